pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Lower bound shared by `cooking_time` and ingredient amounts.
pub const MIN_AMOUNT: i64 = 1;
/// Upper bound shared by `cooking_time` and ingredient amounts.
pub const MAX_AMOUNT: i64 = 32_000;

pub const RECIPE_NAME_MAX_LENGTH: usize = 256;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 128;
pub const MEASUREMENT_UNIT_MAX_LENGTH: usize = 64;
pub const TAG_MAX_LENGTH: usize = 32;
pub const USER_NAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;

pub const SHOPPING_LIST_HEADER: &str = "Shopping list:";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

pub const MEDIA_URL: &str = "/media/";
pub const RECIPE_IMAGE_DIR: &str = "recipes/images";
pub const AVATAR_DIR: &str = "users/avatars";

pub const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];
