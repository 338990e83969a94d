use serde::{Deserialize, Serialize};

use crate::constants::MEDIA_URL;

pub type Id = i32;

#[derive(
    Clone, Debug, PartialEq, PartialOrd, sqlx::Type, Serialize, Eq, Ord, Hash, Deserialize,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

/// The two per-user recipe collections sharing the same add/remove rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserList {
    Favorites,
    ShoppingCart,
}

impl UserList {
    pub fn table(&self) -> &'static str {
        match self {
            UserList::Favorites => "favorites",
            UserList::ShoppingCart => "shopping_cart",
        }
    }

    pub fn already_listed(&self) -> &'static str {
        match self {
            UserList::Favorites => "Recipe is already in favorites",
            UserList::ShoppingCart => "Recipe is already in the shopping cart",
        }
    }

    pub fn not_listed(&self) -> &'static str {
        match self {
            UserList::Favorites => "Recipe is not in favorites",
            UserList::ShoppingCart => "Recipe is not in the shopping cart",
        }
    }
}

/// Turns a stored media path into the public URL it is served from.
pub fn media_url(path: &str) -> String {
    format!("{MEDIA_URL}{path}")
}

fn serialize_media<S>(path: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match path {
        Some(path) => serializer.serialize_some(&media_url(path)),
        None => serializer.serialize_none(),
    }
}

fn serialize_required_media<S>(path: &String, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&media_url(path))
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub avatar: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Public representation returned right after registration.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    #[serde(serialize_with = "serialize_media")]
    pub avatar: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserProfileRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(skip)]
    pub count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Recipe {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipeRow {
    #[sqlx(flatten)]
    pub recipe: Recipe,
    pub count: i64,
}

/// An ingredient line of a recipe as shown to clients.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecipePart {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Minimal recipe shape returned by list toggles and author listings.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: Id,
    pub name: String,
    #[serde(serialize_with = "serialize_required_media")]
    pub image: String,
    pub cooking_time: i32,
}

impl From<Recipe> for RecipeSummary {
    fn from(value: Recipe) -> Self {
        Self {
            id: value.id,
            name: value.name,
            image: value.image,
            cooking_time: value.cooking_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipePart>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    #[serde(serialize_with = "serialize_required_media")]
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Query-string filters of the recipe listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Vec<String>,
    pub author: Option<Id>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// An author as seen from the subscriptions page.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorWithRecipes {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct AuthorRow {
    #[sqlx(flatten)]
    pub profile: UserProfile,
    pub recipes_count: i64,
    pub count: i64,
}

/// One ingredient line of a recipe sitting in a shopping cart.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub ingredient_id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub ingredient_id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}
