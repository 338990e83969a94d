use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::SessionKeys,
    },
    constants::{EMAIL_MAX_LENGTH, USER_NAME_MAX_LENGTH},
    error::{QueryError, RecipeError},
    pagination::{PageContext, Pagination},
    schema::{CreatedUser, Id, NewUser, User, UserProfile, UserProfileRow},
};

use sqlx::{Pool, Postgres};

/// Profile columns; `$1` is the viewing user (or NULL) for `is_subscribed`.
pub(crate) const PROFILE_COLUMNS: &str = "
    u.id, u.email, u.username, u.first_name, u.last_name, u.avatar,
    EXISTS (
        SELECT 1 FROM subscriptions s WHERE s.author_id = u.id AND s.subscriber_id = $1
    ) AS is_subscribed
";

pub async fn get_user(pool: &Pool<Postgres>, email: &str) -> Result<Option<User>, RecipeError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, RecipeError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
}

fn check_new_user(user: &NewUser) -> Result<(), RecipeError> {
    let fields = [
        ("email", &user.email, EMAIL_MAX_LENGTH),
        ("username", &user.username, USER_NAME_MAX_LENGTH),
        ("first_name", &user.first_name, USER_NAME_MAX_LENGTH),
        ("last_name", &user.last_name, USER_NAME_MAX_LENGTH),
    ];

    for (field, value, max) in fields {
        if value.trim().is_empty() {
            return Err(RecipeError::missing(field));
        }
        if value.chars().count() > max {
            return Err(RecipeError::OutOfRange(format!(
                "Field '{field}' must be at most {max} characters"
            )));
        }
    }

    if user.password.is_empty() {
        return Err(RecipeError::missing("password"));
    }
    if !user.email.contains('@') {
        return Err(RecipeError::InvalidField(String::from("Enter a valid email address")));
    }
    if !valid_username(&user.username) {
        return Err(RecipeError::InvalidField(String::from(
            "Username may contain only letters, digits and @/./+/-/_",
        )));
    }

    Ok(())
}

/// Creates a user; the password is stored as an argon2 hash.
pub async fn register_user(user: NewUser, pool: &Pool<Postgres>) -> Result<CreatedUser, RecipeError> {
    check_new_user(&user)?;

    let password = hash_password(&user.password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        RecipeError::Storage(String::from("Could not store password"))
    })?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(RecipeError::from)?;

    log::info!("Registered user {} ({})", user.username, id.0);

    Ok(CreatedUser {
        id: id.0,
        email: user.email,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    })
}

pub async fn login_user(
    email: &str,
    password: &str,
    keys: &SessionKeys,
    pool: &Pool<Postgres>,
) -> Result<String, RecipeError> {
    let user = get_user(pool, email)
        .await?
        .ok_or(RecipeError::InvalidCredentials)?;

    let authenticated = verify_password(password, &user.password).map_err(|e| {
        log::error!("Stored password hash of user {} is unreadable: {e}", user.id);
        RecipeError::InvalidCredentials
    })?;
    if !authenticated {
        return Err(RecipeError::InvalidCredentials);
    }

    keys.generate_jwt_session(&user)
}

pub async fn set_password(
    user_id: Id,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), RecipeError> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| RecipeError::UnknownResource(String::from("User not found")))?;

    let matches = verify_password(current_password, &user.password)
        .map_err(|_| RecipeError::InvalidCredentials)?;
    if !matches {
        return Err(RecipeError::InvalidField(String::from(
            "Current password is incorrect",
        )));
    }
    if new_password.is_empty() {
        return Err(RecipeError::missing("new_password"));
    }

    let password = hash_password(new_password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        RecipeError::Storage(String::from("Could not store password"))
    })?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

pub async fn get_profile(
    user_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Option<UserProfile>, RecipeError> {
    let row: Option<UserProfile> =
        sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = $2"))
            .bind(viewer)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_profiles(
    user_ids: &[Id],
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserProfile>, RecipeError> {
    let rows: Vec<UserProfile> =
        sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = ANY($2)"))
            .bind(viewer)
            .bind(user_ids)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn fetch_users(
    viewer: Option<Id>,
    pagination: &Pagination,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserProfile>, RecipeError> {
    let rows: Vec<UserProfileRow> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS}, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(viewer)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|p| p.count).unwrap_or(0);
    let rows = rows.into_iter().map(|row| row.profile).collect();

    PageContext::from_rows(rows, total_count, pagination)
}

/// Stores a new avatar path and hands back the previous one so its file can be removed.
pub async fn set_avatar(
    user_id: Id,
    avatar: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Option<String>, RecipeError> {
    let previous: Option<(Option<String>,)> = sqlx::query_as(
        "
        UPDATE users u SET avatar = $1
        FROM (SELECT id, avatar FROM users WHERE id = $2 FOR UPDATE) old
        WHERE u.id = old.id
        RETURNING old.avatar
    ",
    )
    .bind(avatar)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    match previous {
        Some((previous,)) => Ok(previous),
        None => Err(RecipeError::UnknownResource(String::from("User not found"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user() -> NewUser {
        NewUser {
            email: String::from("cook@example.com"),
            username: String::from("cook.42"),
            first_name: String::from("Ada"),
            last_name: String::from("Cook"),
            password: String::from("hunter22"),
        }
    }

    #[test]
    fn accepts_complete_user() {
        assert_eq!(check_new_user(&new_user()), Ok(()));
    }

    #[test]
    fn blank_fields_are_missing() {
        let mut user = new_user();
        user.first_name = String::from("  ");

        assert!(matches!(check_new_user(&user), Err(RecipeError::MissingField(_))));
    }

    #[test]
    fn rejects_odd_usernames_and_emails() {
        let mut user = new_user();
        user.username = String::from("no spaces");
        assert!(matches!(check_new_user(&user), Err(RecipeError::InvalidField(_))));

        let mut user = new_user();
        user.email = String::from("cook.example.com");
        assert!(matches!(check_new_user(&user), Err(RecipeError::InvalidField(_))));
    }

    #[test]
    fn long_names_are_out_of_range() {
        let mut user = new_user();
        user.last_name = "x".repeat(USER_NAME_MAX_LENGTH + 1);

        assert!(matches!(check_new_user(&user), Err(RecipeError::OutOfRange(_))));
    }
}
