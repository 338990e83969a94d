use crate::{
    error::{QueryError, RecipeError},
    pagination::{PageContext, Pagination},
    schema::{AuthorRow, AuthorWithRecipes, Id, UserProfile},
};

use super::{
    recipes::{count_author_recipes, fetch_author_recipes},
    users::{get_profile, PROFILE_COLUMNS},
};

use sqlx::{Pool, Postgres};

pub async fn is_subscribed(
    subscriber_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, RecipeError> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE subscriber_id = $1 AND author_id = $2)",
    )
    .bind(subscriber_id)
    .bind(author_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.0)
}

async fn author_view(
    profile: UserProfile,
    recipes_count: i64,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<AuthorWithRecipes, RecipeError> {
    let recipes = fetch_author_recipes(profile.id, recipes_limit, pool).await?;

    Ok(AuthorWithRecipes {
        profile,
        recipes,
        recipes_count,
    })
}

/// Self-subscription is refused before anything else is looked at.
pub async fn subscribe(
    subscriber_id: Id,
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<AuthorWithRecipes, RecipeError> {
    if subscriber_id == author_id {
        return Err(RecipeError::SelfReference(String::from(
            "You can't subscribe to yourself",
        )));
    }

    let profile = get_profile(author_id, Some(subscriber_id), pool)
        .await?
        .ok_or_else(|| RecipeError::UnknownResource(String::from("User not found")))?;

    if profile.is_subscribed {
        return Err(RecipeError::AlreadyExists(String::from(
            "You are already subscribed to this author",
        )));
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (subscriber_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(subscriber_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(RecipeError::from)?;

    if result.rows_affected() == 0 {
        return Err(RecipeError::AlreadyExists(String::from(
            "You are already subscribed to this author",
        )));
    }

    let recipes_count = count_author_recipes(author_id, pool).await?;
    let profile = UserProfile {
        is_subscribed: true,
        ..profile
    };

    author_view(profile, recipes_count, recipes_limit, pool).await
}

pub async fn unsubscribe(
    subscriber_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), RecipeError> {
    if get_profile(author_id, None, pool).await?.is_none() {
        return Err(RecipeError::UnknownResource(String::from("User not found")));
    }

    let result = sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = $1 AND author_id = $2")
        .bind(subscriber_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(RecipeError::from)?;

    if result.rows_affected() == 0 {
        return Err(RecipeError::NotFound(String::from(
            "You are not subscribed to this author",
        )));
    }

    Ok(())
}

/// Authors the subscriber follows, in subscription order.
pub async fn fetch_subscriptions(
    subscriber_id: Id,
    pagination: &Pagination,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<AuthorWithRecipes>, RecipeError> {
    let rows: Vec<AuthorRow> = sqlx::query_as(&format!(
        "
        SELECT {PROFILE_COLUMNS},
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM subscriptions sub
        INNER JOIN users u ON u.id = sub.author_id
        WHERE sub.subscriber_id = $1
        ORDER BY sub.id
        LIMIT $2 OFFSET $3
    "
    ))
    .bind(subscriber_id)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(author_view(row.profile, row.recipes_count, recipes_limit, pool).await?);
    }

    PageContext::from_rows(results, total_count, pagination)
}
