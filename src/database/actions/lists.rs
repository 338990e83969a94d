use std::collections::HashSet;

use crate::{
    error::{QueryError, RecipeError},
    schema::{CartLine, Id, RecipeSummary, ShoppingListItem, UserList},
    shopping_list::aggregate,
};

use super::recipes::get_recipe;

use sqlx::{Pool, Postgres};

pub async fn is_in_list(
    list: UserList,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, RecipeError> {
    let row: (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.0)
}

/// Which of `recipe_ids` the user has in `list`.
pub async fn listed_recipes(
    list: UserList,
    user_id: Id,
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Id>, RecipeError> {
    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Adds the pair once. A concurrent duplicate is caught by the insert itself.
pub async fn add_to_list(
    list: UserList,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, RecipeError> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| RecipeError::UnknownResource(String::from("Recipe not found")))?;

    if is_in_list(list, user_id, recipe_id, pool).await? {
        return Err(RecipeError::AlreadyExists(list.already_listed().to_owned()));
    }

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(RecipeError::from)?;

    if result.rows_affected() == 0 {
        return Err(RecipeError::AlreadyExists(list.already_listed().to_owned()));
    }

    Ok(RecipeSummary::from(recipe))
}

pub async fn remove_from_list(
    list: UserList,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), RecipeError> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(RecipeError::UnknownResource(String::from("Recipe not found")));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(RecipeError::from)?;

    if result.rows_affected() == 0 {
        return Err(RecipeError::NotFound(list.not_listed().to_owned()));
    }

    Ok(())
}

/// Every ingredient line of every recipe in the user's cart, unaggregated.
pub async fn fetch_cart_lines(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<CartLine>, RecipeError> {
    let lines: Vec<CartLine> = sqlx::query_as(
        "
        SELECT i.id AS ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM shopping_cart sc
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(lines)
}

pub async fn shopping_list(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListItem>, RecipeError> {
    let lines = fetch_cart_lines(user_id, pool).await?;
    Ok(aggregate(lines))
}
