use crate::{
    constants::{INGREDIENT_NAME_MAX_LENGTH, MEASUREMENT_UNIT_MAX_LENGTH},
    error::{QueryError, RecipeError},
    schema::{Id, Ingredient, NewIngredient},
};

use sqlx::{Pool, Postgres};

/// Escapes `LIKE` wildcards so user input only ever matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Case-insensitive prefix search by name; no prefix lists the whole catalog.
pub async fn search_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, RecipeError> {
    let pattern = like_prefix(prefix.unwrap_or("").trim());

    let rows: Vec<Ingredient> = sqlx::query_as(
        "SELECT * FROM ingredients WHERE LOWER(name) LIKE LOWER($1) ORDER BY name, id",
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_ingredient(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<Ingredient>, RecipeError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Returns which of the given ids exist.
pub async fn existing_ingredients(
    ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<Id>, RecipeError> {
    let rows: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Loads catalog fixtures in one transaction, skipping pairs that are already present.
/// Returns the number of inserted ingredients.
pub async fn import_ingredients(
    ingredients: Vec<NewIngredient>,
    pool: &Pool<Postgres>,
) -> Result<u64, RecipeError> {
    let mut names = Vec::with_capacity(ingredients.len());
    let mut units = Vec::with_capacity(ingredients.len());

    for ingredient in ingredients {
        let name = ingredient.name.trim().to_string();
        let unit = ingredient.measurement_unit.trim().to_string();

        if name.is_empty() || unit.is_empty() {
            return Err(RecipeError::MissingField(String::from(
                "Every ingredient needs a name and a measurement unit",
            )));
        }
        if name.chars().count() > INGREDIENT_NAME_MAX_LENGTH
            || unit.chars().count() > MEASUREMENT_UNIT_MAX_LENGTH
        {
            return Err(RecipeError::OutOfRange(format!("Ingredient '{name}' is too long")));
        }

        names.push(name);
        units.push(unit);
    }

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    let result = sqlx::query(
        "
        INSERT INTO ingredients (name, measurement_unit)
        SELECT * FROM UNNEST($1::varchar[], $2::varchar[])
        ON CONFLICT (name, measurement_unit) DO NOTHING
    ",
    )
    .bind(&names)
    .bind(&units)
    .execute(&mut *tr)
    .await
    .map_err(RecipeError::from)?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_escapes_wildcards() {
        assert_eq!(like_prefix("sal"), "sal%");
        assert_eq!(like_prefix("50%_"), "50\\%\\_%");
        assert_eq!(like_prefix(""), "%");
    }
}
