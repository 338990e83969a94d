use crate::{
    constants::TAG_MAX_LENGTH,
    error::{QueryError, RecipeError},
    schema::{Id, Tag},
};

use sqlx::{Pool, Postgres};

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub async fn create_tag(name: &str, slug: &str, pool: &Pool<Postgres>) -> Result<Tag, RecipeError> {
    if name.chars().count() > TAG_MAX_LENGTH || slug.chars().count() > TAG_MAX_LENGTH {
        return Err(RecipeError::OutOfRange(format!(
            "Tag name and slug must be at most {TAG_MAX_LENGTH} characters"
        )));
    }
    if !valid_slug(slug) {
        return Err(RecipeError::InvalidField(String::from(
            "Slug may contain only latin letters, digits, '-' and '_'",
        )));
    }

    let tag: Tag = sqlx::query_as("INSERT INTO tags (name, slug) VALUES ($1, $2) RETURNING *")
        .bind(name)
        .bind(slug)
        .fetch_one(pool)
        .await
        .map_err(RecipeError::from)?;

    Ok(tag)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, RecipeError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, RecipeError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

/// Returns which of the given ids exist.
pub async fn existing_tags(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<Id>, RecipeError> {
    let rows: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_url_safe() {
        assert!(valid_slug("breakfast"));
        assert!(valid_slug("late-night_snack2"));
        assert!(!valid_slug(""));
        assert!(!valid_slug("two words"));
        assert!(!valid_slug("завтрак"));
    }
}
