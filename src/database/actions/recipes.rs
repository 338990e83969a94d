use std::collections::{HashMap, HashSet};

use crate::{
    error::{QueryError, RecipeError},
    jwt::SessionData,
    pagination::{PageContext, Pagination},
    schema::{
        Id, Recipe, RecipeDetail, RecipeFilter, RecipePart, RecipeRow, RecipeSummary, Tag, UserList,
    },
    validation::{Catalog, RecipeDraft, ValidRecipe},
};

use super::{
    ingredients::existing_ingredients, lists::listed_recipes, tags::existing_tags,
    users::get_profiles,
};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

/// Looks up which of the draft's tags and ingredients exist.
pub async fn load_catalog(draft: &RecipeDraft, pool: &Pool<Postgres>) -> Result<Catalog, RecipeError> {
    let ingredient_ids: Vec<Id> = draft.ingredients.iter().map(|part| part.id).collect();

    let tags = existing_tags(&draft.tags, pool).await?;
    let ingredients = existing_ingredients(&ingredient_ids, pool).await?;

    Ok(Catalog::new(tags, ingredients))
}

async fn attach_parts(
    recipe_id: Id,
    recipe: &ValidRecipe,
    tr: &mut PgConnection,
) -> Result<(), RecipeError> {
    if !recipe.tags.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

        query_builder.push_values(recipe.tags.iter(), |mut b, tag_id| {
            b.push_bind(recipe_id).push_bind(*tag_id);
        });

        query_builder
            .build()
            .execute(&mut *tr)
            .await
            .map_err(RecipeError::from)?;
    }

    if !recipe.ingredients.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");

        query_builder.push_values(recipe.ingredients.iter(), |mut b, line| {
            b.push_bind(recipe_id)
                .push_bind(line.ingredient_id)
                .push_bind(line.amount);
        });

        query_builder
            .build()
            .execute(&mut *tr)
            .await
            .map_err(RecipeError::from)?;
    }

    Ok(())
}

/// Persists the recipe row, its tag set and its ingredient lines as one unit.
pub async fn create_recipe(
    author_id: Id,
    recipe: &ValidRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Id, RecipeError> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(image)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(RecipeError::from)?;

    attach_parts(id.0, recipe, &mut *tr).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!("Recipe {} created by user {author_id}", id.0);
    Ok(id.0)
}

/// Replaces the recipe's fields, tag set and ingredient lines wholesale.
/// `image` is kept when `None`.
pub async fn update_recipe(
    recipe_id: Id,
    recipe: &ValidRecipe,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), RecipeError> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    let result = sqlx::query(
        "
        UPDATE recipes
        SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
        WHERE id = $5
    ",
    )
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(image)
    .bind(recipe_id)
    .execute(&mut *tr)
    .await
    .map_err(RecipeError::from)?;

    if result.rows_affected() == 0 {
        return Err(RecipeError::UnknownResource(String::from("Recipe not found")));
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await
        .map_err(RecipeError::from)?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await
        .map_err(RecipeError::from)?;

    attach_parts(recipe_id, recipe, &mut *tr).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!("Recipe {recipe_id} updated");
    Ok(())
}

/// Lines, tags, favorites and cart entries go with the recipe through `ON DELETE CASCADE`.
pub async fn delete_recipe(recipe_id: Id, pool: &Pool<Postgres>) -> Result<(), RecipeError> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(RecipeError::from)?;

    if result.rows_affected() == 0 {
        return Err(RecipeError::UnknownResource(String::from("Recipe not found")));
    }

    log::info!("Recipe {recipe_id} deleted");
    Ok(())
}

pub async fn get_recipe(recipe_id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, RecipeError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Fetches a recipe the session is allowed to modify.
pub async fn get_recipe_mut(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, RecipeError> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| RecipeError::UnknownResource(String::from("Recipe not found")))?;

    session.authenticate_recipe_owner(recipe.author_id)?;
    Ok(recipe)
}

#[derive(sqlx::FromRow)]
struct RecipeTagRow {
    recipe_id: Id,
    #[sqlx(flatten)]
    tag: Tag,
}

#[derive(sqlx::FromRow)]
struct RecipePartRow {
    recipe_id: Id,
    #[sqlx(flatten)]
    part: RecipePart,
}

async fn fetch_recipe_tags(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<Tag>>, RecipeError> {
    let rows: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    for row in rows {
        tags.entry(row.recipe_id).or_default().push(row.tag);
    }
    Ok(tags)
}

async fn fetch_recipe_parts(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<RecipePart>>, RecipeError> {
    let rows: Vec<RecipePartRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut parts: HashMap<Id, Vec<RecipePart>> = HashMap::new();
    for row in rows {
        parts.entry(row.recipe_id).or_default().push(row.part);
    }
    Ok(parts)
}

/// Expands recipe rows into the full read shape as seen by `viewer`, in the given order.
/// Costs a fixed number of queries however many recipes there are.
pub async fn recipe_details(
    recipes: Vec<Recipe>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, RecipeError> {
    if recipes.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let author_ids: Vec<Id> = recipes
        .iter()
        .map(|recipe| recipe.author_id)
        .collect::<HashSet<Id>>()
        .into_iter()
        .collect();

    let mut tags = fetch_recipe_tags(&ids, pool).await?;
    let mut parts = fetch_recipe_parts(&ids, pool).await?;
    let authors: HashMap<Id, _> = get_profiles(&author_ids, viewer, pool)
        .await?
        .into_iter()
        .map(|profile| (profile.id, profile))
        .collect();

    let (favorites, cart) = match viewer {
        Some(viewer) => (
            listed_recipes(UserList::Favorites, viewer, &ids, pool).await?,
            listed_recipes(UserList::ShoppingCart, viewer, &ids, pool).await?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    let mut details = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = authors
            .get(&recipe.author_id)
            .cloned()
            .ok_or_else(|| RecipeError::UnknownResource(String::from("Author not found")))?;

        details.push(RecipeDetail {
            id: recipe.id,
            tags: tags.remove(&recipe.id).unwrap_or_default(),
            author,
            ingredients: parts.remove(&recipe.id).unwrap_or_default(),
            is_favorited: favorites.contains(&recipe.id),
            is_in_shopping_cart: cart.contains(&recipe.id),
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        });
    }

    Ok(details)
}

pub async fn recipe_detail(
    recipe: Recipe,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, RecipeError> {
    recipe_details(vec![recipe], viewer, pool)
        .await?
        .pop()
        .ok_or_else(|| RecipeError::UnknownResource(String::from("Recipe not found")))
}

fn push_filters(
    query_builder: &mut QueryBuilder<'_, Postgres>,
    filter: &RecipeFilter,
    viewer: Option<Id>,
) {
    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }

    // list filters mean nothing to an anonymous viewer
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart sc WHERE sc.recipe_id = r.id AND sc.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
    }
}

/// Newest recipes first, narrowed by `filter`.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Id>,
    pagination: &Pagination,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeDetail>, RecipeError> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    push_filters(&mut query_builder, filter, viewer);

    query_builder
        .push(" ORDER BY r.id DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows: Vec<RecipeRow> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);

    let recipes = rows.into_iter().map(|row| row.recipe).collect();
    let results = recipe_details(recipes, viewer, pool).await?;

    PageContext::from_rows(results, total_count, pagination)
}

/// An author's newest recipes; `limit = None` returns all of them.
pub async fn fetch_author_recipes(
    author_id: Id,
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeSummary>, RecipeError> {
    let list: Vec<RecipeSummary> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY id DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    .bind(limit.map(|limit| limit.max(0)))
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn count_author_recipes(author_id: Id, pool: &Pool<Postgres>) -> Result<i64, RecipeError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(count.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filtered_sql(filter: &RecipeFilter, viewer: Option<Id>) -> String {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT r.* FROM recipes r WHERE TRUE");
        push_filters(&mut query_builder, filter, viewer);
        query_builder.sql().to_string()
    }

    #[test]
    fn empty_filter_adds_nothing() {
        assert_eq!(
            filtered_sql(&RecipeFilter::default(), Some(1)),
            "SELECT r.* FROM recipes r WHERE TRUE"
        );
    }

    #[test]
    fn list_filters_are_ignored_for_anonymous_viewers() {
        let filter = RecipeFilter {
            is_favorited: true,
            is_in_shopping_cart: true,
            ..Default::default()
        };

        let sql = filtered_sql(&filter, None);
        assert!(!sql.contains("favorites"));
        assert!(!sql.contains("shopping_cart"));

        let sql = filtered_sql(&filter, Some(7));
        assert!(sql.contains("favorites f"));
        assert!(sql.contains("shopping_cart sc"));
    }

    #[test]
    fn tag_and_author_filters_bind_in_order() {
        let filter = RecipeFilter {
            tags: vec![String::from("breakfast"), String::from("lunch")],
            author: Some(3),
            ..Default::default()
        };

        let sql = filtered_sql(&filter, None);
        assert!(sql.contains("t.slug = ANY($1)"));
        assert!(sql.contains("r.author_id = $2"));
    }
}
