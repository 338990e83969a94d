use serde_json::json;
use warp::{
    http::{StatusCode, Uri},
    reply::{self, with_header, with_status},
    Filter, Rejection, Reply,
};

use crate::{
    actions::{
        add_to_list, create_recipe, delete_recipe, fetch_recipes, get_recipe, get_recipe_mut,
        load_catalog, recipe_detail, remove_from_list, shopping_list, update_recipe,
    },
    authentication::permissions::ActionType,
    constants::{RECIPE_COUNT_PER_PAGE, RECIPE_IMAGE_DIR, SHOPPING_LIST_FILENAME},
    error::{rejection, RecipeError},
    form::{Form, FormData},
    jwt::SessionData,
    middleware::{with_possible_session, with_session},
    pagination::Pagination,
    schema::{Id, RecipeDetail, RecipeFilter, UserList},
    shopping_list::render,
    validation::{validate_recipe, RecipeDraft},
};

use super::{json_body, query_params, with_context, Context, QueryParams};

pub fn routes(context: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_possible_session(context.keys.clone()))
        .and(query_params())
        .and(with_context(context.clone()))
        .and_then(list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(context.keys.clone()))
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(create_recipe_handler);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(download_shopping_cart);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(get_recipe_handler);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(context.keys.clone()))
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(update_recipe_handler);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(delete_recipe_handler);

    let link = warp::path!("recipes" / Id / "get-link")
        .and(warp::get())
        .and(warp::header::optional::<String>("host"))
        .and(with_context(context.clone()))
        .and_then(get_link);

    let short_link = warp::path!("s" / Id)
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(follow_link);

    list.or(create)
        .or(download)
        .or(detail)
        .or(update)
        .or(delete)
        .or(link)
        .or(short_link)
        .or(list_routes("favorite", UserList::Favorites, context.clone()))
        .or(list_routes("shopping_cart", UserList::ShoppingCart, context))
}

/// `POST` and `DELETE` on `/recipes/{id}/{segment}/`.
fn list_routes(
    segment: &'static str,
    list: UserList,
    context: Context,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let path = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = path
        .clone()
        .and(warp::post())
        .and(with_session(context.keys.clone()))
        .and(warp::any().map(move || list))
        .and(with_context(context.clone()))
        .and_then(add_to_list_handler);

    let remove = path
        .and(warp::delete())
        .and(with_session(context.keys.clone()))
        .and(warp::any().map(move || list))
        .and(with_context(context))
        .and_then(remove_from_list_handler);

    add.or(remove)
}

fn recipe_filter(params: &QueryParams) -> Result<RecipeFilter, RecipeError> {
    let author = params
        .get("author")
        .map(|author| author.trim().parse::<Id>())
        .transpose()
        .map_err(|_| RecipeError::InvalidField(String::from("'author' must be an identifier")))?;

    Ok(RecipeFilter {
        tags: params.get_all("tags"),
        author,
        is_favorited: params.flag("is_favorited"),
        is_in_shopping_cart: params.flag("is_in_shopping_cart"),
    })
}

async fn load_detail(id: Id, viewer: Option<Id>, context: &Context) -> Result<RecipeDetail, Rejection> {
    let recipe = get_recipe(id, &context.pool)
        .await
        .map_err(rejection)?
        .ok_or_else(|| rejection(RecipeError::UnknownResource(String::from("Recipe not found"))))?;

    recipe_detail(recipe, viewer, &context.pool)
        .await
        .map_err(rejection)
}

async fn list_recipes(
    session: Option<SessionData>,
    params: QueryParams,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let filter = recipe_filter(&params).map_err(rejection)?;
    let pagination = Pagination::from_query(&params.to_map(), RECIPE_COUNT_PER_PAGE);
    let viewer = session.map(|session| session.user_id);

    let page = fetch_recipes(&filter, viewer, &pagination, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(reply::json(&page))
}

async fn create_recipe_handler(
    session: SessionData,
    data: FormData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    session
        .authenticate(ActionType::CreateRecipes)
        .map_err(rejection)?;

    let draft = RecipeDraft::from_form(&Form::from_data(data), true).map_err(rejection)?;
    let catalog = load_catalog(&draft, &context.pool)
        .await
        .map_err(rejection)?;
    let recipe = validate_recipe(draft, &catalog).map_err(rejection)?;

    let upload = recipe
        .image
        .as_deref()
        .ok_or_else(|| rejection(RecipeError::missing("image")))?;
    let image = context
        .media
        .save(upload, RECIPE_IMAGE_DIR)
        .await
        .map_err(rejection)?;

    let id = match create_recipe(session.user_id, &recipe, &image, &context.pool).await {
        Ok(id) => id,
        Err(e) => {
            context.media.remove(&image).await;
            return Err(rejection(e));
        }
    };

    let detail = load_detail(id, Some(session.user_id), &context).await?;
    Ok(with_status(reply::json(&detail), StatusCode::CREATED))
}

async fn get_recipe_handler(
    id: Id,
    session: Option<SessionData>,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let detail = load_detail(id, session.map(|s| s.user_id), &context).await?;
    Ok(reply::json(&detail))
}

async fn update_recipe_handler(
    id: Id,
    session: SessionData,
    data: FormData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let current = get_recipe_mut(id, &session, &context.pool)
        .await
        .map_err(rejection)?;

    let draft = RecipeDraft::from_form(&Form::from_data(data), false).map_err(rejection)?;
    let catalog = load_catalog(&draft, &context.pool)
        .await
        .map_err(rejection)?;
    let recipe = validate_recipe(draft, &catalog).map_err(rejection)?;

    let image = match recipe.image.as_deref() {
        Some(upload) => Some(
            context
                .media
                .save(upload, RECIPE_IMAGE_DIR)
                .await
                .map_err(rejection)?,
        ),
        None => None,
    };

    if let Err(e) = update_recipe(id, &recipe, image.as_deref(), &context.pool).await {
        if let Some(image) = &image {
            context.media.remove(image).await;
        }
        return Err(rejection(e));
    }

    if image.is_some() {
        context.media.remove(&current.image).await;
    }

    let detail = load_detail(id, Some(session.user_id), &context).await?;
    Ok(reply::json(&detail))
}

async fn delete_recipe_handler(
    id: Id,
    session: SessionData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let recipe = get_recipe_mut(id, &session, &context.pool)
        .await
        .map_err(rejection)?;

    delete_recipe(id, &context.pool).await.map_err(rejection)?;
    context.media.remove(&recipe.image).await;

    Ok(with_status(warp::reply(), StatusCode::NO_CONTENT))
}

async fn get_link(id: Id, host: Option<String>, context: Context) -> Result<impl Reply, Rejection> {
    if get_recipe(id, &context.pool)
        .await
        .map_err(rejection)?
        .is_none()
    {
        return Err(rejection(RecipeError::UnknownResource(String::from(
            "Recipe not found",
        ))));
    }

    let host = host.unwrap_or_else(|| String::from("localhost"));
    Ok(reply::json(&json!({ "short-link": format!("http://{host}/s/{id}") })))
}

async fn follow_link(id: Id, context: Context) -> Result<impl Reply, Rejection> {
    if get_recipe(id, &context.pool)
        .await
        .map_err(rejection)?
        .is_none()
    {
        return Err(rejection(RecipeError::UnknownResource(String::from(
            "Recipe not found",
        ))));
    }

    let location = Uri::try_from(format!("/recipes/{id}/"))
        .map_err(|_| rejection(RecipeError::UnknownResource(String::from("Recipe not found"))))?;

    Ok(warp::redirect::found(location))
}

async fn add_to_list_handler(
    id: Id,
    session: SessionData,
    list: UserList,
    context: Context,
) -> Result<impl Reply, Rejection> {
    session
        .authenticate(ActionType::ManageOwnLists)
        .map_err(rejection)?;

    let summary = add_to_list(list, session.user_id, id, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(reply::json(&summary), StatusCode::CREATED))
}

async fn remove_from_list_handler(
    id: Id,
    session: SessionData,
    list: UserList,
    context: Context,
) -> Result<impl Reply, Rejection> {
    session
        .authenticate(ActionType::ManageOwnLists)
        .map_err(rejection)?;

    remove_from_list(list, session.user_id, id, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(warp::reply(), StatusCode::NO_CONTENT))
}

async fn download_shopping_cart(session: SessionData, context: Context) -> Result<impl Reply, Rejection> {
    let items = shopping_list(session.user_id, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_header(
        render(&items),
        "content-disposition",
        format!("attachment; filename={SHOPPING_LIST_FILENAME}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_reads_query() {
        let filter = recipe_filter(&QueryParams::parse(
            "tags=breakfast&tags=dinner&author=4&is_in_shopping_cart=1",
        ))
        .unwrap();

        assert_eq!(
            filter,
            RecipeFilter {
                tags: vec![String::from("breakfast"), String::from("dinner")],
                author: Some(4),
                is_favorited: false,
                is_in_shopping_cart: true,
            }
        );
    }

    #[test]
    fn filter_rejects_bad_author() {
        assert!(matches!(
            recipe_filter(&QueryParams::parse("author=me")),
            Err(RecipeError::InvalidField(_))
        ));
    }
}
