use warp::{
    http::StatusCode,
    reply::{self, with_status},
    Filter, Rejection, Reply,
};

use crate::{
    actions::{create_tag, get_ingredient, get_tag, list_tags, search_ingredients},
    authentication::permissions::ActionType,
    error::{rejection, RecipeError},
    form::{Form, FormData},
    jwt::SessionData,
    middleware::with_session,
    schema::Id,
};

use super::{json_body, query_params, with_context, Context, QueryParams};

pub fn routes(context: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(tag_list);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(tag_detail);

    let new_tag = warp::path!("tags")
        .and(warp::post())
        .and(with_session(context.keys.clone()))
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(tag_create);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(query_params())
        .and(with_context(context.clone()))
        .and_then(ingredient_search);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_context(context))
        .and_then(ingredient_detail);

    tags.or(tag).or(new_tag).or(ingredients).or(ingredient)
}

async fn tag_list(context: Context) -> Result<impl Reply, Rejection> {
    let tags = list_tags(&context.pool).await.map_err(rejection)?;
    Ok(reply::json(&tags))
}

async fn tag_detail(id: Id, context: Context) -> Result<impl Reply, Rejection> {
    let tag = get_tag(id, &context.pool)
        .await
        .map_err(rejection)?
        .ok_or_else(|| rejection(RecipeError::UnknownResource(String::from("Tag not found"))))?;

    Ok(reply::json(&tag))
}

async fn tag_create(
    session: SessionData,
    data: FormData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    session
        .authenticate(ActionType::CreateTags)
        .map_err(rejection)?;

    let form = Form::from_data(data);
    let name = form.get_str("name").map_err(rejection)?;
    let slug = form.get_str("slug").map_err(rejection)?;

    let tag = create_tag(&name, &slug, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(reply::json(&tag), StatusCode::CREATED))
}

async fn ingredient_search(params: QueryParams, context: Context) -> Result<impl Reply, Rejection> {
    let ingredients = search_ingredients(params.get("name"), &context.pool)
        .await
        .map_err(rejection)?;

    Ok(reply::json(&ingredients))
}

async fn ingredient_detail(id: Id, context: Context) -> Result<impl Reply, Rejection> {
    let ingredient = get_ingredient(id, &context.pool)
        .await
        .map_err(rejection)?
        .ok_or_else(|| {
            rejection(RecipeError::UnknownResource(String::from(
                "Ingredient not found",
            )))
        })?;

    Ok(reply::json(&ingredient))
}
