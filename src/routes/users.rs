use serde_json::json;
use warp::{
    http::StatusCode,
    reply::{self, with_status},
    Filter, Rejection, Reply,
};

use crate::{
    actions::{
        fetch_subscriptions, fetch_users, get_profile, login_user, register_user, set_avatar,
        set_password, subscribe, unsubscribe,
    },
    authentication::permissions::ActionType,
    constants::{AVATAR_DIR, USER_COUNT_PER_PAGE},
    error::{rejection, RecipeError},
    form::{Form, FormData},
    jwt::SessionData,
    middleware::{with_possible_session, with_session},
    pagination::Pagination,
    schema::{media_url, Id, NewUser},
};

use super::{json_body, query_params, with_context, Context, QueryParams};

pub fn routes(context: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(register);

    let list = warp::path!("users")
        .and(warp::get())
        .and(with_possible_session(context.keys.clone()))
        .and(query_params())
        .and(with_context(context.clone()))
        .and_then(list_users);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(current_user);

    let avatar_put = warp::path!("users" / "me" / "avatar")
        .and(warp::put())
        .and(with_session(context.keys.clone()))
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(put_avatar);

    let avatar_delete = warp::path!("users" / "me" / "avatar")
        .and(warp::delete())
        .and(with_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(delete_avatar);

    let password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_session(context.keys.clone()))
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(change_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_session(context.keys.clone()))
        .and(query_params())
        .and(with_context(context.clone()))
        .and_then(list_subscriptions);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(with_session(context.keys.clone()))
        .and(query_params())
        .and(with_context(context.clone()))
        .and_then(subscribe_handler);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(unsubscribe_handler);

    let profile = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(context.keys.clone()))
        .and(with_context(context.clone()))
        .and_then(user_profile);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_context(context.clone()))
        .and_then(login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(context.keys.clone()))
        .and_then(logout);

    register
        .or(list)
        .or(me)
        .or(avatar_put)
        .or(avatar_delete)
        .or(password)
        .or(subscriptions)
        .or(subscribe)
        .or(unsubscribe)
        .or(profile)
        .or(login)
        .or(logout)
}

fn recipes_limit(params: &QueryParams) -> Option<i64> {
    params.number("recipes_limit").filter(|limit| *limit >= 0)
}

async fn register(data: FormData, context: Context) -> Result<impl Reply, Rejection> {
    let form = Form::from_data(data);
    let user = NewUser {
        email: form.get_str("email").map_err(rejection)?,
        username: form.get_str("username").map_err(rejection)?,
        first_name: form.get_str("first_name").map_err(rejection)?,
        last_name: form.get_str("last_name").map_err(rejection)?,
        password: form.get_str("password").map_err(rejection)?,
    };

    let created = register_user(user, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(reply::json(&created), StatusCode::CREATED))
}

async fn login(data: FormData, context: Context) -> Result<impl Reply, Rejection> {
    let form = Form::from_data(data);
    let email = form.get_str("email").map_err(rejection)?;
    let password = form.get_str("password").map_err(rejection)?;

    let token = login_user(&email, &password, &context.keys, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(reply::json(&json!({ "auth_token": token })))
}

/// Tokens are stateless; the client just drops it.
async fn logout(_session: SessionData) -> Result<impl Reply, Rejection> {
    Ok(with_status(warp::reply(), StatusCode::NO_CONTENT))
}

async fn list_users(
    session: Option<SessionData>,
    params: QueryParams,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let pagination = Pagination::from_query(&params.to_map(), USER_COUNT_PER_PAGE);
    let page = fetch_users(session.map(|s| s.user_id), &pagination, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(reply::json(&page))
}

async fn user_profile(
    id: Id,
    session: Option<SessionData>,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let profile = get_profile(id, session.map(|s| s.user_id), &context.pool)
        .await
        .map_err(rejection)?
        .ok_or_else(|| rejection(RecipeError::UnknownResource(String::from("User not found"))))?;

    Ok(reply::json(&profile))
}

async fn current_user(session: SessionData, context: Context) -> Result<impl Reply, Rejection> {
    user_profile(session.user_id, Some(session), context).await
}

async fn change_password(
    session: SessionData,
    data: FormData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let form = Form::from_data(data);
    let current = form.get_str("current_password").map_err(rejection)?;
    let new = form.get_str("new_password").map_err(rejection)?;

    set_password(session.user_id, &current, &new, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(warp::reply(), StatusCode::NO_CONTENT))
}

async fn put_avatar(
    session: SessionData,
    data: FormData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let upload = Form::from_data(data).get_str("avatar").map_err(rejection)?;
    let avatar = context
        .media
        .save(&upload, AVATAR_DIR)
        .await
        .map_err(rejection)?;

    let previous = match set_avatar(session.user_id, Some(&avatar), &context.pool).await {
        Ok(previous) => previous,
        Err(e) => {
            context.media.remove(&avatar).await;
            return Err(rejection(e));
        }
    };

    if let Some(previous) = previous {
        context.media.remove(&previous).await;
    }

    Ok(reply::json(&json!({ "avatar": media_url(&avatar) })))
}

async fn delete_avatar(session: SessionData, context: Context) -> Result<impl Reply, Rejection> {
    let previous = set_avatar(session.user_id, None, &context.pool)
        .await
        .map_err(rejection)?;

    if let Some(previous) = previous {
        context.media.remove(&previous).await;
    }

    Ok(with_status(warp::reply(), StatusCode::NO_CONTENT))
}

async fn list_subscriptions(
    session: SessionData,
    params: QueryParams,
    context: Context,
) -> Result<impl Reply, Rejection> {
    let pagination = Pagination::from_query(&params.to_map(), USER_COUNT_PER_PAGE);
    let page = fetch_subscriptions(
        session.user_id,
        &pagination,
        recipes_limit(&params),
        &context.pool,
    )
    .await
    .map_err(rejection)?;

    Ok(reply::json(&page))
}

async fn subscribe_handler(
    id: Id,
    session: SessionData,
    params: QueryParams,
    context: Context,
) -> Result<impl Reply, Rejection> {
    session
        .authenticate(ActionType::ManageSubscriptions)
        .map_err(rejection)?;

    let author = subscribe(session.user_id, id, recipes_limit(&params), &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(reply::json(&author), StatusCode::CREATED))
}

async fn unsubscribe_handler(
    id: Id,
    session: SessionData,
    context: Context,
) -> Result<impl Reply, Rejection> {
    session
        .authenticate(ActionType::ManageSubscriptions)
        .map_err(rejection)?;

    unsubscribe(session.user_id, id, &context.pool)
        .await
        .map_err(rejection)?;

    Ok(with_status(warp::reply(), StatusCode::NO_CONTENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_recipes_limit_is_ignored() {
        assert_eq!(recipes_limit(&QueryParams::parse("recipes_limit=3")), Some(3));
        assert_eq!(recipes_limit(&QueryParams::parse("recipes_limit=-1")), None);
        assert_eq!(recipes_limit(&QueryParams::parse("")), None);
    }
}
