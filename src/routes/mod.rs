use std::{collections::HashMap, convert::Infallible};

use serde::Serialize;
use sqlx::{Pool, Postgres};
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    reply::{json, with_status},
    Filter, Rejection, Reply,
};

use crate::{error::ApiError, form::FormData, jwt::SessionKeys, media::MediaStore};

mod catalog;
mod recipes;
mod users;

/// Request bodies carry base64 images, so the limit is generous.
const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct Context {
    pub pool: Pool<Postgres>,
    pub keys: SessionKeys,
    pub media: MediaStore,
}

pub fn with_context(context: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

fn json_body() -> impl Filter<Extract = (FormData,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

/// The raw query string, empty when there is none.
fn query_params() -> impl Filter<Extract = (QueryParams,), Error = Infallible> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
        .map(|raw: String| QueryParams::parse(&raw))
}

/// Decoded query pairs, keeping repeated keys such as `tags`.
#[derive(Debug, Default, Clone)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: &str) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    /// `1` enables a flag; anything else leaves it off.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).map(str::trim) == Some("1")
    }

    pub fn number(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (k, v) in &self.pairs {
            map.entry(k.to_owned()).or_insert_with(|| v.to_owned());
        }
        map
    }
}

#[derive(Serialize)]
struct ErrorBody {
    errors: String,
}

/// Renders every rejection as `{"errors": "<message>"}`.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = err.find::<ApiError>() {
        (
            StatusCode::from_u16(e.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            e.message.to_owned(),
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, String::from("Method not allowed"))
    } else if err.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, String::from("Content-Length is required"))
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, String::from("Request body is too large"))
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            String::from("Request body must be JSON"),
        )
    } else {
        log::error!("Unhandled rejection {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("Internal server error"),
        )
    };

    log::trace!("Request rejected with {status}: {message}");
    Ok(with_status(json(&ErrorBody { errors: message }), status))
}

/// The JSON API without the media file server or error recovery.
pub fn api(context: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    recipes::routes(context.clone())
        .or(users::routes(context.clone()))
        .or(catalog::routes(context))
}

/// The complete service: API, uploaded media and error rendering.
pub fn routes(context: Context) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let media = warp::path("media")
        .and(warp::get())
        .and(warp::fs::dir(context.media.root().to_path_buf()));

    api(context)
        .or(media)
        .recover(handle_rejection)
        .with(warp::log("foodgram"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_keeps_repeated_keys() {
        let params = QueryParams::parse("tags=breakfast&tags=lunch&author=3&is_favorited=1");

        assert_eq!(params.get_all("tags"), vec!["breakfast", "lunch"]);
        assert_eq!(params.number("author"), Some(3));
        assert!(params.flag("is_favorited"));
        assert!(!params.flag("is_in_shopping_cart"));
    }

    #[test]
    fn only_one_enables_a_flag() {
        assert!(!QueryParams::parse("is_favorited=0").flag("is_favorited"));
        assert!(!QueryParams::parse("is_favorited=true").flag("is_favorited"));
    }

    #[test]
    fn query_decodes_escapes() {
        let params = QueryParams::parse("name=%D1%81%D0%BE%D0%BB%D1%8C+morska");
        assert_eq!(params.get("name"), Some("соль morska"));
    }

    #[test]
    fn map_keeps_the_first_value() {
        let map = QueryParams::parse("page=2&page=5").to_map();
        assert_eq!(map.get("page").map(String::as_str), Some("2"));
    }
}
