use std::convert::Infallible;

use warp::{reject::Rejection, Filter};

use crate::error::{rejection, RecipeError};

use super::jwt::{SessionData, SessionKeys};

const TOKEN_SCHEMES: &[&str] = &["Token ", "Bearer "];

fn parse_authorization(header: &str) -> Option<&str> {
    TOKEN_SCHEMES
        .iter()
        .find_map(|scheme| header.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn read_session(keys: &SessionKeys, header: Option<String>) -> Result<SessionData, Rejection> {
    let header = header.ok_or_else(|| {
        rejection(RecipeError::Unauthorized(String::from(
            "Authentication credentials were not provided",
        )))
    })?;

    let token = parse_authorization(&header).ok_or_else(|| {
        rejection(RecipeError::Unauthorized(String::from(
            "Invalid authorization header",
        )))
    })?;

    keys.verify_jwt_session(token)
        .map(SessionData::from)
        .map_err(|e| rejection(RecipeError::Unauthorized(e.info.unwrap_or_default())))
}

pub fn with_session(
    keys: SessionKeys,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let keys = keys.clone();
        async move { read_session(&keys, header) }
    })
}

/// Like [`with_session`], but anonymous or invalid credentials read as `None`.
pub fn with_possible_session(
    keys: SessionKeys,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    warp::header::optional::<String>("authorization")
        .or(warp::any().map(|| None::<String>))
        .unify()
        .map(move |header: Option<String>| read_session(&keys, header).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_token_and_bearer_schemes() {
        assert_eq!(parse_authorization("Token abc.def"), Some("abc.def"));
        assert_eq!(parse_authorization("Bearer abc.def "), Some("abc.def"));
    }

    #[test]
    fn rejects_unknown_or_empty_schemes() {
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Token   "), None);
        assert_eq!(parse_authorization("abc.def"), None);
    }
}
