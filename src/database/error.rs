use std::fmt::{self, Display};

use potion::Error;
use warp::reject::{self, Rejection};

pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl Into<Error> for QueryError {
    fn into(self) -> Error {
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

/// Failures surfaced to API callers. Every variant except `Storage` is a client error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipeError {
    #[error("{0}")]
    MissingField(String),
    #[error("{0}")]
    InvalidField(String),
    #[error("{0}")]
    DuplicateEntry(String),
    #[error("{0}")]
    OutOfRange(String),
    #[error("{0}")]
    ReferenceNotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    SelfReference(String),
    #[error("{0}")]
    UnknownResource(String),
    #[error("Unable to log in with provided credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthorized(String),
    #[error("You don't have permission to perform this action")]
    Forbidden,
    #[error("{0}")]
    Storage(String),
}

impl RecipeError {
    pub fn missing(field: &str) -> Self {
        Self::MissingField(format!("Field '{field}' is required"))
    }

    pub fn status(&self) -> u16 {
        match self {
            RecipeError::UnknownResource(_) => 404,
            RecipeError::Unauthorized(_) => 401,
            RecipeError::Forbidden => 403,
            RecipeError::Storage(_) => 500,
            _ => 400,
        }
    }
}

impl From<QueryError> for RecipeError {
    fn from(value: QueryError) -> Self {
        log::error!("Query failed {value}");
        Self::Storage(String::from("Internal server error"))
    }
}

/// Maps named storage constraints back onto the error a caller would have received from
/// the application-level check, so a lost race reads the same as a rejected request.
impl From<sqlx::Error> for RecipeError {
    fn from(value: sqlx::Error) -> Self {
        if let Some(db) = value.as_database_error() {
            match db.constraint() {
                Some("unique_ingredient_in_recipe") => {
                    return Self::DuplicateEntry(String::from("Ingredients must not repeat"))
                }
                Some("unique_tag_in_recipe") => {
                    return Self::DuplicateEntry(String::from("Tags must not repeat"))
                }
                Some("unique_favorite") => {
                    return Self::AlreadyExists(String::from("Recipe is already in favorites"))
                }
                Some("unique_shopping_cart") => {
                    return Self::AlreadyExists(String::from(
                        "Recipe is already in the shopping cart",
                    ))
                }
                Some("unique_subscription") => {
                    return Self::AlreadyExists(String::from(
                        "You are already subscribed to this author",
                    ))
                }
                Some("no_self_subscription") => {
                    return Self::SelfReference(String::from(
                        "You can't subscribe to yourself",
                    ))
                }
                Some("unique_username") => {
                    return Self::AlreadyExists(String::from(
                        "A user with that username already exists",
                    ))
                }
                Some("unique_email") => {
                    return Self::AlreadyExists(String::from(
                        "A user with that email already exists",
                    ))
                }
                Some("unique_tag_name") | Some("unique_tag_slug") => {
                    return Self::AlreadyExists(String::from(
                        "A tag with that name or slug already exists",
                    ))
                }
                _ => {}
            }

            if db.is_unique_violation() {
                return Self::AlreadyExists(String::from("Record already exists"));
            }
            if db.is_foreign_key_violation() {
                return Self::ReferenceNotFound(String::from("Referenced record doesn't exist"));
            }
            if db.is_check_violation() {
                return Self::OutOfRange(String::from("Value is out of the allowed range"));
            }
        }

        QueryError::from(value).into()
    }
}

impl From<RecipeError> for Error {
    fn from(value: RecipeError) -> Self {
        Error {
            code: match value.status() {
                401 => 401,
                403 => 403,
                404 => 404,
                500 => 500,
                _ => 400,
            },
            info: Some(value.to_string()),
            redirect: None,
        }
    }
}

/// Rejection carried through warp filters until the recovery handler renders it.
#[derive(Debug)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl reject::Reject for ApiError {}

impl From<Error> for ApiError {
    fn from(value: Error) -> Self {
        Self {
            status: value.code as u16,
            message: value.info.unwrap_or_default(),
        }
    }
}

pub fn rejection<E: Into<Error>>(error: E) -> Rejection {
    reject::custom(ApiError::from(error.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        let cases = [
            RecipeError::missing("tags"),
            RecipeError::DuplicateEntry(String::new()),
            RecipeError::OutOfRange(String::new()),
            RecipeError::ReferenceNotFound(String::new()),
            RecipeError::AlreadyExists(String::new()),
            RecipeError::NotFound(String::new()),
            RecipeError::SelfReference(String::new()),
            RecipeError::InvalidCredentials,
        ];

        for case in cases {
            assert_eq!(case.status(), 400, "{case:?}");
        }
    }

    #[test]
    fn outer_errors_keep_their_status() {
        assert_eq!(RecipeError::UnknownResource(String::new()).status(), 404);
        assert_eq!(RecipeError::Unauthorized(String::new()).status(), 401);
        assert_eq!(RecipeError::Forbidden.status(), 403);
        assert_eq!(RecipeError::Storage(String::new()).status(), 500);
    }

    #[test]
    fn missing_field_names_the_field() {
        assert_eq!(
            RecipeError::missing("ingredients").to_string(),
            "Field 'ingredients' is required"
        );
    }

    #[test]
    fn api_error_keeps_code_and_message() {
        let error = ApiError::from(Error::from(RecipeError::SelfReference(String::from(
            "You can't subscribe to yourself",
        ))));

        assert_eq!(error.status, 400);
        assert_eq!(error.message, "You can't subscribe to yourself");
    }

    #[test]
    fn row_not_found_becomes_storage_error() {
        let error = RecipeError::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, RecipeError::Storage(_)));
    }
}
