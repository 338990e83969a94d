use std::collections::HashMap;

use serde_json::Value;

use super::error::RecipeError;

pub type FormData = HashMap<String, Value>;

/// Loosely typed view over a JSON request body.
///
/// Absent keys and explicit `null`s both read as missing, so callers get a
/// `MissingField` error naming the key instead of a generic decode failure.
pub struct Form {
    inner: HashMap<String, Value>,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.inner.get(key), Some(value) if !value.is_null())
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.inner.get(key).filter(|value| !value.is_null())
    }

    pub fn get_number(&self, key: &str) -> Result<i64, RecipeError> {
        match self.get_raw(key) {
            Some(value) => integer(value)
                .ok_or_else(|| RecipeError::InvalidField(format!("Field '{key}' must be an integer"))),
            None => Err(RecipeError::missing(key)),
        }
    }

    /// Reads a non-blank string, trimmed.
    pub fn get_str(&self, key: &str) -> Result<String, RecipeError> {
        match self.get_raw(key) {
            Some(value) => match value.as_str() {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                Some(_) => Err(RecipeError::missing(key)),
                None => Err(RecipeError::InvalidField(format!("Field '{key}' must be a string"))),
            },
            None => Err(RecipeError::missing(key)),
        }
    }

    pub fn get_optional_str(&self, key: &str) -> Result<Option<String>, RecipeError> {
        if !self.contains(key) {
            return Ok(None);
        }

        self.get_str(key).map(Some)
    }
}

/// Accepts JSON integers and numeric strings, the way form-encoded clients send them.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn form(value: Value) -> Form {
        Form::from_data(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn null_reads_as_missing() {
        let form = form(json!({ "name": null }));

        assert!(!form.contains("name"));
        assert!(matches!(form.get_str("name"), Err(RecipeError::MissingField(_))));
    }

    #[test]
    fn blank_string_reads_as_missing() {
        let form = form(json!({ "name": "   " }));
        assert!(matches!(form.get_str("name"), Err(RecipeError::MissingField(_))));
    }

    #[test]
    fn strings_are_trimmed() {
        let form = form(json!({ "name": "  Borscht " }));
        assert_eq!(form.get_str("name").unwrap(), "Borscht");
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        let form = form(json!({ "a": 5, "b": "7", "c": "x", "d": 1.5 }));

        assert_eq!(form.get_number("a").unwrap(), 5);
        assert_eq!(form.get_number("b").unwrap(), 7);
        assert!(matches!(form.get_number("c"), Err(RecipeError::InvalidField(_))));
        assert!(matches!(form.get_number("d"), Err(RecipeError::InvalidField(_))));
        assert!(matches!(form.get_number("e"), Err(RecipeError::MissingField(_))));
    }
}
