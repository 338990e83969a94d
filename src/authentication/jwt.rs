use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use potion::HtmlError;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::User;
use crate::error::RecipeError;
use crate::schema::{Id, UserRole};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), RecipeError> {
        if !action.authenticate(self) {
            return Err(RecipeError::Forbidden);
        }
        Ok(())
    }

    /// Owners need `ManageOwnRecipes`; everyone else needs `ManageAllRecipes`.
    pub fn authenticate_recipe_owner(&self, owner_id: Id) -> Result<(), RecipeError> {
        match owner_id == self.user_id {
            true => self.authenticate(ActionType::ManageOwnRecipes),
            false => self.authenticate(ActionType::ManageAllRecipes),
        }
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
            role: value.role,
        }
    }
}

/// Signing key and token lifetime shared by every request handler.
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, lifetime_hours: i64) -> Result<Self, RecipeError> {
        let key: Hmac<Sha256> = Hmac::new_from_slice(secret.as_bytes())
            .map_err(|_| RecipeError::Storage(String::from("Invalid session secret")))?;

        Ok(Self {
            key,
            lifetime: Duration::hours(lifetime_hours),
        })
    }

    pub fn generate_jwt_session(&self, user: &User) -> Result<String, RecipeError> {
        let claims = JwtSessionData::new(
            user.id,
            user.username.to_owned(),
            user.role.to_owned(),
            self.lifetime,
        );

        claims.sign_with_key(&self.key).map_err(|e| {
            log::error!("Failed to sign session: {e}");
            RecipeError::Storage(String::from("Could not create session"))
        })
    }

    pub fn verify_jwt_session(&self, token: &str) -> Result<JwtSessionData, potion::Error> {
        let session: JwtSessionData = token
            .verify_with_key(&self.key)
            .map_err(|_| HtmlError::InvalidSession.new("Invalid session; Invalid token"))?;

        let now = Local::now().timestamp();
        if (session.exp - now).is_negative() {
            return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Ada"),
            last_name: String::from("Cook"),
            password: String::new(),
            avatar: None,
            role,
        }
    }

    #[test]
    fn signed_session_round_trips() {
        let keys = SessionKeys::new("secret", 1).unwrap();
        let token = keys.generate_jwt_session(&user(UserRole::User)).unwrap();

        let session: SessionData = keys.verify_jwt_session(&token).ok().unwrap().into();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
        assert_eq!(session.role, UserRole::User);
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let token = SessionKeys::new("one", 1)
            .unwrap()
            .generate_jwt_session(&user(UserRole::Admin))
            .unwrap();

        let other = SessionKeys::new("two", 1).unwrap();
        assert!(other.verify_jwt_session(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = SessionKeys::new("secret", -1).unwrap();
        let token = keys.generate_jwt_session(&user(UserRole::User)).unwrap();

        assert!(keys.verify_jwt_session(&token).is_err());
    }

    #[test]
    fn owners_manage_their_own_recipes() {
        let session: SessionData =
            JwtSessionData::new(7, String::from("cook"), UserRole::User, Duration::hours(1)).into();

        assert!(session.authenticate_recipe_owner(7).is_ok());
        assert_eq!(session.authenticate_recipe_owner(8), Err(RecipeError::Forbidden));
    }

    #[test]
    fn admins_manage_any_recipe() {
        let session: SessionData =
            JwtSessionData::new(1, String::from("root"), UserRole::Admin, Duration::hours(1)).into();

        assert!(session.authenticate_recipe_owner(8).is_ok());
    }
}
