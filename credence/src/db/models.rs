//! Store record structures for users, tokens, and sealed API keys.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::crypto::SealedSecret;
use crate::types::UserId;

/// User identity record as persisted by the store.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: UserId,
    /// Unique, stored lower-cased. Callers normalize before lookup.
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request for creating a new user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Request for updating a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// Public projection of a user returned across the boundary.
///
/// Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for PublicUser {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

/// Long-lived refresh credential, keyed by the signed token string itself.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Single-use password-reset credential.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetTokenRecord {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

/// Encrypted third-party API key, keyed by platform name.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRecord {
    pub platform: String,
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// View of the encrypted columns as a sealed secret for decryption.
    pub fn sealed(&self) -> SealedSecret {
        SealedSecret {
            ciphertext: self.ciphertext.clone(),
            iv: self.iv.clone(),
            auth_tag: self.auth_tag.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_public_user_never_carries_the_hash() {
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: "user@site.com".to_string(),
            password_hash: "$2b$12$secret-hash".to_string(),
            name: Some("User".to_string()),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        };

        let public = PublicUser::from(record);
        let json = serde_json::to_value(&public).unwrap();
        let fields = json.as_object().unwrap();

        assert!(fields.contains_key("id"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("created_at"));
        assert!(!fields.contains_key("password_hash"));
    }
}
