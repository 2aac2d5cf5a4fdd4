//! In-memory credential store.
//!
//! Backs the same contract as the PostgreSQL store with plain maps behind a
//! single mutex, which makes the atomicity guarantees trivial: every
//! operation, including [`run_atomic`](super::CredentialStore::run_atomic),
//! runs under the lock. Guards are checked before any step mutates, so an
//! aborted unit leaves the maps untouched.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::crypto::SealedSecret;
use crate::db::errors::{Result, StoreError};
use crate::db::models::{
    ApiKeyRecord, NewUser, PasswordResetTokenRecord, RefreshTokenRecord, UserRecord, UserUpdate,
};
use crate::db::{CredentialStore, WriteStep};
use crate::types::UserId;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserRecord>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    reset_tokens: HashMap<String, PasswordResetTokenRecord>,
    api_keys: HashMap<String, ApiKeyRecord>,
}

/// Mutex-guarded in-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Other(anyhow::anyhow!("memory store mutex poisoned")))
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let inner = self.locked()?;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        let inner = self.locked()?;
        Ok(inner.users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        let mut inner = self.locked()?;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation {
                constraint: Some("users_email_key".to_string()),
                message: format!("duplicate email {}", user.email),
            });
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            is_active: true,
            last_login_at: user.last_login_at,
            created_at: Utc::now(),
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<UserRecord> {
        let mut inner = self.locked()?;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(password_hash) = update.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(last_login_at) = update.last_login_at {
            user.last_login_at = Some(last_login_at);
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        Ok(user.clone())
    }

    async fn create_refresh_token(&self, token: RefreshTokenRecord) -> Result<()> {
        let mut inner = self.locked()?;
        inner.refresh_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let inner = self.locked()?;
        Ok(inner.refresh_tokens.get(token).cloned())
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool> {
        let mut inner = self.locked()?;
        Ok(inner.refresh_tokens.remove(token).is_some())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: UserId) -> Result<u64> {
        let mut inner = self.locked()?;
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    async fn create_password_reset_token(&self, token: PasswordResetTokenRecord) -> Result<()> {
        let mut inner = self.locked()?;
        inner.reset_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn find_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetTokenRecord>> {
        let inner = self.locked()?;
        Ok(inner.reset_tokens.get(token).cloned())
    }

    async fn delete_password_reset_token(&self, token: &str) -> Result<bool> {
        let mut inner = self.locked()?;
        Ok(inner.reset_tokens.remove(token).is_some())
    }

    async fn delete_password_reset_tokens_for_user(&self, user_id: UserId) -> Result<u64> {
        let mut inner = self.locked()?;
        let before = inner.reset_tokens.len();
        inner.reset_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - inner.reset_tokens.len()) as u64)
    }

    async fn run_atomic(&self, steps: Vec<WriteStep>) -> Result<()> {
        let mut inner = self.locked()?;

        // Guards first: nothing mutates unless every guarded row is present.
        for step in &steps {
            let present = match step {
                WriteStep::ConsumeRefreshToken { token } => {
                    inner.refresh_tokens.contains_key(token)
                }
                WriteStep::UpdateUserPassword { user_id, .. } => inner.users.contains_key(user_id),
                WriteStep::MarkResetTokenUsed { token } => inner.reset_tokens.contains_key(token),
                WriteStep::CreateRefreshToken(_) => true,
            };
            if !present {
                return Err(StoreError::NotFound);
            }
        }

        for step in steps {
            match step {
                WriteStep::ConsumeRefreshToken { token } => {
                    inner.refresh_tokens.remove(&token);
                }
                WriteStep::CreateRefreshToken(record) => {
                    inner.refresh_tokens.insert(record.token.clone(), record);
                }
                WriteStep::UpdateUserPassword {
                    user_id,
                    password_hash,
                } => {
                    if let Some(user) = inner.users.get_mut(&user_id) {
                        user.password_hash = password_hash;
                    }
                }
                WriteStep::MarkResetTokenUsed { token } => {
                    if let Some(reset) = inner.reset_tokens.get_mut(&token) {
                        reset.used = true;
                    }
                }
            }
        }

        Ok(())
    }

    async fn upsert_api_key(&self, platform: &str, sealed: &SealedSecret) -> Result<ApiKeyRecord> {
        let mut inner = self.locked()?;
        let record = ApiKeyRecord {
            platform: platform.to_string(),
            ciphertext: sealed.ciphertext.clone(),
            iv: sealed.iv.clone(),
            auth_tag: sealed.auth_tag.clone(),
            is_active: true,
            updated_at: Utc::now(),
        };
        inner.api_keys.insert(platform.to_string(), record.clone());
        Ok(record)
    }

    async fn list_active_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let inner = self.locked()?;
        Ok(inner
            .api_keys
            .values()
            .filter(|k| k.is_active)
            .cloned()
            .collect())
    }
}
