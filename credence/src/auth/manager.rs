//! Signup, login, refresh, and logout orchestration.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::password;
use crate::auth::tokens::{TokenIssuer, TokenPair};
use crate::db::errors::StoreError;
use crate::db::models::{NewUser, PublicUser, UserUpdate};
use crate::db::CredentialStore;
use crate::errors::{Error, Result};

/// The result of a successful signup or login: the public user projection
/// plus a fresh token pair.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthSession {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

/// Orchestrates the account session lifecycle against the store and the
/// token issuer.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    tokens: TokenIssuer,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenIssuer) -> Self {
        Self { store, tokens }
    }

    /// Create an account and log it in.
    #[tracing::instrument(skip_all)]
    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email);

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(Error::AlreadyExists);
        }

        // Hash on a blocking thread to avoid stalling the async runtime
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password hashing task: {e}"),
            })??;

        let user = self
            .store
            .create_user(NewUser {
                email,
                password_hash,
                name: None,
                last_login_at: Some(Utc::now()),
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent signup for the same email
                StoreError::UniqueViolation { .. } => Error::AlreadyExists,
                other => Error::Store(other),
            })?;

        let pair = self.tokens.issue_token_pair(user.id).await?;

        Ok(AuthSession {
            user: user.into(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    /// Authenticate with email and password.
    ///
    /// Unknown email and wrong password collapse into the same
    /// [`Error::InvalidCredentials`] so callers cannot probe for accounts.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email);

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !user.is_active {
            return Err(Error::AccountDisabled);
        }

        let candidate = password.to_string();
        let hash = user.password_hash.clone();
        let is_valid = tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password verification task: {e}"),
            })??;

        if !is_valid {
            return Err(Error::InvalidCredentials);
        }

        let user = self
            .store
            .update_user(
                user.id,
                UserUpdate {
                    last_login_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        let pair = self.tokens.issue_token_pair(user.id).await?;

        Ok(AuthSession {
            user: user.into(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    /// Exchange a refresh token for a fresh pair (single-use rotation).
    ///
    /// The owning account's active flag is re-checked after rotation: an
    /// account deactivated mid-session fails here even though the token
    /// itself was still valid, and the just-minted replacement is revoked so
    /// the rotation leaves nothing usable behind.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let (user_id, pair) = self.tokens.rotate_refresh(refresh_token).await?;

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(Error::InvalidCredential)?;

        if !user.is_active {
            self.store.delete_refresh_token(&pair.refresh_token).await?;
            return Err(Error::AccountDisabled);
        }

        Ok(pair)
    }

    /// Invalidate a refresh token. Idempotent: an unknown token is not an
    /// error.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.store.delete_refresh_token(refresh_token).await?;
        Ok(())
    }

    /// Access the token issuer, e.g. for verifying bearer tokens at the
    /// boundary.
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }
}

fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}
