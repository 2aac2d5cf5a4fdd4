//! Password reset flow: single-use, expiring reset tokens delivered by mail.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::auth::password;
use crate::config::PasswordResetConfig;
use crate::db::errors::StoreError;
use crate::db::models::PasswordResetTokenRecord;
use crate::db::{CredentialStore, WriteStep};
use crate::email::Mailer;
use crate::errors::{Error, Result};

/// Generates, delivers, and redeems password-reset tokens.
pub struct PasswordResetFlow {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    token_lifetime: Duration,
}

impl PasswordResetFlow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        config: &PasswordResetConfig,
    ) -> Result<Self> {
        let token_lifetime =
            Duration::from_std(config.token_lifetime).map_err(|_| Error::Configuration {
                message: "password reset token lifetime out of range".to_string(),
            })?;

        Ok(Self {
            store,
            mailer,
            token_lifetime,
        })
    }

    /// Issue a reset token for the account behind `email` and mail a link.
    ///
    /// Returns success whether or not the account exists: a caller must not
    /// be able to tell "email sent" from "no such account" by return value or
    /// response shape. Requesting again replaces any earlier token, so at
    /// most one is live per user.
    #[tracing::instrument(skip_all)]
    pub async fn request_reset(&self, email: &str, callback_base_url: &str) -> Result<()> {
        let email = email.to_lowercase();

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        self.store
            .delete_password_reset_tokens_for_user(user.id)
            .await?;

        let token = password::generate_reset_token();
        self.store
            .create_password_reset_token(PasswordResetTokenRecord {
                token: token.clone(),
                user_id: user.id,
                expires_at: Utc::now() + self.token_lifetime,
                used: false,
            })
            .await?;

        let reset_url = format!(
            "{}/reset-password?token={}",
            callback_base_url.trim_end_matches('/'),
            token
        );

        self.mailer
            .send_password_reset_email(&user.email, &token, &reset_url)
            .await
    }

    /// Redeem a reset token, replacing the account password.
    ///
    /// The password update and the consumed flag commit in one atomic unit:
    /// there is no state where the password changed but the token is still
    /// replayable, or the reverse. On success every refresh token the user
    /// holds is deleted, forcing re-authentication everywhere.
    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let record = self
            .store
            .find_password_reset_token(token)
            .await?
            .ok_or(Error::InvalidOrExpiredToken)?;

        if record.expires_at <= Utc::now() {
            self.store.delete_password_reset_token(token).await?;
            return Err(Error::InvalidOrExpiredToken);
        }

        if record.used {
            return Err(Error::TokenAlreadyUsed);
        }

        let new_password = new_password.to_string();
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&new_password))
                .await
                .map_err(|e| Error::Internal {
                    operation: format!("spawn password hashing task: {e}"),
                })??;

        self.store
            .run_atomic(vec![
                WriteStep::UpdateUserPassword {
                    user_id: record.user_id,
                    password_hash,
                },
                WriteStep::MarkResetTokenUsed {
                    token: token.to_string(),
                },
            ])
            .await
            .map_err(|e| match e {
                // Token or user vanished between the read and the commit
                StoreError::NotFound => Error::InvalidOrExpiredToken,
                other => Error::Store(other),
            })?;

        let revoked = self
            .store
            .delete_refresh_tokens_for_user(record.user_id)
            .await?;
        tracing::info!(
            user_id = %crate::types::abbrev_uuid(&record.user_id),
            revoked_sessions = revoked,
            "password reset completed"
        );

        Ok(())
    }
}
