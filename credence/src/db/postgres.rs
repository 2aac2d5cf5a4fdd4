//! PostgreSQL credential store over SQLx.

use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::crypto::SealedSecret;
use crate::db::errors::{Result, StoreError};
use crate::db::models::{
    ApiKeyRecord, NewUser, PasswordResetTokenRecord, RefreshTokenRecord, UserRecord, UserUpdate,
};
use crate::db::{CredentialStore, WriteStep};
use crate::types::UserId;

/// Get the credence database migrator.
///
/// ```ignore
/// credence::db::postgres::migrator().run(&pool).await?;
/// ```
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// PostgreSQL-backed store. Cheap to clone; wraps a connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, name, is_active, last_login_at, created_at";

#[async_trait::async_trait]
impl CredentialStore for PgStore {
    #[instrument(skip(self), err)]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, user), fields(email = %user.email), err)]
    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        let created = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, password_hash, name, last_login_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.last_login_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self, update), err)]
    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<UserRecord> {
        let updated = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET
                 password_hash = COALESCE($2, password_hash),
                 last_login_at = COALESCE($3, last_login_at),
                 is_active = COALESCE($4, is_active)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.password_hash)
        .bind(update.last_login_at)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(updated)
    }

    #[instrument(skip_all, err)]
    async fn create_refresh_token(&self, token: RefreshTokenRecord) -> Result<()> {
        sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&token.token)
            .bind(token.user_id)
            .bind(token.expires_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token, user_id, expires_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[instrument(skip_all, err)]
    async fn delete_refresh_token(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn delete_refresh_tokens_for_user(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip_all, err)]
    async fn create_password_reset_token(&self, token: PasswordResetTokenRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (token, user_id, expires_at, used)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetTokenRecord>> {
        let record = sqlx::query_as::<_, PasswordResetTokenRecord>(
            "SELECT token, user_id, expires_at, used FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[instrument(skip_all, err)]
    async fn delete_password_reset_token(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn delete_password_reset_tokens_for_user(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(steps = steps.len()), err)]
    async fn run_atomic(&self, steps: Vec<WriteStep>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for step in steps {
            match step {
                WriteStep::ConsumeRefreshToken { token } => {
                    // DELETE ... RETURNING is the atomic check-and-delete; a
                    // missing row aborts the transaction via the early return.
                    let consumed = sqlx::query_scalar::<_, String>(
                        "DELETE FROM refresh_tokens WHERE token = $1 RETURNING token",
                    )
                    .bind(&token)
                    .fetch_optional(&mut *tx)
                    .await?;

                    if consumed.is_none() {
                        return Err(StoreError::NotFound);
                    }
                }
                WriteStep::CreateRefreshToken(record) => {
                    sqlx::query(
                        "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)",
                    )
                    .bind(&record.token)
                    .bind(record.user_id)
                    .bind(record.expires_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteStep::UpdateUserPassword {
                    user_id,
                    password_hash,
                } => {
                    let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                        .bind(user_id)
                        .bind(&password_hash)
                        .execute(&mut *tx)
                        .await?;

                    if result.rows_affected() == 0 {
                        return Err(StoreError::NotFound);
                    }
                }
                WriteStep::MarkResetTokenUsed { token } => {
                    let result =
                        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE token = $1")
                            .bind(&token)
                            .execute(&mut *tx)
                            .await?;

                    if result.rows_affected() == 0 {
                        return Err(StoreError::NotFound);
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, sealed), err)]
    async fn upsert_api_key(&self, platform: &str, sealed: &SealedSecret) -> Result<ApiKeyRecord> {
        let record = sqlx::query_as::<_, ApiKeyRecord>(
            "INSERT INTO api_keys (platform, ciphertext, iv, auth_tag, is_active, updated_at)
             VALUES ($1, $2, $3, $4, TRUE, $5)
             ON CONFLICT (platform) DO UPDATE SET
                 ciphertext = EXCLUDED.ciphertext,
                 iv = EXCLUDED.iv,
                 auth_tag = EXCLUDED.auth_tag,
                 updated_at = EXCLUDED.updated_at
             RETURNING platform, ciphertext, iv, auth_tag, is_active, updated_at",
        )
        .bind(platform)
        .bind(&sealed.ciphertext)
        .bind(&sealed.iv)
        .bind(&sealed.auth_tag)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self), err)]
    async fn list_active_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let records = sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT platform, ciphertext, iv, auth_tag, is_active, updated_at
             FROM api_keys WHERE is_active = TRUE ORDER BY platform",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
