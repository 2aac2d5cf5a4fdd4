//! Credential store abstraction and its backings.
//!
//! The core never talks to a database directly; it goes through the
//! [`CredentialStore`] trait, which models the durable backend as a small set
//! of CRUD operations plus one transactional capability, [`run_atomic`].
//! Two implementations are provided:
//!
//! - [`postgres::PgStore`]: PostgreSQL over SQLx (see `migrations/` for the
//!   schema, applied via [`postgres::migrator`])
//! - [`memory::MemoryStore`]: a mutex-guarded in-memory store satisfying the
//!   same atomicity contract, for tests and embedded use
//!
//! # Atomicity contract
//!
//! [`run_atomic`] executes a list of [`WriteStep`]s as a single all-or-nothing
//! unit. Guarded steps ([`WriteStep::ConsumeRefreshToken`],
//! [`WriteStep::UpdateUserPassword`], [`WriteStep::MarkResetTokenUsed`]) abort
//! the whole unit with [`StoreError::NotFound`](errors::StoreError::NotFound)
//! when their target row is missing, leaving no step applied. Refresh-token
//! rotation relies on this for winner selection: two concurrent rotations of
//! the same token string race on the consume step, and exactly one commits.
//!
//! [`run_atomic`]: CredentialStore::run_atomic

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;

use crate::crypto::SealedSecret;
use crate::db::errors::Result;
use crate::db::models::{
    ApiKeyRecord, NewUser, PasswordResetTokenRecord, RefreshTokenRecord, UserRecord, UserUpdate,
};
use crate::types::UserId;

/// A single write in an atomic unit executed by
/// [`CredentialStore::run_atomic`].
#[derive(Debug, Clone)]
pub enum WriteStep {
    /// Delete the refresh token row, aborting the unit if it is absent.
    ///
    /// This is the atomic check-and-delete used for rotation: of any number
    /// of concurrent units consuming the same token, at most one commits.
    ConsumeRefreshToken { token: String },
    /// Insert a refresh token row.
    CreateRefreshToken(RefreshTokenRecord),
    /// Replace a user's password hash, aborting the unit if the user is absent.
    UpdateUserPassword {
        user_id: UserId,
        password_hash: String,
    },
    /// Flag a password-reset token as consumed, aborting the unit if absent.
    MarkResetTokenUsed { token: String },
}

/// Durable backend for users, tokens, and sealed API keys.
///
/// All methods take `&self`; implementations are internally synchronized and
/// shared behind an `Arc` by the components that compose them.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by (already normalized) email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>>;

    /// Create a user. Fails with `UniqueViolation` if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord>;

    /// Apply the non-`None` fields of `update` to an existing user.
    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<UserRecord>;

    async fn create_refresh_token(&self, token: RefreshTokenRecord) -> Result<()>;

    /// Plain read of a refresh token row. Rotation must not rely on this for
    /// winner selection; that is what [`WriteStep::ConsumeRefreshToken`] is for.
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Delete a refresh token row. Returns whether a row existed.
    async fn delete_refresh_token(&self, token: &str) -> Result<bool>;

    /// Delete every refresh token belonging to a user, returning the count.
    async fn delete_refresh_tokens_for_user(&self, user_id: UserId) -> Result<u64>;

    async fn create_password_reset_token(&self, token: PasswordResetTokenRecord) -> Result<()>;

    async fn find_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetTokenRecord>>;

    /// Delete a password-reset token row. Returns whether a row existed.
    async fn delete_password_reset_token(&self, token: &str) -> Result<bool>;

    /// Delete every password-reset token belonging to a user, returning the count.
    async fn delete_password_reset_tokens_for_user(&self, user_id: UserId) -> Result<u64>;

    /// Execute `steps` as one atomic unit. See the module docs for the
    /// guard/abort semantics.
    async fn run_atomic(&self, steps: Vec<WriteStep>) -> Result<()>;

    /// Insert or replace the sealed key for a platform.
    async fn upsert_api_key(&self, platform: &str, sealed: &SealedSecret) -> Result<ApiKeyRecord>;

    async fn list_active_api_keys(&self) -> Result<Vec<ApiKeyRecord>>;
}
