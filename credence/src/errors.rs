use crate::db::errors::StoreError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// An account with the requested email already exists
    #[error("an account with this email address already exists")]
    AlreadyExists,

    /// Unknown email or wrong password, merged into one error so callers
    /// cannot tell which of the two failed
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The account exists but has been deactivated
    #[error("account is deactivated")]
    AccountDisabled,

    /// A token failed signature or format checks, or was not found server-side
    #[error("invalid credential")]
    InvalidCredential,

    /// A token was well-formed but past its expiry
    #[error("credential has expired")]
    ExpiredCredential,

    /// A password-reset token that is unknown or past its expiry
    #[error("invalid or expired reset token")]
    InvalidOrExpiredToken,

    /// A password-reset token that was already consumed
    #[error("reset token has already been used")]
    TokenAlreadyUsed,

    /// Authenticated decryption failed: tampered or corrupted data, or wrong key
    #[error("decryption failed - data may be corrupted or tampered")]
    DecryptionFailed,

    /// The mail collaborator could not deliver a message
    #[error("failed to deliver email: {reason}")]
    DeliveryFailed { reason: String },

    /// Invalid or missing configuration - fatal at startup, never per-request
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Store-level failure (connectivity, constraints), propagated opaquely
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic internal service error
    #[error("failed to {operation}")]
    Internal { operation: String },
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
