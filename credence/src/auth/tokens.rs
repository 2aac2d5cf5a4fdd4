//! Signed token issuance, verification, and refresh rotation.
//!
//! Access and refresh tokens are HS256 JWTs signed with distinct secrets, so
//! one class can never be presented as the other. Access tokens are verified
//! statelessly; refresh tokens are additionally persisted server-side and
//! consumed on rotation, which is what makes them single-use.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::db::errors::StoreError;
use crate::db::models::RefreshTokenRecord;
use crate::db::{CredentialStore, WriteStep};
use crate::errors::{Error, Result};
use crate::types::UserId;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a refresh token.
///
/// The `jti` nonce keeps two pairs minted for the same user within the same
/// second from colliding on the token string, which is the store's lookup key.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: UserId,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// An access/refresh token pair as handed across the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints and verifies signed, time-bounded tokens and owns refresh rotation.
pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn CredentialStore>, config: &TokenConfig) -> Result<Self> {
        let access_lifetime =
            Duration::from_std(config.access_token_lifetime).map_err(|_| Error::Configuration {
                message: "access token lifetime out of range".to_string(),
            })?;
        let refresh_lifetime =
            Duration::from_std(config.refresh_token_lifetime).map_err(|_| Error::Configuration {
                message: "refresh token lifetime out of range".to_string(),
            })?;

        Ok(Self {
            store,
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_lifetime,
            refresh_lifetime,
        })
    }

    /// Mint an access/refresh pair for a user and persist the refresh row.
    #[tracing::instrument(skip(self), fields(user_id = %crate::types::abbrev_uuid(&user_id)))]
    pub async fn issue_token_pair(&self, user_id: UserId) -> Result<TokenPair> {
        let (pair, record) = self.mint_pair(user_id)?;
        self.store.create_refresh_token(record).await?;
        Ok(pair)
    }

    /// Validate an access token's signature and expiry, returning the user it
    /// was issued to.
    pub fn verify_access(&self, token: &str) -> Result<UserId> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &Validation::default())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::ExpiredCredential,
                _ => Error::InvalidCredential,
            })?;

        Ok(data.claims.sub)
    }

    /// Redeem a refresh token for a fresh pair, invalidating it.
    ///
    /// The server-side row is authoritative for expiry (an expired row is
    /// reaped here), so JWT `exp` validation is skipped for this path. The
    /// old-row delete and new-row create commit as one atomic unit; of any
    /// concurrent rotations of the same token string, at most one succeeds
    /// and the rest observe `InvalidCredential`.
    #[tracing::instrument(skip_all)]
    pub async fn rotate_refresh(&self, token: &str) -> Result<(UserId, TokenPair)> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        decode::<RefreshClaims>(token, &self.refresh_decoding, &validation)
            .map_err(|_| Error::InvalidCredential)?;

        // Covers forged tokens that never hit the store as well as tokens
        // already consumed by an earlier rotation.
        let record = self
            .store
            .find_refresh_token(token)
            .await?
            .ok_or(Error::InvalidCredential)?;

        if record.expires_at <= Utc::now() {
            // Lazy reaping; a concurrent caller may have removed it already.
            self.store.delete_refresh_token(token).await?;
            return Err(Error::ExpiredCredential);
        }

        let user_id = record.user_id;
        let (pair, replacement) = self.mint_pair(user_id)?;

        self.store
            .run_atomic(vec![
                WriteStep::ConsumeRefreshToken {
                    token: token.to_string(),
                },
                WriteStep::CreateRefreshToken(replacement),
            ])
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::InvalidCredential,
                other => Error::Store(other),
            })?;

        Ok((user_id, pair))
    }

    /// Build a pair plus the refresh row to persist, without touching the store.
    fn mint_pair(&self, user_id: UserId) -> Result<(TokenPair, RefreshTokenRecord)> {
        let now = Utc::now();

        let access_claims = AccessClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + self.access_lifetime).timestamp(),
        };
        let access_token = encode(&Header::default(), &access_claims, &self.access_encoding)
            .map_err(|e| Error::Internal {
                operation: format!("encode access token: {e}"),
            })?;

        let refresh_expires_at = now + self.refresh_lifetime;
        let refresh_claims = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: refresh_expires_at.timestamp(),
        };
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.refresh_encoding)
            .map_err(|e| Error::Internal {
                operation: format!("encode refresh token: {e}"),
            })?;

        let record = RefreshTokenRecord {
            token: refresh_token.clone(),
            user_id,
            expires_at: refresh_expires_at,
        };

        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            record,
        ))
    }
}
