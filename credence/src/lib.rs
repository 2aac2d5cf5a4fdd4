//! # credence: Credential Lifecycle Engine
//!
//! `credence` is the authentication and secret-management core of a larger
//! web application: password-based login with short-lived bearer tokens and
//! long-lived rotating refresh tokens, single-use password-reset tokens
//! delivered by mail, and an encrypted vault for third-party API keys.
//!
//! The HTTP layer, request validation, rate limiting, and UI live elsewhere;
//! they call into this crate through a handful of component types and get the
//! domain invariants - expiry, one-time use, atomic state transitions,
//! authenticated encryption - enforced here.
//!
//! ## Architecture
//!
//! The **store layer** ([`db`]) abstracts durable storage behind the
//! [`CredentialStore`](db::CredentialStore) trait: a PostgreSQL
//! implementation over SQLx for production and a mutex-guarded in-memory
//! implementation for tests and embedded use. Multi-step mutations that must
//! be atomic (refresh rotation's delete-old + create-new, password reset's
//! update + mark-used) go through the store's `run_atomic` capability so any
//! backend can uphold the same contract.
//!
//! The **authentication layer** ([`auth`]) owns the session lifecycle.
//! [`TokenIssuer`](auth::TokenIssuer) mints and verifies HS256 token pairs
//! with distinct signing secrets per class and rotates refresh tokens
//! one-shot: presenting the same refresh token twice always fails on the
//! second presentation. [`CredentialManager`](auth::CredentialManager)
//! orchestrates signup, login, refresh, and logout on top of it, and
//! [`PasswordResetFlow`](auth::PasswordResetFlow) issues and redeems
//! single-use reset tokens, invalidating every live session on completion.
//!
//! The **secrets layer** ([`crypto`], [`api_keys`]) seals third-party API
//! keys with AES-256-GCM before they touch the store and opens them only
//! transiently on read; plaintext never persists anywhere.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use credence::auth::{CredentialManager, TokenIssuer};
//! use credence::db::memory::MemoryStore;
//!
//! # async fn example() -> credence::Result<()> {
//! let config = credence::Config::load("config.yaml")?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let issuer = TokenIssuer::new(store.clone(), &config.auth.tokens)?;
//! let manager = CredentialManager::new(store.clone(), issuer);
//!
//! let session = manager.signup("user@site.com", "correct horse battery").await?;
//! let _rotated = manager.refresh(&session.refresh_token).await?;
//! # Ok(())
//! # }
//! ```
//!
//! For a PostgreSQL-backed deployment, run the bundled migrations and hand
//! the components a [`PgStore`](db::postgres::PgStore) instead:
//!
//! ```no_run
//! # async fn example(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! credence::db::postgres::migrator().run(&pool).await?;
//! let _store = std::sync::Arc::new(credence::db::postgres::PgStore::new(pool));
//! # Ok(())
//! # }
//! ```

pub mod api_keys;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod email;
pub mod errors;
pub mod telemetry;
mod types;

pub use config::Config;
pub use errors::{Error, Result};
pub use types::UserId;
