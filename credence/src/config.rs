//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides: variables prefixed with `CREDENCE_` override YAML values, with
//! double underscores for nesting (`CREDENCE_AUTH__TOKENS__ACCESS_SECRET`
//! sets `auth.tokens.access_secret`).
//!
//! Everything the core needs - signing secrets, token lifetimes, the vault
//! key, mail transport - lives here and is passed into components at
//! construction. Nothing reads the process environment at call time, which
//! is what makes deterministic tests with injected fakes possible.
//!
//! [`Config::validate`] enforces the startup preconditions (key lengths,
//! distinct signing secrets); a bad configuration is fatal before any
//! request is served, never a per-request error.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{Error, Result};

/// Root configuration for the credential engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// PostgreSQL connection string. Absent when the host wires up a
    /// different store implementation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Authentication configuration (tokens and password reset)
    pub auth: AuthConfig,
    /// Encryption key material for the API key vault
    pub vault: VaultConfig,
    /// Mail transport for password reset delivery
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub tokens: TokenConfig,
    pub password_reset: PasswordResetConfig,
}

/// Signing secrets and lifetimes for the two token classes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenConfig {
    /// Secret for signing access tokens
    pub access_secret: String,
    /// Secret for signing refresh tokens. Must differ from `access_secret`.
    pub refresh_secret: String,
    /// Access token validity (default 15 minutes)
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Refresh token validity (default 7 days)
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordResetConfig {
    /// Reset token validity (default 1 hour)
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
}

impl Default for PasswordResetConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

/// Key material for the API key vault.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// 32-byte AES-256-GCM key as a 64-character hex string
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    pub from_email: String,
    pub from_name: String,
    /// Upper bound on a single mail dispatch (default 10 seconds)
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    pub transport: EmailTransportConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_email: "noreply@localhost".to_string(),
            from_name: "Credence".to_string(),
            send_timeout: Duration::from_secs(10),
            transport: EmailTransportConfig::default(),
        }
    }
}

/// Mail transport: a real SMTP relay, or a directory of `.eml` files for
/// development and testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    File {
        path: String,
    },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        EmailTransportConfig::File {
            path: "./emails".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file merged with `CREDENCE_`-prefixed
    /// environment overrides, then validate it.
    pub fn load(path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CREDENCE_").split("__"))
            .extract()
            .map_err(|e| Error::Configuration {
                message: format!("load configuration: {e}"),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the startup preconditions. Called by [`Config::load`]; call it
    /// directly when constructing a `Config` by hand.
    pub fn validate(&self) -> Result<()> {
        let tokens = &self.auth.tokens;
        if tokens.access_secret.is_empty() || tokens.refresh_secret.is_empty() {
            return Err(Error::Configuration {
                message: "token signing secrets must be set".to_string(),
            });
        }
        if tokens.access_secret == tokens.refresh_secret {
            return Err(Error::Configuration {
                message: "access and refresh signing secrets must be distinct".to_string(),
            });
        }

        match hex::decode(&self.vault.encryption_key) {
            Ok(key) if key.len() == 32 => {}
            Ok(key) => {
                return Err(Error::Configuration {
                    message: format!(
                        "vault encryption key must be 32 bytes (64 hex characters), got {} bytes",
                        key.len()
                    ),
                });
            }
            Err(_) => {
                return Err(Error::Configuration {
                    message: "vault encryption key must be a hex string".to_string(),
                });
            }
        }

        Ok(())
    }
}
