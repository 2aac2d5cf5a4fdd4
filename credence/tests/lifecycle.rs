//! End-to-end credential lifecycle scenarios against the in-memory store.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use credence::auth::{password, CredentialManager, PasswordResetFlow, TokenIssuer};
use credence::config::{PasswordResetConfig, TokenConfig};
use credence::db::memory::MemoryStore;
use credence::db::models::{PasswordResetTokenRecord, UserUpdate};
use credence::db::CredentialStore;
use credence::email::Mailer;
use credence::Error;

#[derive(Debug, Clone)]
struct SentMail {
    recipient: String,
    token: String,
    reset_url: String,
}

/// Mailer that records instead of sending.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset_email(
        &self,
        recipient: &str,
        token: &str,
        reset_url: &str,
    ) -> credence::Result<()> {
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            token: token.to_string(),
            reset_url: reset_url.to_string(),
        });
        Ok(())
    }
}

/// Mailer whose relay is permanently down.
struct FailingMailer;

#[async_trait::async_trait]
impl Mailer for FailingMailer {
    async fn send_password_reset_email(
        &self,
        _recipient: &str,
        _token: &str,
        _reset_url: &str,
    ) -> credence::Result<()> {
        Err(Error::DeliveryFailed {
            reason: "connection refused".to_string(),
        })
    }
}

fn token_config() -> TokenConfig {
    TokenConfig {
        access_secret: "integration-access-secret".to_string(),
        refresh_secret: "integration-refresh-secret".to_string(),
        ..Default::default()
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    manager: CredentialManager,
    reset: PasswordResetFlow,
    mailer: Arc<RecordingMailer>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let issuer = TokenIssuer::new(store.clone(), &token_config()).unwrap();
    let manager = CredentialManager::new(store.clone(), issuer);
    let reset = PasswordResetFlow::new(
        store.clone(),
        mailer.clone(),
        &PasswordResetConfig::default(),
    )
    .unwrap();

    Harness {
        store,
        manager,
        reset,
        mailer,
    }
}

const BASE_URL: &str = "https://app.example.com";

#[tokio::test]
async fn test_signup_stores_verifying_hash() {
    let h = harness();

    let session = h.manager.signup("User@Site.COM", "s3cret-password").await.unwrap();

    // Email is normalized before storage and in the public projection
    assert_eq!(session.user.email, "user@site.com");

    let record = h
        .store
        .find_user_by_email("user@site.com")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(record.password_hash, "s3cret-password");
    assert!(password::verify_password("s3cret-password", &record.password_hash).unwrap());

    // Signup counts as a login
    assert!(record.last_login_at.is_some());
}

#[tokio::test]
async fn test_signup_duplicate_email_rejected() {
    let h = harness();
    h.manager.signup("dup@site.com", "password-1").await.unwrap();

    let err = h.manager.signup("DUP@site.com", "password-2").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists));
}

#[tokio::test]
async fn test_login_success_and_indistinguishable_failures() {
    let h = harness();
    h.manager.signup("user@site.com", "right-password").await.unwrap();

    let session = h.manager.login("user@site.com", "right-password").await.unwrap();
    assert_ne!(session.access_token, session.refresh_token);

    // Wrong password and unknown account produce the same error, shape and
    // message, so neither reveals whether the account exists
    let wrong_password = h
        .manager
        .login("user@site.com", "wrong-password")
        .await
        .unwrap_err();
    let unknown_account = h
        .manager
        .login("ghost@site.com", "any-password")
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, Error::InvalidCredentials));
    assert!(matches!(unknown_account, Error::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_account.to_string());
}

#[tokio::test]
async fn test_login_disabled_account() {
    let h = harness();
    let session = h.manager.signup("off@site.com", "password").await.unwrap();

    h.store
        .update_user(
            session.user.id,
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h.manager.login("off@site.com", "password").await.unwrap_err();
    assert!(matches!(err, Error::AccountDisabled));
}

#[test_log::test(tokio::test)]
async fn test_refresh_rotation_is_single_use() {
    let h = harness();
    let session = h.manager.signup("rotate@site.com", "password").await.unwrap();

    let pair = h.manager.refresh(&session.refresh_token).await.unwrap();
    assert_ne!(pair.refresh_token, session.refresh_token);

    // The old token was consumed by the rotation
    let err = h.manager.refresh(&session.refresh_token).await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredential));

    // The replacement keeps working
    h.manager.refresh(&pair.refresh_token).await.unwrap();
}

#[tokio::test]
async fn test_refresh_after_deactivation_leaves_nothing_usable() {
    let h = harness();
    let session = h.manager.signup("gone@site.com", "password").await.unwrap();

    h.store
        .update_user(
            session.user.id,
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h.manager.refresh(&session.refresh_token).await.unwrap_err();
    assert!(matches!(err, Error::AccountDisabled));

    // Neither the presented token nor the aborted replacement survives
    assert_eq!(
        h.store
            .delete_refresh_tokens_for_user(session.user.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_concurrent_refresh_has_single_winner() {
    let h = harness();
    let session = h.manager.signup("race@site.com", "password").await.unwrap();

    let (a, b) = tokio::join!(
        h.manager.refresh(&session.refresh_token),
        h.manager.refresh(&session.refresh_token),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one concurrent rotation may succeed");
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let h = harness();
    let session = h.manager.signup("bye@site.com", "password").await.unwrap();

    h.manager.logout(&session.refresh_token).await.unwrap();
    // Second logout with the same (now absent) token is not an error
    h.manager.logout(&session.refresh_token).await.unwrap();

    let err = h.manager.refresh(&session.refresh_token).await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredential));
}

#[tokio::test]
async fn test_reset_request_for_unknown_email_is_uniform() {
    let h = harness();

    // Same success shape as for an existing account, and no mail goes out
    h.reset.request_reset("ghost@site.com", BASE_URL).await.unwrap();
    assert!(h.mailer.sent().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_full_password_reset_flow() {
    let h = harness();
    let first = h.manager.signup("reset@site.com", "old-password").await.unwrap();
    // A second live session for the same account
    let second = h.manager.login("reset@site.com", "old-password").await.unwrap();

    h.reset.request_reset("reset@site.com", BASE_URL).await.unwrap();

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "reset@site.com");
    assert_eq!(
        sent[0].reset_url,
        format!("{}/reset-password?token={}", BASE_URL, sent[0].token)
    );

    h.reset
        .reset_password(&sent[0].token, "new-password")
        .await
        .unwrap();

    // Old password is gone, new one works
    let err = h.manager.login("reset@site.com", "old-password").await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredentials));
    h.manager.login("reset@site.com", "new-password").await.unwrap();

    // Both pre-reset sessions were invalidated
    for stale in [&first.refresh_token, &second.refresh_token] {
        let err = h.manager.refresh(stale).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));
    }

    // The token was consumed exactly once
    let err = h
        .reset
        .reset_password(&sent[0].token, "another-password")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TokenAlreadyUsed));
}

#[tokio::test]
async fn test_expired_reset_token_is_rejected_and_reaped() {
    let h = harness();
    let session = h.manager.signup("late@site.com", "password").await.unwrap();

    h.store
        .create_password_reset_token(PasswordResetTokenRecord {
            token: "expired-token".to_string(),
            user_id: session.user.id,
            expires_at: Utc::now() - Duration::minutes(1),
            used: false,
        })
        .await
        .unwrap();

    let err = h
        .reset
        .reset_password("expired-token", "new-password")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOrExpiredToken));

    // The expired row was removed on the way out
    assert!(h
        .store
        .find_password_reset_token("expired-token")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_new_reset_request_replaces_prior_token() {
    let h = harness();
    h.manager.signup("again@site.com", "password").await.unwrap();

    h.reset.request_reset("again@site.com", BASE_URL).await.unwrap();
    h.reset.request_reset("again@site.com", BASE_URL).await.unwrap();

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0].token, sent[1].token);

    // Only the latest token is redeemable
    let err = h
        .reset
        .reset_password(&sent[0].token, "new-password")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOrExpiredToken));

    h.reset
        .reset_password(&sent[1].token, "new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delivery_failure_is_surfaced() {
    let store = Arc::new(MemoryStore::new());
    let issuer = TokenIssuer::new(store.clone(), &token_config()).unwrap();
    let manager = CredentialManager::new(store.clone(), issuer);
    let reset = PasswordResetFlow::new(
        store.clone(),
        Arc::new(FailingMailer),
        &PasswordResetConfig::default(),
    )
    .unwrap();

    manager.signup("down@site.com", "password").await.unwrap();

    let err = reset.request_reset("down@site.com", BASE_URL).await.unwrap_err();
    assert!(matches!(err, Error::DeliveryFailed { .. }));
}
