//! Mail collaborator for the password reset flow.
//!
//! The core only ever sends one kind of message (the reset link), expressed
//! through the [`Mailer`] trait so tests can substitute a recording fake.
//! [`SmtpMailer`] is the production implementation: SMTP relay, or a file
//! transport that drops `.eml` files in a directory for development.

use std::path::Path;
use std::time::Duration;

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{EmailConfig, EmailTransportConfig};
use crate::errors::{Error, Result};

/// The mail collaborator interface the reset flow depends on.
///
/// Delivery failures surface as [`Error::DeliveryFailed`]; the core never
/// retries internally.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset_email(
        &self,
        recipient: &str,
        token: &str,
        reset_url: &str,
    ) -> Result<()>;
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// Lettre-backed mailer (SMTP relay or file transport).
pub struct SmtpMailer {
    transport: EmailTransport,
    from: Mailbox,
    send_timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                        host,
                    ))
                }
                .map_err(|e| Error::Configuration {
                    message: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Configuration {
                        message: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Configuration {
                message: format!("parse from address: {e}"),
            })?;

        Ok(Self {
            transport,
            from,
            send_timeout: config.send_timeout,
        })
    }

    fn reset_message(&self, recipient: &str, reset_url: &str) -> Result<Message> {
        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| Error::DeliveryFailed {
                reason: format!("invalid recipient address: {e}"),
            })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Password Reset Request")
            .header(ContentType::TEXT_HTML)
            .body(reset_body(reset_url))
            .map_err(|e| Error::DeliveryFailed {
                reason: format!("build message: {e}"),
            })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    /// Send the reset link. The dispatch is time-bounded; an unresponsive
    /// relay surfaces as [`Error::DeliveryFailed`] rather than hanging the
    /// request.
    #[tracing::instrument(skip_all, fields(recipient = %recipient))]
    async fn send_password_reset_email(
        &self,
        recipient: &str,
        _token: &str,
        reset_url: &str,
    ) -> Result<()> {
        let message = self.reset_message(recipient, reset_url)?;

        let send = async {
            match &self.transport {
                EmailTransport::Smtp(smtp) => smtp
                    .send(message)
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::DeliveryFailed {
                        reason: format!("SMTP send: {e}"),
                    }),
                EmailTransport::File(file) => file
                    .send(message)
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::DeliveryFailed {
                        reason: format!("file send: {e}"),
                    }),
            }
        };

        tokio::time::timeout(self.send_timeout, send)
            .await
            .map_err(|_| Error::DeliveryFailed {
                reason: format!("send timed out after {:?}", self.send_timeout),
            })?
    }
}

fn reset_body(reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Password Reset Request</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Password Reset Request</h2>

        <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>

        <p><a href="{reset_url}">Reset your password</a></p>

        <p>Or copy and paste this link into your browser:</p>
        <p>{reset_url}</p>

        <p>This link will expire in 1 hour.</p>

        <p style="margin-top: 30px; font-size: 12px; color: #666;">This is an automated message, please do not reply to this email.</p>
    </div>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(dir: &Path) -> EmailConfig {
        EmailConfig {
            from_email: "noreply@example.com".to_string(),
            from_name: "Example".to_string(),
            send_timeout: Duration::from_secs(5),
            transport: EmailTransportConfig::File {
                path: dir.to_string_lossy().into_owned(),
            },
        }
    }

    #[tokio::test]
    async fn test_send_via_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = SmtpMailer::new(&file_config(dir.path())).unwrap();

        mailer
            .send_password_reset_email(
                "user@example.com",
                "abc123",
                "https://app.example.com/reset-password?token=abc123",
            )
            .await
            .unwrap();

        // The file transport wrote exactly one message
        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_delivery_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = SmtpMailer::new(&file_config(dir.path())).unwrap();

        let err = mailer
            .send_password_reset_email("not an address", "t", "https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeliveryFailed { .. }));
    }

    #[test]
    fn test_reset_body_contains_link() {
        let body = reset_body("https://app.example.com/reset-password?token=abc123");
        assert!(body.contains("https://app.example.com/reset-password?token=abc123"));
        assert!(body.contains("Reset your password"));
    }
}
