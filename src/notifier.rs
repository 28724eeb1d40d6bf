// src/notifier.rs
use async_trait::async_trait;
use chrono::{DateTime, Local};
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::SmtpConfig;
use crate::html_text::escape_html;
use crate::retry::FailureAlert;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid email address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Subject plus both bodies of an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub plain_text: String,
    pub html: String,
}

/// Outbound delivery to the configured recipient list, in one call.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &RenderedMessage) -> Result<(), NotifyError>;
}

pub struct SmtpMailer {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse::<Mailbox>().map_err(|e| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;
        let recipients = config
            .recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;

        // `secure` means TLS from the first byte (SMTPS); otherwise STARTTLS is required.
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            recipients,
            transport: builder.build(),
        })
    }

    pub fn build_message(&self, message: &RenderedMessage) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        Ok(builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_PLAIN)
                        .body(message.plain_text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_HTML)
                        .body(message.html.clone()),
                ),
        )?)
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: &RenderedMessage) -> Result<(), NotifyError> {
        let email = self.build_message(message)?;
        self.transport.send(email).await?;
        info!(
            "Sent '{}' to {} recipient(s)",
            message.subject,
            self.recipients.len()
        );
        Ok(())
    }
}

/// Activity-path delivery: failure is logged and reported as `false`.
pub async fn send_activity(transport: &dyn MailTransport, message: &RenderedMessage) -> bool {
    match transport.deliver(message).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to send '{}': {}", message.subject, e);
            false
        }
    }
}

/// Schedule-path delivery: failure is returned to the caller.
pub async fn send_digest(
    transport: &dyn MailTransport,
    message: &RenderedMessage,
) -> Result<(), NotifyError> {
    transport.deliver(message).await
}

/// Used when no SMTP host is configured: keep the HTML on disk and the text in the log.
pub fn write_fallback(path: &Path, message: &RenderedMessage) -> std::io::Result<()> {
    fs::write(path, &message.html)?;
    info!(
        "No SMTP transport configured; wrote '{}' to {:?}\n{}",
        message.subject, path, message.plain_text
    );
    Ok(())
}

pub fn failure_message(operation: &str, last_error: &str, at: DateTime<Local>) -> RenderedMessage {
    let when = at.format("%d/%m/%Y %H:%M:%S").to_string();
    RenderedMessage {
        subject: format!("carelog failure: {}", operation),
        plain_text: format!(
            "The operation '{}' failed after all retries.\n\nLast error: {}\nTime: {}\n",
            operation, last_error, when
        ),
        html: format!(
            "<h2>carelog failure</h2><p><strong>Operation:</strong> {}</p>\
             <p><strong>Last error:</strong> {}</p><p><strong>Time:</strong> {}</p>",
            escape_html(operation),
            escape_html(last_error),
            when
        ),
    }
}

/// Sends retry-exhaustion alerts through a mail transport.
pub struct MailAlert<'a> {
    transport: &'a dyn MailTransport,
}

impl<'a> MailAlert<'a> {
    pub fn new(transport: &'a dyn MailTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl FailureAlert for MailAlert<'_> {
    async fn alert_failure(&self, operation: &str, last_error: &str, at: DateTime<Local>) {
        let message = failure_message(operation, last_error, at);
        if let Err(e) = self.transport.deliver(&message).await {
            warn!("Could not send failure alert for '{}': {}", operation, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    struct FailingTransport {
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl MailTransport for FailingTransport {
        async fn deliver(&self, _message: &RenderedMessage) -> Result<(), NotifyError> {
            *self.attempts.lock().unwrap() += 1;
            Err(NotifyError::Address {
                address: "nobody".to_string(),
                reason: "rejected".to_string(),
            })
        }
    }

    fn smtp_config(recipients: &[&str]) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            secure: false,
            username: Some("bot".to_string()),
            password: Some("pw".to_string()),
            from: "Care Bot <bot@example.com>".to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            timeout: Duration::from_secs(5),
        }
    }

    fn sample() -> RenderedMessage {
        RenderedMessage {
            subject: "Care activity log - 22/01/2026 (2 entries)".to_string(),
            plain_text: "plain".to_string(),
            html: "<p>html</p>".to_string(),
        }
    }

    #[test]
    fn test_message_goes_to_every_recipient() {
        // The pooled transport spawns onto the runtime, so it must be built and dropped inside one.
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mailer =
                SmtpMailer::new(&smtp_config(&["a@example.com", "b@example.com"])).unwrap();
            let message = mailer.build_message(&sample()).unwrap();
            assert_eq!(message.envelope().to().len(), 2);
            let raw = String::from_utf8(message.formatted()).unwrap();
            assert!(raw.contains("Subject: Care activity log - 22/01/2026 (2 entries)"));
            assert!(raw.contains("multipart/alternative"));
            assert!(raw.contains("text/html"));
        });
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let result = SmtpMailer::new(&smtp_config(&["not-an-address"]));
            assert!(matches!(result, Err(NotifyError::Address { .. })));
        });
    }

    #[test]
    fn test_send_activity_swallows_and_send_digest_propagates() {
        let rt = Runtime::new().unwrap();
        let transport = FailingTransport {
            attempts: Mutex::new(0),
        };
        assert!(!rt.block_on(send_activity(&transport, &sample())));
        assert!(rt.block_on(send_digest(&transport, &sample())).is_err());
        assert_eq!(*transport.attempts.lock().unwrap(), 2);
    }

    #[test]
    fn test_failure_alert_never_propagates() {
        let rt = Runtime::new().unwrap();
        let transport = FailingTransport {
            attempts: Mutex::new(0),
        };
        let alert = MailAlert::new(&transport);
        rt.block_on(alert.alert_failure("login", "timed out", Local::now()));
        assert_eq!(*transport.attempts.lock().unwrap(), 1);

        let message = failure_message("fetch 22/01/2026", "503 <gateway>", Local::now());
        assert!(message.subject.contains("fetch 22/01/2026"));
        assert!(message.html.contains("503 &lt;gateway&gt;"));
    }
}
