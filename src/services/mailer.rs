//! Outgoing email.
//!
//! [`SmtpMailer`] delivers through lettre's blocking SMTP transport on the
//! blocking thread pool. [`LogMailer`] stands in when no SMTP server is
//! configured and only records what would have been sent.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::SmtpSettings;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("{0}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
    #[error("mail task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<EmailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Builds the MIME message: a plain-text body plus the optional attachment
pub fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, MailError> {
    let to = parse_mailbox(&email.to)?;
    let builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.clone());

    let message = match &email.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| MailError::Build(e.to_string()))?;
            let part = Attachment::new(attachment.filename.clone())
                .body(attachment.bytes.clone(), content_type);
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(email.body.clone()))
                    .singlepart(part),
            )
        }
        None => builder.singlepart(SinglePart::plain(email.body.clone())),
    };

    message.map_err(|e| MailError::Build(e.to_string()))
}

#[derive(Clone, Debug)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from = parse_mailbox(&settings.from)?;

        let mut builder = if settings.tls {
            SmtpTransport::relay(settings.host.trim())
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(settings.port)
        } else {
            SmtpTransport::builder_dangerous(settings.host.trim()).port(settings.port)
        };

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = build_message(&self.from, &email)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError::Join(e.to_string()))?
            .map_err(|e| MailError::Transport(e.to_string()))?;

        metrics::counter!("invoicing.emails.sent", 1);
        info!(to = %email.to, subject = %email.subject, "Email delivered");
        Ok(())
    }
}

/// Accepts every message and logs it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        parse_mailbox(&email.to)?;
        info!(
            to = %email.to,
            subject = %email.subject,
            attachment = email.attachment.as_ref().map(|a| a.filename.as_str()).unwrap_or("-"),
            "SMTP not configured; email logged instead of sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".into(),
            port: 2525,
            username: None,
            password: None,
            from: "Billing <billing@example.com>".into(),
            tls: false,
        }
    }

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.into(),
            subject: "Invoice INV-2024-000001".into(),
            body: "Please find the invoice attached.".into(),
            attachment: Some(EmailAttachment {
                filename: "invoice-INV-2024-000001.pdf".into(),
                content_type: "application/pdf".into(),
                bytes: b"%PDF-1.3".to_vec(),
            }),
        }
    }

    #[test]
    fn builds_multipart_message_with_attachment() {
        let from = parse_mailbox("Billing <billing@example.com>").unwrap();
        let message = build_message(&from, &email("client@example.com")).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("invoice-INV-2024-000001.pdf"));
        assert!(raw.contains("application/pdf"));
    }

    #[test]
    fn rejects_bad_recipient() {
        let from = parse_mailbox("billing@example.com").unwrap();
        assert_matches!(
            build_message(&from, &email("not an address")),
            Err(MailError::InvalidAddress(_))
        );
    }

    #[test]
    fn smtp_mailer_requires_valid_sender() {
        assert!(SmtpMailer::from_settings(&settings()).is_ok());

        let mut bad = settings();
        bad.from = "nobody".into();
        assert_matches!(
            SmtpMailer::from_settings(&bad),
            Err(MailError::InvalidAddress(_))
        );
    }

    #[tokio::test]
    async fn log_mailer_accepts_valid_messages() {
        assert!(LogMailer.send(email("client@example.com")).await.is_ok());
        assert_matches!(
            LogMailer.send(email("broken")).await,
            Err(MailError::InvalidAddress(_))
        );
    }
}
