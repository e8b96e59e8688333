//! Outgoing mail: plain emails and SMS text-gateway messages.

use std::fmt;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::EmailSettings;

/// Text gateways truncate or drop anything this long.
pub const TEXT_GATEWAY_LIMIT: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    InvalidAddress(String),
    TooLong { len: usize, max: usize },
    Build(String),
    Transport(String),
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(addr) => write!(f, "'{addr}' is not an email address"),
            Self::TooLong { len, max } => write!(f, "message is {len} characters, limit is {max}"),
            Self::Build(e) => write!(f, "could not build email: {e}"),
            Self::Transport(e) => write!(f, "SMTP error: {e}"),
        }
    }
}

impl std::error::Error for MailError {}

/// A body that fits through a text gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBody(String);

impl TextBody {
    pub fn new(text: &str) -> Result<Self, MailError> {
        let len = text.chars().count();
        if len >= TEXT_GATEWAY_LIMIT {
            return Err(MailError::TooLong { len, max: TEXT_GATEWAY_LIMIT });
        }
        Ok(Self(text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
}

impl OutgoingMail {
    /// Email relayed on behalf of a chat user, with a footer naming them.
    pub fn relayed(to: &str, words: &str, bot_name: &str, requester: &str) -> Self {
        let body = format!(
            "{words}\n\n\n-----\nThis email was sent by a bot named {bot_name} in a chat.\n\
             {requester} ordered that this email be sent to you."
        );
        Self {
            to: to.to_string(),
            subject: Some(format!("A message from {bot_name}")),
            body,
        }
    }

    /// Bare text-gateway message.
    pub fn text(gateway: &str, body: TextBody) -> Self {
        Self { to: gateway.to_string(), subject: None, body: body.0 }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// SMTP over STARTTLS with login. Connections are opened on demand.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self, MailError> {
        let from = parse_mailbox(&settings.address)?;
        let credentials = Credentials::new(settings.username.clone(), settings.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(settings.smtp_port)
            .credentials(credentials)
            .build();
        Ok(Self { transport, from })
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, MailError> {
    addr.trim()
        .parse::<Mailbox>()
        .map_err(|_| MailError::InvalidAddress(addr.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let to = parse_mailbox(&mail.to)?;
        let mut builder = Message::builder().from(self.from.clone()).to(to);
        if let Some(subject) = mail.subject {
            builder = builder.subject(subject);
        }
        let message = builder
            .body(mail.body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        info!("📧 Mail sent to {}", mail.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_body_limit() {
        assert!(TextBody::new(&"a".repeat(159)).is_ok());
        assert_eq!(
            TextBody::new(&"a".repeat(160)),
            Err(MailError::TooLong { len: 160, max: 160 })
        );
    }

    #[test]
    fn test_text_body_counts_chars_not_bytes() {
        // 100 two-byte chars = 200 bytes, still under the limit.
        assert!(TextBody::new(&"é".repeat(100)).is_ok());
    }

    #[test]
    fn test_relayed_mail_names_requester() {
        let mail = OutgoingMail::relayed("a@b.com", "hi there", "Moby", "@alice");
        assert_eq!(mail.to, "a@b.com");
        assert_eq!(mail.subject.as_deref(), Some("A message from Moby"));
        assert!(mail.body.starts_with("hi there\n"));
        assert!(mail.body.contains("@alice ordered that this email be sent to you."));
    }

    #[test]
    fn test_text_mail_has_no_subject() {
        let mail = OutgoingMail::text("5551234@sms.example", TextBody::new("yo").unwrap());
        assert_eq!(mail.subject, None);
        assert_eq!(mail.body, "yo");
    }

    #[test]
    fn test_parse_mailbox() {
        assert!(parse_mailbox("moby@example.com").is_ok());
        assert!(matches!(parse_mailbox("not an address"), Err(MailError::InvalidAddress(_))));
    }
}
