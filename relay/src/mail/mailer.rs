//! Mailer trait and SMTP implementation.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use super::{Email, EmailBody, MailError};
use crate::config::EmailConfig;

/// Async email sending trait.
///
/// Implement this trait to provide alternative backends; the relay's tests use an
/// in-memory implementation.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send an email and return its message identifier.
    async fn send(&self, email: &Email) -> Result<String, MailError>;
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (`SMTP_SECURE=true`, usually port 465).
    Implicit,
    /// Plain connection upgraded with `STARTTLS` (usually port 587).
    StartTls,
}

impl TlsMode {
    pub fn for_config(config: &EmailConfig) -> Self {
        if config.secure {
            TlsMode::Implicit
        } else {
            TlsMode::StartTls
        }
    }
}

/// Login credentials, only when both user and password are configured.
fn smtp_credentials(config: &EmailConfig) -> Option<Credentials> {
    match (&config.credentials.user, &config.credentials.pass) {
        (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
        _ => None,
    }
}

/// SMTP-based mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl SmtpMailer {
    /// Create a mailer from the relay configuration.
    ///
    /// No connection is opened here. A missing sender is allowed and only fails
    /// individual sends.
    pub fn from_config(config: &EmailConfig) -> Result<Self, MailError> {
        if config.host.trim().is_empty() {
            return Err(MailError::MissingConfig("SMTP_HOST".into()));
        }

        let from = config
            .sender()
            .map(|sender| {
                sender
                    .parse::<Mailbox>()
                    .map_err(|_| MailError::InvalidAddress(sender.to_string()))
            })
            .transpose()?;

        let mut builder = match TlsMode::for_config(config) {
            TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host),
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host),
        }
        .map_err(|e| MailError::Smtp(e.to_string()))?;

        builder = builder.port(config.port).timeout(config.timeout());

        if let Some(credentials) = smtp_credentials(config) {
            builder = builder.credentials(credentials);
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
            from,
        })
    }

    /// Factory for [`Transport`](super::Transport).
    pub fn boxed(config: &EmailConfig) -> Result<Arc<dyn Mailer>, MailError> {
        Ok(Arc::new(Self::from_config(config)?))
    }

    /// Build a lettre Message from our Email type, returning it with its Message-ID.
    fn build_message(&self, email: &Email) -> Result<(Message, String), MailError> {
        let from = match &email.from {
            Some(from) => parse_mailbox(from)?,
            None => self.from.clone().ok_or_else(|| {
                MailError::MissingConfig("sender address (SMTP_FROM or SMTP_USER)".into())
            })?,
        };

        let message_id = format!("<{}@{}>", Uuid::new_v4(), from.email.domain());

        let mut builder = Message::builder()
            .from(from)
            .message_id(Some(message_id.clone()))
            .subject(&email.subject);

        for to in &email.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        for cc in &email.cc {
            builder = builder.cc(parse_mailbox(cc)?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(parse_mailbox(bcc)?);
        }

        let message = match &email.body {
            EmailBody::Text(text) => builder.body(text.clone()),
            EmailBody::Multipart { text, html } => {
                builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
            }
        }
        .map_err(|e| MailError::Build(e.to_string()))?;

        Ok((message, message_id))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<String, MailError> {
        let (message, message_id) = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(message_id)
    }
}
