//! Outbound mail: message type, the [`Mailer`] seam and the shared [`Transport`].
//!
//! [`SmtpMailer`] is a thin wrapper over [lettre](https://lettre.rs). The HTTP layer
//! never talks to it directly; it goes through [`Transport`], which builds the mailer
//! once and bounds every send with the configured timeout.

mod mailer;
mod message;
mod transport;

pub use mailer::{Mailer, SmtpMailer, TlsMode};
pub use message::{split_addresses, Email, EmailBody, EmailBuilder};
pub use transport::{MailerFactory, Transport};

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    /// Text reported by the SMTP client, passed through unchanged.
    #[error("{0}")]
    Smtp(String),

    #[error("SMTP send timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}
