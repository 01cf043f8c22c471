//! Email message type and builder.

use serde::{Deserialize, Serialize};

use super::MailError;
use crate::model::SendRequest;

/// The body content of an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailBody {
    /// Plain text only.
    Text(String),
    /// Both plain text and HTML (multipart/alternative).
    Multipart { text: String, html: String },
}

impl EmailBody {
    pub fn text(&self) -> &str {
        match self {
            EmailBody::Text(text) | EmailBody::Multipart { text, .. } => text,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            EmailBody::Text(_) => None,
            EmailBody::Multipart { html, .. } => Some(html),
        }
    }
}

/// A complete email message ready to hand to a [`Mailer`](super::Mailer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Sender; the mailer's configured sender when absent.
    #[serde(default)]
    pub from: Option<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: EmailBody,
}

impl Email {
    /// Create a new email builder.
    ///
    /// ```
    /// use mail_relay::mail::Email;
    ///
    /// let email = Email::builder()
    ///     .to("a@b.com")
    ///     .subject("Hi")
    ///     .text("Hello")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(email.to, vec!["a@b.com"]);
    /// assert_eq!(email.body.html(), None);
    /// ```
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }

    /// Message for a validated relay request.
    ///
    /// The HTML part falls back to the text body with `<br>` line breaks, and
    /// `cc`/`bcc` may hold comma-separated lists.
    pub fn from_request(request: &SendRequest, from: Option<&str>) -> Result<Email, MailError> {
        let mut builder = Email::builder()
            .to(&request.to)
            .subject(&request.subject)
            .text(&request.body)
            .html(request.html_or_default());

        if let Some(from) = from {
            builder = builder.from(from);
        }
        if let Some(cc) = &request.cc {
            builder = builder.cc_many(split_addresses(cc));
        }
        if let Some(bcc) = &request.bcc {
            builder = builder.bcc_many(split_addresses(bcc));
        }

        builder.build()
    }
}

/// Split `"a@b.com, c@d.com"` into its addresses, skipping empty entries.
pub fn split_addresses(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|a| !a.is_empty())
}

/// Builder for constructing [`Email`] instances.
#[derive(Debug, Default)]
pub struct EmailBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
}

impl EmailBuilder {
    /// Set the sender address.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Add a primary recipient.
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add multiple CC recipients.
    pub fn cc_many(mut self, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Add multiple BCC recipients.
    pub fn bcc_many(mut self, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bcc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set plain text body content.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set HTML body content.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Build the email. A recipient, a subject and a text body are required.
    pub fn build(self) -> Result<Email, MailError> {
        if self.to.is_empty() {
            return Err(MailError::Build("at least one recipient required".into()));
        }

        let subject = self
            .subject
            .ok_or_else(|| MailError::Build("subject required".into()))?;

        let body = match (self.text, self.html) {
            (Some(text), Some(html)) => EmailBody::Multipart { text, html },
            (Some(text), None) => EmailBody::Text(text),
            (None, _) => return Err(MailError::Build("text body required".into())),
        };

        Ok(Email {
            from: self.from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject,
            body,
        })
    }
}
