use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use super::{Email, MailError, Mailer, SmtpMailer};
use crate::config::EmailConfig;
use crate::journal::Journal;

/// Builds the mailer behind a [`Transport`].
pub type MailerFactory =
    dyn Fn(&EmailConfig) -> Result<Arc<dyn Mailer>, MailError> + Send + Sync + 'static;

/// Shared handle to the process-wide mailer.
///
/// The mailer is created at most once: the check-and-create in [`Transport::ready`]
/// runs under a mutex, so concurrent first requests never build two clients. The
/// lock is released before sending, so sends run concurrently.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<EmailConfig>,
    journal: Journal,
    factory: Box<MailerFactory>,
    mailer: Mutex<Option<Arc<dyn Mailer>>>,
}

impl Transport {
    pub fn new<F>(config: Arc<EmailConfig>, journal: Journal, factory: F) -> Self
    where
        F: Fn(&EmailConfig) -> Result<Arc<dyn Mailer>, MailError> + Send + Sync + 'static,
    {
        Transport {
            inner: Arc::new(Inner {
                config,
                journal,
                factory: Box::new(factory),
                mailer: Mutex::new(None),
            }),
        }
    }

    /// Transport backed by [`SmtpMailer`].
    pub fn smtp(config: Arc<EmailConfig>, journal: Journal) -> Self {
        Self::new(config, journal, SmtpMailer::boxed)
    }

    /// Transport around an already-built mailer.
    pub fn with_mailer(config: Arc<EmailConfig>, journal: Journal, mailer: Arc<dyn Mailer>) -> Self {
        Self::new(config, journal, move |_| Ok(mailer.clone()))
    }

    /// Build the mailer if needed. Returns whether one is available.
    pub async fn ensure_initialized(&self) -> bool {
        self.ready().await.is_ok()
    }

    /// The cached mailer, creating it on first use.
    pub async fn ready(&self) -> Result<Arc<dyn Mailer>, MailError> {
        let mut slot = self.inner.mailer.lock().await;
        if let Some(mailer) = slot.as_ref() {
            return Ok(mailer.clone());
        }

        let config: &EmailConfig = &self.inner.config;
        match (self.inner.factory)(config) {
            Ok(mailer) => {
                self.inner.journal.info(
                    "Email transporter initialized",
                    Some(json!({
                        "host": config.host,
                        "port": config.port,
                        "user": config.credentials.user,
                    })),
                );
                *slot = Some(mailer.clone());
                Ok(mailer)
            }
            Err(err) => {
                self.inner.journal.error(
                    "Failed to initialize email transporter",
                    Some(json!({ "error": err.to_string() })),
                );
                Err(err)
            }
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.mailer.lock().await.is_some()
    }

    /// Drop the cached mailer; the next send builds a new one.
    pub async fn reset(&self) {
        self.inner.mailer.lock().await.take();
    }

    /// Send one message, bounded by the configured timeout when there is one.
    pub async fn send(&self, email: &Email) -> Result<String, MailError> {
        let mailer = self.ready().await?;

        match self.inner.config.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, mailer.send(email))
                .await
                .map_err(|_| MailError::Timeout(timeout))?,
            None => mailer.send(email).await,
        }
    }
}
