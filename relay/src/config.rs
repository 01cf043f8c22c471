//! Environment-driven configuration.
//!
//! Any `DeserializeOwned` type can be loaded from the process environment through
//! [`EnvConfig`]. Variable names are lowercased before deserialization, so a field
//! named `smtp_host` reads `SMTP_HOST`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

pub use config::ConfigError;

pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: serde::de::DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()?
            .try_deserialize()
    }
}

/// SMTP settings, read once at startup.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `SMTP_HOST` | `smtp.gmail.com` | SMTP server hostname |
/// | `SMTP_PORT` | `587` | SMTP server port |
/// | `SMTP_SECURE` | `false` | `"true"` for implicit TLS, anything else for STARTTLS |
/// | `SMTP_USER` | unset | Username, also the default sender |
/// | `SMTP_PASS` | unset | Password |
/// | `SMTP_FROM` | unset | Sender override |
/// | `SMTP_TIMEOUT` | `30` | Send timeout in seconds, `0` for none |
///
/// Missing credentials are accepted here and only surface when a send is attempted.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(rename = "smtp_host", default = "default_host")]
    pub host: String,

    #[serde(rename = "smtp_port", default = "default_smtp_port")]
    pub port: u16,

    #[serde(rename = "smtp_secure", default, deserialize_with = "true_flag")]
    pub secure: bool,

    #[serde(flatten)]
    pub credentials: Credentials,

    #[serde(rename = "smtp_from", default)]
    pub from: Option<String>,

    #[serde(rename = "smtp_timeout", default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(rename = "smtp_user", default)]
    pub user: Option<String>,

    #[serde(rename = "smtp_pass", default)]
    pub pass: Option<String>,
}

impl EmailConfig {
    /// Address used as `From`, and as the default recipient of test emails.
    pub fn sender(&self) -> Option<&str> {
        self.from
            .as_deref()
            .or(self.credentials.user.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Bound on a single send; `None` when `SMTP_TIMEOUT` is 0.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            host: default_host(),
            port: default_smtp_port(),
            secure: false,
            credentials: Credentials::default(),
            from: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// HTTP listener and process settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "mcp_port", default = "default_listen_port")]
    pub port: u16,

    /// JSON-lines journal location (`MCP_LOG_FILE`).
    #[serde(rename = "mcp_log_file", default = "default_log_file")]
    pub log_file: PathBuf,

    /// Seconds to wait for in-flight requests after a shutdown signal.
    #[serde(rename = "mcp_shutdown_grace", default = "default_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_listen_port(),
            log_file: default_log_file(),
            shutdown_grace_secs: default_grace(),
        }
    }
}

fn default_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_timeout() -> u64 {
    30
}

fn default_listen_port() -> u16 {
    3000
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs").join("mcp_server.log")
}

fn default_grace() -> u64 {
    10
}

// Only the literal "true" enables TLS; "1", "yes" and friends do not.
fn true_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref() == Some("true"))
}
