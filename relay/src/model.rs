//! Request and response bodies of the relay API.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

/// Current UTC time as `2024-05-01T12:00:00.000Z`.
pub fn timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

pub(crate) fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Body of `POST /send-email` as it arrives on the wire.
///
/// Every field is optional here so that missing fields produce the relay's own
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSendRequest {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub html: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
}

/// Body of `POST /test-email`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestEmailRequest {
    pub to: Option<String>,
}

/// A validated send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
}

impl SendRequest {
    /// The explicit `html` part, or the plain body with line breaks turned into `<br>`.
    pub fn html_or_default(&self) -> String {
        match &self.html {
            Some(html) if !html.is_empty() => html.clone(),
            _ => self.body.replace('\n', "<br>"),
        }
    }
}

/// Outcome of a send, serialized as the response body.
///
/// Built only through [`SendResult::sent`] and [`SendResult::failed`]: a success
/// always has a `message_id` and no `error`, a failure always has an `error` and
/// no `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

impl SendResult {
    pub fn sent(message_id: impl Into<String>, duration_ms: u64) -> Self {
        SendResult {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
            timestamp: Some(timestamp()),
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        SendResult {
            success: false,
            message_id: None,
            error: Some(error.into()),
            timestamp: Some(timestamp()),
            duration_ms: None,
        }
    }

    pub(crate) fn without_timestamp(mut self) -> Self {
        self.timestamp = None;
        self
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
}
