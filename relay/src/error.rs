use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::mail::MailError;
use crate::model::SendResult;
use crate::validate::ValidationError;

pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Every way a relay request can fail.
///
/// `http_code()` maps a variant to its status; `http_message()` is the text placed
/// in the `error` field of the response body. The `Display` output may carry more
/// detail than `http_message()` and is what goes to the journal.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("transport unavailable: {0}")]
    TransportInit(MailError),

    #[error(transparent)]
    Send(#[from] MailError),

    #[error("route not found")]
    NotFound,

    #[error("Internal Server Error: {0:?}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    pub fn http_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TransportInit(_) | Self::Send(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn http_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::MalformedBody(detail) => detail.clone(),
            Self::TransportInit(_) => "Email service not configured".to_string(),
            Self::Send(err) => err.to_string(),
            Self::NotFound => "Not found".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = self.http_code();
        // Relay failures are already journaled; only unexpected ones are traced here.
        if let Self::Internal(err) = &self {
            tracing::error!("Error Status {}: {:?}", code, err);
        }

        let body = SendResult::failed(self.http_message());
        // Client errors carry no timestamp.
        let body = if code.is_server_error() {
            body
        } else {
            body.without_timestamp()
        };
        (code, Json(body)).into_response()
    }
}
