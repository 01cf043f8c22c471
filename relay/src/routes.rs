//! HTTP surface of the relay.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::EmailConfig;
use crate::error::{RelayError, Result};
use crate::journal::Journal;
use crate::mail::{Email, Transport};
use crate::model::{timestamp, Health, RawSendRequest, SendResult, TestEmailRequest};
use crate::validate::{validate, ValidationError};

pub const SERVICE_NAME: &str = "MCP Email Server";
pub const TEST_SUBJECT: &str = "MCP Email Server Test";
pub const TEST_BODY: &str =
    "This is a test email from the MCP Email Server.\n\nIf you received this, the server is working correctly!";

#[derive(Clone, FromRef)]
pub struct Context {
    pub config: Arc<EmailConfig>,
    pub journal: Journal,
    pub transport: Transport,
}

impl Context {
    pub fn new(config: Arc<EmailConfig>, journal: Journal, transport: Transport) -> Self {
        Context {
            config,
            journal,
            transport,
        }
    }

    /// Context whose transport sends through SMTP.
    pub fn smtp(config: EmailConfig, journal: Journal) -> Self {
        let config = Arc::new(config);
        let transport = Transport::smtp(config.clone(), journal.clone());
        Self::new(config, journal, transport)
    }
}

pub fn router(ctx: Context) -> Router {
    let journal = ctx.journal.clone();

    Router::new()
        .route("/health", get(health))
        .route("/send-email", post(send_email))
        .route("/test-email", post(test_email))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| handle_panic(&journal, panic),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Request body given either as JSON or as an urlencoded form.
///
/// The form is chosen only for `application/x-www-form-urlencoded`; everything
/// else goes through the JSON extractor and its content-type check.
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(value)| Payload(value))
                .map_err(|rejection| RelayError::MalformedBody(rejection.body_text()))
        } else {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(value)| Payload(value))
                .map_err(|rejection| RelayError::MalformedBody(rejection.body_text()))
        }
    }
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: timestamp(),
    })
}

async fn send_email(
    State(ctx): State<Context>,
    payload: Result<Payload<RawSendRequest>>,
) -> Result<Json<SendResult>> {
    let Payload(raw) = payload.inspect_err(|err| {
        ctx.journal
            .warn("Malformed request body", Some(json!({ "error": err.http_message() })));
    })?;

    relay(&ctx, raw).await.map(Json)
}

async fn test_email(
    State(ctx): State<Context>,
    payload: Option<Payload<TestEmailRequest>>,
) -> Result<Json<SendResult>> {
    let to = payload
        .and_then(|Payload(req)| req.to)
        .filter(|to| !to.is_empty())
        .or_else(|| ctx.config.sender().map(str::to_string));

    let raw = RawSendRequest {
        to,
        subject: Some(TEST_SUBJECT.to_string()),
        body: Some(TEST_BODY.to_string()),
        ..Default::default()
    };

    relay(&ctx, raw).await.map(Json)
}

async fn not_found() -> RelayError {
    RelayError::NotFound
}

/// Validate, send and journal one request.
///
/// Exactly one record is written for the validation outcome. The message body is
/// never journaled.
pub async fn relay(ctx: &Context, raw: RawSendRequest) -> Result<SendResult> {
    let started = Instant::now();
    let journal = &ctx.journal;

    let received = json!({ "to": raw.to, "subject": raw.subject });
    let request = match validate(raw) {
        Ok(request) => request,
        Err(err) => {
            let message = match err {
                ValidationError::MissingFields => "Missing required fields",
                ValidationError::InvalidAddress => "Invalid email format",
            };
            journal.warn(message, Some(received));
            return Err(err.into());
        }
    };
    journal.info("Received email send request", Some(received));

    ctx.transport
        .ready()
        .await
        .map_err(RelayError::TransportInit)?;

    let sent = match Email::from_request(&request, ctx.config.sender()) {
        Ok(email) => ctx.transport.send(&email).await,
        Err(err) => Err(err),
    };
    let duration_ms = elapsed_ms(started);

    match sent {
        Ok(message_id) => {
            journal.info(
                "Email sent successfully",
                Some(json!({
                    "messageId": message_id,
                    "to": request.to,
                    "subject": request.subject,
                    "duration": format!("{duration_ms}ms"),
                })),
            );
            Ok(SendResult::sent(message_id, duration_ms))
        }
        Err(err) => {
            journal.error(
                "Failed to send email",
                Some(json!({
                    "error": err.to_string(),
                    "detail": format!("{err:?}"),
                    "duration": format!("{duration_ms}ms"),
                })),
            );
            Err(err.into())
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn handle_panic(journal: &Journal, panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    journal.error("Unhandled error", Some(json!({ "error": detail })));
    RelayError::Internal(anyhow::anyhow!(detail)).into_response()
}
