use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mail_relay::config::Credentials;
use mail_relay::journal::{read_records, Journal, Level, LogRecord};
use mail_relay::mail::{Email, MailError, Mailer, Transport};
use mail_relay::routes::{TEST_BODY, TEST_SUBJECT};
use mail_relay::{router, Context, EmailConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Clone, Copy)]
enum Outcome {
    Deliver,
    Refuse,
    Panic,
}

struct RecordingMailer {
    outcome: Outcome,
    sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<String, MailError> {
        self.sent.lock().unwrap().push(email.clone());
        match self.outcome {
            Outcome::Deliver => Ok("id-123".to_string()),
            Outcome::Refuse => Err(MailError::Smtp("connection refused".to_string())),
            Outcome::Panic => panic!("mailer exploded"),
        }
    }
}

struct Harness {
    _dir: TempDir,
    journal: Journal,
    mailer: Arc<RecordingMailer>,
    builds: Arc<AtomicUsize>,
    ctx: Context,
}

impl Harness {
    fn new(outcome: Outcome) -> Self {
        Self::build(outcome, true)
    }

    fn build(outcome: Outcome, init_ok: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("logs").join("mcp_server.log"));
        let config = Arc::new(EmailConfig {
            credentials: Credentials {
                user: Some("relay@example.com".to_string()),
                pass: Some("secret".to_string()),
            },
            ..Default::default()
        });
        let mailer = Arc::new(RecordingMailer {
            outcome,
            sent: Mutex::new(Vec::new()),
        });
        let builds = Arc::new(AtomicUsize::new(0));

        let factory_mailer = mailer.clone();
        let counter = builds.clone();
        let transport = Transport::new(config.clone(), journal.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if init_ok {
                Ok(factory_mailer.clone() as Arc<dyn Mailer>)
            } else {
                Err(MailError::MissingConfig("SMTP_HOST".to_string()))
            }
        });

        let ctx = Context::new(config, journal.clone(), transport);
        Harness {
            _dir: dir,
            journal,
            mailer,
            builds,
            ctx,
        }
    }

    async fn post(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method("POST").uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.call(request.body(body).unwrap()).await
    }

    async fn post_form(&self, uri: &str, form: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        self.call(request).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(self.ctx.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn sent(&self) -> Vec<Email> {
        self.mailer.sent.lock().unwrap().clone()
    }

    fn records(&self) -> Vec<LogRecord> {
        read_records(self.journal.path()).unwrap_or_default()
    }

    fn journal_text(&self) -> String {
        std::fs::read_to_string(self.journal.path()).unwrap_or_default()
    }
}

fn keys(value: &Value) -> Vec<&str> {
    let mut keys: Vec<_> = value.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

#[tokio::test]
async fn health_reports_identity() {
    let harness = Harness::new(Outcome::Deliver);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = harness.call(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "MCP Email Server");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(harness.records().is_empty());
}

#[tokio::test]
async fn missing_fields_are_rejected_before_transport() {
    let harness = Harness::new(Outcome::Deliver);
    let cases = [
        json!({}),
        json!({"subject": "S", "body": "B"}),
        json!({"to": "a@b.com", "body": "B"}),
        json!({"to": "a@b.com", "subject": "S"}),
        json!({"to": "", "subject": "S", "body": "B"}),
        json!({"to": "a@b.com", "subject": "S", "body": null}),
    ];

    for case in cases {
        let (status, body) = harness.post("/send-email", Some(case)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"success": false, "error": "Missing required fields: to, subject, body"})
        );
    }

    assert!(harness.sent().is_empty());
    assert_eq!(harness.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_addresses_are_rejected() {
    let harness = Harness::new(Outcome::Deliver);

    for to in ["not-an-email", "user@", "@domain.com"] {
        let (status, body) = harness
            .post(
                "/send-email",
                Some(json!({"to": to, "subject": "S", "body": "B"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Invalid email format"}));
    }

    assert!(harness.sent().is_empty());
    assert_eq!(harness.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn html_defaults_to_body_with_line_breaks() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, _) = harness
        .post(
            "/send-email",
            Some(json!({"to": "a@b.com", "subject": "S", "body": "hello\nworld"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from.as_deref(), Some("relay@example.com"));
    assert_eq!(sent[0].to, vec!["a@b.com"]);
    assert_eq!(sent[0].subject, "S");
    assert_eq!(sent[0].body.text(), "hello\nworld");
    assert_eq!(sent[0].body.html(), Some("hello<br>world"));
    assert!(sent[0].cc.is_empty());
    assert!(sent[0].bcc.is_empty());
}

#[tokio::test]
async fn explicit_html_and_copies_are_forwarded() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, _) = harness
        .post(
            "/send-email",
            Some(json!({
                "to": "a@b.com",
                "subject": "S",
                "body": "plain",
                "html": "<p>rich</p>",
                "cc": "c@d.com",
                "bcc": "e@f.com, g@h.com",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let sent = harness.sent();
    assert_eq!(sent[0].body.html(), Some("<p>rich</p>"));
    assert_eq!(sent[0].cc, vec!["c@d.com"]);
    assert_eq!(sent[0].bcc, vec!["e@f.com", "g@h.com"]);
}

#[tokio::test]
async fn successful_send_returns_message_id() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, body) = harness
        .post(
            "/send-email",
            Some(json!({"to": "a@b.com", "subject": "S", "body": "B"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys(&body), ["duration_ms", "message_id", "success", "timestamp"]);
    assert_eq!(body["success"], true);
    assert_eq!(body["message_id"], "id-123");
    assert!(body["duration_ms"].is_u64());
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

    let records = harness.records();
    let sent = records
        .iter()
        .find(|r| r.message == "Email sent successfully")
        .unwrap();
    assert_eq!(sent.level, Level::Info);
    assert_eq!(sent.data.as_ref().unwrap()["messageId"], "id-123");
}

#[tokio::test]
async fn transport_failure_returns_error_text() {
    let harness = Harness::new(Outcome::Refuse);
    let (status, body) = harness
        .post(
            "/send-email",
            Some(json!({"to": "a@b.com", "subject": "S", "body": "B"})),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(keys(&body), ["error", "success", "timestamp"]);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "connection refused");

    let failure = harness
        .records()
        .into_iter()
        .find(|r| r.message == "Failed to send email")
        .unwrap();
    assert_eq!(failure.level, Level::Error);
    assert_eq!(failure.data.unwrap()["error"], "connection refused");
}

#[tokio::test]
async fn transport_init_failure_is_server_error() {
    let harness = Harness::build(Outcome::Deliver, false);
    let (status, body) = harness
        .post(
            "/send-email",
            Some(json!({"to": "a@b.com", "subject": "S", "body": "B"})),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Email service not configured");
    assert!(harness.sent().is_empty());

    let records = harness.records();
    assert!(records
        .iter()
        .any(|r| r.level == Level::Error && r.message == "Failed to initialize email transporter"));
}

#[tokio::test]
async fn transport_is_built_once_across_requests() {
    let harness = Harness::new(Outcome::Deliver);
    for _ in 0..3 {
        let (status, _) = harness
            .post(
                "/send-email",
                Some(json!({"to": "a@b.com", "subject": "S", "body": "B"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(harness.builds.load(Ordering::SeqCst), 1);
    assert_eq!(harness.sent().len(), 3);
}

#[tokio::test]
async fn test_email_defaults_to_configured_sender() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, body) = harness.post("/test-email", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message_id"], "id-123");

    let sent = harness.sent();
    assert_eq!(sent[0].to, vec!["relay@example.com"]);
    assert_eq!(sent[0].subject, TEST_SUBJECT);
    assert_eq!(sent[0].body.text(), TEST_BODY);
}

#[tokio::test]
async fn test_email_accepts_recipient_override() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, _) = harness
        .post("/test-email", Some(json!({"to": "someone@example.org"})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.sent()[0].to, vec!["someone@example.org"]);
}

#[tokio::test]
async fn test_email_shares_send_error_contract() {
    let harness = Harness::new(Outcome::Refuse);
    let (status, body) = harness.post("/test-email", Some(json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "connection refused");
}

#[tokio::test]
async fn one_validation_record_per_request_and_no_body_contents() {
    let secret = "TOP-SECRET-BODY-CONTENT";
    let harness = Harness::new(Outcome::Refuse);
    let requests = [
        json!({"to": "a@b.com", "subject": "S", "body": secret}),
        json!({"to": "a@b.com", "body": secret}),
        json!({"to": "not-an-email", "subject": "S", "body": secret}),
    ];

    let mut expected = 0;
    for request in requests {
        harness.post("/send-email", Some(request)).await;
        expected += 1;

        let validation_records = harness
            .records()
            .into_iter()
            .filter(|r| {
                matches!(
                    r.message.as_str(),
                    "Received email send request" | "Missing required fields" | "Invalid email format"
                )
            })
            .count();
        assert_eq!(validation_records, expected);
    }

    let warnings: Vec<_> = harness
        .records()
        .into_iter()
        .filter(|r| r.level == Level::Warn)
        .collect();
    assert_eq!(warnings.len(), 2);
    assert!(!harness.journal_text().contains(secret));
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let harness = Harness::new(Outcome::Deliver);
    let request = Request::builder()
        .method("POST")
        .uri("/send-email")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = harness.call(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn urlencoded_form_is_relayed() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, body) = harness
        .post_form("/send-email", "to=a%40b.com&subject=S&body=hello")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message_id"], "id-123");

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["a@b.com"]);
    assert_eq!(sent[0].subject, "S");
    assert_eq!(sent[0].body.html(), Some("hello"));
}

#[tokio::test]
async fn urlencoded_form_is_validated() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, body) = harness
        .post_form("/send-email", "to=nobody&subject=S&body=hello")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Invalid email format"}));
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn test_email_accepts_form_recipient() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, _) = harness.post_form("/test-email", "to=x%40y.com").await;

    assert_eq!(status, StatusCode::OK);
    let sent = harness.sent();
    assert_eq!(sent[0].to, vec!["x@y.com"]);
    assert_eq!(sent[0].subject, TEST_SUBJECT);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let harness = Harness::new(Outcome::Deliver);
    let (status, body) = harness.post("/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "error": "Not found"}));
}

#[tokio::test]
async fn panics_become_internal_errors() {
    let harness = Harness::new(Outcome::Panic);
    let (status, body) = harness
        .post(
            "/send-email",
            Some(json!({"to": "a@b.com", "subject": "S", "body": "B"})),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Internal server error");
    assert!(body["timestamp"].is_string());

    let unhandled = harness
        .records()
        .into_iter()
        .find(|r| r.message == "Unhandled error")
        .unwrap();
    assert_eq!(unhandled.level, Level::Error);
    assert_eq!(unhandled.data.unwrap()["error"], "mailer exploded");
}
