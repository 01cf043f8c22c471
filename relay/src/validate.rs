//! Request validation.
//!
//! Checks run in a fixed order: required fields first, then the recipient's
//! address syntax. Nothing here touches the network.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{RawSendRequest, SendRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required fields: to, subject, body")]
    MissingFields,
    #[error("Invalid email format")]
    InvalidAddress,
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid address pattern")
    })
}

/// Syntactic check for `local-part@domain.tld`. No DNS lookups.
pub fn is_valid_address(address: &str) -> bool {
    address_pattern().is_match(address)
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

/// Turn a raw payload into a [`SendRequest`].
///
/// Empty optional fields are dropped so that `cc: ""` behaves like an absent `cc`.
pub fn validate(raw: RawSendRequest) -> Result<SendRequest, ValidationError> {
    let (Some(to), Some(subject), Some(body)) = (
        required(raw.to),
        required(raw.subject),
        required(raw.body),
    ) else {
        return Err(ValidationError::MissingFields);
    };

    if !is_valid_address(&to) {
        return Err(ValidationError::InvalidAddress);
    }

    Ok(SendRequest {
        to,
        subject,
        body,
        html: required(raw.html),
        cc: required(raw.cc),
        bcc: required(raw.bcc),
    })
}
