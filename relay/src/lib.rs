//! HTTP to SMTP relay.
//!
//! Accepts JSON or form-encoded email requests on `POST /send-email`, validates them and hands them to
//! an SMTP server through a shared [`mail::Transport`]. Every step is recorded in a
//! JSON-lines [`journal::Journal`].

pub mod config;
pub mod error;
pub mod journal;
pub mod mail;
pub mod model;
pub mod routes;
pub mod serve;
pub mod validate;

pub use config::{EmailConfig, EnvConfig, ServerConfig};
pub use error::{RelayError, Result};
pub use routes::{router, Context};
pub use serve::serve;
