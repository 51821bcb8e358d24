//! Relay phone numbers and messages, optionally with one attached file, to
//! the WhatsApp Cloud API.
//!
//! Each route is deployed as its own serverless function under `api/`; the
//! `dev-server` binary serves all of them locally.

pub mod config;
pub mod dev_server;
pub mod error;
pub mod handler;
pub mod multipart;
pub mod telemetry;
pub mod types;
pub mod whatsapp;

pub use config::{ConfigError, Credentials, RelayConfig, SendMode};
pub use error::RelayError;
pub use handler::{MessageInput, Relay, Route};
pub use multipart::{Attachment, FormData};
pub use whatsapp::WhatsAppClient;
