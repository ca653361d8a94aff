//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface for the services a run talks to:
//! the BookStack REST API, S3-compatible object storage, and notification
//! channels.

pub mod http;
pub mod notify;
pub mod storage;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// Re-export the concrete adapters
pub use http::{HttpClient, RetryPolicy};
pub use notify::{NotifyChannel, NotifyHandler, Notifier, TelegramNotifier, WebhookNotifier};
pub use storage::{ObjectStore, RemoteObject, S3Store};

/// Errors surfaced by the API client once its retry policy is exhausted
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request to {url} failed with HTTP status {status}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for the upstream wiki API
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// GET a URL and parse the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value, HttpError>;

    /// GET a URL and return the raw body
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError>;
}
