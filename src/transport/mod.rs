pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use self::http::HttpTransport;
use crate::config::WidgetConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("server responded with HTTP {status}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("response is not valid JSON: {0}")]
    Decode(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Moves JSON between the widget and its backend. Both calls hand back a decoded JSON object.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, TransportError>;

    async fn get_json(&self, url: &str) -> Result<Value, TransportError>;
}

pub fn new_transport(config: &WidgetConfig) -> Result<Arc<dyn ChatTransport>, TransportError> {
    let transport = HttpTransport::from_config(config)?;
    Ok(Arc::new(transport))
}
