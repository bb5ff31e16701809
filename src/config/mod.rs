pub mod variant;
pub mod widget;

pub use variant::{ ParseVariantError, Variant };
pub use widget::{
    CannedRule,
    CompletionRule,
    ExtraEndpoints,
    Features,
    RequestFields,
    ResponseFields,
    SessionMode,
    StorageKeys,
    WidgetConfig,
    WidgetMessages,
};

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Widget config file IO error: {}", e),
            ConfigError::Json(e) => write!(f, "Widget config JSON parsing error: {}", e),
            ConfigError::InvalidUrl { field, value, source } =>
                write!(f, "Invalid URL '{}' for {}: {}", value, field, source),
            ConfigError::Invalid(msg) => write!(f, "Invalid widget config: {}", msg),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::InvalidUrl { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err)
    }
}

/// Resolves `path` against `base_url`, e.g. `http://host:8000` + `/api/ai/chat/`.
pub fn join_url(base_url: &str, path: &str) -> Result<String, ConfigError> {
    let base = url::Url::parse(base_url).map_err(|source| ConfigError::InvalidUrl {
        field: "base_url",
        value: base_url.to_string(),
        source,
    })?;
    let joined = base.join(path).map_err(|source| ConfigError::InvalidUrl {
        field: "endpoint",
        value: path.to_string(),
        source,
    })?;
    Ok(joined.to_string())
}
