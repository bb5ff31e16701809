use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::fs;
use std::path::Path;
use log::info;

use super::ConfigError;
use crate::models::chat::Theme;

/// Where the session identifier sent with each request comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionMode {
    /// Random token minted locally when the widget is created.
    ClientGenerated,
    /// No token until the server hands one back in a reply.
    ServerAssigned,
    /// Before the first chat request, reuse the first session listed at `list_endpoint`,
    /// else ask `endpoint` for a new one.
    Negotiated {
        endpoint: String,
        #[serde(default)]
        list_endpoint: Option<String>,
    },
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::ClientGenerated
    }
}

/// Outgoing JSON field names. `None` leaves the field out of the payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFields {
    pub message: String,
    pub session_id: Option<String>,
    pub user_email: Option<String>,
    pub context: Option<String>,
    /// Static fields merged into every payload, e.g. `{"action": "message"}`.
    pub extra: Map<String, Value>,
}

impl Default for RequestFields {
    fn default() -> Self {
        Self {
            message: "message".to_string(),
            session_id: Some("session_id".to_string()),
            user_email: None,
            context: None,
            extra: Map::new(),
        }
    }
}

/// Incoming JSON field names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseFields {
    /// Candidate reply text fields, first string match wins.
    pub text: Vec<String>,
    pub session_id: Option<String>,
    /// When set, anything other than `true` here is a failed reply.
    pub success: Option<String>,
    pub error: String,
    pub details: String,
    pub quick_replies: Option<String>,
    pub recommendations: Option<String>,
    pub action: Option<String>,
    pub state: Option<String>,
    pub progress: Option<String>,
    pub next_steps: Option<String>,
    /// Partial object merged into the widget's accumulated data.
    pub club_data: Option<String>,
}

impl Default for ResponseFields {
    fn default() -> Self {
        Self {
            text: vec!["response".to_string(), "message".to_string()],
            session_id: Some("session_id".to_string()),
            success: None,
            error: "error".to_string(),
            details: "details".to_string(),
            quick_replies: None,
            recommendations: None,
            action: None,
            state: None,
            progress: None,
            next_steps: None,
            club_data: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub markdown: bool,
    pub linkify: bool,
    pub auto_open_on_reply: bool,
    pub welcome_on_first_open: bool,
    pub show_server_errors: bool,
    pub distinguish_failures: bool,
    pub provider_fallback: bool,
    pub persist_history: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            markdown: true,
            linkify: false,
            auto_open_on_reply: false,
            welcome_on_first_open: true,
            show_server_errors: false,
            distinguish_failures: false,
            provider_fallback: false,
            persist_history: false,
        }
    }
}

/// User-facing strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetMessages {
    pub welcome: String,
    pub connection_error: String,
    pub generic_error: String,
    pub unexpected_format: String,
    pub timeout: String,
    pub not_found: String,
    pub server_unavailable: String,
    pub provider_fallback: String,
    pub server_error_prefix: String,
}

impl Default for WidgetMessages {
    fn default() -> Self {
        Self {
            welcome: "👋 Hi! I can help you find the right community. Where shall we start?".to_string(),
            connection_error: "⚠️ Connection error. Please try again later.".to_string(),
            generic_error: "Sorry, something went wrong. Please try again later.".to_string(),
            unexpected_format: "⚠️ Unexpected response format.".to_string(),
            timeout: "⏰ The response took too long. Please try again!".to_string(),
            not_found: "🔍 The service is temporarily unavailable. Try again in a few minutes!".to_string(),
            server_unavailable: "💥 The server is overloaded right now. Try again in a minute!".to_string(),
            provider_fallback:
                "Hi! 👋 I'm the platform's AI consultant.\n\nI can help you:\n• Find interesting clubs and communities\n• Learn about platform features\n• Grow your skills\n\nHow can I help?".to_string(),
            server_error_prefix: "⚠️ Error: ".to_string(),
        }
    }
}

/// Keys used in the local key/value store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub theme: String,
    pub visited: String,
    pub history_prefix: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            theme: "ai_chat_theme".to_string(),
            visited: "ai_chat_visited".to_string(),
            history_prefix: "ai_chat_history:".to_string(),
        }
    }
}

/// Ends a conversation when a reply reports a terminal `state` or `action`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionRule {
    pub states: Vec<String>,
    pub actions: Vec<String>,
    /// Appended as an assistant message once the conversation completes.
    pub message: String,
    pub close_panel: bool,
}

impl Default for CompletionRule {
    fn default() -> Self {
        Self {
            states: vec!["completed".to_string()],
            actions: Vec::new(),
            message: "🎉 All done, thanks for chatting!".to_string(),
            close_panel: false,
        }
    }
}

/// Side endpoints some backends offer next to the chat endpoint. Absolute URLs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraEndpoints {
    pub guide: Option<String>,
    pub validate: Option<String>,
    pub recommendations: Option<String>,
}

/// A local reply used instead of the network when any keyword occurs in the message.
/// `{origin}` in `reply` expands to the endpoint's scheme, host and port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CannedRule {
    pub keywords: Vec<String>,
    pub reply: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub name: String,
    pub title: String,
    /// Absolute URL of the chat endpoint.
    pub endpoint: String,
    pub session: SessionMode,
    pub csrf_token: Option<String>,
    pub user_email: Option<String>,
    pub context: Option<Value>,
    pub request: RequestFields,
    pub response: ResponseFields,
    pub features: Features,
    pub messages: WidgetMessages,
    pub storage_keys: StorageKeys,
    pub canned_responses: Vec<CannedRule>,
    pub completion: Option<CompletionRule>,
    /// Body posted to the chat endpoint to restart the server-side conversation.
    pub restart_payload: Option<Map<String, Value>>,
    pub extra_endpoints: ExtraEndpoints,
    /// Recommendations fetched when the widget starts up.
    pub initial_recommendations: usize,
    pub max_messages: usize,
    pub request_timeout_secs: u64,
    pub default_theme: Theme,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            name: "ai-chat".to_string(),
            title: "AI Consultant".to_string(),
            endpoint: String::new(),
            session: SessionMode::default(),
            csrf_token: None,
            user_email: None,
            context: None,
            request: RequestFields::default(),
            response: ResponseFields::default(),
            features: Features::default(),
            messages: WidgetMessages::default(),
            storage_keys: StorageKeys::default(),
            canned_responses: Vec::new(),
            completion: None,
            restart_payload: None,
            extra_endpoints: ExtraEndpoints::default(),
            initial_recommendations: 0,
            max_messages: 100,
            request_timeout_secs: 30,
            default_theme: Theme::Light,
        }
    }
}

impl WidgetConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading widget config from: {}", path.display());
        let json_str = fs::read_to_string(path)?;
        Self::from_json(&json_str)
    }

    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let config: WidgetConfig = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_http_url("endpoint", &self.endpoint)?;
        if let SessionMode::Negotiated { endpoint, list_endpoint } = &self.session {
            check_http_url("session.endpoint", endpoint)?;
            if let Some(list) = list_endpoint {
                check_http_url("session.list_endpoint", list)?;
            }
        }
        let extras = &self.extra_endpoints;
        for (field, url) in [
            ("extra_endpoints.guide", &extras.guide),
            ("extra_endpoints.validate", &extras.validate),
            ("extra_endpoints.recommendations", &extras.recommendations),
        ] {
            if let Some(url) = url {
                check_http_url(field, url)?;
            }
        }
        if self.request.message.trim().is_empty() {
            return Err(ConfigError::Invalid("request.message field name is empty".to_string()));
        }
        if self.response.text.iter().all(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid("response.text lists no field names".to_string()));
        }
        if self.max_messages == 0 {
            return Err(ConfigError::Invalid("max_messages must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".to_string()));
        }
        if let Some(rule) = &self.completion {
            if rule.states.is_empty() && rule.actions.is_empty() {
                return Err(ConfigError::Invalid("completion rule matches no state or action".to_string()));
            }
        }
        if let Some(rule) = self.canned_responses.iter().find(|r| r.keywords.is_empty()) {
            return Err(
                ConfigError::Invalid(format!("canned response '{}' has no keywords", rule.reply))
            );
        }
        Ok(())
    }

    /// Scheme, host and port of the chat endpoint, e.g. `https://example.org`.
    pub fn origin(&self) -> String {
        url::Url::parse(&self.endpoint)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_default()
    }
}

fn check_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!("{} must use http or https, got '{}'", field, other))),
    }
}
