pub mod canned;
pub mod registry;
pub mod view;

use chrono::Utc;
use log::{ debug, error, info, warn };
use serde_json::{ Map, Value };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use self::canned::CannedResponder;
use self::view::WidgetView;
use crate::config::{ ConfigError, SessionMode, WidgetConfig };
use crate::markdown;
use crate::models::chat::{ Conversation, ConversationState, Message, MessageLog, Role, Theme };
use crate::models::club::{ ClubGuide, ClubValidation };
use crate::models::reply::{ interpret, ChatReply, ReplyOutcome };
use crate::storage::{ self, LocalStore };
use crate::transport::{ new_transport, ChatTransport, TransportError };

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("widget '{widget}' has no {endpoint} endpoint")]
    MissingEndpoint {
        widget: String,
        endpoint: &'static str,
    },
    #[error("server declined: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Busy,
    NoSuchQuickReply,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Replied(ChatReply),
    Canned,
    Failed,
    Ignored(IgnoreReason),
    /// The conversation was cleared locally, no request was made.
    Cleared,
}

struct Inner {
    state: ConversationState,
    log: MessageLog,
    quick_replies: Vec<String>,
    recommendations: Vec<Value>,
    last_reply: Option<ChatReply>,
    club_data: Map<String, Value>,
    completed: bool,
}

/// A chat client with its own panel state, message log and session.
///
/// At most one request is in flight per widget; sends made meanwhile are ignored.
pub struct ChatWidget {
    config: Arc<WidgetConfig>,
    transport: Arc<dyn ChatTransport>,
    view: Arc<dyn WidgetView>,
    store: Arc<dyn LocalStore>,
    canned: CannedResponder,
    first_visit: bool,
    inner: Mutex<Inner>,
}

/// Clears the typing flag when the send it belongs to finishes, however it finishes.
struct TypingGuard<'a> {
    widget: &'a ChatWidget,
}

impl Drop for TypingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.widget.lock();
        inner.state.is_typing = false;
        self.widget.view.set_typing_indicator(false);
    }
}

pub fn generate_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

/// The JSON body for one chat request, using the configured field names.
pub fn build_payload(config: &WidgetConfig, text: &str, session_id: Option<&str>) -> Value {
    let fields = &config.request;
    let mut body: Map<String, Value> = fields.extra.clone();
    body.insert(fields.message.clone(), Value::String(text.to_string()));
    if let Some(name) = &fields.session_id {
        let value = session_id.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null);
        body.insert(name.clone(), value);
    }
    if let Some(name) = &fields.user_email {
        let value = config.user_email.clone().map(Value::String).unwrap_or(Value::Null);
        body.insert(name.clone(), value);
    }
    if let Some(name) = &fields.context {
        let value = config.context.clone().unwrap_or_else(|| Value::Object(Map::new()));
        body.insert(name.clone(), value);
    }
    Value::Object(body)
}

impl ChatWidget {
    pub fn new(
        config: WidgetConfig,
        transport: Arc<dyn ChatTransport>,
        view: Arc<dyn WidgetView>,
        store: Arc<dyn LocalStore>
    ) -> Result<Self, WidgetError> {
        config.validate()?;

        let theme = match store.get(&config.storage_keys.theme) {
            Ok(saved) => saved.as_deref().and_then(Theme::parse).unwrap_or(config.default_theme),
            Err(e) => {
                warn!("Could not read saved theme: {}", e);
                config.default_theme
            }
        };
        let session_id = match config.session {
            SessionMode::ClientGenerated => Some(generate_session_id()),
            SessionMode::ServerAssigned | SessionMode::Negotiated { .. } => None,
        };

        let first_visit = match store.get(&config.storage_keys.visited) {
            Ok(flag) => flag.is_none(),
            Err(e) => {
                warn!("Could not read visited flag: {}", e);
                false
            }
        };

        let canned = CannedResponder::new(&config.canned_responses, &config.origin());
        let widget = Self {
            inner: Mutex::new(Inner {
                state: ConversationState {
                    session_id,
                    is_open: false,
                    is_typing: false,
                    theme,
                },
                log: MessageLog::new(config.max_messages),
                quick_replies: Vec::new(),
                recommendations: Vec::new(),
                last_reply: None,
                club_data: Map::new(),
                completed: false,
            }),
            config: Arc::new(config),
            transport,
            view,
            store,
            canned,
            first_visit,
        };

        widget.view.apply_theme(theme);
        if first_visit {
            widget.view.greet_first_visit();
            if let Err(e) = widget.store.set(&widget.config.storage_keys.visited, "true") {
                warn!("Could not store visited flag: {}", e);
            }
        }
        if widget.config.features.persist_history {
            widget.restore_history();
        }
        info!("Chat widget '{}' ready, endpoint {}", widget.config.name, widget.config.endpoint);
        Ok(widget)
    }

    /// Builds a widget talking HTTP to the configured endpoint.
    pub fn connect(
        config: WidgetConfig,
        view: Arc<dyn WidgetView>,
        store: Arc<dyn LocalStore>
    ) -> Result<Self, WidgetError> {
        config.validate()?;
        let transport = new_transport(&config)?;
        Self::new(config, transport, view, store)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ConversationState {
        self.lock().state.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().state.is_open
    }

    pub fn is_typing(&self) -> bool {
        self.lock().state.is_typing
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().state.session_id.clone()
    }

    pub fn theme(&self) -> Theme {
        self.lock().state.theme
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().log.to_vec()
    }

    pub fn quick_replies(&self) -> Vec<String> {
        self.lock().quick_replies.clone()
    }

    pub fn recommendations(&self) -> Vec<Value> {
        self.lock().recommendations.clone()
    }

    pub fn last_reply(&self) -> Option<ChatReply> {
        self.lock().last_reply.clone()
    }

    /// Club fields gathered so far, merged from every reply that carried some.
    pub fn club_data(&self) -> Map<String, Value> {
        self.lock().club_data.clone()
    }

    /// Whether a reply has matched the completion rule since the last reset.
    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// Whether no widget had run against this store before this one.
    pub fn is_first_visit(&self) -> bool {
        self.first_visit
    }

    pub fn render(&self, text: &str) -> String {
        markdown::render(text, self.config.features.markdown, self.config.features.linkify)
    }

    pub fn open(&self) {
        let mut inner = self.lock();
        self.open_locked(&mut inner);
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.state.is_open {
            return;
        }
        inner.state.is_open = false;
        self.view.set_panel_visible(false);
    }

    /// Returns whether the panel is open afterwards.
    pub fn toggle(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_open {
            inner.state.is_open = false;
            self.view.set_panel_visible(false);
        } else {
            self.open_locked(&mut inner);
        }
        inner.state.is_open
    }

    fn open_locked(&self, inner: &mut Inner) {
        if inner.state.is_open {
            return;
        }
        inner.state.is_open = true;
        self.view.set_panel_visible(true);
        self.view.focus_input();

        if self.config.features.welcome_on_first_open && !inner.log.has_role(Role::Assistant) {
            let welcome = Message::assistant(self.config.messages.welcome.clone());
            self.push_message(inner, welcome);
        }
    }

    pub fn set_theme(&self, theme: Theme) {
        let mut inner = self.lock();
        inner.state.theme = theme;
        self.view.apply_theme(theme);
        if let Err(e) = self.store.set(&self.config.storage_keys.theme, theme.as_str()) {
            warn!("Could not store theme preference: {}", e);
        }
    }

    pub fn toggle_theme(&self) -> Theme {
        let next = self.theme().toggled();
        self.set_theme(next);
        next
    }

    /// Starts a fresh conversation. A reply already in flight still lands in the new log.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.log.clear();
        inner.quick_replies.clear();
        inner.recommendations.clear();
        inner.last_reply = None;
        inner.club_data.clear();
        inner.completed = false;
        inner.state.session_id = match self.config.session {
            SessionMode::ClientGenerated => Some(generate_session_id()),
            _ => None,
        };
        self.view.clear_messages();
        self.view.show_quick_replies(&[]);
        if self.config.features.persist_history {
            if let Err(e) = self.store.remove(&self.history_key()) {
                warn!("Could not drop stored conversation: {}", e);
            }
        }
        debug!("Widget '{}' reset", self.config.name);
    }

    /// Starts over. Backends with a restart payload are told first and their answer opens
    /// the new conversation; if that request fails nothing local changes.
    pub async fn restart(&self) -> SendOutcome {
        let Some(body) = self.config.restart_payload.clone() else {
            self.reset();
            return SendOutcome::Cleared;
        };

        {
            let mut inner = self.lock();
            if inner.state.is_typing {
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
            inner.state.is_typing = true;
            self.view.set_typing_indicator(true);
        }
        let _typing = TypingGuard { widget: self };

        let payload = match self.transport.post_json(&self.config.endpoint, &Value::Object(body)).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Widget '{}' could not restart: {}", self.config.name, e);
                return SendOutcome::Failed;
            }
        };

        self.reset();
        match interpret(&payload, &self.config.response, None) {
            ReplyOutcome::Reply(reply) => {
                self.accept_reply(&reply);
                SendOutcome::Replied(reply)
            }
            other => {
                warn!("Widget '{}' restarted without a greeting: {:?}", self.config.name, other);
                SendOutcome::Failed
            }
        }
    }

    pub async fn fetch_guide(&self) -> Result<ClubGuide, WidgetError> {
        let url = self.extra_endpoint("guide", &self.config.extra_endpoints.guide)?;
        let body = self.transport.get_json(url).await?;
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(WidgetError::Rejected(declined_reason(&body)));
        }
        serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()).into())
    }

    /// Asks the server to check the club data gathered so far.
    pub async fn validate_club_data(&self) -> Result<ClubValidation, WidgetError> {
        let url = self.extra_endpoint("validate", &self.config.extra_endpoints.validate)?;
        let mut payload = Map::new();
        payload.insert("club_data".to_string(), Value::Object(self.club_data()));
        let body = self.transport.post_json(url, &Value::Object(payload)).await?;

        let Some(validation) = body.get("validation") else {
            return Err(WidgetError::Rejected(declined_reason(&body)));
        };
        let validation: ClubValidation =
            serde_json::from_value(validation.clone()).map_err(|e| TransportError::Decode(e.to_string()))?;
        debug!(
            "Widget '{}' club data scored {} ({} errors)",
            self.config.name,
            validation.score,
            validation.errors.len()
        );
        Ok(validation)
    }

    /// Fetches up to `limit` recommendations, replacing the ones on show.
    pub async fn load_recommendations(&self, limit: usize) -> Result<Vec<Value>, WidgetError> {
        let base = self.extra_endpoint("recommendations", &self.config.extra_endpoints.recommendations)?;
        let mut url = Url::parse(base).map_err(|source| ConfigError::InvalidUrl {
            field: "extra_endpoints.recommendations",
            value: base.to_string(),
            source,
        })?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());

        let body = self.transport.get_json(url.as_str()).await?;
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(WidgetError::Rejected(declined_reason(&body)));
        }
        let items = body
            .get("recommendations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut inner = self.lock();
        inner.recommendations = items.clone();
        self.view.show_recommendations(&items);
        info!("Widget '{}' loaded {} recommendations", self.config.name, items.len());
        Ok(items)
    }

    fn extra_endpoint<'a>(&self, name: &'static str, url: &'a Option<String>) -> Result<&'a str, WidgetError> {
        url.as_deref().ok_or_else(|| WidgetError::MissingEndpoint {
            widget: self.config.name.clone(),
            endpoint: name,
        })
    }

    pub async fn send_quick_reply(&self, index: usize) -> SendOutcome {
        let reply = self.lock().quick_replies.get(index).cloned();
        match reply {
            Some(text) => self.send_message(&text).await,
            None => SendOutcome::Ignored(IgnoreReason::NoSuchQuickReply),
        }
    }

    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Empty);
        }

        let session_id = {
            let mut inner = self.lock();
            if inner.state.is_typing {
                debug!("Widget '{}' is awaiting a reply, ignoring send", self.config.name);
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
            inner.state.is_typing = true;
            self.view.set_typing_indicator(true);
            self.push_message(&mut inner, Message::user(text));
            inner.quick_replies.clear();
            self.view.show_quick_replies(&[]);
            inner.state.session_id.clone()
        };
        let _typing = TypingGuard { widget: self };

        if let Some(reply) = self.canned.respond(text) {
            let mut inner = self.lock();
            self.push_message(&mut inner, Message::assistant(reply));
            return SendOutcome::Canned;
        }

        let session_id = match (session_id, &self.config.session) {
            (None, SessionMode::Negotiated { endpoint, list_endpoint }) =>
                match self.negotiate_session(endpoint, list_endpoint.as_deref()).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        error!("Widget '{}' could not open a session: {}", self.config.name, e);
                        self.fail(self.transport_failure_text(&e));
                        return SendOutcome::Failed;
                    }
                }
            (session_id, _) => session_id,
        };

        let payload = build_payload(&self.config, text, session_id.as_deref());
        let result = self.transport.post_json(&self.config.endpoint, &payload).await;

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                error!("Widget '{}' request failed: {}", self.config.name, e);
                self.fail(self.transport_failure_text(&e));
                return SendOutcome::Failed;
            }
        };

        let fallback = self.config.features.provider_fallback.then_some(
            self.config.messages.provider_fallback.as_str()
        );
        match interpret(&payload, &self.config.response, fallback) {
            ReplyOutcome::Reply(reply) => {
                self.accept_reply(&reply);
                SendOutcome::Replied(reply)
            }
            ReplyOutcome::Failure { detail } => {
                warn!("Widget '{}' got an unsuccessful reply: {:?}", self.config.name, detail);
                let messages = &self.config.messages;
                let text = match detail {
                    Some(detail) if self.config.features.show_server_errors =>
                        format!("{}{}", messages.server_error_prefix, detail),
                    _ => messages.generic_error.clone(),
                };
                self.fail(text);
                SendOutcome::Failed
            }
            ReplyOutcome::Unrecognized => {
                warn!("Widget '{}' could not find reply text in: {}", self.config.name, payload);
                self.fail(self.config.messages.unexpected_format.clone());
                SendOutcome::Failed
            }
        }
    }

    /// Reuses the newest listed session when there is one, otherwise creates a session.
    async fn negotiate_session(&self, endpoint: &str, list_endpoint: Option<&str>) -> Result<String, TransportError> {
        if let Some(list) = list_endpoint {
            match self.transport.get_json(list).await {
                Ok(listing) => {
                    let existing = listing
                        .get("sessions")
                        .and_then(Value::as_array)
                        .and_then(|sessions| sessions.first())
                        .and_then(|session| session.get("id"))
                        .and_then(session_token);
                    if let Some(session_id) = existing {
                        info!("Widget '{}' resumed session {}", self.config.name, session_id);
                        self.lock().state.session_id = Some(session_id.clone());
                        return Ok(session_id);
                    }
                }
                Err(e) => warn!("Widget '{}' could not list sessions: {}", self.config.name, e),
            }
        }

        let response = self.transport.post_json(endpoint, &Value::Object(Map::new())).await?;
        let field = self.config.response.session_id.as_deref().unwrap_or("session_id");
        let session_id = response
            .get(field)
            .or_else(|| response.get("id"))
            .and_then(session_token)
            .ok_or_else(|| TransportError::Decode("session endpoint returned no session id".to_string()))?;

        info!("Widget '{}' opened session {}", self.config.name, session_id);
        self.lock().state.session_id = Some(session_id.clone());
        Ok(session_id)
    }

    fn accept_reply(&self, reply: &ChatReply) {
        let mut inner = self.lock();
        if let Some(session_id) = &reply.session_id {
            if inner.state.session_id.as_deref() != Some(session_id.as_str()) {
                debug!("Widget '{}' session is now {}", self.config.name, session_id);
            }
            inner.state.session_id = Some(session_id.clone());
        }
        self.push_message(&mut inner, Message::assistant(reply.text.clone()));
        if !reply.quick_replies.is_empty() {
            inner.quick_replies = reply.quick_replies.clone();
            self.view.show_quick_replies(&inner.quick_replies);
        }
        if !reply.recommendations.is_empty() {
            inner.recommendations = reply.recommendations.clone();
            self.view.show_recommendations(&inner.recommendations);
        }
        if let Some(data) = &reply.club_data {
            for (key, value) in data {
                inner.club_data.insert(key.clone(), value.clone());
            }
        }
        inner.last_reply = Some(reply.clone());
        if self.config.features.auto_open_on_reply {
            self.open_locked(&mut inner);
        }

        let Some(rule) = &self.config.completion else {
            return;
        };
        let matches = |value: &Option<Value>, wanted: &[String]| {
            value
                .as_ref()
                .and_then(Value::as_str)
                .map(|v| wanted.iter().any(|w| w == v))
                .unwrap_or(false)
        };
        if matches(&reply.state, &rule.states) || matches(&reply.action, &rule.actions) {
            info!("Widget '{}' conversation completed", self.config.name);
            inner.completed = true;
            self.push_message(&mut inner, Message::assistant(rule.message.clone()));
            if rule.close_panel && inner.state.is_open {
                inner.state.is_open = false;
                self.view.set_panel_visible(false);
            }
        }
    }

    fn fail(&self, text: String) {
        let mut inner = self.lock();
        self.push_message(&mut inner, Message::system(text));
    }

    fn transport_failure_text(&self, err: &TransportError) -> String {
        let messages = &self.config.messages;
        if self.config.features.distinguish_failures {
            match err {
                TransportError::Timeout => return messages.timeout.clone(),
                TransportError::Status { status: 404, .. } => return messages.not_found.clone(),
                TransportError::Status { status, .. } if *status >= 500 => {
                    return messages.server_unavailable.clone();
                }
                _ => {}
            }
        }
        match err {
            TransportError::Status { .. } | TransportError::Decode(_) => messages.generic_error.clone(),
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Request(_) =>
                messages.connection_error.clone(),
        }
    }

    fn push_message(&self, inner: &mut Inner, message: Message) {
        let html = self.render(&message.text);
        for evicted in inner.log.push(message.clone()) {
            self.view.remove_message(&evicted.id);
        }
        self.view.append_message(&message, &html);
        if self.config.features.persist_history {
            let conversation = Conversation {
                session_id: inner.state.session_id.clone(),
                messages: inner.log.to_vec(),
            };
            if let Err(e) = storage::save_history(self.store.as_ref(), &self.history_key(), &conversation) {
                warn!("Could not mirror conversation: {}", e);
            }
        }
    }

    fn history_key(&self) -> String {
        format!("{}{}", self.config.storage_keys.history_prefix, self.config.name)
    }

    fn restore_history(&self) {
        let conversation = match storage::load_history(self.store.as_ref(), &self.history_key()) {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return,
            Err(e) => {
                warn!("Ignoring stored conversation: {}", e);
                return;
            }
        };

        let mut inner = self.lock();
        if conversation.session_id.is_some() {
            inner.state.session_id = conversation.session_id;
        }
        for message in conversation.messages {
            let html = self.render(&message.text);
            for evicted in inner.log.push(message.clone()) {
                self.view.remove_message(&evicted.id);
            }
            self.view.append_message(&message, &html);
        }
        info!("Widget '{}' restored {} stored messages", self.config.name, inner.log.len());
    }
}

fn session_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn declined_reason(body: &Value) -> String {
    ["error", "message", "detail"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .unwrap_or("no reason given")
        .to_string()
}
