#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };
use tokio::sync::Notify;

use widget_client::models::chat::{ Message, Role, Theme };
use widget_client::transport::{ ChatTransport, TransportError };
use widget_client::widget::view::WidgetView;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Panel(bool),
    Focus,
    Typing(bool),
    Append(Role, String),
    Remove(String),
    Clear,
    QuickReplies(Vec<String>),
    Theme(Theme),
    Recommendations(usize),
    FirstVisit,
    Request(String, Value),
    Fetch(String),
}

pub type Events = Arc<Mutex<Vec<Event>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(events: &Events) -> Vec<Event> {
    events.lock().unwrap().clone()
}

pub struct RecordingView {
    events: Events,
}

impl RecordingView {
    pub fn new(events: Events) -> Arc<Self> {
        Arc::new(Self { events })
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl WidgetView for RecordingView {
    fn set_panel_visible(&self, visible: bool) {
        self.record(Event::Panel(visible));
    }
    fn focus_input(&self) {
        self.record(Event::Focus);
    }
    fn set_typing_indicator(&self, visible: bool) {
        self.record(Event::Typing(visible));
    }
    fn append_message(&self, message: &Message, html: &str) {
        self.record(Event::Append(message.role, html.to_string()));
    }
    fn remove_message(&self, message_id: &str) {
        self.record(Event::Remove(message_id.to_string()));
    }
    fn clear_messages(&self) {
        self.record(Event::Clear);
    }
    fn show_quick_replies(&self, replies: &[String]) {
        self.record(Event::QuickReplies(replies.to_vec()));
    }
    fn apply_theme(&self, theme: Theme) {
        self.record(Event::Theme(theme));
    }
    fn show_recommendations(&self, items: &[Value]) {
        self.record(Event::Recommendations(items.len()));
    }
    fn greet_first_visit(&self) {
        self.record(Event::FirstVisit);
    }
}

/// Answers requests from a queue and records them into the shared event list.
pub struct ScriptedTransport {
    events: Events,
    replies: Mutex<VecDeque<Result<Value, TransportError>>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    pub fn new(events: Events, replies: Vec<Result<Value, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            events,
            replies: Mutex::new(replies.into()),
            gate: None,
        })
    }

    /// Each request waits for `gate` to be notified before answering.
    pub fn gated(events: Events, replies: Vec<Result<Value, TransportError>>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            events,
            replies: Mutex::new(replies.into()),
            gate: Some(gate),
        })
    }

    async fn answer(&self, event: Event) -> Result<Value, TransportError> {
        self.events.lock().unwrap().push(event);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("no scripted reply left".to_string())))
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, TransportError> {
        self.answer(Event::Request(url.to_string(), payload.clone())).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        self.answer(Event::Fetch(url.to_string())).await
    }
}

pub fn requests(events: &Events) -> Vec<(String, Value)> {
    snapshot(events)
        .into_iter()
        .filter_map(|e| match e {
            Event::Request(url, body) => Some((url, body)),
            _ => None,
        })
        .collect()
}

pub fn fetches(events: &Events) -> Vec<String> {
    snapshot(events)
        .into_iter()
        .filter_map(|e| match e {
            Event::Fetch(url) => Some(url),
            _ => None,
        })
        .collect()
}

pub fn appended(events: &Events) -> Vec<(Role, String)> {
    snapshot(events)
        .into_iter()
        .filter_map(|e| match e {
            Event::Append(role, html) => Some((role, html)),
            _ => None,
        })
        .collect()
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_backend(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
