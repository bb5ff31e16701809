use serde::Serialize;
use serde_json::{ Map, Value };

use crate::config::ResponseFields;

/// Substrings of upstream AI-provider errors that get a friendly greeting instead.
pub const PROVIDER_ERROR_MARKERS: &[&str] = &["empty", "must contain either"];

/// A successful server reply, normalised across backend field names.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub session_id: Option<String>,
    pub quick_replies: Vec<String>,
    pub recommendations: Vec<Value>,
    pub action: Option<Value>,
    pub state: Option<Value>,
    pub progress: Option<u8>,
    pub next_steps: Vec<String>,
    pub club_data: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReplyOutcome {
    Reply(ChatReply),
    /// The server answered but flagged failure. `detail` is whatever text it sent along.
    Failure {
        detail: Option<String>,
    },
    /// No configured text field holds a string.
    Unrecognized,
}

/// Interprets a decoded JSON payload. `provider_fallback` is the greeting to substitute
/// when the server relays a known provider error, `None` disables the substitution.
pub fn interpret(payload: &Value, fields: &ResponseFields, provider_fallback: Option<&str>) -> ReplyOutcome {
    let error_flag = payload.get(&fields.error).filter(|v| is_truthy(v));
    let details = str_field(payload, &fields.details);

    if let (Some(greeting), Some(_), Some(details)) = (provider_fallback, error_flag, details) {
        let lowered = details.to_lowercase();
        if PROVIDER_ERROR_MARKERS.iter().any(|m| lowered.contains(m)) {
            return ReplyOutcome::Reply(ChatReply {
                text: greeting.to_string(),
                session_id: session_of(payload, fields),
                ..ChatReply::default()
            });
        }
    }

    let text = fields.text
        .iter()
        .find_map(|name| str_field(payload, name))
        .map(str::to_string);

    if let Some(flag) = &fields.success {
        if payload.get(flag).and_then(Value::as_bool) != Some(true) {
            let detail = text.or_else(|| details.map(str::to_string)).or_else(|| error_text(error_flag));
            return ReplyOutcome::Failure { detail };
        }
    } else if error_flag.is_some() {
        let detail = details.map(str::to_string).or_else(|| error_text(error_flag));
        return ReplyOutcome::Failure { detail };
    }

    let Some(text) = text else {
        return ReplyOutcome::Unrecognized;
    };

    ReplyOutcome::Reply(ChatReply {
        text,
        session_id: session_of(payload, fields),
        quick_replies: fields.quick_replies
            .as_deref()
            .map(|name| string_items(payload.get(name)))
            .unwrap_or_default(),
        recommendations: fields.recommendations
            .as_deref()
            .and_then(|name| payload.get(name))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        action: optional_value(payload, fields.action.as_deref()),
        state: optional_value(payload, fields.state.as_deref()),
        progress: fields.progress
            .as_deref()
            .and_then(|name| payload.get(name))
            .and_then(progress_percent),
        next_steps: fields.next_steps
            .as_deref()
            .map(|name| string_items(payload.get(name)))
            .unwrap_or_default(),
        club_data: fields.club_data
            .as_deref()
            .and_then(|name| payload.get(name))
            .and_then(Value::as_object)
            .filter(|data| !data.is_empty())
            .cloned(),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn str_field<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}

fn error_text(error: Option<&Value>) -> Option<String> {
    error.and_then(Value::as_str).map(str::to_string)
}

fn session_of(payload: &Value, fields: &ResponseFields) -> Option<String> {
    let name = fields.session_id.as_deref()?;
    match payload.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_value(payload: &Value, name: Option<&str>) -> Option<Value> {
    payload.get(name?).filter(|v| !v.is_null()).cloned()
}

/// Accepts `["a", "b"]` or `[{"text": "a"}, {"title": "b"}]`.
fn string_items(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) =>
                ["text", "title", "label"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Accepts `42` or `{"percent": 42}`, clamped to 0..=100.
fn progress_percent(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Object(obj) => obj.get("percent")?.as_f64()?,
        other => other.as_f64()?,
    };
    Some(raw.clamp(0.0, 100.0).round() as u8)
}
