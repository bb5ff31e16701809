use serde_json::Value;
use std::io::{ self, Write };

use crate::models::chat::{ Message, Role, Theme };

/// The surface a widget draws on. Bound once when the widget is built.
///
/// Calls arrive while the widget holds its state lock, so implementations must not
/// call back into the widget.
pub trait WidgetView: Send + Sync {
    fn set_panel_visible(&self, visible: bool);
    fn focus_input(&self);
    fn set_typing_indicator(&self, visible: bool);
    fn append_message(&self, message: &Message, html: &str);
    fn remove_message(&self, message_id: &str);
    fn clear_messages(&self);
    fn show_quick_replies(&self, replies: &[String]);
    fn apply_theme(&self, theme: Theme);
    fn show_recommendations(&self, items: &[Value]);
    /// Draws attention to the launcher the first time this store sees a widget.
    fn greet_first_visit(&self);
}

/// Line-oriented rendering on stdout for the terminal client.
#[derive(Debug, Default)]
pub struct TerminalView {
    pub title: String,
}

impl TerminalView {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    fn print(&self, line: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

impl WidgetView for TerminalView {
    fn set_panel_visible(&self, visible: bool) {
        if visible {
            self.print(&format!("── {} ──", self.title));
        } else {
            self.print("── chat closed ──");
        }
    }

    fn focus_input(&self) {}

    fn set_typing_indicator(&self, visible: bool) {
        if visible {
            self.print("…");
        }
    }

    fn append_message(&self, message: &Message, _html: &str) {
        let label = match message.role {
            Role::User => "you",
            Role::Assistant => "bot",
            Role::System => "!",
        };
        let time = message.timestamp.with_timezone(&chrono::Local).format("%H:%M");
        self.print(&format!("[{}] {}: {}", time, label, message.text));
    }

    fn remove_message(&self, _message_id: &str) {}

    fn clear_messages(&self) {
        self.print("── conversation cleared ──");
    }

    fn show_quick_replies(&self, replies: &[String]) {
        if replies.is_empty() {
            return;
        }
        let chips = replies
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}", i + 1, r))
            .collect::<Vec<_>>()
            .join("  ");
        self.print(&format!("quick replies: {}", chips));
    }

    fn apply_theme(&self, theme: Theme) {
        self.print(&format!("theme: {}", theme.as_str()));
    }

    fn show_recommendations(&self, items: &[Value]) {
        for item in items {
            let reason = item
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("Recommended for you");
            let club = item.get("club_id").map(Value::to_string).unwrap_or_else(|| "?".to_string());
            match item.get("score").and_then(Value::as_f64) {
                Some(score) => self.print(&format!("🎯 club {}: {} ({:.0}%)", club, reason, score * 100.0)),
                None => self.print(&format!("🎯 club {}: {}", club, reason)),
            }
        }
    }

    fn greet_first_visit(&self) {
        self.print(&format!("👋 Welcome! {} is here whenever you need it.", self.title));
    }
}
