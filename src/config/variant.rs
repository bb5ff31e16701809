use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::fmt;
use std::str::FromStr;

use super::widget::{
    CannedRule,
    CompletionRule,
    ExtraEndpoints,
    RequestFields,
    ResponseFields,
    SessionMode,
    WidgetConfig,
};
use super::{ join_url, ConfigError };

/// The backend flavours the chat client knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Actionable,
    Https,
    Standalone,
    V1,
    V2,
    ClubCreation,
    Enhanced,
    Professional,
    Ultimate,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseVariantError {
    message: String,
}

impl fmt::Display for ParseVariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseVariantError {}

impl FromStr for Variant {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "actionable" => Ok(Variant::Actionable),
            "https" => Ok(Variant::Https),
            "standalone" => Ok(Variant::Standalone),
            "v1" => Ok(Variant::V1),
            "v2" => Ok(Variant::V2),
            "club_creation" => Ok(Variant::ClubCreation),
            "enhanced" => Ok(Variant::Enhanced),
            "professional" => Ok(Variant::Professional),
            "ultimate" => Ok(Variant::Ultimate),
            _ =>
                Err(ParseVariantError {
                    message: format!("Invalid widget variant: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::Actionable => "actionable",
            Variant::Https => "https",
            Variant::Standalone => "standalone",
            Variant::V1 => "v1",
            Variant::V2 => "v2",
            Variant::ClubCreation => "club-creation",
            Variant::Enhanced => "enhanced",
            Variant::Professional => "professional",
            Variant::Ultimate => "ultimate",
        };
        write!(f, "{}", name)
    }
}

impl Variant {
    pub fn chat_path(&self) -> &'static str {
        match self {
            Variant::Actionable => "/api/v1/ai/enhanced/chat/",
            Variant::Https => "/api/v1/ai/production/agent/",
            Variant::Standalone => "/api/v1/ai/simplified/interactive/chat/",
            Variant::V1 => "/api/v1/ai/chat/",
            Variant::V2 => "/api/ai/chat/",
            Variant::ClubCreation => "/api/v1/ai/club-creation/agent/",
            Variant::Enhanced => "/api/v1/ai/enhanced-chat/",
            Variant::Professional | Variant::Ultimate => "/api/v1/ai/conversational/agent/",
        }
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn some(name: &str) -> Option<String> {
    Some(name.to_string())
}

fn club_created(message: &str, close_panel: bool) -> CompletionRule {
    CompletionRule {
        states: fields(&["completed"]),
        actions: if close_panel { fields(&["close_chat"]) } else { Vec::new() },
        message: message.to_string(),
        close_panel,
    }
}

fn club_guidance_rules() -> Vec<CannedRule> {
    vec![
        CannedRule {
            keywords: fields(
                &["create a club", "start a club", "new club", "создать клуб", "создай клуб", "хочу создать", "создание клуба"]
            ),
            reply: "🎉 Great, let's create a new club!\n\n• Open the \"Create a community\" section\n• Fill in the club form\n• Add a description, photos and contacts\n\n🔗 Create it here: {origin}/clubs/create/\n\n💡 Want help with a name or description?".to_string(),
        },
        CannedRule {
            keywords: fields(
                &["find a club", "search clubs", "communities", "найти клуб", "поиск клуб", "поищ", "клубы", "сообщества"]
            ),
            reply: "🔍 Let's find a club that suits you!\n\n• Open the \"Join a community\" section\n• Filter by interests and city\n• Check the top clubs on the home page\n\n🔗 Browse here: {origin}/clubs/\n\n💡 Tell me what you're into and I'll suggest some clubs!".to_string(),
        }
    ]
}

impl WidgetConfig {
    /// Configuration for a known backend flavour rooted at `base_url`.
    pub fn preset(variant: Variant, base_url: &str) -> Result<WidgetConfig, ConfigError> {
        let mut config = WidgetConfig {
            name: variant.to_string(),
            endpoint: join_url(base_url, variant.chat_path())?,
            ..WidgetConfig::default()
        };

        match variant {
            Variant::Actionable => {
                config.session = SessionMode::ServerAssigned;
                config.request = RequestFields {
                    session_id: None,
                    user_email: some("user_email"),
                    ..RequestFields::default()
                };
                config.response = ResponseFields {
                    text: fields(&["message"]),
                    session_id: None,
                    action: some("action_performed"),
                    ..ResponseFields::default()
                };
            }
            Variant::Https => {
                config.response = ResponseFields {
                    text: fields(&["response"]),
                    success: some("success"),
                    quick_replies: some("quick_replies"),
                    ..ResponseFields::default()
                };
                config.features.auto_open_on_reply = true;
            }
            Variant::Standalone => {
                config.session = SessionMode::ServerAssigned;
                config.request = RequestFields {
                    session_id: some("state_id"),
                    user_email: some("user_email"),
                    ..RequestFields::default()
                };
                config.response = ResponseFields {
                    text: fields(&["message", "response"]),
                    session_id: some("state_id"),
                    ..ResponseFields::default()
                };
                config.features.linkify = true;
                config.features.show_server_errors = true;
                config.features.provider_fallback = true;
                config.storage_keys.theme = "ai_theme_standalone".to_string();
            }
            Variant::V1 => {
                config.session = SessionMode::Negotiated {
                    endpoint: join_url(base_url, "/api/v1/ai/sessions/create/")?,
                    list_endpoint: Some(join_url(base_url, "/api/v1/ai/sessions/")?),
                };
                config.response = ResponseFields {
                    text: fields(&["message"]),
                    success: some("success"),
                    ..ResponseFields::default()
                };
            }
            Variant::V2 => {
                config.response = ResponseFields {
                    text: fields(&["response"]),
                    ..ResponseFields::default()
                };
                config.features.show_server_errors = true;
                config.features.provider_fallback = true;
                config.canned_responses = club_guidance_rules();
                config.storage_keys.theme = "ai_theme".to_string();
            }
            Variant::ClubCreation => {
                let mut extra = Map::new();
                extra.insert("action".to_string(), Value::String("message".to_string()));
                config.title = "Club Creation Assistant".to_string();
                config.session = SessionMode::ServerAssigned;
                config.context = Some(Value::Object(Map::new()));
                config.request = RequestFields {
                    session_id: None,
                    context: some("context"),
                    extra,
                    ..RequestFields::default()
                };
                config.response = ResponseFields {
                    text: fields(&["response"]),
                    session_id: None,
                    success: some("success"),
                    state: some("session_state"),
                    progress: some("progress"),
                    next_steps: some("next_steps"),
                    club_data: some("club_data"),
                    ..ResponseFields::default()
                };
                let mut restart = Map::new();
                restart.insert("action".to_string(), Value::String("restart".to_string()));
                config.restart_payload = Some(restart);
                config.extra_endpoints = ExtraEndpoints {
                    guide: Some(join_url(base_url, "/api/v1/ai/club-creation/guide/")?),
                    validate: Some(join_url(base_url, "/api/v1/ai/club-creation/validate/")?),
                    recommendations: None,
                };
                config.completion = Some(
                    club_created(
                        "🎉 Congratulations! Your club has been created and sent for moderation. You'll be notified once it's published.",
                        false
                    )
                );
                config.features.persist_history = true;
                config.storage_keys.history_prefix = "club_creation_session:".to_string();
            }
            Variant::Enhanced => {
                config.context = Some(Value::Object(Map::new()));
                config.request = RequestFields {
                    context: some("context"),
                    ..RequestFields::default()
                };
                config.response = ResponseFields {
                    text: fields(&["message"]),
                    success: some("success"),
                    recommendations: some("recommendations"),
                    ..ResponseFields::default()
                };
                config.extra_endpoints.recommendations = Some(join_url(base_url, "/api/v1/ai/recommendations/")?);
                config.initial_recommendations = 5;
                config.max_messages = 50;
            }
            Variant::Professional | Variant::Ultimate => {
                config.response = ResponseFields {
                    text: fields(&["response"]),
                    success: some("success"),
                    quick_replies: some("quick_replies"),
                    state: some("state"),
                    action: some("action"),
                    ..ResponseFields::default()
                };
                config.features.distinguish_failures = true;
                config.completion = Some(
                    club_created("🎉 Great! Your club has been created! Thanks for using the AI consultant! 🎊", true)
                );
                config.storage_keys.history_prefix = "widget-session-data:".to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("V2".parse::<Variant>(), Ok(Variant::V2));
        assert_eq!("club-creation".parse::<Variant>(), Ok(Variant::ClubCreation));
        assert_eq!("Club_Creation".parse::<Variant>(), Ok(Variant::ClubCreation));
        assert!("v3".parse::<Variant>().unwrap_err().to_string().contains("'v3'"));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for variant in [
            Variant::Actionable,
            Variant::Https,
            Variant::Standalone,
            Variant::V1,
            Variant::V2,
            Variant::ClubCreation,
            Variant::Enhanced,
            Variant::Professional,
            Variant::Ultimate,
        ] {
            assert_eq!(variant.to_string().parse::<Variant>(), Ok(variant));
        }
    }

    #[test]
    fn standalone_uses_state_id() {
        let config = WidgetConfig::preset(Variant::Standalone, "http://localhost:8000").unwrap();
        assert_eq!(config.endpoint, "http://localhost:8000/api/v1/ai/simplified/interactive/chat/");
        assert_eq!(config.request.session_id.as_deref(), Some("state_id"));
        assert_eq!(config.response.session_id.as_deref(), Some("state_id"));
        assert_eq!(config.session, SessionMode::ServerAssigned);
    }

    #[test]
    fn v1_negotiates_sessions() {
        let config = WidgetConfig::preset(Variant::V1, "https://example.org/").unwrap();
        assert_eq!(
            config.session,
            SessionMode::Negotiated {
                endpoint: "https://example.org/api/v1/ai/sessions/create/".to_string(),
                list_endpoint: Some("https://example.org/api/v1/ai/sessions/".to_string()),
            }
        );
    }

    #[test]
    fn club_creation_sends_action_and_context() {
        let config = WidgetConfig::preset(Variant::ClubCreation, "http://localhost").unwrap();
        assert_eq!(config.request.extra.get("action"), Some(&Value::String("message".into())));
        assert_eq!(config.request.context.as_deref(), Some("context"));
        assert!(config.request.session_id.is_none());
        assert_eq!(config.response.club_data.as_deref(), Some("club_data"));
        assert_eq!(
            config.extra_endpoints.validate.as_deref(),
            Some("http://localhost/api/v1/ai/club-creation/validate/")
        );
        assert!(config.restart_payload.is_some());
    }

    #[test]
    fn professional_closes_on_completion() {
        let rule = WidgetConfig::preset(Variant::Ultimate, "http://localhost").unwrap().completion.unwrap();
        assert_eq!(rule.states, vec!["completed"]);
        assert_eq!(rule.actions, vec!["close_chat"]);
        assert!(rule.close_panel);
    }

    #[test]
    fn enhanced_loads_recommendations() {
        let config = WidgetConfig::preset(Variant::Enhanced, "http://localhost:8000").unwrap();
        assert_eq!(
            config.extra_endpoints.recommendations.as_deref(),
            Some("http://localhost:8000/api/v1/ai/recommendations/")
        );
        assert_eq!(config.initial_recommendations, 5);
    }

    #[test]
    fn preset_rejects_bad_base_url() {
        assert!(WidgetConfig::preset(Variant::V2, "not a url").is_err());
    }
}
