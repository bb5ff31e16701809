//! Typed calls for the site's one-shot page actions: club buttons, festival
//! participation, profile edits, recommendation ratings and the sign-up/sign-in flow.

use log::{ info, warn };
use reqwest::multipart::Form as MultipartForm;
use reqwest::{ Client as HttpClient, RequestBuilder, StatusCode };
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ join_url, ConfigError };
use crate::storage::{ LocalStore, StorageError };
use crate::transport::http::CSRF_HEADER;

pub const API_TOKEN_KEY: &str = "apiToken";
pub const LOGIN_PATH: &str = "/accounts/login/";
/// Keys holding a registration that still waits for its e-mail code.
pub const PENDING_SESSION_KEY: &str = "session_id";
pub const PENDING_EMAIL_KEY: &str = "email";
/// Phone numbers accepted at sign-up must start with one of these.
pub const PHONE_PREFIXES: &[&str] = &["+770", "+7747", "+7771", "+7775", "+7776", "+7777", "+7778"];

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("not signed in, continue at {login_url}")]
    Unauthorized {
        login_url: String,
    },
    #[error("server responded with HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClubAction {
    Like,
    Unlike,
    Join,
    Leave,
}

impl ClubAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClubAction::Like => "like",
            ClubAction::Unlike => "unlike",
            ClubAction::Join => "join",
            ClubAction::Leave => "leave",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FestivalDecision {
    Approve,
    Reject,
}

impl FestivalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FestivalDecision::Approve => "approve",
            FestivalDecision::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Like,
    Dislike,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Like => "like",
            Rating::Dislike => "dislike",
        }
    }

    /// Star score sent along with the rating.
    pub fn score(&self) -> u8 {
        match self {
            Rating::Like => 5,
            Rating::Dislike => 1,
        }
    }
}

/// A sign-up waiting for the code mailed to `email`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PendingRegistration {
    pub session_id: String,
    pub email: String,
}

/// Where to send someone who is not signed in, coming back to `current_path` afterwards.
pub fn login_redirect(current_path: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new()).append_pair("next", current_path).finish();
    format!("{}?{}", LOGIN_PATH, query)
}

/// Checks a sign-up phone number against the accepted prefixes.
pub fn check_phone(phone: &str) -> Result<(), ActionError> {
    if PHONE_PREFIXES.iter().any(|prefix| phone.starts_with(prefix)) {
        return Ok(());
    }
    Err(ActionError::Invalid {
        field: "phone",
        message: format!("must start with one of: {}", PHONE_PREFIXES.join(", ")),
    })
}

pub struct PageActionsClient {
    http: HttpClient,
    base_url: String,
    store: Arc<dyn LocalStore>,
    csrf_token: Option<String>,
    current_path: String,
}

impl PageActionsClient {
    pub fn new(base_url: &str, store: Arc<dyn LocalStore>, timeout: Duration) -> Result<Self, ActionError> {
        join_url(base_url, "/")?;
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            store,
            csrf_token: None,
            current_path: "/".to_string(),
        })
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// The page path used as the return target when a login redirect is needed.
    pub fn with_current_path(mut self, path: impl Into<String>) -> Self {
        self.current_path = path.into();
        self
    }

    pub async fn club_action(&self, club_id: u64, action: ClubAction) -> Result<Value, ActionError> {
        let path = format!("/api/v1/clubs/{}/club_action/", club_id);
        info!("Club {}: {}", club_id, action.as_str());
        self.post_form(&path, &[("action", action.as_str())]).await
    }

    pub async fn festival_request_action(
        &self,
        request_id: u64,
        decision: FestivalDecision
    ) -> Result<Value, ActionError> {
        let path = format!("/api/v1/festival/join_requests/{}/request_action/", request_id);
        info!("Festival join request {}: {}", request_id, decision.as_str());
        self.post_form(&path, &[("action", decision.as_str())]).await
    }

    /// Asks for `club_id` to take part in a festival.
    pub async fn festival_join(&self, festival_id: u64, club_id: u64) -> Result<Value, ActionError> {
        let url = join_url(&self.base_url, &format!("/api/v1/festivals/{}/festival_action/", festival_id))?;
        info!("Festival {}: join request for club {}", festival_id, club_id);
        let req = self.with_token(self.http.post(&url))?.json(&json!({ "action": "join", "club": club_id }));
        self.send(req).await
    }

    pub async fn update_profile(&self, fields: &[(&str, &str)]) -> Result<Value, ActionError> {
        self.post_form("/api/v1/profile/update/", fields).await
    }

    /// Lists the signed-in user as looking for allies.
    pub async fn to_searching_allies(&self) -> Result<Value, ActionError> {
        self.post_form("/api/v1/profile/to_searching_allies/", &[]).await
    }

    pub async fn rate_recommendation(&self, club_id: u64, rating: Rating) -> Result<Value, ActionError> {
        let url = join_url(&self.base_url, "/api/v1/ai/recommendations/rate/")?;
        let body = json!({ "club_id": club_id, "rating": rating.score(), "action": rating.as_str() });
        self.send(self.http.post(&url).json(&body)).await
    }

    /// Submits the sign-up form. The server mails a code that `verify_email` exchanges for a token.
    pub async fn register(&self, fields: &[(&str, &str)]) -> Result<PendingRegistration, ActionError> {
        let phone = fields
            .iter()
            .find(|(name, _)| *name == "phone")
            .map(|(_, value)| *value)
            .unwrap_or_default();
        check_phone(phone)?;

        let url = join_url(&self.base_url, "/api/v1/register/")?;
        let form = fields
            .iter()
            .fold(MultipartForm::new(), |form, (name, value)| form.text(name.to_string(), value.to_string()));
        let body = self.send(self.http.post(&url).multipart(form)).await?;
        let pending: PendingRegistration = serde_json
            ::from_value(body)
            .map_err(|e| ActionError::Decode(e.to_string()))?;

        self.store.set(PENDING_SESSION_KEY, &pending.session_id)?;
        self.store.set(PENDING_EMAIL_KEY, &pending.email)?;
        info!("Registration pending, code sent to {}", pending.email);
        Ok(pending)
    }

    /// Finishes a pending sign-up and stores the API token it yields.
    pub async fn verify_email(&self, code: &str) -> Result<String, ActionError> {
        let session_id = self.store.get(PENDING_SESSION_KEY)?.ok_or_else(|| ActionError::Invalid {
            field: "session_id",
            message: "no registration is waiting for a code".to_string(),
        })?;

        let url = join_url(&self.base_url, "/api/v1/verify/")?;
        let req = self.http.post(&url).json(&json!({ "user_session_id": session_id, "email_code": code }));
        let token = token_of(self.send(req).await?)?;
        self.store.set(API_TOKEN_KEY, &token)?;
        self.store.remove(PENDING_SESSION_KEY)?;
        self.store.remove(PENDING_EMAIL_KEY)?;
        info!("E-mail verified, signed in");
        Ok(token)
    }

    /// Exchanges credentials for an API token and stores it for later actions.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ActionError> {
        #[derive(Serialize)]
        struct Credentials<'a> {
            username: &'a str,
            password: &'a str,
        }

        let url = join_url(&self.base_url, "/api/v1/login/")?;
        let req = self.http.post(&url).json(&Credentials { username, password });
        let token = token_of(self.send(req).await?)?;
        self.store.set(API_TOKEN_KEY, &token)?;
        info!("Signed in as {}", username);
        Ok(token)
    }

    async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> Result<Value, ActionError> {
        let url = join_url(&self.base_url, path)?;
        let req = self.with_token(self.http.post(&url))?.form(fields);
        self.send(req).await
    }

    fn with_token(&self, req: RequestBuilder) -> Result<RequestBuilder, ActionError> {
        Ok(match self.store.get(API_TOKEN_KEY)? {
            Some(token) => req.header(reqwest::header::AUTHORIZATION, format!("Token {}", token)),
            None => req,
        })
    }

    async fn send(&self, mut req: RequestBuilder) -> Result<Value, ActionError> {
        if let Some(csrf) = &self.csrf_token {
            req = req.header(CSRF_HEADER, csrf.as_str());
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            let login_url = login_redirect(&self.current_path);
            warn!("Action rejected as unauthenticated, login at {}", login_url);
            return Err(ActionError::Unauthorized { login_url });
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ActionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ActionError::Decode(e.to_string()))
    }
}

fn token_of(body: Value) -> Result<String, ActionError> {
    body.get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ActionError::Decode("response has no token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_encodes_return_path() {
        assert_eq!(login_redirect("/clubs/12/"), "/accounts/login/?next=%2Fclubs%2F12%2F");
        assert_eq!(
            login_redirect("/search/?q=chess&city=Almaty"),
            "/accounts/login/?next=%2Fsearch%2F%3Fq%3Dchess%26city%3DAlmaty"
        );
    }

    #[test]
    fn phone_prefixes_are_enforced() {
        assert!(check_phone("+77771234567").is_ok());
        assert!(matches!(check_phone("+15551234567"), Err(ActionError::Invalid { field: "phone", .. })));
        assert!(check_phone("").is_err());
    }

    #[test]
    fn ratings_carry_scores() {
        assert_eq!(Rating::Like.score(), 5);
        assert_eq!(Rating::Dislike.as_str(), "dislike");
    }

    #[test]
    fn action_names_match_form_values() {
        assert_eq!(ClubAction::Unlike.as_str(), "unlike");
        assert_eq!(FestivalDecision::Approve.as_str(), "approve");
        assert_eq!(serde_json::to_string(&ClubAction::Leave).unwrap(), "\"leave\"");
    }
}
