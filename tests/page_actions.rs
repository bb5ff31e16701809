mod common;

use axum::extract::{ Multipart, Path, State };
use axum::http::{ HeaderMap, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::post;
use axum::{ Form, Json, Router };
use serde_json::{ json, Value };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use common::spawn_backend;
use widget_client::actions::{
    ActionError,
    ClubAction,
    FestivalDecision,
    PageActionsClient,
    Rating,
    API_TOKEN_KEY,
    PENDING_SESSION_KEY,
};
use widget_client::storage::{ LocalStore, MemoryStore };

type Seen = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Token good-token")
        .unwrap_or(false)
}

async fn club_action(
    State(seen): State<Seen>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Not authenticated" }))).into_response();
    }
    seen.lock().unwrap().push((format!("club:{}", id), form.clone()));
    Json(json!({ "status": form.get("action").cloned().unwrap_or_default() })).into_response()
}

async fn request_action(
    State(seen): State<Seen>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let csrf = headers
        .get("x-csrftoken")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let mut form = form;
    form.insert("csrf".to_string(), csrf);
    seen.lock().unwrap().push((format!("festival:{}", id), form));
    StatusCode::NO_CONTENT.into_response()
}

async fn profile_update(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if form.get("city").map(String::is_empty).unwrap_or(true) {
        return (StatusCode::BAD_REQUEST, "city is required").into_response();
    }
    Json(json!({ "updated": form.keys().collect::<Vec<_>>() })).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["username"] == "ann" && body["password"] == "secret" {
        Json(json!({ "token": "good-token" })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "non_field_errors": ["bad credentials"] }))).into_response()
    }
}

async fn festival_action(
    State(seen): State<Seen>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut form = HashMap::new();
    form.insert("action".to_string(), body["action"].as_str().unwrap_or_default().to_string());
    form.insert("club".to_string(), body["club"].to_string());
    seen.lock().unwrap().push((format!("fest:{}", id), form));
    Json(json!({ "detail": "request sent" })).into_response()
}

async fn searching_allies(State(seen): State<Seen>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    seen.lock().unwrap().push(("allies".to_string(), HashMap::new()));
    StatusCode::OK.into_response()
}

async fn rate(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    let mut form = HashMap::new();
    for key in ["club_id", "rating", "action"] {
        form.insert(key.to_string(), body[key].to_string());
    }
    seen.lock().unwrap().push(("rate".to_string(), form));
    Json(json!({ "success": true }))
}

async fn register(State(seen): State<Seen>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let mut form = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        form.insert(name, field.text().await.unwrap());
    }
    let csrf = headers
        .get("x-csrftoken")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    form.insert("csrf".to_string(), csrf);
    let email = form.get("email").cloned().unwrap_or_default();
    seen.lock().unwrap().push(("register".to_string(), form));
    Json(json!({ "session_id": "reg-1", "email": email })).into_response()
}

async fn verify(Json(body): Json<Value>) -> Response {
    if body["user_session_id"] == "reg-1" && body["email_code"] == "4321" {
        Json(json!({ "token": "good-token" })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "email_code": ["wrong code"] }))).into_response()
    }
}

async fn setup() -> (PageActionsClient, Arc<dyn LocalStore>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/api/v1/clubs/{id}/club_action/", post(club_action))
        .route("/api/v1/festival/join_requests/{id}/request_action/", post(request_action))
        .route("/api/v1/profile/update/", post(profile_update))
        .route("/api/v1/login/", post(login))
        .route("/api/v1/festivals/{id}/festival_action/", post(festival_action))
        .route("/api/v1/profile/to_searching_allies/", post(searching_allies))
        .route("/api/v1/ai/recommendations/rate/", post(rate))
        .route("/api/v1/register/", post(register))
        .route("/api/v1/verify/", post(verify))
        .with_state(Arc::clone(&seen));
    let base = spawn_backend(router).await;
    let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
    let client = PageActionsClient::new(&base, Arc::clone(&store), Duration::from_secs(5))
        .unwrap()
        .with_current_path("/clubs/7/");
    (client, store, seen)
}

#[tokio::test]
async fn unauthenticated_action_points_to_login() {
    let (client, _, seen) = setup().await;
    let err = client.club_action(7, ClubAction::Like).await.unwrap_err();
    match err {
        ActionError::Unauthorized { login_url } => {
            assert_eq!(login_url, "/accounts/login/?next=%2Fclubs%2F7%2F");
        }
        other => panic!("expected Unauthorized, got {:?}", other),
    }
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn login_stores_token_for_later_actions() {
    let (client, store, seen) = setup().await;

    assert!(matches!(client.login("ann", "wrong").await, Err(ActionError::Status { status: 400, .. })));
    assert_eq!(store.get(API_TOKEN_KEY).unwrap(), None);

    assert_eq!(client.login("ann", "secret").await.unwrap(), "good-token");
    assert_eq!(store.get(API_TOKEN_KEY).unwrap().as_deref(), Some("good-token"));

    let body = client.club_action(7, ClubAction::Join).await.unwrap();
    assert_eq!(body, json!({ "status": "join" }));
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].0, "club:7");
    assert_eq!(seen[0].1.get("action").map(String::as_str), Some("join"));
}

#[tokio::test]
async fn festival_decision_sends_csrf_and_accepts_empty_body() {
    let (client, store, seen) = setup().await;
    store.set(API_TOKEN_KEY, "good-token").unwrap();
    let client = client.with_csrf_token("csrf-9");

    let body = client.festival_request_action(42, FestivalDecision::Reject).await.unwrap();
    assert_eq!(body, Value::Null);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].0, "festival:42");
    assert_eq!(seen[0].1.get("action").map(String::as_str), Some("reject"));
    assert_eq!(seen[0].1.get("csrf").map(String::as_str), Some("csrf-9"));
}

#[tokio::test]
async fn profile_update_surfaces_validation_errors() {
    let (client, store, _) = setup().await;
    store.set(API_TOKEN_KEY, "good-token").unwrap();

    let body = client.update_profile(&[("city", "Almaty"), ("bio", "chess")]).await.unwrap();
    let mut updated: Vec<String> = serde_json::from_value(body["updated"].clone()).unwrap();
    updated.sort();
    assert_eq!(updated, vec!["bio", "city"]);

    match client.update_profile(&[("city", "")]).await {
        Err(ActionError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "city is required");
        }
        other => panic!("expected a 400, got {:?}", other),
    }
}

#[tokio::test]
async fn festival_participation_posts_json_with_token() {
    let (client, store, seen) = setup().await;
    assert!(matches!(client.festival_join(5, 9).await, Err(ActionError::Unauthorized { .. })));

    store.set(API_TOKEN_KEY, "good-token").unwrap();
    let body = client.festival_join(5, 9).await.unwrap();
    assert_eq!(body["detail"], "request sent");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].0, "fest:5");
    assert_eq!(seen[0].1.get("action").map(String::as_str), Some("join"));
    assert_eq!(seen[0].1.get("club").map(String::as_str), Some("9"));
}

#[tokio::test]
async fn searching_allies_and_rating() {
    let (client, store, seen) = setup().await;
    store.set(API_TOKEN_KEY, "good-token").unwrap();

    assert_eq!(client.to_searching_allies().await.unwrap(), Value::Null);
    client.rate_recommendation(3, Rating::Dislike).await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0].0, "allies");
    assert_eq!(seen[1].0, "rate");
    assert_eq!(seen[1].1.get("rating").map(String::as_str), Some("1"));
    assert_eq!(seen[1].1.get("action").map(String::as_str), Some("\"dislike\""));
}

#[tokio::test]
async fn registration_then_verification_signs_in() {
    let (client, store, seen) = setup().await;
    let client = client.with_csrf_token("csrf-reg");

    let bad_phone = client.register(&[("email", "ann@example.org"), ("phone", "+15550000000")]).await;
    assert!(matches!(bad_phone, Err(ActionError::Invalid { field: "phone", .. })));
    assert!(seen.lock().unwrap().is_empty());

    let pending = client
        .register(&[("username", "ann"), ("email", "ann@example.org"), ("phone", "+77771234567")]).await
        .unwrap();
    assert_eq!(pending.email, "ann@example.org");
    assert_eq!(store.get(PENDING_SESSION_KEY).unwrap().as_deref(), Some("reg-1"));
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1.get("username").map(String::as_str), Some("ann"));
        assert_eq!(seen[0].1.get("csrf").map(String::as_str), Some("csrf-reg"));
    }

    assert!(matches!(client.verify_email("0000").await, Err(ActionError::Status { status: 400, .. })));
    assert_eq!(client.verify_email("4321").await.unwrap(), "good-token");
    assert_eq!(store.get(API_TOKEN_KEY).unwrap().as_deref(), Some("good-token"));
    assert_eq!(store.get(PENDING_SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn verification_needs_a_pending_registration() {
    let (client, _, _) = setup().await;
    assert!(matches!(
        client.verify_email("4321").await,
        Err(ActionError::Invalid { field: "session_id", .. })
    ));
}
