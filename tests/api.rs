// Router-level tests: JSON in/out, status codes and the submitter header.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use ladder_backend::api::{self, AppState};
use ladder_backend::config::Config;
use ladder_backend::db::Database;

async fn app() -> Router {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let state = AppState::new(db, &Config::default());
    state.recorder.ensure_tournament("Default").await.unwrap();
    api::router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Submitter", "referee");
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, names: &[&str]) {
    for name in names {
        let (status, _) = send(app, "POST", "/api/players", Some(json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(
            app,
            "POST",
            "/api/tournaments/Default/players",
            Some(json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_submit_match_and_read_back() {
    let app = app().await;
    register(&app, &["alice", "bob"]).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/matches",
        Some(json!({ "winner": "alice", "loser": "bob", "note": "close game" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["record"]["submitter"], "referee");
    assert_eq!(body["winner"]["rating"], 1216.0);
    assert_eq!(body["loser"]["rating"], 1184.0);
    let id = body["record"]["id"].as_i64().unwrap();

    let (_, latest) = send(&app, "GET", "/api/matches/latest", None).await;
    assert_eq!(latest["id"].as_i64(), Some(id));

    let (_, recent) = send(&app, "GET", "/api/matches?tournament=Default&num=5", None).await;
    assert_eq!(recent.as_array().unwrap().len(), 1);
    let (_, none) = send(&app, "GET", "/api/matches", None).await;
    assert!(none.as_array().unwrap().is_empty());

    let (_, standings) = send(&app, "GET", "/api/tournaments/Default/standings", None).await;
    assert_eq!(standings[0]["player_name"], "alice");

    let (_, table) = send(&app, "GET", "/api/tournaments/Default/head-to-head", None).await;
    assert_eq!(table["cells"][0][1]["wins"], 1);
}

#[tokio::test]
async fn test_rejections() {
    let app = app().await;
    register(&app, &["alice"]).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/matches",
        Some(json!({ "winner": "alice", "loser": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("same"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/matches",
        Some(json!({ "winner": "alice", "loser": "nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/api/players", Some(json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", "/api/admin/matches/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ffa_and_admin_rerun() {
    let app = app().await;
    register(&app, &["alice", "bob", "carol", "dave"]).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/ffa-matches",
        Some(json!({ "tournament": "Default", "ranking": ["alice", "bob", "carol"], "draws": [false] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/ffa-matches",
        Some(json!({
            "tournament": "Default",
            "ranking": ["alice", "bob", "carol", "dave"],
            "draws": [true, false, false]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["record"]["summary"], "alice = bob > carol > dave");
    assert_eq!(body["emulated"].as_array().unwrap().len(), 5);

    let (_, before) = send(&app, "GET", "/api/tournaments/Default/standings", None).await;
    let (status, after) = send(&app, "POST", "/api/admin/tournaments/Default/rerun", None).await;
    assert_eq!(status, StatusCode::OK);
    for (b, a) in before.as_array().unwrap().iter().zip(after.as_array().unwrap()) {
        assert_eq!(b["player_name"], a["player_name"]);
        assert_eq!(b["rating"], a["rating"]);
        assert_eq!(b["ffa_wins"], a["ffa_wins"]);
        assert_eq!(b["mu"], a["mu"]);
    }

    let swap_id = body["emulated"][0]["id"].as_i64().unwrap();
    let (status, _) = send(&app, "POST", &format!("/api/admin/matches/{swap_id}/swap"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    ladder_backend::metrics::register_metrics();
    let app = app().await;
    send(&app, "GET", "/health", None).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ladder_api_requests_total"));
}
