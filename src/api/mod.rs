// HTTP API routes (registration, match submission, standings, admin edits)

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Submitter;
use crate::config::Config;
use crate::db::Database;
use crate::error::{EngineError, StoreError};
use crate::latest::LatestMatch;
use crate::metrics;
use crate::recorder::{FfaSubmission, MatchRecorder, MatchSubmission};
use crate::replay::HistoryReplayer;
use crate::standings::Leaderboard;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct SubmitMatchRequest {
    pub tournament: Option<String>,
    pub winner: String,
    pub loser: String,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct SubmitFfaRequest {
    pub tournament: String,
    pub ranking: Vec<String>,
    pub draws: Vec<bool>,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct MatchListParams {
    pub tournament: Option<String>,
    pub num: Option<i64>,
    pub player: Option<String>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub recorder: MatchRecorder<Database>,
    pub replayer: HistoryReplayer<Database>,
    pub leaderboard: Leaderboard<Database>,
    pub default_tournament: String,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let latest = LatestMatch::new();
        AppState {
            recorder: MatchRecorder::new(db.clone(), latest.clone())
                .with_retry_attempts(config.tx_retry_attempts),
            replayer: HistoryReplayer::new(db.clone(), latest)
                .with_retry_attempts(config.tx_retry_attempts),
            leaderboard: Leaderboard::new(db),
            default_tournament: config.default_tournament.clone(),
        }
    }
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::Validation(_) | EngineError::SamePlayer | EngineError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::UnknownTournament(_)
        | EngineError::NoSuchPlayer(_)
        | EngineError::UnknownPlayer { .. }
        | EngineError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        EngineError::Store(StoreError::Conflict { .. })
        | EngineError::Store(StoreError::RetryExhausted { .. }) => StatusCode::CONFLICT,
        EngineError::Integrity(_) | EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error(e: EngineError) -> Response {
    let status = status_for(&e);
    match &e {
        // Database details stay in the log
        EngineError::Store(_) if status == StatusCode::INTERNAL_SERVER_ERROR => {
            tracing::error!("Engine error: {e}");
            json_error(status, "Internal server error").into_response()
        }
        EngineError::Integrity(_) => {
            tracing::error!("Engine error: {e}");
            json_error(status, &e.to_string()).into_response()
        }
        _ => json_error(status, &e.to_string()).into_response(),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Players & tournaments
        .route("/api/players", post(register_player))
        .route("/api/tournaments", get(list_tournaments).post(create_tournament))
        .route("/api/tournaments/{name}/players", post(join_tournament))
        .route("/api/tournaments/{name}/standings", get(get_standings))
        .route("/api/tournaments/{name}/head-to-head", get(get_head_to_head))
        // Matches
        .route("/api/matches", get(list_matches).post(submit_match))
        .route("/api/matches/latest", get(latest_match))
        .route("/api/ffa-matches", post(submit_ffa_match))
        // Admin
        .route("/api/admin/matches/{id}", delete(delete_match))
        .route("/api/admin/matches/{id}/swap", post(swap_match))
        .route("/api/admin/tournaments/{name}/rerun", post(rerun_tournament))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let response = next.run(req).await;
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "ladder-backend" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Player & tournament handlers ─────────────────────────────────────

async fn register_player(
    State(state): State<AppState>,
    Json(req): Json<NameRequest>,
) -> impl IntoResponse {
    match state.recorder.register_player(&req.name).await {
        Ok(player) => (StatusCode::CREATED, Json(json!(player))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn list_tournaments(State(state): State<AppState>) -> impl IntoResponse {
    match state.leaderboard.tournaments().await {
        Ok(tournaments) => (StatusCode::OK, Json(json!(tournaments))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn create_tournament(
    State(state): State<AppState>,
    Json(req): Json<NameRequest>,
) -> impl IntoResponse {
    match state.recorder.create_tournament(&req.name).await {
        Ok(t) => (StatusCode::CREATED, Json(json!(t))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn join_tournament(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<NameRequest>,
) -> impl IntoResponse {
    match state.recorder.join_tournament(&name, &req.name).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn get_standings(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.leaderboard.standings(&name).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn get_head_to_head(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.leaderboard.head_to_head(&name).await {
        Ok(table) => (StatusCode::OK, Json(json!(table))).into_response(),
        Err(e) => engine_error(e),
    }
}

// ── Match handlers ───────────────────────────────────────────────────

async fn submit_match(
    State(state): State<AppState>,
    Submitter(submitter): Submitter,
    Json(req): Json<SubmitMatchRequest>,
) -> impl IntoResponse {
    let submission = MatchSubmission {
        tournament: req.tournament.unwrap_or_else(|| state.default_tournament.clone()),
        winner: req.winner,
        loser: req.loser,
        note: req.note.unwrap_or_default(),
        submitter,
        played_at: Utc::now(),
    };
    match state.recorder.record_match(submission).await {
        Ok(outcome) => (StatusCode::CREATED, Json(json!(outcome))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn submit_ffa_match(
    State(state): State<AppState>,
    Submitter(submitter): Submitter,
    Json(req): Json<SubmitFfaRequest>,
) -> impl IntoResponse {
    let submission = FfaSubmission {
        tournament: req.tournament,
        ranking: req.ranking,
        draws: req.draws,
        note: req.note.unwrap_or_default(),
        submitter,
        played_at: Utc::now(),
    };
    match state.recorder.record_ffa(submission).await {
        Ok(outcome) => (StatusCode::CREATED, Json(json!(outcome))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<MatchListParams>,
) -> impl IntoResponse {
    let tournament = params
        .tournament
        .unwrap_or_else(|| state.default_tournament.clone());
    let result = match &params.player {
        Some(player) => {
            state
                .leaderboard
                .player_matches(&tournament, player, params.num)
                .await
        }
        None => state.leaderboard.recent_matches(&tournament, params.num).await,
    };
    match result {
        Ok(matches) => (StatusCode::OK, Json(json!(matches))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn latest_match(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.recorder.latest().get()))
}

// ── Admin handlers ───────────────────────────────────────────────────

async fn delete_match(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.replayer.delete_match(id).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn swap_match(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.replayer.swap_match(id).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn rerun_tournament(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.replayer.replay(&name).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => engine_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&EngineError::SamePlayer), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&EngineError::UnknownTournament("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&EngineError::Store(StoreError::not_found("match", 1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&EngineError::Store(StoreError::RetryExhausted { attempts: 3 })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::Integrity("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    async fn error_body(e: EngineError) -> (StatusCode, serde_json::Value) {
        use http_body_util::BodyExt;

        let response = engine_error(e);
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_integrity_error_keeps_its_message() {
        let (status, body) =
            error_body(EngineError::Integrity("match 7 references unknown player mallory".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("mallory"));

        let (status, body) =
            error_body(EngineError::Store(StoreError::Database(sqlx::Error::PoolClosed))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }
}
