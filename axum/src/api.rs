use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use zone_spawn::{SpawnError, SpawnStats, Vec3};

use crate::sim::{SimClient, SimCommand};

#[derive(Clone)]
pub struct AppState {
    pub sim: SimClient,
    pub zone_id: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("simulation thread is not running")]
    SimulationGone,
    #[error("player {0} is not in the zone")]
    PlayerNotFound(u64),
    #[error(transparent)]
    Rejected(#[from] SpawnError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SimulationGone => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::PlayerNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected(_) => StatusCode::CONFLICT,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    zone_id: u32,
    started_at: DateTime<Utc>,
    uptime_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlayerPosition {
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub z: f32,
    /// Containing cell; omitted when outdoors
    #[serde(default)]
    pub parent_id: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/players/{id}", put(upsert_player).delete(remove_player))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        zone_id: state.zone_id,
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<SpawnStats> {
    Json(state.sim.stats())
}

async fn upsert_player(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<PlayerPosition>,
) -> Result<StatusCode, ApiError> {
    let (reply, response) = oneshot::channel();
    let command = SimCommand::UpsertPlayer {
        id,
        position: Vec3::new(body.x, body.y, body.z),
        parent_id: body.parent_id,
        reply,
    };
    if !state.sim.send(command) {
        return Err(ApiError::SimulationGone);
    }
    response.await.map_err(|_| ApiError::SimulationGone)??;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_player(State(state): State<AppState>, Path(id): Path<u64>) -> Result<StatusCode, ApiError> {
    let (reply, response) = oneshot::channel();
    if !state.sim.send(SimCommand::RemovePlayer { id, reply }) {
        return Err(ApiError::SimulationGone);
    }
    match response.await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::PlayerNotFound(id)),
        Err(_) => Err(ApiError::SimulationGone),
    }
}
