//! HTTP control surface for the booth.
//!
//! Loopback axum server: `/status` for polling UIs, `/perform`, `/stop`, and
//! `/volume` for control. Performances run fire-and-forget; failures land in
//! `last_error` on the status response.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::Booth;
use crate::sequencer::PlaybackState;

#[derive(Clone)]
pub struct BoothApiState {
    pub booth: Arc<Booth>,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct PerformRequest {
    topic: String,
}

#[derive(Deserialize)]
struct VolumeRequest {
    volume: f32,
}

#[derive(Serialize)]
struct StatusResponse {
    state: &'static str,
    current_line: String,
    lyrics: Vec<String>,
    volume: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            volume: None,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            volume: None,
            error: Some(message.into()),
        }
    }
}

fn state_label(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "idle",
        PlaybackState::Generating => "generating",
        PlaybackState::Playing => "playing",
    }
}

/// Build the axum router.
pub fn router(state: BoothApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/perform", post(handle_perform))
        .route("/stop", post(handle_stop))
        .route("/volume", post(handle_volume))
        .with_state(state)
}

/// Serve the control API on the loopback interface until shutdown.
pub async fn serve(state: BoothApiState, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Control API listening on {addr}");
    axum::serve(listener, app).await
}

// --- Handlers ---

async fn handle_status(State(state): State<BoothApiState>) -> Json<StatusResponse> {
    let booth = &state.booth;
    Json(StatusResponse {
        state: state_label(booth.state()),
        current_line: booth.current_line(),
        lyrics: booth.lyrics(),
        volume: booth.volume(),
        last_error: booth.last_error(),
    })
}

async fn handle_perform(
    State(state): State<BoothApiState>,
    Json(req): Json<PerformRequest>,
) -> Json<SimpleResponse> {
    let topic = req.topic.trim().to_string();
    if topic.is_empty() {
        return Json(SimpleResponse::err("empty topic"));
    }
    if state.booth.state() != PlaybackState::Idle {
        return Json(SimpleResponse::err("a performance is already in progress"));
    }

    info!("HTTP /perform: \"{topic}\"");

    // Fire-and-forget: perform() logs and records its own failures.
    let booth = state.booth.clone();
    tokio::spawn(async move {
        let _ = booth.perform(&topic).await;
    });

    Json(SimpleResponse::ok("generating"))
}

async fn handle_stop(State(state): State<BoothApiState>) -> Json<SimpleResponse> {
    state.booth.stop();
    Json(SimpleResponse::ok("stopped"))
}

async fn handle_volume(
    State(state): State<BoothApiState>,
    Json(req): Json<VolumeRequest>,
) -> Json<SimpleResponse> {
    let applied = state.booth.set_volume(req.volume);
    Json(SimpleResponse {
        volume: Some(applied),
        ..SimpleResponse::ok("ok")
    })
}
