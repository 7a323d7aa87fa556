use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::startup::StartupController;
use crate::supervisor::{CommandSupervisor, SupervisorError};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: CommandSupervisor,
    pub startup: Arc<StartupController>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/commands", post(submit_command))
        .route("/api/commands/:pid/output", get(command_output))
        .route("/api/commands/:pid/stop", post(stop_command))
        .route("/api/startup/reload", post(startup_reload))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

fn supervisor_error(err: SupervisorError) -> Response {
    let code = match &err {
        SupervisorError::EmptyCommand | SupervisorError::CommandTooLong(_) => {
            StatusCode::BAD_REQUEST
        }
        SupervisorError::ConcurrencyLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        SupervisorError::HandleNotFound(_) => StatusCode::NOT_FOUND,
        SupervisorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(code, err.to_string())
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    command: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    pid: u32,
    message: &'static str,
}

async fn submit_command(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    match state.supervisor.spawn(&req.command).await {
        Ok(pid) => Json(SubmitResponse {
            pid,
            message: "command started",
        })
        .into_response(),
        Err(err) => supervisor_error(err),
    }
}

#[derive(Debug, Serialize)]
struct OutputResponse {
    output: String,
    running: bool,
    exit_code: Option<i32>,
}

async fn command_output(State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    match state.supervisor.poll(pid).await {
        Ok(report) => Json(OutputResponse {
            output: report.output,
            running: report.running,
            exit_code: report.exit_code,
        })
        .into_response(),
        Err(err) => supervisor_error(err),
    }
}

#[derive(Debug, Serialize)]
struct StopResponse {
    success: bool,
}

async fn stop_command(State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    match state.supervisor.terminate(pid).await {
        Ok(()) => Json(StopResponse { success: true }).into_response(),
        Err(err) => supervisor_error(err),
    }
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
    reload_sent: bool,
    service_active: bool,
}

async fn startup_reload(State(state): State<AppState>) -> Json<ReloadResponse> {
    let report = state.startup.reload().await;
    Json(ReloadResponse {
        reload_sent: report.reload_sent,
        service_active: report.service_active,
    })
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    version: &'static str,
    running: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running: state.supervisor.running().await,
    })
}
