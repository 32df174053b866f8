//! Administrative HTTP interface
//!
//! Lets a maintenance workflow mark ports as treated and exposes the
//! controller's view of tracked ports. The control loop stays the only
//! writer of port state: requests are forwarded to it over a channel and
//! reads come from the snapshot it publishes after every cycle.
//!
//! Endpoints:
//! - `POST /ports/treated` `{"ports": {"<port>": "treated"}}`
//! - `GET /ports`
//! - `GET /stats`
//! - `GET /health`

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::controller::{AdminCommand, ControllerSnapshot, IsolationStats};
use crate::error::{IsolationError, Result};
use crate::types::{PortState, PortStateKind};

/// JSON response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiErrorResponse>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ApiErrorResponse) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of `POST /ports/treated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatedRequest {
    pub ports: HashMap<String, PortStateKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatedResponse {
    /// Tracked ports that are now treated
    pub marked: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsInfo {
    pub stats: IsolationStats,
    pub tracked_ports: usize,
    pub last_cycle: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub last_cycle: Option<DateTime<Utc>>,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// Shared handler state
#[derive(Clone)]
pub struct AdminState {
    commands: mpsc::Sender<AdminCommand>,
    snapshot: watch::Receiver<ControllerSnapshot>,
}

impl AdminState {
    pub fn new(
        commands: mpsc::Sender<AdminCommand>,
        snapshot: watch::Receiver<ControllerSnapshot>,
    ) -> Self {
        Self { commands, snapshot }
    }
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/ports", get(list_ports))
        .route("/ports/treated", post(mark_treated))
        .route("/stats", get(get_stats))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the admin API on `addr` until `cancel` fires
pub async fn serve(addr: SocketAddr, state: AdminState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Admin API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Admin API stopped");
    Ok(())
}

fn unavailable<T: Serialize>(err: IsolationError) -> ApiResult<T> {
    error!(error = %err, "Admin request could not reach the control loop");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::error(ApiErrorResponse {
            code: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            message: "Control loop unavailable".to_string(),
            details: Some(err.to_string()),
        })),
    )
}

/// Handle `POST /ports/treated`
pub async fn mark_treated(
    State(state): State<AdminState>,
    Json(request): Json<TreatedRequest>,
) -> ApiResult<TreatedResponse> {
    let (reply, response) = oneshot::channel();
    let command = AdminCommand::MarkTreated {
        ports: request.ports,
        reply,
    };

    if state.commands.send(command).await.is_err() {
        return unavailable(IsolationError::AdminChannelClosed);
    }

    match response.await {
        Ok(marked) => {
            info!(ports = ?marked, "Treated request applied");
            (
                StatusCode::OK,
                Json(ApiResponse::success(TreatedResponse { marked })),
            )
        }
        Err(_) => unavailable(IsolationError::AdminChannelClosed),
    }
}

/// Handle `GET /ports`
pub async fn list_ports(State(state): State<AdminState>) -> ApiResult<Vec<PortState>> {
    let ports = state.snapshot.borrow().ports.values().cloned().collect();
    (StatusCode::OK, Json(ApiResponse::success(ports)))
}

/// Handle `GET /stats`
pub async fn get_stats(State(state): State<AdminState>) -> ApiResult<StatsInfo> {
    let info = {
        let snapshot = state.snapshot.borrow();
        StatsInfo {
            stats: snapshot.stats.clone(),
            tracked_ports: snapshot.ports.len(),
            last_cycle: snapshot.last_cycle,
        }
    };
    (StatusCode::OK, Json(ApiResponse::success(info)))
}

/// Handle `GET /health`
pub async fn health(State(state): State<AdminState>) -> ApiResult<HealthInfo> {
    let last_cycle = state.snapshot.borrow().last_cycle;
    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthInfo {
            status: "ok",
            last_cycle,
        })),
    )
}
