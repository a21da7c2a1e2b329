//! Health check for monitoring and load balancers. No token needed.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use khata_db::migrations::migration_status;
use serde::Serialize;
use tracing::warn;

use super::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStatus {
    Serving,
    /// Up, but migrations are behind.
    Degraded,
    NotServing,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: ServingStatus,
    pub message: String,
    pub version: &'static str,
    pub migrations_applied: usize,
    pub migrations_total: usize,
    pub live_subscribers: usize,
    pub server_time: DateTime<Utc>,
}

async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, message, applied, total) = if !state.db.health_check().await {
        (ServingStatus::NotServing, "Database unreachable".to_string(), 0, 0)
    } else {
        match migration_status(state.db.pool()).await {
            Ok((total, applied)) if applied == total => (ServingStatus::Serving, "OK".to_string(), applied, total),
            Ok((total, applied)) => (
                ServingStatus::Degraded,
                format!("{} of {} migrations applied", applied, total),
                applied,
                total,
            ),
            Err(e) => {
                warn!(error = %e, "Could not read migration status");
                (ServingStatus::Degraded, "Migration status unknown".to_string(), 0, 0)
            }
        }
    };

    let code = match status {
        ServingStatus::NotServing => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        code,
        Json(HealthResponse {
            status,
            message,
            version: env!("CARGO_PKG_VERSION"),
            migrations_applied: applied,
            migrations_total: total,
            live_subscribers: state.live.subscriber_count(),
            server_time: Utc::now(),
        }),
    )
}
