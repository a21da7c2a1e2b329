//! # Khata API
//!
//! REST server for the Khata ERP.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Khata API                                     │
//! │                                                                         │
//! │  Request ──► TraceLayer ──► CORS ──► Router (/api/v1)                   │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                              AuthUser (bearer JWT)                      │
//! │                              user.require("sales.invoice.post")?        │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                              khata-db repository call                   │
//! │                              (one SQLite transaction)                   │
//! │                                         │                               │
//! │                      ┌──────────────────┴─────────────┐                 │
//! │                      ▼                                ▼                 │
//! │                 Json response                 LiveFeed::publish         │
//! │                 or ApiError                   (POS events only)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config`] for the `KHATA_*` environment variables.

pub mod auth;
pub mod config;
pub mod error;
pub mod live;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use khata_db::Database;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// Re-exports
pub use auth::JwtManager;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use live::LiveFeed;

/// UTC+05:30
const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub jwt: JwtManager,
    pub config: ApiConfig,
    pub live: LiveFeed,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig) -> Arc<Self> {
        Arc::new(AppState {
            jwt: JwtManager::new(&config.jwt_secret, config.jwt_lifetime_secs),
            live: LiveFeed::new(config.live_feed_capacity),
            db,
            config,
        })
    }
}

/// Builds the full application: every route under `/api/v1` plus request
/// tracing and CORS.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The business date. Entries are dated in Indian Standard Time whatever
/// the server's zone.
pub fn today_ist() -> NaiveDate {
    (Utc::now().naive_utc() + Duration::seconds(IST_OFFSET_SECS)).date()
}
