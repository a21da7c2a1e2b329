//! # POS Live Feed
//!
//! Counter events fan out to `/pos/live` WebSocket subscribers.
//!
//! ```text
//! POST /pos/transactions ──► PosRepository::create_sale ──► commit
//!                                                            │
//!                                                            ▼
//!                                          LiveFeed::publish(SaleCompleted)
//!                                                            │
//!                              broadcast::Sender<PosEvent> ──┤
//!                                     ┌──────────────────────┼──────────────┐
//!                                     ▼                      ▼              ▼
//!                              socket (company A)    socket (company A)  socket (company B)
//!                               forwards             forwards            skips
//! ```
//!
//! The channel is in memory only: a subscriber that falls more than the
//! configured capacity behind loses the oldest events, and nothing is
//! replayed after a reconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use khata_core::pos::PosEvent;
use khata_core::rbac::perms;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::auth::{AuthUser, Claims};
use crate::error::ApiResult;
use crate::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Publisher side of the feed.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    tx: broadcast::Sender<PosEvent>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        LiveFeed { tx }
    }

    /// Sends to whoever is listening. No subscribers is not an error.
    pub fn publish(&self, event: PosEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(receivers, "POS event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PosEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    /// Browsers cannot set headers on a WebSocket upgrade.
    pub token: String,
}

/// `GET /pos/live?token=...`
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let claims: Claims = state.jwt.validate(&query.token)?;
    let user = AuthUser::from_claims(claims);
    user.require(perms::POS_SESSION_READ)?;

    let rx = state.live.subscribe();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user, rx)))
}

async fn handle_socket(socket: WebSocket, user: AuthUser, mut rx: broadcast::Receiver<PosEvent>) {
    info!(company_id = %user.company_id, username = %user.username, "Live feed subscriber connected");

    let (mut sender, mut receiver) = socket.split();
    let company_id = user.company_id.clone();

    let mut forward = tokio::spawn(async move {
        let mut ping = interval(PING_INTERVAL);
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if event.company_id() != company_id {
                            continue;
                        }
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode POS event");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(company_id = %company_id, skipped, "Live feed subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ping.tick() => {
                    if sender.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The feed is one-way; incoming frames only tell us the client is alive.
    let mut drain = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => drain.abort(),
        _ = &mut drain => forward.abort(),
    }

    info!(company_id = %user.company_id, username = %user.username, "Live feed subscriber disconnected");
}
