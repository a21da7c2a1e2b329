//! Counter sessions, sales and voids. Every committed change is also
//! pushed to `/pos/live`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use khata_core::pos::{PosEvent, PosSession, PosTransaction};
use khata_core::rbac::perms;
use khata_core::Money;
use khata_db::repository::pos::{NewPosSale, OpenSession, PosReceipt, SessionFilter, TransactionFilter};
use serde::Deserialize;

use super::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::{live, today_ist};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/pos/sessions", get(list_sessions).post(open_session))
        .route("/pos/sessions/{id}", get(get_session))
        .route("/pos/sessions/{id}/close", post(close_session))
        .route("/pos/transactions", get(list_transactions).post(create_sale))
        .route("/pos/transactions/{id}", get(get_transaction))
        .route("/pos/transactions/{id}/void", post(void_sale))
        .route("/pos/live", get(live::ws_handler))
}

// =============================================================================
// Sessions
// =============================================================================

async fn list_sessions(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<SessionFilter>,
) -> ApiResult<Json<Vec<PosSession>>> {
    user.require(perms::POS_SESSION_READ)?;
    Ok(Json(state.db.pos().list_sessions(&user.company_id, &filter).await?))
}

async fn get_session(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<PosSession>> {
    user.require(perms::POS_SESSION_READ)?;
    Ok(Json(state.db.pos().get_session(&user.company_id, &id).await?))
}

async fn open_session(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<OpenSession>,
) -> ApiResult<(StatusCode, Json<PosSession>)> {
    user.require(perms::POS_SESSION_OPEN)?;
    let session = state.db.pos().open_session(&user.company_id, &user.user_id, &input).await?;

    state.live.publish(PosEvent::SessionOpened {
        company_id: session.company_id.clone(),
        session_id: session.id.clone(),
        terminal_id: session.terminal_id.clone(),
    });
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct CloseSessionRequest {
    pub counted_cash: Money,
}

async fn close_session(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CloseSessionRequest>,
) -> ApiResult<Json<PosSession>> {
    user.require(perms::POS_SESSION_CLOSE)?;
    let session = state
        .db
        .pos()
        .close_session(&user.company_id, &user.user_id, &id, req.counted_cash)
        .await?;

    state.live.publish(PosEvent::SessionClosed {
        company_id: session.company_id.clone(),
        session_id: session.id.clone(),
        terminal_id: session.terminal_id.clone(),
        variance: session.variance.unwrap_or_default(),
    });
    Ok(Json(session))
}

// =============================================================================
// Transactions
// =============================================================================

async fn list_transactions(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<TransactionFilter>,
) -> ApiResult<Json<Vec<PosTransaction>>> {
    user.require(perms::POS_SALE_READ)?;
    Ok(Json(state.db.pos().list_transactions(&user.company_id, &filter).await?))
}

async fn get_transaction(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<PosReceipt>> {
    user.require(perms::POS_SALE_READ)?;
    Ok(Json(state.db.pos().get_transaction(&user.company_id, &id).await?))
}

async fn create_sale(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewPosSale>,
) -> ApiResult<(StatusCode, Json<PosReceipt>)> {
    user.require(perms::POS_SALE_CREATE)?;
    let receipt = state
        .db
        .pos()
        .create_sale(&user.company_id, &user.user_id, &input, today_ist())
        .await?;

    let sale = &receipt.transaction;
    state.live.publish(PosEvent::SaleCompleted {
        company_id: sale.company_id.clone(),
        session_id: sale.session_id.clone(),
        transaction_id: sale.id.clone(),
        number: sale.number.clone(),
        grand_total: sale.grand_total,
    });
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn void_sale(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<PosReceipt>> {
    user.require(perms::POS_SALE_VOID)?;
    let receipt = state.db.pos().void(&user.company_id, &user.user_id, &id).await?;

    let sale = &receipt.transaction;
    state.live.publish(PosEvent::SaleVoided {
        company_id: sale.company_id.clone(),
        session_id: sale.session_id.clone(),
        transaction_id: sale.id.clone(),
        number: sale.number.clone(),
    });
    Ok(Json(receipt))
}
