//! Loyalty program settings and customer point balances.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use khata_core::loyalty::{LoyaltyAccount, LoyaltyProgram, LoyaltyTransaction};
use khata_core::rbac::perms;
use khata_db::repository::loyalty::LoyaltyAdjustment;

use super::{LimitQuery, SharedState};
use crate::auth::AuthUser;
use crate::error::ApiResult;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/loyalty/program", get(get_program).put(save_program))
        .route("/loyalty/accounts/{party_id}", get(get_account))
        .route("/loyalty/accounts/{party_id}/transactions", get(list_transactions))
        .route("/loyalty/accounts/{party_id}/adjustments", post(adjust))
}

async fn get_program(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<LoyaltyProgram>> {
    user.require(perms::LOYALTY_READ)?;
    Ok(Json(state.db.loyalty().program(&user.company_id).await?))
}

async fn save_program(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(program): Json<LoyaltyProgram>,
) -> ApiResult<Json<LoyaltyProgram>> {
    user.require(perms::LOYALTY_MANAGE)?;
    Ok(Json(state.db.loyalty().save_program(&user.company_id, &user.user_id, &program).await?))
}

async fn get_account(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(party_id): Path<String>,
) -> ApiResult<Json<LoyaltyAccount>> {
    user.require(perms::LOYALTY_READ)?;
    Ok(Json(state.db.loyalty().account(&user.company_id, &party_id).await?))
}

async fn list_transactions(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(party_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<LoyaltyTransaction>>> {
    user.require(perms::LOYALTY_READ)?;
    Ok(Json(state.db.loyalty().transactions(&user.company_id, &party_id, query.limit).await?))
}

async fn adjust(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(party_id): Path<String>,
    Json(input): Json<LoyaltyAdjustment>,
) -> ApiResult<Json<LoyaltyAccount>> {
    user.require(perms::LOYALTY_ADJUST)?;
    Ok(Json(state.db.loyalty().adjust(&user.company_id, &user.user_id, &party_id, &input).await?))
}
