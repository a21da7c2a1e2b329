//! Parties (customers and suppliers) and stock items.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use khata_core::rbac::perms;
use khata_core::{Item, Party, StockMovement};
use khata_db::repository::item::{ItemFilter, ItemUpdate, NewItem, StockAdjustment};
use khata_db::repository::party::{NewParty, PartyFilter, PartyUpdate};

use super::{LimitQuery, SharedState};
use crate::auth::AuthUser;
use crate::error::ApiResult;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/parties", get(list_parties).post(create_party))
        .route("/parties/{id}", get(get_party).put(update_party))
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(get_item).put(update_item))
        .route("/items/{id}/stock-adjustments", post(adjust_stock))
        .route("/items/{id}/movements", get(item_movements))
}

// =============================================================================
// Parties
// =============================================================================

async fn list_parties(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<PartyFilter>,
) -> ApiResult<Json<Vec<Party>>> {
    user.require(perms::PARTY_READ)?;
    Ok(Json(state.db.parties().list(&user.company_id, &filter).await?))
}

async fn get_party(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<Party>> {
    user.require(perms::PARTY_READ)?;
    Ok(Json(state.db.parties().get(&user.company_id, &id).await?))
}

async fn create_party(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewParty>,
) -> ApiResult<(StatusCode, Json<Party>)> {
    user.require(perms::PARTY_MANAGE)?;
    let party = state.db.parties().create(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(party)))
}

async fn update_party(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<PartyUpdate>,
) -> ApiResult<Json<Party>> {
    user.require(perms::PARTY_MANAGE)?;
    Ok(Json(state.db.parties().update(&user.company_id, &user.user_id, &id, &input).await?))
}

// =============================================================================
// Items
// =============================================================================

async fn list_items(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<Json<Vec<Item>>> {
    user.require(perms::ITEM_READ)?;
    Ok(Json(state.db.items().list(&user.company_id, &filter).await?))
}

async fn get_item(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<Item>> {
    user.require(perms::ITEM_READ)?;
    Ok(Json(state.db.items().get(&user.company_id, &id).await?))
}

async fn create_item(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewItem>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    user.require(perms::ITEM_MANAGE)?;
    let item = state.db.items().create(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<ItemUpdate>,
) -> ApiResult<Json<Item>> {
    user.require(perms::ITEM_MANAGE)?;
    Ok(Json(state.db.items().update(&user.company_id, &user.user_id, &id, &input).await?))
}

async fn adjust_stock(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<StockAdjustment>,
) -> ApiResult<Json<Item>> {
    user.require(perms::STOCK_ADJUST)?;
    Ok(Json(state.db.items().adjust_stock(&user.company_id, &user.user_id, &id, &input).await?))
}

async fn item_movements(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<StockMovement>>> {
    user.require(perms::ITEM_READ)?;
    Ok(Json(state.db.items().movements(&user.company_id, &id, query.limit).await?))
}
