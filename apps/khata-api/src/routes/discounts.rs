//! Discount rules, coupons and coupon validation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use khata_core::discount::{Coupon, CouponQuote, DiscountRule};
use khata_core::rbac::perms;
use khata_core::Money;
use khata_db::repository::discount::{BestDiscount, NewCoupon, NewDiscountRule};
use serde::Deserialize;

use super::{SetActive, SharedState};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::today_ist;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/discounts/rules", get(list_rules).post(create_rule))
        .route("/discounts/rules/{id}", get(get_rule))
        .route("/discounts/rules/{id}/active", put(set_rule_active))
        .route("/discounts/best", get(best_automatic))
        .route("/discounts/coupons", get(list_coupons).post(create_coupon))
        .route("/discounts/coupons/{id}/active", put(set_coupon_active))
        .route("/discounts/coupons/validate", post(validate_coupon))
}

// =============================================================================
// Rules
// =============================================================================

async fn list_rules(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<Vec<DiscountRule>>> {
    user.require(perms::DISCOUNT_READ)?;
    Ok(Json(state.db.discounts().list_rules(&user.company_id).await?))
}

async fn get_rule(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<DiscountRule>> {
    user.require(perms::DISCOUNT_READ)?;
    Ok(Json(state.db.discounts().get_rule(&user.company_id, &id).await?))
}

async fn create_rule(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewDiscountRule>,
) -> ApiResult<(StatusCode, Json<DiscountRule>)> {
    user.require(perms::DISCOUNT_MANAGE)?;
    let rule = state.db.discounts().create_rule(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn set_rule_active(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetActive>,
) -> ApiResult<Json<DiscountRule>> {
    user.require(perms::DISCOUNT_MANAGE)?;
    let rule = state
        .db
        .discounts()
        .set_rule_active(&user.company_id, &user.user_id, &id, body.is_active)
        .await?;
    Ok(Json(rule))
}

#[derive(Debug, Deserialize)]
pub struct BestQuery {
    pub order_total: Money,
    pub date: Option<NaiveDate>,
}

/// `null` when no automatic rule applies.
async fn best_automatic(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(query): Query<BestQuery>,
) -> ApiResult<Json<Option<BestDiscount>>> {
    user.require(perms::DISCOUNT_READ)?;
    let date = query.date.unwrap_or_else(today_ist);
    Ok(Json(state.db.discounts().best_automatic(&user.company_id, query.order_total, date).await?))
}

// =============================================================================
// Coupons
// =============================================================================

async fn list_coupons(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<Vec<Coupon>>> {
    user.require(perms::DISCOUNT_READ)?;
    Ok(Json(state.db.discounts().list_coupons(&user.company_id).await?))
}

async fn create_coupon(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewCoupon>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    user.require(perms::DISCOUNT_MANAGE)?;
    let coupon = state.db.discounts().create_coupon(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn set_coupon_active(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetActive>,
) -> ApiResult<Json<Coupon>> {
    user.require(perms::DISCOUNT_MANAGE)?;
    let coupon = state
        .db
        .discounts()
        .set_coupon_active(&user.company_id, &user.user_id, &id, body.is_active)
        .await?;
    Ok(Json(coupon))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCoupon {
    pub code: String,
    pub order_total: Money,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Prices a coupon against a basket without using it up.
async fn validate_coupon(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(req): Json<ValidateCoupon>,
) -> ApiResult<Json<CouponQuote>> {
    user.require(perms::DISCOUNT_READ)?;
    let quote = state
        .db
        .discounts()
        .quote(
            &user.company_id,
            &req.code,
            req.order_total,
            req.customer_id.as_deref(),
            req.date.unwrap_or_else(today_ist),
        )
        .await?;
    Ok(Json(quote))
}
