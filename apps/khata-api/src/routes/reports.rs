//! Financial and GST reports over a date range (`?from=2025-04-01&to=2026-03-31`).

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use khata_core::gst::HsnSummaryRow;
use khata_core::journal::JournalEntryWithLines;
use khata_core::ledger::{ProfitAndLoss, TrialBalance};
use khata_core::rbac::perms;
use khata_db::repository::report::{GstSummary, HsnDirection, ReportPeriod};
use serde::Deserialize;

use super::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiResult;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/reports/trial-balance", get(trial_balance))
        .route("/reports/profit-and-loss", get(profit_and_loss))
        .route("/reports/day-book", get(day_book))
        .route("/reports/gst-summary", get(gst_summary))
        .route("/reports/hsn-summary", get(hsn_summary))
}

async fn trial_balance(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(period): Query<ReportPeriod>,
) -> ApiResult<Json<TrialBalance>> {
    user.require(perms::REPORT_FINANCIAL)?;
    Ok(Json(state.db.reports().trial_balance(&user.company_id, &period).await?))
}

async fn profit_and_loss(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(period): Query<ReportPeriod>,
) -> ApiResult<Json<ProfitAndLoss>> {
    user.require(perms::REPORT_FINANCIAL)?;
    Ok(Json(state.db.reports().profit_and_loss(&user.company_id, &period).await?))
}

async fn day_book(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(period): Query<ReportPeriod>,
) -> ApiResult<Json<Vec<JournalEntryWithLines>>> {
    user.require(perms::REPORT_FINANCIAL)?;
    Ok(Json(state.db.reports().day_book(&user.company_id, &period).await?))
}

async fn gst_summary(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(period): Query<ReportPeriod>,
) -> ApiResult<Json<GstSummary>> {
    user.require(perms::REPORT_GST)?;
    Ok(Json(state.db.reports().gst_summary(&user.company_id, &period).await?))
}

#[derive(Debug, Deserialize)]
pub struct HsnQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub direction: HsnDirection,
}

async fn hsn_summary(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(query): Query<HsnQuery>,
) -> ApiResult<Json<Vec<HsnSummaryRow>>> {
    user.require(perms::REPORT_GST)?;
    let period = ReportPeriod {
        from: query.from,
        to: query.to,
    };
    Ok(Json(state.db.reports().hsn_summary(&user.company_id, &period, query.direction).await?))
}
