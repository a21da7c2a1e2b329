//! Financial years, the chart of accounts and journal vouchers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use khata_core::financial_year::FinancialYear;
use khata_core::journal::{JournalDraft, JournalEntry, JournalEntryWithLines};
use khata_core::ledger::{Account, LedgerStatement};
use khata_core::rbac::perms;
use khata_db::repository::account::NewAccount;
use khata_db::repository::financial_year::NewFinancialYear;
use khata_db::repository::journal::JournalFilter;
use khata_db::repository::report::ReportPeriod;
use serde::Deserialize;

use super::{SetActive, SharedState};
use crate::auth::AuthUser;
use crate::error::ApiResult;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/financial-years", get(list_years).post(create_year))
        .route("/financial-years/{id}", get(get_year))
        .route("/financial-years/{id}/close", post(close_year))
        .route("/financial-years/{id}/reopen", post(reopen_year))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/{id}", get(get_account))
        .route("/accounts/{id}/active", put(set_account_active))
        .route("/accounts/{id}/ledger", get(account_ledger))
        .route("/journals", get(list_journals).post(create_journal))
        .route("/journals/{id}", get(get_journal))
        .route("/journals/{id}/reverse", post(reverse_journal))
}

// =============================================================================
// Financial Years
// =============================================================================

async fn list_years(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<Vec<FinancialYear>>> {
    user.require(perms::FY_READ)?;
    Ok(Json(state.db.financial_years().list(&user.company_id).await?))
}

async fn get_year(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<FinancialYear>> {
    user.require(perms::FY_READ)?;
    Ok(Json(state.db.financial_years().get(&user.company_id, &id).await?))
}

async fn create_year(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewFinancialYear>,
) -> ApiResult<(StatusCode, Json<FinancialYear>)> {
    user.require(perms::FY_MANAGE)?;
    let year = state.db.financial_years().create(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(year)))
}

async fn close_year(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<FinancialYear>> {
    user.require(perms::FY_MANAGE)?;
    Ok(Json(state.db.financial_years().close(&user.company_id, &user.user_id, &id).await?))
}

async fn reopen_year(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<FinancialYear>> {
    user.require(perms::FY_MANAGE)?;
    Ok(Json(state.db.financial_years().reopen(&user.company_id, &user.user_id, &id).await?))
}

// =============================================================================
// Accounts
// =============================================================================

async fn list_accounts(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<Vec<Account>>> {
    user.require(perms::ACCOUNT_READ)?;
    Ok(Json(state.db.accounts().list(&user.company_id).await?))
}

async fn get_account(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<Account>> {
    user.require(perms::ACCOUNT_READ)?;
    Ok(Json(state.db.accounts().get(&user.company_id, &id).await?))
}

async fn create_account(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewAccount>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    user.require(perms::ACCOUNT_CREATE)?;
    let account = state.db.accounts().create(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn set_account_active(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetActive>,
) -> ApiResult<Json<Account>> {
    user.require(perms::ACCOUNT_CREATE)?;
    let account = state
        .db
        .accounts()
        .set_active(&user.company_id, &user.user_id, &id, body.is_active)
        .await?;
    Ok(Json(account))
}

async fn account_ledger(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(period): Query<ReportPeriod>,
) -> ApiResult<Json<LedgerStatement>> {
    user.require(perms::REPORT_FINANCIAL)?;
    Ok(Json(state.db.reports().ledger_statement(&user.company_id, &id, &period).await?))
}

// =============================================================================
// Journals
// =============================================================================

async fn list_journals(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<JournalFilter>,
) -> ApiResult<Json<Vec<JournalEntry>>> {
    user.require(perms::JOURNAL_READ)?;
    Ok(Json(state.db.journals().list(&user.company_id, &filter).await?))
}

async fn get_journal(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JournalEntryWithLines>> {
    user.require(perms::JOURNAL_READ)?;
    Ok(Json(state.db.journals().get(&user.company_id, &id).await?))
}

async fn create_journal(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(draft): Json<JournalDraft>,
) -> ApiResult<(StatusCode, Json<JournalEntryWithLines>)> {
    user.require(perms::JOURNAL_CREATE)?;
    let entry = state.db.journals().create(&user.company_id, &user.user_id, draft).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReverseRequest {
    /// Defaults to the original entry's date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

async fn reverse_journal(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Option<Json<ReverseRequest>>,
) -> ApiResult<(StatusCode, Json<JournalEntryWithLines>)> {
    user.require(perms::JOURNAL_REVERSE)?;
    let date = body.and_then(|Json(req)| req.date);
    let reversal = state.db.journals().reverse(&user.company_id, &user.user_id, &id, date).await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}
