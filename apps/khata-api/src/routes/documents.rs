//! Sales invoices and purchase bills.
//!
//! Both kinds share one set of handlers; the route prefix fixes the kind
//! and the permissions checked.
//!
//! ```text
//! POST   /sales-invoices                 draft
//! GET    /sales-invoices?status=posted   list
//! GET    /sales-invoices/{id}            document with lines
//! POST   /sales-invoices/{id}/post       number, journal, stock
//! POST   /sales-invoices/{id}/cancel     reverse journal, restore stock
//! POST   /sales-invoices/{id}/settle     receipt against the invoice
//! GET    /sales-invoices/{id}/settlements
//! ```

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use khata_core::document::{DocumentKind, TradeDocument, TradeDocumentWithLines};
use khata_core::rbac::perms;
use khata_db::repository::document::{DocumentFilter, DocumentSettlement, NewDocument, NewSettlement};

use super::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::today_ist;

#[derive(Debug, Clone, Copy)]
struct DocumentPerms {
    read: &'static str,
    create: &'static str,
    post: &'static str,
    cancel: &'static str,
    settle: &'static str,
}

fn perms_for(kind: DocumentKind) -> DocumentPerms {
    match kind {
        DocumentKind::SalesInvoice => DocumentPerms {
            read: perms::INVOICE_READ,
            create: perms::INVOICE_CREATE,
            post: perms::INVOICE_POST,
            cancel: perms::INVOICE_CANCEL,
            settle: perms::RECEIPT_CREATE,
        },
        DocumentKind::PurchaseBill => DocumentPerms {
            read: perms::BILL_READ,
            create: perms::BILL_CREATE,
            post: perms::BILL_POST,
            cancel: perms::BILL_CANCEL,
            settle: perms::PAYMENT_CREATE,
        },
    }
}

pub fn routes() -> Router<SharedState> {
    document_routes("/sales-invoices", DocumentKind::SalesInvoice)
        .merge(document_routes("/purchase-bills", DocumentKind::PurchaseBill))
}

fn document_routes(base: &str, kind: DocumentKind) -> Router<SharedState> {
    Router::new()
        .route(
            base,
            get(move |s: State<SharedState>, u: AuthUser, q: Query<DocumentFilter>| list(kind, s, u, q))
                .post(move |s: State<SharedState>, u: AuthUser, b: Json<NewDocument>| create(kind, s, u, b)),
        )
        .route(
            &format!("{}/{{id}}", base),
            get(move |s: State<SharedState>, u: AuthUser, p: Path<String>| get_one(kind, s, u, p)),
        )
        .route(
            &format!("{}/{{id}}/post", base),
            post(move |s: State<SharedState>, u: AuthUser, p: Path<String>| post_document(kind, s, u, p)),
        )
        .route(
            &format!("{}/{{id}}/cancel", base),
            post(move |s: State<SharedState>, u: AuthUser, p: Path<String>| cancel(kind, s, u, p)),
        )
        .route(
            &format!("{}/{{id}}/settle", base),
            post(move |s: State<SharedState>, u: AuthUser, p: Path<String>, b: Json<NewSettlement>| {
                settle(kind, s, u, p, b)
            }),
        )
        .route(
            &format!("{}/{{id}}/settlements", base),
            get(move |s: State<SharedState>, u: AuthUser, p: Path<String>| settlements(kind, s, u, p)),
        )
}

async fn list(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Json<Vec<TradeDocument>>> {
    user.require(perms_for(kind).read)?;
    Ok(Json(state.db.documents().list(&user.company_id, kind, &filter).await?))
}

async fn create(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewDocument>,
) -> ApiResult<(StatusCode, Json<TradeDocumentWithLines>)> {
    user.require(perms_for(kind).create)?;
    let draft = state.db.documents().create_draft(&user.company_id, &user.user_id, kind, &input).await?;
    Ok((StatusCode::CREATED, Json(draft)))
}

async fn get_one(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TradeDocumentWithLines>> {
    user.require(perms_for(kind).read)?;
    Ok(Json(state.db.documents().get(&user.company_id, kind, &id).await?))
}

async fn post_document(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TradeDocumentWithLines>> {
    user.require(perms_for(kind).post)?;
    Ok(Json(state.db.documents().post(&user.company_id, &user.user_id, kind, &id).await?))
}

async fn cancel(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TradeDocumentWithLines>> {
    user.require(perms_for(kind).cancel)?;
    Ok(Json(state.db.documents().cancel(&user.company_id, &user.user_id, kind, &id).await?))
}

async fn settle(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<NewSettlement>,
) -> ApiResult<(StatusCode, Json<DocumentSettlement>)> {
    user.require(perms_for(kind).settle)?;
    let settlement = state
        .db
        .documents()
        .settle(&user.company_id, &user.user_id, kind, &id, &input, today_ist())
        .await?;
    Ok((StatusCode::CREATED, Json(settlement)))
}

async fn settlements(
    kind: DocumentKind,
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DocumentSettlement>>> {
    user.require(perms_for(kind).read)?;
    Ok(Json(state.db.documents().settlements(&user.company_id, kind, &id).await?))
}
