//! # HTTP Routes
//!
//! Every handler follows the same shape: extract the caller, check one
//! permission, call one repository method scoped to the caller's company,
//! serialize the result.
//!
//! | Prefix | Module |
//! |---|---|
//! | `/auth`, `/companies` | [`auth`] |
//! | `/financial-years`, `/accounts`, `/journals` | [`accounting`] |
//! | `/parties`, `/items` | [`masters`] |
//! | `/sales-invoices`, `/purchase-bills` | [`documents`] |
//! | `/pos` | [`pos`] |
//! | `/loyalty` | [`loyalty`] |
//! | `/discounts` | [`discounts`] |
//! | `/reports` | [`reports`] |
//! | `/users`, `/roles`, `/audit` | [`admin`] |
//! | `/health` | [`health`] |

pub mod accounting;
pub mod admin;
pub mod auth;
pub mod discounts;
pub mod documents;
pub mod health;
pub mod loyalty;
pub mod masters;
pub mod pos;
pub mod reports;

use std::sync::Arc;

use axum::Router;
use serde::Deserialize;

use crate::AppState;

pub type SharedState = Arc<AppState>;

/// Body of the `.../active` toggles.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetActive {
    pub is_active: bool,
}

/// `?limit=` on history lists.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .merge(auth::routes())
        .merge(accounting::routes())
        .merge(masters::routes())
        .merge(documents::routes())
        .merge(pos::routes())
        .merge(loyalty::routes())
        .merge(discounts::routes())
        .merge(reports::routes())
        .merge(admin::routes())
        .merge(health::routes())
}
