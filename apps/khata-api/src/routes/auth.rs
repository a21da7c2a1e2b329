//! Login, the current user and company signup.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use khata_core::rbac::{perms, User};
use khata_core::Company;
use khata_db::repository::company::{CompanySignup, CompanyUpdate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::SharedState;
use crate::auth::{hash_password_blocking, validate_password, verify_password_blocking, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::today_ist;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/companies", post(signup))
        .route("/companies/{id}", get(get_company).put(update_company))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub company_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
    pub permissions: Vec<String>,
}

/// Same answer for unknown user, wrong password and inactive account.
fn bad_credentials() -> ApiError {
    ApiError::unauthorized("Invalid company, username or password")
}

async fn login(State(state): State<SharedState>, Json(req): Json<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .db
        .users()
        .find_for_login(&req.company_id, &req.username)
        .await?
        .ok_or_else(bad_credentials)?;

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(company_id = %req.company_id, username = %user.username, "Login failed");
        return Err(bad_credentials());
    }
    if !user.is_active {
        warn!(company_id = %req.company_id, username = %user.username, "Login by inactive user");
        return Err(bad_credentials());
    }

    let permissions = state.db.users().permissions(&user.id).await?;
    let token = state.jwt.issue(&user.id, &user.company_id, &user.username, &permissions)?;
    state.db.users().touch_login(&user.id).await?;

    info!(company_id = %user.company_id, username = %user.username, "User logged in");
    Ok(Json(LoginResponse {
        token,
        expires_in: state.jwt.lifetime_secs(),
        permissions: permissions.as_strings(),
        user,
    }))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub roles: Vec<String>,
    /// As granted when the token was issued.
    pub permissions: Vec<String>,
}

async fn me(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<MeResponse>> {
    let current = state.db.users().get(&user.company_id, &user.user_id).await?;
    Ok(Json(MeResponse {
        user: current.user,
        roles: current.roles,
        permissions: user.permissions.as_strings(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(flatten)]
    pub company: CompanySignup,
    pub admin_password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub company: Company,
    pub admin: User,
    pub token: String,
    pub expires_in: i64,
}

async fn signup(
    State(state): State<SharedState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    if !state.config.allow_company_signup {
        return Err(ApiError::forbidden("Company signup is disabled"));
    }
    validate_password(&req.admin_password).map_err(|e| ApiError::validation(e.to_string()))?;

    let hash = hash_password_blocking(req.admin_password).await?;
    let (company, admin) = state.db.companies().signup(&req.company, &hash, today_ist()).await?;

    let permissions = state.db.users().permissions(&admin.id).await?;
    let token = state.jwt.issue(&admin.id, &company.id, &admin.username, &permissions)?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            company,
            admin,
            token,
            expires_in: state.jwt.lifetime_secs(),
        }),
    ))
}

/// Other tenants' companies are reported as missing.
fn own_company(user: &AuthUser, id: &str) -> ApiResult<()> {
    if user.company_id == id {
        Ok(())
    } else {
        Err(ApiError::not_found("Company", id))
    }
}

async fn get_company(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<Company>> {
    user.require(perms::COMPANY_READ)?;
    own_company(&user, &id)?;
    Ok(Json(state.db.companies().get(&id).await?))
}

async fn update_company(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<CompanyUpdate>,
) -> ApiResult<Json<Company>> {
    user.require(perms::COMPANY_UPDATE)?;
    own_company(&user, &id)?;
    Ok(Json(state.db.companies().update(&id, &user.user_id, &input).await?))
}
