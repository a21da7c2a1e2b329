//! Users, roles and the audit log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use khata_core::rbac::{perms, RoleWithPermissions};
use khata_db::repository::audit::{AuditFilter, AuditRecord};
use khata_db::repository::user::{NewRole, NewUser, UserWithRoles};
use serde::Deserialize;
use tracing::info;

use super::{SetActive, SharedState};
use crate::auth::{hash_password_blocking, validate_password, AuthUser};
use crate::error::{ApiError, ApiResult};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/roles", put(set_user_roles))
        .route("/users/{id}/active", put(set_user_active))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}", get(get_role))
        .route("/roles/{id}/permissions", put(set_role_permissions))
        .route("/audit", get(list_audit))
}

// =============================================================================
// Users
// =============================================================================

async fn list_users(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<Vec<UserWithRoles>>> {
    user.require(perms::USER_READ)?;
    Ok(Json(state.db.users().list(&user.company_id).await?))
}

async fn get_user(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<UserWithRoles>> {
    user.require(perms::USER_READ)?;
    Ok(Json(state.db.users().get(&user.company_id, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub user: NewUser,
    pub password: String,
}

async fn create_user(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserWithRoles>)> {
    user.require(perms::USER_MANAGE)?;
    validate_password(&req.password).map_err(|e| ApiError::validation(e.to_string()))?;

    let hash = hash_password_blocking(req.password).await?;
    let created = state.db.users().create(&user.company_id, &user.user_id, &req.user, &hash).await?;
    info!(company_id = %user.company_id, by = %user.username, username = %created.user.username, "User added");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct SetRoles {
    pub roles: Vec<String>,
}

async fn set_user_roles(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetRoles>,
) -> ApiResult<Json<UserWithRoles>> {
    user.require(perms::USER_MANAGE)?;
    let updated = state
        .db
        .users()
        .set_roles(&user.company_id, &user.user_id, &id, &body.roles)
        .await?;
    Ok(Json(updated))
}

async fn set_user_active(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetActive>,
) -> ApiResult<Json<UserWithRoles>> {
    user.require(perms::USER_MANAGE)?;
    let updated = state
        .db
        .users()
        .set_active(&user.company_id, &user.user_id, &id, body.is_active)
        .await?;
    Ok(Json(updated))
}

// =============================================================================
// Roles
// =============================================================================

async fn list_roles(State(state): State<SharedState>, user: AuthUser) -> ApiResult<Json<Vec<RoleWithPermissions>>> {
    user.require(perms::ROLE_READ)?;
    Ok(Json(state.db.roles().list(&user.company_id).await?))
}

async fn get_role(State(state): State<SharedState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<RoleWithPermissions>> {
    user.require(perms::ROLE_READ)?;
    Ok(Json(state.db.roles().get(&user.company_id, &id).await?))
}

async fn create_role(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(input): Json<NewRole>,
) -> ApiResult<(StatusCode, Json<RoleWithPermissions>)> {
    user.require(perms::ROLE_MANAGE)?;
    let role = state.db.roles().create(&user.company_id, &user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[derive(Debug, Deserialize)]
pub struct SetPermissions {
    pub permissions: Vec<String>,
}

async fn set_role_permissions(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetPermissions>,
) -> ApiResult<Json<RoleWithPermissions>> {
    user.require(perms::ROLE_MANAGE)?;
    let role = state
        .db
        .roles()
        .set_permissions(&user.company_id, &user.user_id, &id, &body.permissions)
        .await?;
    Ok(Json(role))
}

// =============================================================================
// Audit
// =============================================================================

async fn list_audit(
    State(state): State<SharedState>,
    user: AuthUser,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    user.require(perms::AUDIT_READ)?;
    Ok(Json(state.db.audit().list(&user.company_id, &filter).await?))
}
