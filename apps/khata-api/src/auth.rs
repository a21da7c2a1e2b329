//! JWT authentication and password hashing.
//!
//! A login issues one bearer token carrying the user, the company and the
//! permissions the user's roles granted at that moment. Role changes take
//! effect at the next login.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use khata_core::rbac::PermissionSet;
use khata_core::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub company_id: String,

    pub username: String,

    /// Flattened permission strings, e.g. `sales.*`
    pub permissions: Vec<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// JWT token manager.
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        JwtManager {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Issues a session token.
    pub fn issue(
        &self,
        user_id: &str,
        company_id: &str,
        username: &str,
        permissions: &PermissionSet,
    ) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.lifetime_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            company_id: company_id.to_string(),
            username: username.to_string(),
            permissions: permissions.as_strings(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        let token_data: TokenData<Claims> = decode(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                debug!(error = %e, "Rejected token");
                ApiError::unauthorized("Invalid or expired token")
            })?;
        Ok(token_data.claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

// =============================================================================
// Passwords
// =============================================================================

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::OutOfRange {
            field: "password length".to_string(),
            min: MIN_PASSWORD_LEN as i64,
            max: 128,
        });
    }
    if password.chars().count() > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }
    Ok(())
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against its stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok()
}

/// Hashing is deliberately slow; keep it off the async workers.
pub async fn hash_password_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)?
}

pub async fn verify_password_blocking(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(ApiError::internal)
}

// =============================================================================
// Request Extractor
// =============================================================================

/// The caller of an authenticated route.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub company_id: String,
    pub username: String,
    pub permissions: PermissionSet,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Self {
        AuthUser {
            permissions: PermissionSet::from_strings(&claims.permissions),
            user_id: claims.sub,
            company_id: claims.company_id,
            username: claims.username,
        }
    }

    /// 403 unless the token grants `permission`.
    pub fn require(&self, permission: &str) -> ApiResult<()> {
        self.permissions.require(permission).map_err(ApiError::from)
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        let token = extract_bearer_token(header).ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

        let claims = state.jwt.validate(token)?;
        Ok(AuthUser::from_claims(claims))
    }
}
