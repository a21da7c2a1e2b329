//! # Users and Roles
//!
//! Users log in to exactly one company. What they may do is the union of
//! the permissions of their roles:
//!
//! ```text
//! users ──< user_roles >── roles ──< role_permissions
//!  owner                    admin        "*"
//!  meena                    cashier      "pos.session.open", "pos.transaction.create", ...
//! ```
//!
//! Password hashing happens in the API; this module only stores hashes.

use chrono::Utc;
use khata_core::rbac::{normalize_username, Permission, PermissionSet, Role, RoleWithPermissions, User, ADMIN_ROLE};
use khata_core::validation::{validate_email, validate_name};
use khata_core::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::{audit, begin_write, new_id, refused};
use crate::error::{DbError, DbResult};

const SELECT_USER: &str = r#"
    SELECT id, company_id, username, full_name, email, password_hash, is_active, created_at, last_login_at
    FROM users
"#;

const SELECT_ROLE: &str = r#"
    SELECT id, company_id, name, description, is_builtin, created_at
    FROM roles
"#;

// =============================================================================
// Inputs and Views
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Role names, e.g. `["cashier"]`.
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

fn parse_permissions(raw: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut perms = raw
        .iter()
        .map(|p| Permission::parse(p).map(|p| p.as_str().to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    perms.sort();
    perms.dedup();
    if perms.is_empty() {
        return Err(ValidationError::Required {
            field: "permissions".to_string(),
        });
    }
    Ok(perms)
}

fn optional_email(email: &Option<String>) -> Result<Option<String>, ValidationError> {
    match email.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(e) => {
            validate_email(e)?;
            Ok(Some(e.to_string()))
        }
    }
}

// =============================================================================
// In-transaction Helpers
// =============================================================================

pub async fn insert_user_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    input: &NewUser,
    password_hash: &str,
) -> DbResult<User> {
    let user = User {
        id: new_id(),
        company_id: company_id.to_string(),
        username: normalize_username(&input.username)?,
        full_name: validate_name("full_name", &input.full_name, 120)?,
        email: optional_email(&input.email)?,
        password_hash: password_hash.to_string(),
        is_active: true,
        created_at: Utc::now(),
        last_login_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, company_id, username, full_name, email, password_hash, is_active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
        "#,
    )
    .bind(&user.id)
    .bind(&user.company_id)
    .bind(&user.username)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { .. } => DbError::duplicate("username", &user.username),
        other => other,
    })?;

    Ok(user)
}

pub async fn insert_role_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    name: &str,
    description: Option<&str>,
    is_builtin: bool,
    permissions: &[String],
) -> DbResult<Role> {
    let role = Role {
        id: new_id(),
        company_id: company_id.to_string(),
        name: name.to_string(),
        description: description.map(str::to_string),
        is_builtin,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO roles (id, company_id, name, description, is_builtin, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&role.id)
    .bind(&role.company_id)
    .bind(&role.name)
    .bind(&role.description)
    .bind(role.is_builtin)
    .bind(role.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { .. } => DbError::duplicate("role", name),
        other => other,
    })?;

    write_permissions_in(conn, &role.id, permissions).await?;
    Ok(role)
}

async fn write_permissions_in(conn: &mut SqliteConnection, role_id: &str, permissions: &[String]) -> DbResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?1")
        .bind(role_id)
        .execute(&mut *conn)
        .await?;
    for perm in permissions {
        sqlx::query("INSERT INTO role_permissions (role_id, permission) VALUES (?1, ?2)")
            .bind(role_id)
            .bind(perm)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Replaces a user's roles, resolving names within the company.
pub async fn assign_roles_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    user_id: &str,
    role_names: &[String],
) -> DbResult<()> {
    let mut role_ids = Vec::with_capacity(role_names.len());
    for name in role_names {
        let name = name.trim().to_ascii_lowercase();
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM roles WHERE company_id = ?1 AND name = ?2")
            .bind(company_id)
            .bind(&name)
            .fetch_optional(&mut *conn)
            .await?;
        role_ids.push(id.ok_or_else(|| DbError::not_found("Role", name))?);
    }

    sqlx::query("DELETE FROM user_roles WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    role_ids.sort();
    role_ids.dedup();
    for role_id in role_ids {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn role_names_in(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT r.name FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = ?1
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(names)
}

/// Active admins of a company other than `except_user`.
async fn other_admins_in(conn: &mut SqliteConnection, company_id: &str, except_user: &str) -> DbResult<i64> {
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT u.id) FROM users u
        JOIN user_roles ur ON ur.user_id = u.id
        JOIN roles r ON r.id = ur.role_id
        WHERE u.company_id = ?1 AND u.id <> ?2 AND u.is_active = 1 AND r.name = ?3
        "#,
    )
    .bind(company_id)
    .bind(except_user)
    .bind(ADMIN_ROLE)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

// =============================================================================
// User Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn create(
        &self,
        company_id: &str,
        actor: &str,
        input: &NewUser,
        password_hash: &str,
    ) -> DbResult<UserWithRoles> {
        let mut tx = begin_write(&self.pool).await?;

        let user = insert_user_in(&mut tx, company_id, input, password_hash).await?;
        assign_roles_in(&mut tx, company_id, &user.id, &input.roles).await?;
        let roles = role_names_in(&mut tx, &user.id).await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "user.create",
            "user",
            &user.id,
            &json!({ "username": user.username, "roles": roles }),
        )
        .await?;

        tx.commit().await?;
        info!(company_id = %company_id, username = %user.username, "User created");
        Ok(UserWithRoles { user, roles })
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<UserWithRoles> {
        let mut conn = self.pool.acquire().await?;
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_USER))
            .bind(company_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))?;
        let roles = role_names_in(&mut conn, &user.id).await?;
        Ok(UserWithRoles { user, roles })
    }

    pub async fn list(&self, company_id: &str) -> DbResult<Vec<UserWithRoles>> {
        let mut conn = self.pool.acquire().await?;
        let users = sqlx::query_as::<_, User>(&format!("{} WHERE company_id = ?1 ORDER BY username", SELECT_USER))
            .bind(company_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut out = Vec::with_capacity(users.len());
        for user in users {
            let roles = role_names_in(&mut conn, &user.id).await?;
            out.push(UserWithRoles { user, roles });
        }
        Ok(out)
    }

    /// Looks up a user for login. Inactive users are returned too; the
    /// caller decides how to answer.
    pub async fn find_for_login(&self, company_id: &str, username: &str) -> DbResult<Option<User>> {
        let username = username.trim().to_ascii_lowercase();
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE company_id = ?1 AND username = ?2", SELECT_USER))
            .bind(company_id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Union of the permissions of the user's roles.
    pub async fn permissions(&self, user_id: &str) -> DbResult<PermissionSet> {
        let raw: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT rp.permission FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            WHERE ur.user_id = ?1
            ORDER BY rp.permission
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(PermissionSet::from_strings(raw))
    }

    pub async fn touch_login(&self, user_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replaces a user's roles. The last active admin keeps the admin role.
    pub async fn set_roles(
        &self,
        company_id: &str,
        actor: &str,
        user_id: &str,
        role_names: &[String],
    ) -> DbResult<UserWithRoles> {
        let current = self.get(company_id, user_id).await?;

        let mut tx = begin_write(&self.pool).await?;
        let keeps_admin = role_names.iter().any(|r| r.trim().eq_ignore_ascii_case(ADMIN_ROLE));
        if current.roles.iter().any(|r| r == ADMIN_ROLE)
            && !keeps_admin
            && other_admins_in(&mut tx, company_id, user_id).await? == 0
        {
            return Err(refused("User", &current.user.username, "the last admin", "drop the admin role"));
        }

        assign_roles_in(&mut tx, company_id, user_id, role_names).await?;
        audit::record(&mut tx, company_id, actor, "user.set_roles", "user", user_id, &json!({ "roles": role_names })).await?;
        tx.commit().await?;

        self.get(company_id, user_id).await
    }

    /// Deactivated users cannot log in; their history stays.
    pub async fn set_active(&self, company_id: &str, actor: &str, user_id: &str, active: bool) -> DbResult<UserWithRoles> {
        let current = self.get(company_id, user_id).await?;

        let mut tx = begin_write(&self.pool).await?;
        if !active
            && current.roles.iter().any(|r| r == ADMIN_ROLE)
            && other_admins_in(&mut tx, company_id, user_id).await? == 0
        {
            return Err(refused("User", &current.user.username, "the last admin", "deactivate"));
        }

        sqlx::query("UPDATE users SET is_active = ?1 WHERE company_id = ?2 AND id = ?3")
            .bind(active)
            .bind(company_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        audit::record(&mut tx, company_id, actor, "user.set_active", "user", user_id, &json!({ "is_active": active })).await?;
        tx.commit().await?;

        self.get(company_id, user_id).await
    }
}

// =============================================================================
// Role Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: SqlitePool,
}

impl RoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RoleRepository { pool }
    }

    async fn with_permissions(&self, conn: &mut SqliteConnection, role: Role) -> DbResult<RoleWithPermissions> {
        let permissions = sqlx::query_scalar("SELECT permission FROM role_permissions WHERE role_id = ?1 ORDER BY permission")
            .bind(&role.id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    pub async fn list(&self, company_id: &str) -> DbResult<Vec<RoleWithPermissions>> {
        let mut conn = self.pool.acquire().await?;
        let roles = sqlx::query_as::<_, Role>(&format!("{} WHERE company_id = ?1 ORDER BY name", SELECT_ROLE))
            .bind(company_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut out = Vec::with_capacity(roles.len());
        for role in roles {
            out.push(self.with_permissions(&mut conn, role).await?);
        }
        Ok(out)
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<RoleWithPermissions> {
        let mut conn = self.pool.acquire().await?;
        let role = sqlx::query_as::<_, Role>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_ROLE))
            .bind(company_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Role", id))?;
        self.with_permissions(&mut conn, role).await
    }

    pub async fn create(&self, company_id: &str, actor: &str, input: &NewRole) -> DbResult<RoleWithPermissions> {
        let name = normalize_username(&input.name)?;
        let permissions = parse_permissions(&input.permissions)?;
        let description = input.description.as_deref().map(str::trim).filter(|d| !d.is_empty());

        let mut tx = begin_write(&self.pool).await?;
        let role = insert_role_in(&mut tx, company_id, &name, description, false, &permissions).await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "role.create",
            "role",
            &role.id,
            &json!({ "name": role.name, "permissions": permissions }),
        )
        .await?;
        tx.commit().await?;

        info!(company_id = %company_id, role = %role.name, "Role created");
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Replaces a custom role's permissions. Built-in roles are fixed.
    pub async fn set_permissions(
        &self,
        company_id: &str,
        actor: &str,
        id: &str,
        permissions: &[String],
    ) -> DbResult<RoleWithPermissions> {
        let current = self.get(company_id, id).await?;
        if current.role.is_builtin {
            return Err(refused("Role", &current.role.name, "built in", "edit"));
        }
        let permissions = parse_permissions(permissions)?;

        let mut tx = begin_write(&self.pool).await?;
        write_permissions_in(&mut tx, id, &permissions).await?;
        audit::record(&mut tx, company_id, actor, "role.set_permissions", "role", id, &json!({ "permissions": permissions })).await?;
        tx.commit().await?;

        self.get(company_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::setup;
    use khata_core::rbac::perms;
    use khata_core::CoreError;

    fn cashier(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            full_name: "Meena Patil".to_string(),
            email: None,
            roles: vec!["cashier".to_string()],
        }
    }

    #[tokio::test]
    async fn test_admin_has_everything() {
        let (db, _, admin) = setup().await;
        let granted = db.users().permissions(&admin.id).await.unwrap();
        assert!(granted.allows(perms::JOURNAL_REVERSE));
        assert!(granted.allows(perms::USER_MANAGE));
    }

    #[tokio::test]
    async fn test_cashier_permissions() {
        let (db, company, admin) = setup().await;
        let user = db.users().create(&company.id, &admin.id, &cashier("meena"), "hash").await.unwrap();
        assert_eq!(user.roles, vec!["cashier".to_string()]);

        let granted = db.users().permissions(&user.user.id).await.unwrap();
        assert!(granted.allows(perms::POS_SALE_CREATE));
        assert!(!granted.allows(perms::POS_SALE_VOID));
        assert!(!granted.allows(perms::JOURNAL_CREATE));
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (db, company, admin) = setup().await;
        db.users().create(&company.id, &admin.id, &cashier("meena"), "hash").await.unwrap();
        let again = db.users().create(&company.id, &admin.id, &cashier("Meena"), "hash").await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_unknown_role_rolls_back_user() {
        let (db, company, admin) = setup().await;
        let mut input = cashier("meena");
        input.roles = vec!["wizard".to_string()];
        assert!(matches!(
            db.users().create(&company.id, &admin.id, &input, "hash").await,
            Err(DbError::NotFound { .. })
        ));
        assert!(db.users().find_for_login(&company.id, "meena").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_admin_is_protected() {
        let (db, company, admin) = setup().await;
        let result = db.users().set_roles(&company.id, &admin.id, &admin.id, &["cashier".to_string()]).await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::InvalidStatus { .. }))));
        assert!(db.users().set_active(&company.id, &admin.id, &admin.id, false).await.is_err());
    }

    #[tokio::test]
    async fn test_custom_role() {
        let (db, company, admin) = setup().await;
        let role = db
            .roles()
            .create(
                &company.id,
                &admin.id,
                &NewRole {
                    name: "auditor".to_string(),
                    description: Some("Read-only books".to_string()),
                    permissions: vec!["reports.*".to_string(), "accounts.journal.read".to_string()],
                },
            )
            .await
            .unwrap();
        assert_eq!(role.permissions.len(), 2);

        let bad = db
            .roles()
            .set_permissions(&company.id, &admin.id, &role.role.id, &["Not A Permission".to_string()])
            .await;
        assert!(bad.is_err());

        let builtin = db.roles().list(&company.id).await.unwrap().into_iter().find(|r| r.role.name == "cashier").unwrap();
        assert!(db
            .roles()
            .set_permissions(&company.id, &admin.id, &builtin.role.id, &["*".to_string()])
            .await
            .is_err());
    }
}
