//! # RBAC Module
//!
//! Permission strings, roles and users.
//!
//! ## Permission Strings
//! ```text
//! module . resource . action          sales.invoice.post
//!
//! Grants may use `*` for any segment:
//!   *                    everything
//!   sales.*              every sales permission
//!   *.*.read             read anything
//!   pos.transaction.*    every action on POS transactions
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Permission names checked by the API.
pub mod perms {
    pub const COMPANY_READ: &str = "admin.company.read";
    pub const COMPANY_UPDATE: &str = "admin.company.update";
    pub const USER_READ: &str = "admin.user.read";
    pub const USER_MANAGE: &str = "admin.user.manage";
    pub const ROLE_READ: &str = "admin.role.read";
    pub const ROLE_MANAGE: &str = "admin.role.manage";
    pub const AUDIT_READ: &str = "admin.audit.read";

    pub const ACCOUNT_READ: &str = "accounts.account.read";
    pub const ACCOUNT_CREATE: &str = "accounts.account.create";
    pub const JOURNAL_READ: &str = "accounts.journal.read";
    pub const JOURNAL_CREATE: &str = "accounts.journal.create";
    pub const JOURNAL_REVERSE: &str = "accounts.journal.reverse";
    pub const FY_READ: &str = "accounts.financial_year.read";
    pub const FY_MANAGE: &str = "accounts.financial_year.manage";

    pub const PARTY_READ: &str = "parties.party.read";
    pub const PARTY_MANAGE: &str = "parties.party.manage";

    pub const ITEM_READ: &str = "inventory.item.read";
    pub const ITEM_MANAGE: &str = "inventory.item.manage";
    pub const STOCK_ADJUST: &str = "inventory.stock.adjust";

    pub const INVOICE_READ: &str = "sales.invoice.read";
    pub const INVOICE_CREATE: &str = "sales.invoice.create";
    pub const INVOICE_POST: &str = "sales.invoice.post";
    pub const INVOICE_CANCEL: &str = "sales.invoice.cancel";
    pub const RECEIPT_CREATE: &str = "sales.receipt.create";

    pub const BILL_READ: &str = "purchase.bill.read";
    pub const BILL_CREATE: &str = "purchase.bill.create";
    pub const BILL_POST: &str = "purchase.bill.post";
    pub const BILL_CANCEL: &str = "purchase.bill.cancel";
    pub const PAYMENT_CREATE: &str = "purchase.payment.create";

    pub const POS_SESSION_READ: &str = "pos.session.read";
    pub const POS_SESSION_OPEN: &str = "pos.session.open";
    pub const POS_SESSION_CLOSE: &str = "pos.session.close";
    pub const POS_SALE_READ: &str = "pos.transaction.read";
    pub const POS_SALE_CREATE: &str = "pos.transaction.create";
    pub const POS_SALE_VOID: &str = "pos.transaction.void";

    pub const LOYALTY_READ: &str = "loyalty.program.read";
    pub const LOYALTY_MANAGE: &str = "loyalty.program.manage";
    pub const LOYALTY_ADJUST: &str = "loyalty.account.adjust";

    pub const DISCOUNT_READ: &str = "discounts.rule.read";
    pub const DISCOUNT_MANAGE: &str = "discounts.rule.manage";

    pub const REPORT_FINANCIAL: &str = "reports.financial.read";
    pub const REPORT_GST: &str = "reports.gst.read";
}

// =============================================================================
// Permission
// =============================================================================

/// A granted permission, possibly with wildcard segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Parses `module.resource.action`. Each segment is lower-case letters
    /// and underscores, or `*`. Fewer than three segments are allowed only
    /// when the last one is `*`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let segments: Vec<&str> = raw.split('.').collect();

        let bad = || ValidationError::invalid_format("permission", format!("'{}' is not module.resource.action", raw));

        if segments.is_empty() || segments.len() > 3 {
            return Err(bad());
        }
        for seg in &segments {
            let ok = *seg == "*" || (!seg.is_empty() && seg.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
            if !ok {
                return Err(bad());
            }
        }
        if segments.len() < 3 && segments.last() != Some(&"*") {
            return Err(bad());
        }
        Ok(Permission(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this grant covers `required` (a concrete permission).
    pub fn allows(&self, required: &str) -> bool {
        let granted: Vec<&str> = self.0.split('.').collect();
        let wanted: Vec<&str> = required.split('.').collect();

        for (idx, seg) in granted.iter().enumerate() {
            let is_last = idx == granted.len() - 1;
            match wanted.get(idx) {
                // A trailing `*` covers everything below it.
                _ if *seg == "*" && is_last => return true,
                Some(w) if *seg == "*" || seg == w => continue,
                _ => return false,
            }
        }
        granted.len() == wanted.len()
    }
}

impl TryFrom<String> for Permission {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Permission::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a user has been granted through their roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(Vec<Permission>);

impl PermissionSet {
    pub fn new(perms: Vec<Permission>) -> Self {
        PermissionSet(perms)
    }

    /// Builds a set from stored strings, skipping anything malformed.
    pub fn from_strings<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PermissionSet(raw.into_iter().filter_map(|s| Permission::parse(s.as_ref()).ok()).collect())
    }

    pub fn allows(&self, required: &str) -> bool {
        self.0.iter().any(|p| p.allows(required))
    }

    /// `PermissionDenied` unless `required` is granted.
    pub fn require(&self, required: &str) -> CoreResult<()> {
        if self.allows(required) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied(required.to_string()))
        }
    }

    pub fn as_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.0.clone()).collect()
    }
}

// =============================================================================
// Roles
// =============================================================================

/// A role every company starts with.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinRole {
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: &'static [&'static str],
}

pub const ADMIN_ROLE: &str = "admin";

pub fn builtin_roles() -> &'static [BuiltinRole] {
    use perms::*;

    const ROLES: &[BuiltinRole] = &[
        BuiltinRole {
            name: ADMIN_ROLE,
            description: "Full access",
            permissions: &["*"],
        },
        BuiltinRole {
            name: "accountant",
            description: "Books, parties and reports",
            permissions: &[
                "accounts.*",
                "parties.*",
                "reports.*",
                "sales.*.read",
                "purchase.*.read",
                "sales.receipt.create",
                "purchase.payment.create",
                COMPANY_READ,
            ],
        },
        BuiltinRole {
            name: "sales_manager",
            description: "Sales, customers, discounts and loyalty",
            permissions: &[
                "sales.*",
                "parties.*",
                "discounts.*",
                "loyalty.*",
                ITEM_READ,
                POS_SESSION_READ,
                POS_SALE_READ,
                POS_SALE_VOID,
            ],
        },
        BuiltinRole {
            name: "cashier",
            description: "Counter sales",
            permissions: &[
                POS_SESSION_OPEN,
                POS_SESSION_CLOSE,
                POS_SESSION_READ,
                POS_SALE_CREATE,
                POS_SALE_READ,
                ITEM_READ,
                PARTY_READ,
                LOYALTY_READ,
                DISCOUNT_READ,
            ],
        },
        BuiltinRole {
            name: "purchase_manager",
            description: "Purchases, suppliers and stock",
            permissions: &["purchase.*", "parties.*", "inventory.*"],
        },
    ];
    ROLES
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Role {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_builtin: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub company_id: String,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub password_hash: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Usernames: 3-32 lower-case letters, digits, dots, underscores.
pub fn normalize_username(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim().to_ascii_lowercase();
    if name.len() < 3 || name.len() > 32 {
        return Err(ValidationError::OutOfRange {
            field: "username length".to_string(),
            min: 3,
            max: 32,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_') {
        return Err(ValidationError::invalid_format(
            "username",
            "only letters, digits, dots and underscores",
        ));
    }
    Ok(name)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Permission {
        Permission::parse(s).unwrap()
    }

    #[test]
    fn test_parse() {
        assert!(Permission::parse("sales.invoice.post").is_ok());
        assert!(Permission::parse("*").is_ok());
        assert!(Permission::parse("sales.*").is_ok());
        assert!(Permission::parse("*.*.read").is_ok());
        assert!(Permission::parse("sales.invoice").is_err());
        assert!(Permission::parse("Sales.Invoice.Post").is_err());
        assert!(Permission::parse("a.b.c.d").is_err());
        assert!(Permission::parse("sales..post").is_err());
    }

    #[test]
    fn test_wildcards() {
        assert!(p("*").allows(perms::INVOICE_POST));
        assert!(p("sales.*").allows(perms::INVOICE_POST));
        assert!(!p("sales.*").allows(perms::BILL_POST));
        assert!(p("*.*.read").allows(perms::BILL_READ));
        assert!(!p("*.*.read").allows(perms::BILL_POST));
        assert!(p("pos.transaction.*").allows(perms::POS_SALE_VOID));
        assert!(p("sales.invoice.post").allows("sales.invoice.post"));
        assert!(!p("sales.invoice.post").allows("sales.invoice.cancel"));
    }

    #[test]
    fn test_permission_set_require() {
        let set = PermissionSet::from_strings(["pos.session.open", "not a permission"]);
        assert_eq!(set.as_strings(), vec!["pos.session.open".to_string()]);
        assert!(set.require(perms::POS_SESSION_OPEN).is_ok());
        assert!(matches!(
            set.require(perms::POS_SALE_VOID),
            Err(CoreError::PermissionDenied(ref s)) if s == "pos.transaction.void"
        ));
    }

    #[test]
    fn test_builtin_roles_parse() {
        for role in builtin_roles() {
            for perm in role.permissions {
                assert!(Permission::parse(perm).is_ok(), "{} in {}", perm, role.name);
            }
        }
    }

    #[test]
    fn test_cashier_cannot_void() {
        let cashier = builtin_roles().iter().find(|r| r.name == "cashier").unwrap();
        let set = PermissionSet::from_strings(cashier.permissions.iter().copied());
        assert!(set.allows(perms::POS_SALE_CREATE));
        assert!(!set.allows(perms::POS_SALE_VOID));
        assert!(!set.allows(perms::JOURNAL_CREATE));
    }

    #[test]
    fn test_user_hash_not_serialized() {
        let user = User {
            id: "u".to_string(),
            company_id: "co".to_string(),
            username: "owner".to_string(),
            full_name: "Owner".to_string(),
            email: None,
            password_hash: "$argon2id$secret".to_string(),
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username(" Owner.1 ").unwrap(), "owner.1");
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username("has space").is_err());
    }
}
