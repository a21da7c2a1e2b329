//! # Discount Repository
//!
//! Discount rules and the coupons that carry them. A coupon is redeemed
//! inside the POS sale transaction; voiding the sale gives the use back.

use chrono::{NaiveDate, Utc};
use khata_core::discount::{
    best_discount, normalize_code, validate_rule, Coupon, CouponQuote, DiscountKind, DiscountRule,
};
use khata_core::validation::validate_name;
use khata_core::{CoreError, Money};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{audit, begin_write, new_id};
use crate::error::{DbError, DbResult};

const SELECT_RULE: &str = r#"
    SELECT id, company_id, name, kind, value, min_order, max_discount, valid_from, valid_until, is_active, created_at
    FROM discount_rules
"#;

const SELECT_COUPON: &str = r#"
    SELECT id, company_id, code, rule_id, usage_limit, used_count, per_customer_limit, is_active, created_at
    FROM coupons
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct NewDiscountRule {
    pub name: String,
    pub kind: DiscountKind,
    /// Basis points for percentage rules, paise for flat ones.
    pub value: i64,
    #[serde(default)]
    pub min_order: Money,
    #[serde(default)]
    pub max_discount: Option<Money>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub rule_id: String,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub per_customer_limit: Option<i64>,
}

/// The automatic rule that would apply to an order.
#[derive(Debug, Clone, Serialize)]
pub struct BestDiscount {
    pub rule: DiscountRule,
    pub discount: Money,
}

pub async fn get_rule_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<DiscountRule> {
    sqlx::query_as::<_, DiscountRule>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_RULE))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Discount rule", id))
}

/// Validates a coupon for an order of `order_total` on `date`.
pub async fn quote_in(
    conn: &mut SqliteConnection,
    company_id: &str,
    code: &str,
    order_total: Money,
    customer_id: Option<&str>,
    date: NaiveDate,
) -> DbResult<(Coupon, CouponQuote)> {
    let code = normalize_code(code)?;
    let coupon = sqlx::query_as::<_, Coupon>(&format!("{} WHERE company_id = ?1 AND code = ?2", SELECT_COUPON))
        .bind(company_id)
        .bind(&code)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Coupon", &code))?;

    let customer_uses: i64 = match customer_id {
        Some(party_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = ?1 AND party_id = ?2")
                .bind(&coupon.id)
                .bind(party_id)
                .fetch_one(&mut *conn)
                .await?
        }
        None => 0,
    };
    coupon.check_redeemable(customer_uses)?;

    let rule = get_rule_in(conn, company_id, &coupon.rule_id).await?;
    let discount = rule.discount_for(order_total, date)?;

    let quote = CouponQuote {
        code: coupon.code.clone(),
        rule_name: rule.name,
        discount,
    };
    Ok((coupon, quote))
}

/// Counts one use of the coupon against a POS sale.
pub async fn redeem_in(
    conn: &mut SqliteConnection,
    coupon: &Coupon,
    party_id: Option<&str>,
    transaction_id: &str,
) -> DbResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE coupons SET used_count = used_count + 1
        WHERE id = ?1 AND (usage_limit IS NULL OR used_count < usage_limit)
        "#,
    )
    .bind(&coupon.id)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() != 1 {
        return Err(CoreError::DiscountNotApplicable {
            reason: format!("coupon {} has been fully used", coupon.code),
        }
        .into());
    }

    sqlx::query("INSERT INTO coupon_redemptions (id, coupon_id, party_id, transaction_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)")
        .bind(new_id())
        .bind(&coupon.id)
        .bind(party_id)
        .bind(transaction_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Gives back the coupon use of a voided sale, if it had one.
pub async fn release_in(conn: &mut SqliteConnection, transaction_id: &str) -> DbResult<()> {
    let coupon_id: Option<String> = sqlx::query_scalar("SELECT coupon_id FROM coupon_redemptions WHERE transaction_id = ?1")
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(coupon_id) = coupon_id else {
        return Ok(());
    };

    sqlx::query("UPDATE coupons SET used_count = used_count - 1 WHERE id = ?1 AND used_count > 0")
        .bind(&coupon_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM coupon_redemptions WHERE transaction_id = ?1")
        .bind(transaction_id)
        .execute(&mut *conn)
        .await?;
    debug!(coupon_id = %coupon_id, transaction_id = %transaction_id, "Coupon use released");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: SqlitePool,
}

impl DiscountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DiscountRepository { pool }
    }

    pub async fn create_rule(&self, company_id: &str, actor: &str, input: &NewDiscountRule) -> DbResult<DiscountRule> {
        let name = validate_name("name", &input.name, 80)?;
        validate_rule(
            input.kind,
            input.value,
            input.min_order,
            input.max_discount,
            input.valid_from,
            input.valid_until,
        )?;

        let rule = DiscountRule {
            id: new_id(),
            company_id: company_id.to_string(),
            name,
            kind: input.kind,
            value: input.value,
            min_order: input.min_order,
            max_discount: input.max_discount,
            valid_from: input.valid_from,
            valid_until: input.valid_until,
            is_active: true,
            created_at: Utc::now(),
        };

        let mut tx = begin_write(&self.pool).await?;
        sqlx::query(
            r#"
            INSERT INTO discount_rules (id, company_id, name, kind, value, min_order, max_discount, valid_from, valid_until, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.company_id)
        .bind(&rule.name)
        .bind(rule.kind)
        .bind(rule.value)
        .bind(rule.min_order)
        .bind(rule.max_discount)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .bind(rule.created_at)
        .execute(&mut *tx)
        .await?;
        audit::record(&mut tx, company_id, actor, "discount_rule.create", "discount_rule", &rule.id, &rule).await?;
        tx.commit().await?;

        info!(company_id = %company_id, rule = %rule.name, "Discount rule created");
        Ok(rule)
    }

    pub async fn list_rules(&self, company_id: &str) -> DbResult<Vec<DiscountRule>> {
        let rules = sqlx::query_as::<_, DiscountRule>(&format!("{} WHERE company_id = ?1 ORDER BY name", SELECT_RULE))
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rules)
    }

    pub async fn get_rule(&self, company_id: &str, id: &str) -> DbResult<DiscountRule> {
        let mut conn = self.pool.acquire().await?;
        get_rule_in(&mut conn, company_id, id).await
    }

    pub async fn set_rule_active(&self, company_id: &str, actor: &str, id: &str, active: bool) -> DbResult<DiscountRule> {
        let mut tx = begin_write(&self.pool).await?;
        get_rule_in(&mut tx, company_id, id).await?;
        sqlx::query("UPDATE discount_rules SET is_active = ?1 WHERE company_id = ?2 AND id = ?3")
            .bind(active)
            .bind(company_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        audit::record(&mut tx, company_id, actor, "discount_rule.set_active", "discount_rule", id, &json!({ "is_active": active }))
            .await?;
        let rule = get_rule_in(&mut tx, company_id, id).await?;
        tx.commit().await?;
        Ok(rule)
    }

    /// Best rule not tied to any coupon. Coupon rules only apply through
    /// their code.
    pub async fn best_automatic(&self, company_id: &str, order_total: Money, date: NaiveDate) -> DbResult<Option<BestDiscount>> {
        let rules = sqlx::query_as::<_, DiscountRule>(&format!(
            r#"{}
            WHERE company_id = ?1 AND is_active = 1
              AND NOT EXISTS (SELECT 1 FROM coupons c WHERE c.rule_id = discount_rules.id)
            "#,
            SELECT_RULE
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(best_discount(&rules, order_total, date).map(|(rule, discount)| BestDiscount {
            rule: rule.clone(),
            discount,
        }))
    }

    pub async fn create_coupon(&self, company_id: &str, actor: &str, input: &NewCoupon) -> DbResult<Coupon> {
        let code = normalize_code(&input.code)?;
        for (field, limit) in [("usage_limit", input.usage_limit), ("per_customer_limit", input.per_customer_limit)] {
            if matches!(limit, Some(n) if n <= 0) {
                return Err(khata_core::ValidationError::MustBePositive {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let mut tx = begin_write(&self.pool).await?;
        get_rule_in(&mut tx, company_id, &input.rule_id).await?;

        let coupon = Coupon {
            id: new_id(),
            company_id: company_id.to_string(),
            code,
            rule_id: input.rule_id.clone(),
            usage_limit: input.usage_limit,
            used_count: 0,
            per_customer_limit: input.per_customer_limit,
            is_active: true,
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO coupons (id, company_id, code, rule_id, usage_limit, used_count, per_customer_limit, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 1, ?7)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.company_id)
        .bind(&coupon.code)
        .bind(&coupon.rule_id)
        .bind(coupon.usage_limit)
        .bind(coupon.per_customer_limit)
        .bind(coupon.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("coupon code", &coupon.code),
            other => other,
        })?;
        audit::record(&mut tx, company_id, actor, "coupon.create", "coupon", &coupon.id, &coupon).await?;
        tx.commit().await?;

        info!(company_id = %company_id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    pub async fn list_coupons(&self, company_id: &str) -> DbResult<Vec<Coupon>> {
        let coupons = sqlx::query_as::<_, Coupon>(&format!("{} WHERE company_id = ?1 ORDER BY code", SELECT_COUPON))
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(coupons)
    }

    pub async fn set_coupon_active(&self, company_id: &str, actor: &str, id: &str, active: bool) -> DbResult<Coupon> {
        let mut tx = begin_write(&self.pool).await?;
        let updated = sqlx::query("UPDATE coupons SET is_active = ?1 WHERE company_id = ?2 AND id = ?3")
            .bind(active)
            .bind(company_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", id));
        }
        audit::record(&mut tx, company_id, actor, "coupon.set_active", "coupon", id, &json!({ "is_active": active })).await?;
        let coupon = sqlx::query_as::<_, Coupon>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_COUPON))
            .bind(company_id)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(coupon)
    }

    /// Checks a coupon without using it up.
    pub async fn quote(
        &self,
        company_id: &str,
        code: &str,
        order_total: Money,
        customer_id: Option<&str>,
        date: NaiveDate,
    ) -> DbResult<CouponQuote> {
        let mut conn = self.pool.acquire().await?;
        let (_, quote) = quote_in(&mut conn, company_id, code, order_total, customer_id, date).await?;
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{date, setup};

    fn ten_percent() -> NewDiscountRule {
        NewDiscountRule {
            name: "Diwali 10%".to_string(),
            kind: DiscountKind::Percentage,
            value: 1_000,
            min_order: Money::from_paise(50_000),
            max_discount: Some(Money::from_paise(20_000)),
            valid_from: Some(date(2025, 10, 1)),
            valid_until: Some(date(2025, 10, 31)),
        }
    }

    #[tokio::test]
    async fn test_coupon_quote() {
        let (db, company, admin) = setup().await;
        let rule = db.discounts().create_rule(&company.id, &admin.id, &ten_percent()).await.unwrap();
        db.discounts()
            .create_coupon(
                &company.id,
                &admin.id,
                &NewCoupon {
                    code: "diwali10".to_string(),
                    rule_id: rule.id.clone(),
                    usage_limit: Some(100),
                    per_customer_limit: Some(1),
                },
            )
            .await
            .unwrap();

        let quote = db
            .discounts()
            .quote(&company.id, "DIWALI10", Money::from_paise(100_000), None, date(2025, 10, 20))
            .await
            .unwrap();
        assert_eq!(quote.discount.paise(), 10_000);
        assert_eq!(quote.rule_name, "Diwali 10%");

        let expired = db
            .discounts()
            .quote(&company.id, "diwali10", Money::from_paise(100_000), None, date(2025, 11, 20))
            .await;
        assert!(matches!(expired, Err(DbError::Domain(CoreError::DiscountNotApplicable { .. }))));

        let unknown = db
            .discounts()
            .quote(&company.id, "NOPE1234", Money::from_paise(100_000), None, date(2025, 10, 20))
            .await;
        assert!(matches!(unknown, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invalid_rule_rejected() {
        let (db, company, admin) = setup().await;
        let mut input = ten_percent();
        input.value = 12_000;
        assert!(db.discounts().create_rule(&company.id, &admin.id, &input).await.is_err());
    }

    #[tokio::test]
    async fn test_best_automatic_skips_coupon_rules() {
        let (db, company, admin) = setup().await;
        let coupon_rule = db.discounts().create_rule(&company.id, &admin.id, &ten_percent()).await.unwrap();
        db.discounts()
            .create_coupon(
                &company.id,
                &admin.id,
                &NewCoupon {
                    code: "DIWALI10".to_string(),
                    rule_id: coupon_rule.id,
                    usage_limit: None,
                    per_customer_limit: None,
                },
            )
            .await
            .unwrap();
        let flat = db
            .discounts()
            .create_rule(
                &company.id,
                &admin.id,
                &NewDiscountRule {
                    name: "₹50 off".to_string(),
                    kind: DiscountKind::Flat,
                    value: 5_000,
                    min_order: Money::zero(),
                    max_discount: None,
                    valid_from: None,
                    valid_until: None,
                },
            )
            .await
            .unwrap();

        let best = db
            .discounts()
            .best_automatic(&company.id, Money::from_paise(100_000), date(2025, 10, 20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.rule.id, flat.id);
        assert_eq!(best.discount.paise(), 5_000);
    }
}
