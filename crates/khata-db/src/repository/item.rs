//! # Item Repository
//!
//! Items and their stock. Every change to `current_stock` goes through
//! [`apply_movement`], which writes a `stock_movements` row next to it:
//!
//! ```text
//! posted sales invoice   RICE-5KG  -3   sale          INV/2025-26/0001
//! posted purchase bill   RICE-5KG  +50  purchase      BILL/2025-26/0001
//! POS sale               RICE-5KG  -1   pos_sale      POS/2025-26/000001
//! cancelled invoice      RICE-5KG  +3   cancellation  INV/2025-26/0001
//! manual count           RICE-5KG  -2   adjustment    "damaged in transit"
//! ```

use chrono::Utc;
use khata_core::validation::{validate_gst_rate, validate_hsn, validate_name, validate_price_paise, validate_sku};
use khata_core::{CoreError, Item, Money, StockMovement, StockReason, TaxRate};
use serde::Deserialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{audit, begin_write, new_id, page_limit, refused};
use crate::error::{DbError, DbResult};

const SELECT_ITEM: &str = r#"
    SELECT id, company_id, sku, name, hsn_code, unit, sale_price, purchase_price, tax_rate,
           track_inventory, allow_negative_stock, current_stock, is_active, created_at, updated_at
    FROM items
"#;

fn default_unit() -> String {
    "NOS".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub hsn_code: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub sale_price: Money,
    #[serde(default)]
    pub purchase_price: Money,
    pub tax_rate: TaxRate,
    #[serde(default = "default_true")]
    pub track_inventory: bool,
    #[serde(default)]
    pub allow_negative_stock: bool,
    /// Recorded as an adjustment movement.
    #[serde(default)]
    pub opening_stock: i64,
}

/// SKU and stock tracking are fixed once created.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemUpdate {
    pub name: String,
    #[serde(default)]
    pub hsn_code: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub sale_price: Money,
    pub purchase_price: Money,
    pub tax_rate: TaxRate,
    #[serde(default)]
    pub allow_negative_stock: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFilter {
    /// Case-insensitive match on SKU or name.
    pub search: Option<String>,
    #[serde(default)]
    pub active_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustment {
    /// Signed: positive adds stock.
    pub quantity: i64,
    pub reason: String,
}

struct ItemFields {
    name: String,
    hsn_code: Option<String>,
    unit: String,
}

fn validate_fields(
    name: &str,
    hsn_code: &Option<String>,
    unit: &str,
    sale_price: Money,
    purchase_price: Money,
    tax_rate: TaxRate,
) -> DbResult<ItemFields> {
    let name = validate_name("name", name, 120)?;
    let hsn_code = match hsn_code.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => {
            validate_hsn(h)?;
            Some(h.to_string())
        }
        None => None,
    };
    let unit = validate_name("unit", unit, 8)?.to_ascii_uppercase();
    validate_price_paise(sale_price.paise())?;
    validate_price_paise(purchase_price.paise())?;
    validate_gst_rate(tax_rate)?;
    Ok(ItemFields { name, hsn_code, unit })
}

pub async fn get_in(conn: &mut SqliteConnection, company_id: &str, id: &str) -> DbResult<Item> {
    sqlx::query_as::<_, Item>(&format!("{} WHERE company_id = ?1 AND id = ?2", SELECT_ITEM))
        .bind(company_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Item", id))
}

/// Changes stock by a signed quantity and records the movement.
///
/// Items that do not track inventory are left untouched. Removing more than
/// is on hand fails with `InsufficientStock` unless the item allows
/// negative stock.
pub async fn apply_movement(
    conn: &mut SqliteConnection,
    company_id: &str,
    item_id: &str,
    quantity: i64,
    reason: StockReason,
    reference_id: Option<&str>,
    note: Option<&str>,
) -> DbResult<Item> {
    let item = get_in(conn, company_id, item_id).await?;
    if !item.track_inventory || quantity == 0 {
        return Ok(item);
    }
    if quantity < 0 && !item.can_sell(-quantity) {
        return Err(CoreError::InsufficientStock {
            sku: item.sku,
            available: item.current_stock,
            requested: -quantity,
        }
        .into());
    }

    let now = Utc::now();
    sqlx::query("UPDATE items SET current_stock = current_stock + ?1, updated_at = ?2 WHERE company_id = ?3 AND id = ?4")
        .bind(quantity)
        .bind(now)
        .bind(company_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_movements (id, company_id, item_id, quantity, reason, reference_id, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(new_id())
    .bind(company_id)
    .bind(item_id)
    .bind(quantity)
    .bind(reason)
    .bind(reference_id)
    .bind(note)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(sku = %item.sku, quantity, ?reason, "Stock moved");
    get_in(conn, company_id, item_id).await
}

#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    pub async fn create(&self, company_id: &str, actor: &str, input: &NewItem) -> DbResult<Item> {
        let sku = input.sku.trim().to_ascii_uppercase();
        validate_sku(&sku)?;
        let fields = validate_fields(
            &input.name,
            &input.hsn_code,
            &input.unit,
            input.sale_price,
            input.purchase_price,
            input.tax_rate,
        )?;
        if input.opening_stock < 0 {
            return Err(khata_core::ValidationError::MustBePositive {
                field: "opening_stock".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let item = Item {
            id: new_id(),
            company_id: company_id.to_string(),
            sku,
            name: fields.name,
            hsn_code: fields.hsn_code,
            unit: fields.unit,
            sale_price: input.sale_price,
            purchase_price: input.purchase_price,
            tax_rate: input.tax_rate,
            track_inventory: input.track_inventory,
            allow_negative_stock: input.allow_negative_stock,
            current_stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = begin_write(&self.pool).await?;
        sqlx::query(
            r#"
            INSERT INTO items (id, company_id, sku, name, hsn_code, unit, sale_price, purchase_price, tax_rate,
                               track_inventory, allow_negative_stock, current_stock, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, 1, ?12, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.company_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.hsn_code)
        .bind(&item.unit)
        .bind(item.sale_price)
        .bind(item.purchase_price)
        .bind(item.tax_rate)
        .bind(item.track_inventory)
        .bind(item.allow_negative_stock)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("sku", &item.sku),
            other => other,
        })?;

        let item = if input.opening_stock > 0 && item.track_inventory {
            apply_movement(
                &mut tx,
                company_id,
                &item.id,
                input.opening_stock,
                StockReason::Adjustment,
                None,
                Some("opening stock"),
            )
            .await?
        } else {
            item
        };

        audit::record(&mut tx, company_id, actor, "item.create", "item", &item.id, &item).await?;
        tx.commit().await?;

        info!(company_id = %company_id, sku = %item.sku, "Item created");
        Ok(item)
    }

    pub async fn get(&self, company_id: &str, id: &str) -> DbResult<Item> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, company_id, id).await
    }

    pub async fn list(&self, company_id: &str, filter: &ItemFilter) -> DbResult<Vec<Item>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let items = sqlx::query_as::<_, Item>(&format!(
            r#"{}
            WHERE company_id = ?1
              AND (?2 IS NULL OR lower(sku) LIKE ?2 OR lower(name) LIKE ?2)
              AND (?3 = 0 OR is_active = 1)
            ORDER BY name
            LIMIT ?4 OFFSET ?5
            "#,
            SELECT_ITEM
        ))
        .bind(company_id)
        .bind(search)
        .bind(filter.active_only)
        .bind(page_limit(filter.limit))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn update(&self, company_id: &str, actor: &str, id: &str, input: &ItemUpdate) -> DbResult<Item> {
        let fields = validate_fields(
            &input.name,
            &input.hsn_code,
            &input.unit,
            input.sale_price,
            input.purchase_price,
            input.tax_rate,
        )?;

        let mut tx = begin_write(&self.pool).await?;
        let before = get_in(&mut tx, company_id, id).await?;

        sqlx::query(
            r#"
            UPDATE items
            SET name = ?1, hsn_code = ?2, unit = ?3, sale_price = ?4, purchase_price = ?5, tax_rate = ?6,
                allow_negative_stock = ?7, is_active = ?8, updated_at = ?9
            WHERE company_id = ?10 AND id = ?11
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.hsn_code)
        .bind(&fields.unit)
        .bind(input.sale_price)
        .bind(input.purchase_price)
        .bind(input.tax_rate)
        .bind(input.allow_negative_stock)
        .bind(input.is_active)
        .bind(Utc::now())
        .bind(company_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let after = get_in(&mut tx, company_id, id).await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "item.update",
            "item",
            id,
            &json!({ "before": before, "after": after }),
        )
        .await?;
        tx.commit().await?;

        Ok(after)
    }

    /// Manual stock correction with a mandatory reason.
    pub async fn adjust_stock(
        &self,
        company_id: &str,
        actor: &str,
        id: &str,
        input: &StockAdjustment,
    ) -> DbResult<Item> {
        let reason = validate_name("reason", &input.reason, 200)?;
        if input.quantity == 0 {
            return Err(khata_core::ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        let mut tx = begin_write(&self.pool).await?;
        let before = get_in(&mut tx, company_id, id).await?;
        if !before.track_inventory {
            return Err(refused("Item", &before.sku, "not stock tracked", "adjust stock"));
        }

        let item = apply_movement(&mut tx, company_id, id, input.quantity, StockReason::Adjustment, None, Some(&reason))
            .await?;
        audit::record(
            &mut tx,
            company_id,
            actor,
            "stock.adjust",
            "item",
            id,
            &json!({
                "sku": item.sku,
                "quantity": input.quantity,
                "reason": reason,
                "before": before.current_stock,
                "after": item.current_stock,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(company_id = %company_id, sku = %item.sku, quantity = input.quantity, "Stock adjusted");
        Ok(item)
    }

    /// Stock movements of an item, newest first.
    pub async fn movements(&self, company_id: &str, id: &str, limit: Option<i64>) -> DbResult<Vec<StockMovement>> {
        self.get(company_id, id).await?;
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, company_id, item_id, quantity, reason, reference_id, note, created_at
            FROM stock_movements
            WHERE company_id = ?1 AND item_id = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
        )
        .bind(company_id)
        .bind(id)
        .bind(page_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{rice, setup};

    #[tokio::test]
    async fn test_create_with_opening_stock() {
        let (db, company, admin) = setup().await;
        let item = db.items().create(&company.id, &admin.id, &rice(10)).await.unwrap();
        assert_eq!(item.sku, "RICE-5KG");
        assert_eq!(item.current_stock, 10);

        let movements = db.items().movements(&company.id, &item.id, None).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].reason, StockReason::Adjustment);
    }

    #[tokio::test]
    async fn test_non_slab_rate_rejected() {
        let (db, company, admin) = setup().await;
        let mut input = rice(0);
        input.tax_rate = TaxRate::from_percent(7);
        assert!(db.items().create(&company.id, &admin.id, &input).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_sku() {
        let (db, company, admin) = setup().await;
        db.items().create(&company.id, &admin.id, &rice(0)).await.unwrap();
        let again = db.items().create(&company.id, &admin.id, &rice(0)).await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_adjustment_cannot_go_negative() {
        let (db, company, admin) = setup().await;
        let item = db.items().create(&company.id, &admin.id, &rice(2)).await.unwrap();

        let result = db
            .items()
            .adjust_stock(
                &company.id,
                &admin.id,
                &item.id,
                &StockAdjustment {
                    quantity: -3,
                    reason: "damaged".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::InsufficientStock { available: 2, requested: 3, .. }))));

        let item = db
            .items()
            .adjust_stock(
                &company.id,
                &admin.id,
                &item.id,
                &StockAdjustment {
                    quantity: -2,
                    reason: "damaged".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(item.current_stock, 0);
    }

    #[tokio::test]
    async fn test_update_and_search() {
        let (db, company, admin) = setup().await;
        let item = db.items().create(&company.id, &admin.id, &rice(0)).await.unwrap();
        let updated = db
            .items()
            .update(
                &company.id,
                &admin.id,
                &item.id,
                &ItemUpdate {
                    name: "Basmati Rice 5kg Premium".to_string(),
                    hsn_code: Some("1006".to_string()),
                    unit: "bag".to_string(),
                    sale_price: Money::from_paise(70_000),
                    purchase_price: Money::from_paise(55_000),
                    tax_rate: TaxRate::from_percent(5),
                    allow_negative_stock: false,
                    is_active: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.unit, "BAG");
        assert_eq!(updated.sale_price.paise(), 70_000);

        let found = db
            .items()
            .list(
                &company.id,
                &ItemFilter {
                    search: Some("premium".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
