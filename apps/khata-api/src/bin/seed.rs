//! # Demo Company Seeder
//!
//! Populates a database with one demo company for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./khata_dev.db
//! cargo run -p khata-api --bin seed
//!
//! # Specify database path and admin password
//! cargo run -p khata-api --bin seed -- --db ./data/khata.db --password s3cret-pass
//! ```
//!
//! ## Generated Data
//! - Company "Annapurna Kirana Stores" registered in Maharashtra
//! - Users `owner` (admin) and `counter1` (cashier), same password
//! - A grocery catalogue across the 0%, 5%, 12% and 18% GST slabs
//! - Two customers and two suppliers, one of each with a GSTIN
//! - An active loyalty program with a Gold tier
//! - A 10% festive rule behind coupon `DIWALI10`

use std::env;

use khata_api::auth::{hash_password, validate_password};
use khata_api::today_ist;
use khata_core::discount::DiscountKind;
use khata_core::loyalty::{LoyaltyProgram, LoyaltyTier};
use khata_core::{Money, PartyKind, TaxRate};
use khata_db::repository::company::CompanySignup;
use khata_db::repository::discount::{NewCoupon, NewDiscountRule};
use khata_db::repository::item::NewItem;
use khata_db::repository::party::NewParty;
use khata_db::repository::user::NewUser;
use khata_db::{Database, DbConfig};

/// (SKU, name, HSN, unit, sale price in paise, GST %, opening stock)
const CATALOGUE: &[(&str, &str, &str, &str, i64, u32, i64)] = &[
    ("ATTA-10KG", "Whole Wheat Atta 10kg", "1101", "bag", 48_000, 5, 40),
    ("RICE-SONA-5KG", "Sona Masoori Rice 5kg", "1006", "bag", 39_500, 5, 60),
    ("TOOR-1KG", "Toor Dal 1kg", "0713", "pkt", 16_500, 0, 80),
    ("SUGAR-1KG", "Sugar 1kg", "1701", "pkt", 4_800, 5, 120),
    ("OIL-SUN-1L", "Sunflower Oil 1L", "1512", "btl", 15_500, 5, 70),
    ("GHEE-500ML", "Cow Ghee 500ml", "0405", "jar", 34_000, 12, 30),
    ("TEA-500G", "Assam Tea 500g", "0902", "pkt", 27_000, 5, 50),
    ("BISCUIT-GLU", "Glucose Biscuits 800g", "1905", "pkt", 12_000, 18, 90),
    ("SOAP-4PK", "Neem Soap 4-pack", "3401", "pack", 16_000, 18, 45),
    ("MILK-500ML", "Toned Milk 500ml", "0401", "pkt", 2_800, 0, 100),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = "./khata_dev.db".to_string();
    let mut password = "khata-demo-123".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--password" | "-p" => {
                if i + 1 < args.len() {
                    password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Khata Demo Company Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>          Database file path (default: ./khata_dev.db)");
                println!("  -p, --password <PASS>    Password for the demo users (default: khata-demo-123)");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }
    validate_password(&password)?;

    println!("🌱 Khata Demo Company Seeder");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let hash = hash_password(&password)?;
    let (company, admin) = db
        .companies()
        .signup(
            &CompanySignup {
                name: "Annapurna Kirana Stores".to_string(),
                gstin: Some("27AAPFU0939F1ZV".to_string()),
                state_code: None,
                admin_username: "owner".to_string(),
                admin_full_name: "Sunita Deshpande".to_string(),
                admin_email: Some("owner@annapurna.example".to_string()),
            },
            &hash,
            today_ist(),
        )
        .await?;
    println!("✓ Company {} ({})", company.name, company.id);

    db.users()
        .create(
            &company.id,
            &admin.id,
            &NewUser {
                username: "counter1".to_string(),
                full_name: "Imran Shaikh".to_string(),
                email: None,
                roles: vec!["cashier".to_string()],
            },
            &hash,
        )
        .await?;
    println!("✓ Users: owner (admin), counter1 (cashier)");

    for (sku, name, hsn, unit, price, gst, stock) in CATALOGUE {
        let item = NewItem {
            sku: sku.to_string(),
            name: name.to_string(),
            hsn_code: Some(hsn.to_string()),
            unit: unit.to_string(),
            sale_price: Money::from_paise(*price),
            // Bought at 80% of the selling price
            purchase_price: Money::from_paise(price * 80 / 100),
            tax_rate: TaxRate::from_percent(*gst),
            track_inventory: true,
            allow_negative_stock: false,
            opening_stock: *stock,
        };
        if let Err(e) = db.items().create(&company.id, &admin.id, &item).await {
            eprintln!("Failed to insert {}: {}", sku, e);
        }
    }
    println!("✓ {} items", CATALOGUE.len());

    let parties = [
        (PartyKind::Customer, "Hotel Sai Prasad", Some("27AAACH1234K1Z2"), Some("9822012345")),
        (PartyKind::Customer, "Priya Joshi", None, Some("9890098900")),
        (PartyKind::Supplier, "Deccan Grain Traders", Some("27AABCD5678L1Z9"), None),
        (PartyKind::Supplier, "Karnataka Oil Mills", None, Some("9845011122")),
    ];
    let party_count = parties.len();
    for (kind, name, gstin, phone) in parties {
        let party = NewParty {
            kind,
            name: name.to_string(),
            gstin: gstin.map(str::to_string),
            state_code: if gstin.is_some() { None } else { Some(27) },
            phone: phone.map(str::to_string),
            email: None,
        };
        if let Err(e) = db.parties().create(&company.id, &admin.id, &party).await {
            eprintln!("Failed to insert {}: {}", name, e);
        }
    }
    println!("✓ {} parties", party_count);

    db.loyalty()
        .save_program(
            &company.id,
            &admin.id,
            &LoyaltyProgram {
                earn_points_per_100: 1,
                point_value_paise: 100,
                min_redeem_points: 50,
                max_redeem_bps: 2_000,
                is_active: true,
                tiers: vec![LoyaltyTier {
                    name: "Gold".to_string(),
                    min_lifetime_points: 2_000,
                    multiplier_bps: 15_000,
                }],
            },
        )
        .await?;
    println!("✓ Loyalty program");

    let rule = db
        .discounts()
        .create_rule(
            &company.id,
            &admin.id,
            &NewDiscountRule {
                name: "Diwali 10%".to_string(),
                kind: DiscountKind::Percentage,
                value: 1_000,
                min_order: Money::from_paise(100_000),
                max_discount: Some(Money::from_paise(25_000)),
                valid_from: None,
                valid_until: None,
            },
        )
        .await?;
    db.discounts()
        .create_coupon(
            &company.id,
            &admin.id,
            &NewCoupon {
                code: "DIWALI10".to_string(),
                rule_id: rule.id.clone(),
                usage_limit: Some(500),
                per_customer_limit: Some(1),
            },
        )
        .await?;
    println!("✓ Coupon DIWALI10");

    println!();
    println!("✓ Seed complete!");
    println!("  Log in with company_id {} and password '{}'", company.id, password);

    Ok(())
}
