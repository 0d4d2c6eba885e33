//! Product catalog consulted at checkout time.
//!
//! Checkout snapshots the catalog price into the order's line items; a
//! client-supplied price is never trusted. The storefront's admin side
//! feeds this table.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{CheckoutError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub available: bool,
}

/// Insert or update a catalog row. Returns the product id (generated
/// when the caller passes an empty one).
pub fn upsert_product(db: &DbState, name: &str, price: f64, id: Option<&str>) -> Result<String> {
    if name.trim().is_empty() {
        return Err(CheckoutError::Validation("product name is required".into()));
    }
    if price < 0.0 {
        return Err(CheckoutError::Validation(format!(
            "product price must be non-negative, got {price}"
        )));
    }

    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    let product_id = id
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO products (id, name, price, available, created_at, updated_at)
         VALUES (?1, ?2, ?3, 1, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            price = excluded.price,
            updated_at = excluded.updated_at",
        params![product_id, name.trim(), price, now],
    )?;

    info!(product_id = %product_id, price, "Catalog product upserted");
    Ok(product_id)
}

/// Current catalog price for a product.
pub fn get_price(db: &DbState, product_id: &str) -> Result<f64> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    conn.query_row(
        "SELECT price FROM products WHERE id = ?1",
        params![product_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| CheckoutError::Validation(format!("unknown product: {product_id}")))
}

/// Whether a product can currently be sold.
pub fn is_available(db: &DbState, product_id: &str) -> Result<bool> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    let available: Option<bool> = conn
        .query_row(
            "SELECT available != 0 FROM products WHERE id = ?1",
            params![product_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(available.unwrap_or(false))
}

/// Flip a product's availability (sold out, back in stock).
pub fn set_available(db: &DbState, product_id: &str, available: bool) -> Result<()> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    let updated = conn.execute(
        "UPDATE products SET available = ?1, updated_at = ?2 WHERE id = ?3",
        params![available, Utc::now().to_rfc3339(), product_id],
    )?;
    if updated == 0 {
        return Err(CheckoutError::Validation(format!(
            "unknown product: {product_id}"
        )));
    }
    Ok(())
}

/// Load a full product row.
pub fn get_product(db: &DbState, product_id: &str) -> Result<Product> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    product_row(&conn, product_id)?
        .ok_or_else(|| CheckoutError::Validation(format!("unknown product: {product_id}")))
}

pub(crate) fn product_row(conn: &Connection, product_id: &str) -> Result<Option<Product>> {
    let product = conn
        .query_row(
            "SELECT id, name, price, available != 0 FROM products WHERE id = ?1",
            params![product_id],
            |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                    available: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(product)
}

// ===========================================================================
// Tests
// ===========================================================================
