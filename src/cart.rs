//! Per-owner shopping cart.
//!
//! The cart is a mutable bag owned by one session; checkout reads it and
//! clears it only after the order is durably written. A failed checkout
//! leaves it untouched so the user can retry without re-adding items.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog;
use crate::db::DbState;
use crate::error::{CheckoutError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub owner_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// Add a product to the owner's cart. Adding a product already in the
/// cart bumps its quantity.
pub fn add_item(db: &DbState, owner_id: &str, product_id: &str, quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(CheckoutError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }

    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;

    if catalog::product_row(&conn, product_id)?.is_none() {
        return Err(CheckoutError::Validation(format!(
            "unknown product: {product_id}"
        )));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO cart_items (id, owner_id, product_id, quantity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(owner_id, product_id) DO UPDATE SET
            quantity = quantity + excluded.quantity,
            updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            owner_id,
            product_id,
            quantity,
            now
        ],
    )?;
    Ok(())
}

/// Set the quantity of a cart line. Zero (or less) removes the line.
pub fn update_quantity(db: &DbState, owner_id: &str, product_id: &str, quantity: i64) -> Result<()> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;

    if quantity <= 0 {
        conn.execute(
            "DELETE FROM cart_items WHERE owner_id = ?1 AND product_id = ?2",
            params![owner_id, product_id],
        )?;
        return Ok(());
    }

    let updated = conn.execute(
        "UPDATE cart_items SET quantity = ?1, updated_at = ?2
         WHERE owner_id = ?3 AND product_id = ?4",
        params![quantity, Utc::now().to_rfc3339(), owner_id, product_id],
    )?;
    if updated == 0 {
        return Err(CheckoutError::Validation(format!(
            "product {product_id} is not in the cart"
        )));
    }
    Ok(())
}

/// Remove one product from the cart.
pub fn remove_item(db: &DbState, owner_id: &str, product_id: &str) -> Result<()> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    conn.execute(
        "DELETE FROM cart_items WHERE owner_id = ?1 AND product_id = ?2",
        params![owner_id, product_id],
    )?;
    Ok(())
}

/// All cart lines for an owner, oldest first.
pub fn get_items(db: &DbState, owner_id: &str) -> Result<Vec<CartItem>> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    items_for_owner(&conn, owner_id)
}

/// Empty the owner's cart.
pub fn clear(db: &DbState, owner_id: &str) -> Result<()> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    clear_for_owner(&conn, owner_id)?;
    Ok(())
}

pub(crate) fn items_for_owner(conn: &Connection, owner_id: &str) -> Result<Vec<CartItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, product_id, quantity FROM cart_items
         WHERE owner_id = ?1
         ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| {
        Ok(CartItem {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            product_id: row.get(2)?,
            quantity: row.get(3)?,
        })
    })?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

pub(crate) fn clear_for_owner(conn: &Connection, owner_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM cart_items WHERE owner_id = ?1",
        params![owner_id],
    )?;
    Ok(deleted)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::run_migrations_for_test(&conn);
        DbState {
            conn: Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        }
    }

    fn seed_product(db: &DbState, id: &str, price: f64) {
        crate::catalog::upsert_product(db, id, price, Some(id)).expect("seed product");
    }

    #[test]
    fn add_and_read_back() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        add_item(&db, "user-1", "dish-1", 2).expect("add");

        let items = get_items(&db, "user-1").expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, "dish-1");
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn adding_same_product_bumps_quantity() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        add_item(&db, "user-1", "dish-1", 2).expect("first add");
        add_item(&db, "user-1", "dish-1", 3).expect("second add");

        let items = get_items(&db, "user-1").expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
    }

    #[test]
    fn carts_are_scoped_per_owner() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        add_item(&db, "user-1", "dish-1", 1).expect("add user-1");
        add_item(&db, "user-2", "dish-1", 4).expect("add user-2");

        assert_eq!(get_items(&db, "user-1").expect("items").len(), 1);
        assert_eq!(get_items(&db, "user-2").expect("items")[0].quantity, 4);

        clear(&db, "user-1").expect("clear user-1");
        assert!(get_items(&db, "user-1").expect("items").is_empty());
        assert_eq!(get_items(&db, "user-2").expect("items").len(), 1);
    }

    #[test]
    fn add_unknown_product_rejected() {
        let db = test_db();
        let err = add_item(&db, "user-1", "ghost", 1).unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[test]
    fn add_non_positive_quantity_rejected() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        let err = add_item(&db, "user-1", "dish-1", 0).unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[test]
    fn update_quantity_sets_and_removes() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        add_item(&db, "user-1", "dish-1", 2).expect("add");

        update_quantity(&db, "user-1", "dish-1", 7).expect("set");
        assert_eq!(get_items(&db, "user-1").expect("items")[0].quantity, 7);

        update_quantity(&db, "user-1", "dish-1", 0).expect("remove via zero");
        assert!(get_items(&db, "user-1").expect("items").is_empty());
    }

    #[test]
    fn update_missing_line_rejected() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        let err = update_quantity(&db, "user-1", "dish-1", 3).unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[test]
    fn remove_item_is_idempotent() {
        let db = test_db();
        seed_product(&db, "dish-1", 10.0);
        add_item(&db, "user-1", "dish-1", 1).expect("add");
        remove_item(&db, "user-1", "dish-1").expect("remove");
        remove_item(&db, "user-1", "dish-1").expect("remove again");
        assert!(get_items(&db, "user-1").expect("items").is_empty());
    }
}
