//! Per-family order number allocation.
//!
//! Numbers are strictly increasing within a family and never reused.
//! Gaps are acceptable (a rolled-back checkout burns nothing here since
//! the counter update rolls back with it); collisions are not.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::Result;
use crate::family::OrderFamily;

/// Read-only preview of the next order number: `MAX(order_number) + 1`,
/// or the family's starting constant on an empty store.
///
/// Advisory only. Two callers can observe the same value, which is
/// exactly the race the old storefront shipped with. Real allocation
/// goes through [`allocate_order_number`] inside the checkout
/// transaction; this exists for dashboards and order-ahead displays.
pub fn peek_next_order_number(conn: &Connection, family: OrderFamily) -> Result<i64> {
    // MAX() over zero rows yields a single NULL row, not no rows.
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(order_number) FROM orders WHERE family = ?1",
        params![family.as_str()],
        |row| row.get(0),
    )?;

    Ok(match max {
        Some(n) => n + 1,
        None => family.starting_number(),
    })
}

/// Atomically allocate the next order number for a family.
///
/// Must run inside the caller's transaction so the increment commits or
/// rolls back together with the order insert. The counter row stores the
/// last assigned number; it is seeded lazily from the current maximum so
/// stores that predate the counter (or had it wiped) resume without
/// reissuing a live number.
pub fn allocate_order_number(conn: &Connection, family: OrderFamily) -> Result<i64> {
    // Last assigned number according to the orders table itself; the
    // family's range floor when no orders exist yet.
    let last_assigned: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(order_number), ?2) FROM orders WHERE family = ?1",
            params![family.as_str(), family.starting_number() - 1],
            |row| row.get(0),
        )?;

    conn.execute(
        "INSERT INTO order_counters (family, next_number) VALUES (?1, ?2)
         ON CONFLICT(family) DO NOTHING",
        params![family.as_str(), last_assigned],
    )?;

    // MAX() guards against a counter that fell behind the orders table
    // (e.g. a restored backup); the RETURNING makes read-and-increment a
    // single statement.
    let number: i64 = conn.query_row(
        "UPDATE order_counters
         SET next_number = MAX(next_number, ?2) + 1, updated_at = datetime('now')
         WHERE family = ?1
         RETURNING next_number",
        params![family.as_str(), last_assigned],
        |row| row.get(0),
    )?;

    debug!(family = %family, number, "Allocated order number");
    Ok(number)
}

// ===========================================================================
// Tests
// ===========================================================================
