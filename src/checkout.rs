//! Order creation and read-back.
//!
//! `create_order` is the single checkout path for every order family.
//! Cart read, price snapshotting, totals, number allocation, header and
//! line-item inserts, and the cart clear all run inside one BEGIN
//! IMMEDIATE transaction: an error at any step rolls the whole thing
//! back, so the store never holds a header without items and a failed
//! checkout never eats the user's cart.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cart;
use crate::db::DbState;
use crate::error::{CheckoutError, Result};
use crate::family::{FamilyPolicy, OrderFamily};
use crate::totals::{self, OrderTotals};

/// Attempts before a `DuplicateOrderNumber` conflict escapes to the caller.
const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

/// A product snapshot attached to an order. `unit_price` is the catalog
/// price at order time, not a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Contact details for guest checkout (catering/corporate).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Family-dependent delivery metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMeta {
    /// Event date for catering/corporate orders (required there).
    pub event_date: Option<String>,
    pub time_slot: Option<String>,
    pub notes: Option<String>,
}

/// Everything checkout needs to turn a cart into an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub family: OrderFamily,
    /// Cart owner (session id); the cart read and clear key on this.
    pub owner_id: String,
    /// Registered account, or None for guest checkout where the family
    /// permits it.
    pub user_id: Option<String>,
    pub guest: Option<GuestContact>,
    pub address_ref: Option<String>,
    pub delivery: Option<DeliveryMeta>,
    /// Client-supplied idempotency token. Retrying a submission with the
    /// same token returns the already-created order.
    pub client_request_id: Option<String>,
}

impl CheckoutRequest {
    pub fn new(family: OrderFamily, owner_id: impl Into<String>) -> Self {
        CheckoutRequest {
            family,
            owner_id: owner_id.into(),
            user_id: None,
            guest: None,
            address_ref: None,
            delivery: None,
            client_request_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: i64,
    pub family: OrderFamily,
    pub user_id: Option<String>,
    pub guest: Option<GuestContact>,
    pub address_ref: Option<String>,
    pub delivery: Option<DeliveryMeta>,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub status: String,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Order creation
// ---------------------------------------------------------------------------

/// Create an order from the owner's cart.
///
/// Validates family rules up front (guest permission, event date),
/// resolves prices and availability from the catalog, computes totals,
/// allocates the order number, writes header + line items, and clears
/// the cart, atomically. On `DuplicateOrderNumber` the allocate-and-
/// insert step is retried a bounded number of times before the conflict
/// escapes.
pub fn create_order(db: &DbState, request: &CheckoutRequest) -> Result<Order> {
    validate_request(request)?;

    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    let policy = FamilyPolicy::resolve(&conn, request.family);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match create_in_transaction(&conn, request, &policy) {
            Err(CheckoutError::DuplicateOrderNumber { family, number })
                if attempt < MAX_ALLOCATION_ATTEMPTS =>
            {
                warn!(
                    family = %family,
                    number,
                    attempt,
                    "Order number conflict, retrying allocation"
                );
            }
            other => return other,
        }
    }
}

/// Family-specific validation. Runs before any write.
fn validate_request(request: &CheckoutRequest) -> Result<()> {
    if request.owner_id.trim().is_empty() {
        return Err(CheckoutError::Validation("cart owner is required".into()));
    }

    let signed_in = request
        .user_id
        .as_deref()
        .map(|u| !u.trim().is_empty())
        .unwrap_or(false);
    if !signed_in {
        if !request.family.allows_guest() {
            return Err(CheckoutError::Validation(format!(
                "{} orders require a signed-in account",
                request.family
            )));
        }
        let guest = request.guest.as_ref().ok_or_else(|| {
            CheckoutError::Validation("guest checkout requires contact details".into())
        })?;
        if guest.name.trim().is_empty() || guest.phone.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "guest contact needs a name and phone number".into(),
            ));
        }
    }

    if request.family.requires_event_date() {
        let has_date = request
            .delivery
            .as_ref()
            .and_then(|d| d.event_date.as_deref())
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false);
        if !has_date {
            return Err(CheckoutError::Validation(format!(
                "{} orders require an event date",
                request.family
            )));
        }
    }

    Ok(())
}

fn create_in_transaction(
    conn: &Connection,
    request: &CheckoutRequest,
    policy: &FamilyPolicy,
) -> Result<Order> {
    conn.execute_batch("BEGIN IMMEDIATE")?;

    match build_order(conn, request, policy) {
        Ok(order) => {
            conn.execute_batch("COMMIT")?;
            info!(
                order_id = %order.id,
                family = %order.family,
                order_number = order.order_number,
                total = order.totals.total,
                "Order created"
            );
            Ok(order)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// The write path proper. Caller owns BEGIN/COMMIT/ROLLBACK.
fn build_order(
    conn: &Connection,
    request: &CheckoutRequest,
    policy: &FamilyPolicy,
) -> Result<Order> {
    // Idempotency guard: if this checkout request has already created an
    // order, return that order instead of inserting a duplicate row.
    if let Some(req_id) = request.client_request_id.as_deref().filter(|s| !s.is_empty()) {
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM orders WHERE client_request_id = ?1 LIMIT 1",
                params![req_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(order_id) = existing {
            info!(
                order_id = %order_id,
                client_request_id = %req_id,
                "Order create deduplicated via client_request_id"
            );
            return load_order(conn, &order_id);
        }
    }

    let items = snapshot_cart(conn, &request.owner_id)?;
    if items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let totals = totals::compute_totals(&items, policy)?;
    let order_number = crate::sequence::allocate_order_number(conn, request.family)?;

    let order_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let delivery = request.delivery.clone().unwrap_or_default();

    conn.execute(
        "INSERT INTO orders (
            id, order_number, family, user_id,
            guest_name, guest_phone, guest_email,
            address_ref, event_date, delivery_time, delivery_notes,
            subtotal, delivery_fee, tax_amount, total_amount, tax_rate,
            status, client_request_id, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7,
            ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16,
            'pending', ?17, ?18, ?18
        )",
        params![
            order_id,
            order_number,
            request.family.as_str(),
            request.user_id,
            request.guest.as_ref().map(|g| g.name.clone()),
            request.guest.as_ref().map(|g| g.phone.clone()),
            request.guest.as_ref().and_then(|g| g.email.clone()),
            request.address_ref,
            delivery.event_date,
            delivery.time_slot,
            delivery.notes,
            totals.subtotal,
            totals.delivery_fee,
            totals.tax,
            totals.total,
            policy.tax_rate,
            request.client_request_id,
            now,
        ],
    )
    .map_err(|e| CheckoutError::from_order_insert(e, request.family, order_number))?;

    for item in &items {
        conn.execute(
            "INSERT INTO order_items (
                id, order_id, product_id, product_name,
                quantity, unit_price, total_price, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                order_id,
                item.product_id,
                item.name,
                item.quantity,
                item.unit_price,
                item.total_price,
                now,
            ],
        )?;
    }

    cart::clear_for_owner(conn, &request.owner_id)?;

    Ok(Order {
        id: order_id,
        order_number,
        family: request.family,
        user_id: request.user_id.clone(),
        guest: request.guest.clone(),
        address_ref: request.address_ref.clone(),
        delivery: request.delivery.clone(),
        items,
        totals,
        status: "pending".to_string(),
        created_at: now,
    })
}

/// Read the cart and resolve every line against the catalog at order
/// time. Client-side prices never enter this path.
fn snapshot_cart(conn: &Connection, owner_id: &str) -> Result<Vec<LineItem>> {
    let mut stmt = conn.prepare(
        "SELECT c.product_id, c.quantity, p.name, p.price, p.available
         FROM cart_items c
         LEFT JOIN products p ON p.id = c.product_id
         WHERE c.owner_id = ?1
         ORDER BY c.created_at, c.id",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<bool>>(4)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (product_id, quantity, name, price, available) = row?;
        let (name, price) = match (name, price) {
            (Some(n), Some(p)) => (n, p),
            _ => {
                return Err(CheckoutError::Validation(format!(
                    "cart references unknown product: {product_id}"
                )))
            }
        };
        if !available.unwrap_or(false) {
            return Err(CheckoutError::ProductUnavailable(name));
        }
        items.push(LineItem {
            product_id,
            name,
            quantity,
            unit_price: price,
            total_price: crate::totals::round_cents(price * quantity as f64),
        });
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// Order read-back
// ---------------------------------------------------------------------------

/// Load a single order with its line items.
pub fn get_order(db: &DbState, order_id: &str) -> Result<Order> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    load_order(&conn, order_id)
}

/// All orders in a family, newest number first.
pub fn list_orders(db: &DbState, family: OrderFamily) -> Result<Vec<Order>> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| CheckoutError::StorageUnavailable(e.to_string()))?;
    let mut stmt = conn.prepare(
        "SELECT id FROM orders WHERE family = ?1 ORDER BY order_number DESC",
    )?;
    let ids = stmt
        .query_map(params![family.as_str()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut orders = Vec::with_capacity(ids.len());
    for id in ids {
        orders.push(load_order(&conn, &id)?);
    }
    Ok(orders)
}

fn load_order(conn: &Connection, order_id: &str) -> Result<Order> {
    struct HeaderRow {
        id: String,
        order_number: i64,
        family: String,
        user_id: Option<String>,
        guest_name: Option<String>,
        guest_phone: Option<String>,
        guest_email: Option<String>,
        address_ref: Option<String>,
        event_date: Option<String>,
        delivery_time: Option<String>,
        delivery_notes: Option<String>,
        subtotal: f64,
        delivery_fee: f64,
        tax_amount: f64,
        total_amount: f64,
        status: String,
        created_at: String,
    }

    let header: HeaderRow = conn
        .query_row(
            "SELECT id, order_number, family, user_id,
                    guest_name, guest_phone, guest_email,
                    address_ref, event_date, delivery_time, delivery_notes,
                    subtotal, delivery_fee, tax_amount, total_amount,
                    status, created_at
             FROM orders WHERE id = ?1",
            params![order_id],
            |row| {
                Ok(HeaderRow {
                    id: row.get(0)?,
                    order_number: row.get(1)?,
                    family: row.get(2)?,
                    user_id: row.get(3)?,
                    guest_name: row.get(4)?,
                    guest_phone: row.get(5)?,
                    guest_email: row.get(6)?,
                    address_ref: row.get(7)?,
                    event_date: row.get(8)?,
                    delivery_time: row.get(9)?,
                    delivery_notes: row.get(10)?,
                    subtotal: row.get(11)?,
                    delivery_fee: row.get(12)?,
                    tax_amount: row.get(13)?,
                    total_amount: row.get(14)?,
                    status: row.get(15)?,
                    created_at: row.get(16)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT product_id, product_name, quantity, unit_price, total_price
         FROM order_items WHERE order_id = ?1
         ORDER BY created_at, id",
    )?;
    let items = stmt
        .query_map(params![order_id], |row| {
            Ok(LineItem {
                product_id: row.get(0)?,
                name: row.get(1)?,
                quantity: row.get(2)?,
                unit_price: row.get(3)?,
                total_price: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let family: OrderFamily = header.family.parse()?;
    let guest = header.guest_name.map(|name| GuestContact {
        name,
        phone: header.guest_phone.unwrap_or_default(),
        email: header.guest_email,
    });
    let delivery = if header.event_date.is_some()
        || header.delivery_time.is_some()
        || header.delivery_notes.is_some()
    {
        Some(DeliveryMeta {
            event_date: header.event_date,
            time_slot: header.delivery_time,
            notes: header.delivery_notes,
        })
    } else {
        None
    };

    Ok(Order {
        id: header.id,
        order_number: header.order_number,
        family,
        user_id: header.user_id,
        guest,
        address_ref: header.address_ref,
        delivery,
        items,
        totals: OrderTotals {
            subtotal: header.subtotal,
            delivery_fee: header.delivery_fee,
            tax: header.tax_amount,
            total: header.total_amount,
        },
        status: header.status,
        created_at: header.created_at,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
