//! Checkout core for the BigPlate food-ordering storefront.
//!
//! Owns the storefront's order-creation protocol: per-family order
//! number allocation (regular, meal-box, bulk-meal, catering, corporate
//! each hold a disjoint numeric range), totals arithmetic, and the
//! transactional write of order header + line items + cart clear. The
//! web layer in front of this crate is plain request/response glue; all
//! money and numbering invariants live here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod db;
pub mod error;
pub mod family;
pub mod sequence;
pub mod totals;

pub use checkout::{
    create_order, get_order, list_orders, CheckoutRequest, DeliveryMeta, GuestContact, LineItem,
    Order,
};
pub use db::DbState;
pub use error::{CheckoutError, Result};
pub use family::{FamilyPolicy, OrderFamily};
pub use totals::{compute_totals, OrderTotals};

/// Initialize structured logging for an embedding application.
///
/// Honors `RUST_LOG`; defaults to info with debug for this crate.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storefront_checkout=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}
