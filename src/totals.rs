//! Order totals arithmetic.
//!
//! One pure function so every family computes money the same way. The
//! breakdown is computed once at checkout and frozen on the order row.

use serde::{Deserialize, Serialize};

use crate::checkout::LineItem;
use crate::error::{CheckoutError, Result};
use crate::family::FamilyPolicy;

/// Subtotal / delivery fee / tax / total breakdown, two-decimal values.
///
/// Invariant: `total == subtotal + delivery_fee + tax` exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub tax: f64,
    pub total: f64,
}

/// Round to the currency's minor unit (cents).
pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the totals breakdown for a set of line items.
///
/// Tax is rounded half-up to the nearest *whole* currency unit before it
/// is combined into the total. That is the storefront's historical
/// behavior and receipts depend on it; do not switch to two-decimal tax
/// rounding without a pricing sign-off.
pub fn compute_totals(items: &[LineItem], policy: &FamilyPolicy) -> Result<OrderTotals> {
    if items.is_empty() {
        return Err(CheckoutError::EmptyOrder);
    }

    let subtotal = round_cents(
        items
            .iter()
            .map(|item| item.unit_price * item.quantity as f64)
            .sum(),
    );
    let tax = (subtotal * policy.tax_rate).round();
    let total = round_cents(subtotal + policy.delivery_fee + tax);

    Ok(OrderTotals {
        subtotal,
        delivery_fee: policy.delivery_fee,
        tax,
        total,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
