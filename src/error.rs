//! Error taxonomy for the checkout core.
//!
//! Collaborator errors (catalog, cart store, order store) propagate
//! unchanged; the only internal recovery is the bounded retry on
//! `DuplicateOrderNumber` inside `checkout::create_order`.

use thiserror::Error;

use crate::family::OrderFamily;

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout was requested against a cart with no items. Not
    /// retryable; the caller surfaces a "cart is empty" message.
    #[error("cart is empty")]
    EmptyCart,

    /// A totals computation was handed zero line items. An order must
    /// carry at least one item.
    #[error("an order must contain at least one line item")]
    EmptyOrder,

    /// Missing or malformed family-specific fields (guest contact,
    /// event date, ...). Raised before any write occurs.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A cart line references a product the catalog currently refuses
    /// to sell. The cart is left intact so the user can amend it.
    #[error("product unavailable: {0}")]
    ProductUnavailable(String),

    /// Two writers raced on the same order number. Internal conflict
    /// signal; `create_order` retries allocation a bounded number of
    /// times before letting this escape.
    #[error("order number {number} already assigned in family {family}")]
    DuplicateOrderNumber { family: OrderFamily, number: i64 },

    /// The backing store could not be reached (poisoned lock, failed
    /// open). Transient; the caller may retry the whole call.
    #[error("order store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Any other database error, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

impl CheckoutError {
    /// Map a rusqlite failure to the internal conflict signal when it is
    /// a unique-constraint violation on `(family, order_number)`.
    pub(crate) fn from_order_insert(err: rusqlite::Error, family: OrderFamily, number: i64) -> Self {
        if let rusqlite::Error::SqliteFailure(ref code, ref msg) = err {
            let unique_hit = code.code == rusqlite::ErrorCode::ConstraintViolation
                && msg
                    .as_deref()
                    .map(|m| m.contains("order_number"))
                    .unwrap_or(false);
            if unique_hit {
                return CheckoutError::DuplicateOrderNumber { family, number };
            }
        }
        CheckoutError::Storage(err)
    }
}
