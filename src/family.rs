//! Order families and the per-family checkout policy.
//!
//! Each storefront flow (regular menu, meal boxes, bulk meals, catering,
//! corporate catering) is an order family with its own disjoint order
//! number range. Families differ only by policy, not by schema, so the
//! router is a small configuration record instead of five code paths.

use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{CheckoutError, Result};

/// Default delivery fee in whole currency units, applied unless a
/// `local_settings` override exists.
const DEFAULT_DELIVERY_FEE: f64 = 40.0;

/// Default tax rate as a decimal fraction.
const DEFAULT_TAX_RATE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderFamily {
    Regular,
    #[serde(rename = "mealbox")]
    MealBox,
    BulkMeal,
    Catering,
    Corporate,
}

impl OrderFamily {
    pub const ALL: [OrderFamily; 5] = [
        OrderFamily::Regular,
        OrderFamily::MealBox,
        OrderFamily::BulkMeal,
        OrderFamily::Catering,
        OrderFamily::Corporate,
    ];

    /// First order number assigned on a fresh store. Ranges are disjoint
    /// so a bare order number is globally unambiguous.
    pub fn starting_number(self) -> i64 {
        match self {
            OrderFamily::Regular => 10_000_001,
            OrderFamily::MealBox => 20_000_001,
            OrderFamily::BulkMeal => 30_000_001,
            OrderFamily::Catering => 40_000_001,
            OrderFamily::Corporate => 50_000_001,
        }
    }

    /// Storage tag, also the wire spelling used by the storefront.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderFamily::Regular => "regular",
            OrderFamily::MealBox => "mealbox",
            OrderFamily::BulkMeal => "bulk-meal",
            OrderFamily::Catering => "catering",
            OrderFamily::Corporate => "corporate",
        }
    }

    /// Catering and corporate flows accept guest checkout (contact info
    /// instead of a registered account).
    pub fn allows_guest(self) -> bool {
        matches!(self, OrderFamily::Catering | OrderFamily::Corporate)
    }

    /// Event-driven families must carry an event date.
    pub fn requires_event_date(self) -> bool {
        matches!(self, OrderFamily::Catering | OrderFamily::Corporate)
    }
}

impl fmt::Display for OrderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderFamily {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "regular" => Ok(OrderFamily::Regular),
            "mealbox" | "meal-box" => Ok(OrderFamily::MealBox),
            "bulk-meal" | "bulkmeal" => Ok(OrderFamily::BulkMeal),
            "catering" => Ok(OrderFamily::Catering),
            "corporate" => Ok(OrderFamily::Corporate),
            other => Err(CheckoutError::Validation(format!(
                "unknown order family: {other}"
            ))),
        }
    }
}

/// The Order Family Router: everything checkout needs to know about a
/// family, in one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyPolicy {
    pub family: OrderFamily,
    pub starting_number: i64,
    pub delivery_fee: f64,
    pub tax_rate: f64,
    pub guest_allowed: bool,
    pub requires_event_date: bool,
}

impl FamilyPolicy {
    /// Built-in policy for a family, before settings overrides.
    pub fn for_family(family: OrderFamily) -> Self {
        FamilyPolicy {
            family,
            starting_number: family.starting_number(),
            delivery_fee: DEFAULT_DELIVERY_FEE,
            tax_rate: DEFAULT_TAX_RATE,
            guest_allowed: family.allows_guest(),
            requires_event_date: family.requires_event_date(),
        }
    }

    /// Policy with `local_settings` overrides applied.
    ///
    /// Looks up `checkout / <family>.delivery_fee` first, then the
    /// family-agnostic `checkout / delivery_fee`; same for `tax_rate`.
    /// Unparseable values are ignored in favor of the defaults.
    pub fn resolve(conn: &Connection, family: OrderFamily) -> Self {
        let mut policy = Self::for_family(family);
        if let Some(fee) = setting_f64(conn, family, "delivery_fee") {
            policy.delivery_fee = fee;
        }
        if let Some(rate) = setting_f64(conn, family, "tax_rate") {
            policy.tax_rate = rate;
        }
        policy
    }
}

fn setting_f64(conn: &Connection, family: OrderFamily, key: &str) -> Option<f64> {
    let scoped = format!("{}.{key}", family.as_str());
    db::get_setting(conn, "checkout", &scoped)
        .or_else(|| db::get_setting(conn, "checkout", key))
        .and_then(|v| v.trim().parse::<f64>().ok())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::run_migrations_for_test(&conn);
        conn
    }

    #[test]
    fn starting_numbers_are_disjoint_and_ordered() {
        let starts: Vec<i64> = OrderFamily::ALL
            .iter()
            .map(|f| f.starting_number())
            .collect();
        assert_eq!(
            starts,
            vec![10_000_001, 20_000_001, 30_000_001, 40_000_001, 50_000_001]
        );
        // 10M of headroom per family: no range can reach the next one.
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= 10_000_000);
        }
    }

    #[test]
    fn parse_round_trips_every_family() {
        for family in OrderFamily::ALL {
            let parsed: OrderFamily = family.as_str().parse().expect("parse family tag");
            assert_eq!(parsed, family);
        }
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        let err = "drive-thru".parse::<OrderFamily>().unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[test]
    fn guest_checkout_is_catering_and_corporate_only() {
        assert!(!OrderFamily::Regular.allows_guest());
        assert!(!OrderFamily::MealBox.allows_guest());
        assert!(!OrderFamily::BulkMeal.allows_guest());
        assert!(OrderFamily::Catering.allows_guest());
        assert!(OrderFamily::Corporate.allows_guest());
    }

    #[test]
    fn resolve_uses_defaults_without_overrides() {
        let conn = test_conn();
        let policy = FamilyPolicy::resolve(&conn, OrderFamily::Regular);
        assert_eq!(policy.delivery_fee, 40.0);
        assert_eq!(policy.tax_rate, 0.05);
    }

    #[test]
    fn resolve_prefers_family_scoped_override() {
        let conn = test_conn();
        crate::db::set_setting(&conn, "checkout", "delivery_fee", "25").expect("global override");
        crate::db::set_setting(&conn, "checkout", "catering.delivery_fee", "120")
            .expect("scoped override");

        let catering = FamilyPolicy::resolve(&conn, OrderFamily::Catering);
        assert_eq!(catering.delivery_fee, 120.0);

        let regular = FamilyPolicy::resolve(&conn, OrderFamily::Regular);
        assert_eq!(regular.delivery_fee, 25.0);
    }

    #[test]
    fn resolve_ignores_garbage_override() {
        let conn = test_conn();
        crate::db::set_setting(&conn, "checkout", "tax_rate", "not-a-number").expect("set");
        let policy = FamilyPolicy::resolve(&conn, OrderFamily::Regular);
        assert_eq!(policy.tax_rate, 0.05);
    }

    #[test]
    fn serde_uses_storefront_spelling() {
        let json = serde_json::to_string(&OrderFamily::BulkMeal).expect("serialize");
        assert_eq!(json, "\"bulk-meal\"");
        let back: OrderFamily = serde_json::from_str("\"mealbox\"").expect("deserialize");
        assert_eq!(back, OrderFamily::MealBox);
    }
}
