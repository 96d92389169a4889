//! Shared domain types for the lead desk: orders, per-state progress, leads.

mod states;

pub use states::{
    parse_states, InvalidStateCode, StateCode, StateList, Thresholds, DEFAULT_STATE_CAP,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Fulfilled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Fulfilled => "fulfilled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(OrderStatus::Active),
            "fulfilled" => Some(OrderStatus::Fulfilled),
            _ => None,
        }
    }
}

/// One row of the order ledger.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub id: i64,
    pub order_number: String,
    pub states: StateList,
    pub quantity: i64,
    pub fulfilled_count: i64,
    pub status: OrderStatus,
    pub product_name: Option<String>,
    /// External reference used by the one-time guard (`actual_order_number`).
    pub external_ref: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub completed_at_utc: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// Quantity still to be filled (never negative).
    pub fn remaining(&self) -> i64 {
        (self.quantity - self.fulfilled_count).max(0)
    }
}

/// Per-(order, state) threshold and progress. `threshold` caps what the
/// state may contribute in any single allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateProgress {
    pub state: StateCode,
    pub threshold: i64,
    pub fulfilled_count: i64,
}

/// Order plus its per-state progress rows (list order).
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderRecord,
    pub progress: Vec<StateProgress>,
}

/// A bound lead as emitted by the fulfilled-order export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadExportRow {
    pub phone_number: String,
    pub state: String,
    pub order_number: String,
}

/// Count of free leads for one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeStock {
    pub state: String,
    pub free_leads: i64,
}

/// One page of the order ledger, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderRecord>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_lowercase_only() {
        assert_eq!(OrderStatus::parse("active"), Some(OrderStatus::Active));
        assert_eq!(OrderStatus::parse("fulfilled"), Some(OrderStatus::Fulfilled));
        assert_eq!(OrderStatus::parse("FULFILLED"), None);
    }
}
