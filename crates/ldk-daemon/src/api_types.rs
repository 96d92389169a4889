//! Request and response bodies for the ldk-daemon HTTP endpoints.
//!
//! `Serialize + Deserialize` so tests can decode what the router returns.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ldk_schemas::{FreeStock, OrderRecord, OrderStatus, StateProgress};
use serde::{Deserialize, Serialize};

pub use ldk_orders::CreateOrderRequest;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// "validation" | "duplicate_order" | "already_processed" | "not_found" |
    /// "invalid_state_transition" | "not_fulfilled" | "persistence"
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub message: String,
    pub order_id: i64,
    pub assigned: i64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillOrderResponse {
    pub success: bool,
    pub message: String,
    pub order_id: i64,
    pub assigned: i64,
    pub fulfilled_count: i64,
    pub quantity: i64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOrderResponse {
    pub success: bool,
    pub message: String,
    pub order_id: i64,
    pub released: u64,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
}

/// Order row as shown to operators, with local-time renderings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub id: i64,
    pub order_number: String,
    pub states: Vec<String>,
    pub quantity: i64,
    pub fulfilled_count: i64,
    pub remaining: i64,
    pub status: OrderStatus,
    pub product_name: Option<String>,
    pub actual_order_number: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub created_at_display: String,
    pub completed_at_display: Option<String>,
}

impl OrderView {
    pub fn from_record(r: &OrderRecord, tz: Tz) -> Self {
        Self {
            id: r.id,
            order_number: r.order_number.clone(),
            states: r.states.iter().map(|s| s.to_string()).collect(),
            quantity: r.quantity,
            fulfilled_count: r.fulfilled_count,
            remaining: r.remaining(),
            status: r.status,
            product_name: r.product_name.clone(),
            actual_order_number: r.external_ref.clone(),
            created_at_utc: r.created_at_utc,
            completed_at_utc: r.completed_at_utc,
            created_at_display: display_time(r.created_at_utc, tz),
            completed_at_display: r.completed_at_utc.map(|t| display_time(t, tz)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateProgressView {
    pub state: String,
    pub threshold: i64,
    pub fulfilled_count: i64,
}

impl From<&StateProgress> for StateProgressView {
    fn from(p: &StateProgress) -> Self {
        Self {
            state: p.state.to_string(),
            threshold: p.threshold,
            fulfilled_count: p.fulfilled_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    pub order: OrderView,
    pub progress: Vec<StateProgressView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderView>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockResponse {
    pub total_free: i64,
    pub states: Vec<FreeStock>,
}

/// `2026-03-04 9:05 AM EST`
pub fn display_time(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %-I:%M %p %Z").to_string()
}
