//! Order lifecycle controller.
//!
//! Drives an order through `active -> fulfilled` and deletion. Every mutating
//! operation is one sqlx transaction: the transaction is committed only after
//! leads, per-state progress and the order row are all updated, and dropping
//! it on any early return rolls everything back.
//!
//! Fulfill and delete take a row lock on the order before reading its
//! counters, so concurrent calls on the same order serialize and
//! `fulfilled_count` can never pass `quantity`.

mod error;
mod export;
mod guard;
mod request;

pub use error::{ErrorKind, OrderError};
pub use export::{render_csv, OrderExport, EXPORT_HEADER};
pub use guard::{GuardLedger, PgGuardLedger};
pub use request::{CreateOrderRequest, ValidatedOrder, MSG_INVALID_STATES, MSG_MISSING_FIELDS};

use anyhow::Context;
use ldk_allocation::{allocate, Allocation, AllocationRequest, StateCaps};
use ldk_db::{InsertOrderOutcome, NewOrder, PgLeadPool};
use ldk_schemas::{FreeStock, OrderDetail, OrderPage, OrderStatus, DEFAULT_STATE_CAP};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

const OP_CREATE: &str = "Failed to create order";
const OP_FULFILL: &str = "Failed to fulfill order";
const OP_DELETE: &str = "Failed to delete order";
const OP_EXPORT: &str = "Failed to export CSV";
const OP_READ: &str = "Failed to load orders";

pub const DEFAULT_ONE_TIME_MARKER: &str = "One Time";
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Tunables the controller applies to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPolicy {
    /// Cap for states without an explicit threshold.
    pub default_state_cap: i64,
    /// Product-name substring that marks a one-time product.
    pub one_time_marker: String,
    pub page_size: i64,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            default_state_cap: DEFAULT_STATE_CAP,
            one_time_marker: DEFAULT_ONE_TIME_MARKER.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub order_id: i64,
    pub order_number: String,
    pub assigned: i64,
    pub status: OrderStatus,
    pub allocation: Allocation,
}

impl CreateOutcome {
    pub fn message(&self) -> String {
        format!("Order created successfully. Assigned {} leads.", self.assigned)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillOutcome {
    pub order_id: i64,
    pub assigned: i64,
    pub fulfilled_count: i64,
    pub quantity: i64,
    pub status: OrderStatus,
    pub allocation: Allocation,
}

impl FulfillOutcome {
    pub fn message(&self) -> String {
        format!("Order fulfilled. Assigned {} additional leads.", self.assigned)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub order_id: i64,
    pub order_number: String,
    /// Leads returned to the free pool.
    pub released: u64,
}

impl DeleteOutcome {
    pub fn message(&self) -> String {
        "Order deleted successfully. Leads returned to stock.".to_string()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrderController<G = PgGuardLedger> {
    pool: PgPool,
    policy: OrderPolicy,
    guard: G,
}

impl OrderController<PgGuardLedger> {
    pub fn new(pool: PgPool, policy: OrderPolicy) -> Self {
        let guard = PgGuardLedger::new(pool.clone());
        Self::with_guard(pool, policy, guard)
    }
}

impl<G: GuardLedger> OrderController<G> {
    pub fn with_guard(pool: PgPool, policy: OrderPolicy, guard: G) -> Self {
        Self {
            pool,
            policy,
            guard,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn policy(&self) -> &OrderPolicy {
        &self.policy
    }

    /// Validate and create an order, allocating its full quantity.
    pub async fn create(&self, req: &CreateOrderRequest) -> Result<CreateOutcome, OrderError> {
        let order = req.validate()?;
        self.create_validated(&order).await
    }

    pub async fn create_validated(&self, order: &ValidatedOrder) -> Result<CreateOutcome, OrderError> {
        if order.is_one_time(&self.policy.one_time_marker) {
            if let Some(external_ref) = order.external_ref.as_deref() {
                let seen = self
                    .guard
                    .already_processed(external_ref)
                    .await
                    .context(OP_CREATE)?;
                if seen {
                    info!(
                        order_number = %order.order_number,
                        external_ref,
                        "one-time order already processed"
                    );
                    return Err(OrderError::AlreadyProcessed {
                        external_ref: external_ref.to_string(),
                    });
                }
            }
        }

        if ldk_db::order_number_exists(&self.pool, &order.order_number)
            .await
            .context(OP_CREATE)?
        {
            return Err(OrderError::DuplicateOrder {
                order_number: order.order_number.clone(),
            });
        }

        let mut tx = self.pool.begin().await.context(OP_CREATE)?;

        let inserted = ldk_db::insert_order(
            &mut tx,
            &NewOrder {
                order_number: &order.order_number,
                states: &order.states,
                quantity: order.quantity,
                product_name: order.product_name.as_deref(),
                external_ref: order.external_ref.as_deref(),
            },
        )
        .await
        .context(OP_CREATE)?;

        let order_id = match inserted {
            InsertOrderOutcome::Inserted { order_id } => order_id,
            // Lost a race with a concurrent create; `tx` rolls back on drop.
            InsertOrderOutcome::DuplicateOrderNumber => {
                return Err(OrderError::DuplicateOrder {
                    order_number: order.order_number.clone(),
                })
            }
        };

        let caps = StateCaps::from_thresholds(
            &order.thresholds,
            &order.states,
            self.policy.default_state_cap,
        );
        for (position, state) in order.states.iter().enumerate() {
            let position = i32::try_from(position).context(OP_CREATE)?;
            ldk_db::insert_state_progress(&mut tx, order_id, position, state, caps.cap_for(state))
                .await
                .context(OP_CREATE)?;
        }

        let allocation = run_allocation(
            &mut tx,
            &AllocationRequest {
                order_number: &order.order_number,
                states: &order.states,
                caps: &caps,
                total_remaining: order.quantity,
            },
        )
        .await
        .context(OP_CREATE)?;

        let record = apply_allocation(&mut tx, order_id, &allocation)
            .await
            .context(OP_CREATE)?;

        tx.commit().await.context(OP_CREATE)?;

        info!(
            order_id,
            order_number = %record.order_number,
            quantity = record.quantity,
            assigned = allocation.total_assigned,
            status = record.status.as_str(),
            "order created"
        );

        if let Some(external_ref) = order.external_ref.as_deref() {
            if let Err(e) = self.guard.record(&order.order_number, external_ref).await {
                warn!(
                    order_id,
                    external_ref,
                    error = %format!("{e:#}"),
                    "guard ledger insert failed; order stands"
                );
            }
        }

        Ok(CreateOutcome {
            order_id,
            order_number: record.order_number,
            assigned: allocation.total_assigned,
            status: record.status,
            allocation,
        })
    }

    /// Allocate the order's outstanding quantity. The stored thresholds cap
    /// each state again for this pass; the remaining quantity bounds the total.
    pub async fn fulfill(&self, order_id: i64) -> Result<FulfillOutcome, OrderError> {
        let mut tx = self.pool.begin().await.context(OP_FULFILL)?;

        let order = ldk_db::fetch_order_for_update(&mut tx, order_id)
            .await
            .context(OP_FULFILL)?
            .ok_or(OrderError::NotFound { order_id })?;

        if order.status == OrderStatus::Fulfilled {
            return Err(OrderError::AlreadyFulfilled { order_id });
        }
        let remaining = order.remaining();
        if remaining <= 0 {
            return Err(OrderError::NoRemainingQuantity { order_id });
        }

        let progress = ldk_db::fetch_state_progress(&mut *tx, order_id)
            .await
            .context(OP_FULFILL)?;
        let caps = StateCaps::from_progress(&progress);

        let allocation = run_allocation(
            &mut tx,
            &AllocationRequest {
                order_number: &order.order_number,
                states: &order.states,
                caps: &caps,
                total_remaining: remaining,
            },
        )
        .await
        .context(OP_FULFILL)?;

        let record = apply_allocation(&mut tx, order_id, &allocation)
            .await
            .context(OP_FULFILL)?;

        tx.commit().await.context(OP_FULFILL)?;

        info!(
            order_id,
            order_number = %record.order_number,
            assigned = allocation.total_assigned,
            fulfilled_count = record.fulfilled_count,
            status = record.status.as_str(),
            "order fulfilled"
        );

        Ok(FulfillOutcome {
            order_id,
            assigned: allocation.total_assigned,
            fulfilled_count: record.fulfilled_count,
            quantity: record.quantity,
            status: record.status,
            allocation,
        })
    }

    /// Release the order's leads and remove the order with its progress rows.
    pub async fn delete(&self, order_id: i64) -> Result<DeleteOutcome, OrderError> {
        let mut tx = self.pool.begin().await.context(OP_DELETE)?;

        let order = ldk_db::fetch_order_for_update(&mut tx, order_id)
            .await
            .context(OP_DELETE)?
            .ok_or(OrderError::NotFound { order_id })?;

        let released = ldk_db::release_order_leads(&mut tx, &order.order_number)
            .await
            .context(OP_DELETE)?;
        let progress_rows = ldk_db::delete_order(&mut tx, order_id)
            .await
            .context(OP_DELETE)?;

        tx.commit().await.context(OP_DELETE)?;

        info!(
            order_id,
            order_number = %order.order_number,
            released,
            progress_rows,
            "order deleted"
        );

        Ok(DeleteOutcome {
            order_id,
            order_number: order.order_number,
            released,
        })
    }

    /// Leads of a fulfilled order, ascending lead id.
    pub async fn export(&self, order_id: i64) -> Result<OrderExport, OrderError> {
        let order = ldk_db::fetch_order(&self.pool, order_id)
            .await
            .context(OP_EXPORT)?
            .ok_or(OrderError::NotFound { order_id })?;

        if order.status != OrderStatus::Fulfilled {
            return Err(OrderError::NotFulfilled { order_id });
        }

        let rows = ldk_db::fetch_bound_leads(&self.pool, &order.order_number)
            .await
            .context(OP_EXPORT)?;

        Ok(OrderExport {
            order_id,
            order_number: order.order_number,
            rows,
        })
    }

    pub async fn get(&self, order_id: i64) -> Result<OrderDetail, OrderError> {
        let order = ldk_db::fetch_order(&self.pool, order_id)
            .await
            .context(OP_READ)?
            .ok_or(OrderError::NotFound { order_id })?;
        let progress = ldk_db::fetch_state_progress(&self.pool, order_id)
            .await
            .context(OP_READ)?;
        Ok(OrderDetail { order, progress })
    }

    /// Newest-first page of orders. Pages are 1-based; anything below 1 reads
    /// as page 1.
    pub async fn list(&self, page: i64) -> Result<OrderPage, OrderError> {
        let page = page.max(1);
        let page_size = self.policy.page_size.max(1);
        let offset = (page - 1).saturating_mul(page_size);

        let orders = ldk_db::list_orders(&self.pool, page_size, offset)
            .await
            .context(OP_READ)?;
        let total = ldk_db::count_orders(&self.pool).await.context(OP_READ)?;

        Ok(OrderPage {
            orders,
            page,
            page_size,
            total,
            total_pages: (total + page_size - 1) / page_size,
        })
    }

    pub async fn stock(&self) -> Result<Vec<FreeStock>, OrderError> {
        Ok(ldk_db::free_stock_by_state(&self.pool)
            .await
            .context(OP_READ)?)
    }
}

async fn run_allocation(
    conn: &mut PgConnection,
    req: &AllocationRequest<'_>,
) -> anyhow::Result<Allocation> {
    let mut leads = PgLeadPool::new(conn);
    allocate(&mut leads, req).await
}

/// Write an allocation's counts to the ledger. Status and completion time are
/// derived by `add_order_progress` in the same statement.
async fn apply_allocation(
    conn: &mut PgConnection,
    order_id: i64,
    allocation: &Allocation,
) -> anyhow::Result<ldk_schemas::OrderRecord> {
    for s in allocation.per_state.iter().filter(|s| s.assigned > 0) {
        ldk_db::add_state_progress(&mut *conn, order_id, &s.state, s.assigned).await?;
    }
    ldk_db::add_order_progress(conn, order_id, allocation.total_assigned).await
}
