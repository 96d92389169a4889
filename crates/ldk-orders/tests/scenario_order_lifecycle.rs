//! Scenario: order lifecycle against Postgres.
//!
//! Ignored by default; each test runs in its own throwaway schema.
//!
//! Run:
//!   LDK_DATABASE_URL=... cargo test -p ldk-orders --test scenario_order_lifecycle -- --ignored

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use ldk_orders::{
    CreateOrderRequest, ErrorKind, GuardLedger, OrderController, OrderError, OrderPolicy,
};
use ldk_schemas::OrderStatus;
use ldk_testkit::{bound_lead_ids, count_orders_named, count_progress_rows, db_url, seed_leads, TestDb};

// ---------------------------------------------------------------------------
// Guard fakes
// ---------------------------------------------------------------------------

/// In-memory guard ledger.
#[derive(Debug, Clone, Default)]
struct MemGuard {
    refs: Arc<Mutex<HashSet<String>>>,
    records: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemGuard {
    fn seeded(external_ref: &str) -> Self {
        let g = Self::default();
        g.refs.lock().unwrap().insert(external_ref.to_string());
        g
    }

    fn records(&self) -> Vec<(String, String)> {
        self.records.lock().unwrap().clone()
    }
}

impl GuardLedger for MemGuard {
    async fn already_processed(&self, external_ref: &str) -> Result<bool> {
        Ok(self.refs.lock().unwrap().contains(external_ref))
    }

    async fn record(&self, order_name: &str, external_ref: &str) -> Result<()> {
        self.refs.lock().unwrap().insert(external_ref.to_string());
        self.records
            .lock()
            .unwrap()
            .push((order_name.to_string(), external_ref.to_string()));
        Ok(())
    }
}

/// Guard whose writes always fail.
#[derive(Debug, Clone, Default)]
struct BrokenGuard;

impl GuardLedger for BrokenGuard {
    async fn already_processed(&self, _external_ref: &str) -> Result<bool> {
        Ok(false)
    }

    async fn record(&self, _order_name: &str, _external_ref: &str) -> Result<()> {
        Err(anyhow!("automation table unavailable"))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_req(order_number: &str, states: &str, quantity: i64, thresholds: Option<&str>) -> CreateOrderRequest {
    CreateOrderRequest {
        order_number: Some(order_number.to_string()),
        states: Some(states.to_string()),
        quantity: Some(quantity),
        thresholds: thresholds.map(str::to_string),
        ..Default::default()
    }
}

async fn setup() -> TestDb {
    TestDb::create(&db_url()).await.expect("test db")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore]
async fn create_with_thresholds_assigns_seven_then_fulfill_reaches_quantity() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 5).await.unwrap();
    seed_leads(&db.pool, "TX", 6).await.unwrap();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    let created = ctl
        .create(&create_req("ORD-FLTX", "FL,TX", 10, Some("FL=3,TX=4")))
        .await
        .unwrap();
    assert_eq!(created.assigned, 7);
    assert_eq!(created.status, OrderStatus::Active);
    assert_eq!(created.message(), "Order created successfully. Assigned 7 leads.");

    let detail = ctl.get(created.order_id).await.unwrap();
    assert_eq!(detail.order.fulfilled_count, 7);
    assert!(detail.order.completed_at_utc.is_none());
    let counts: Vec<(String, i64, i64)> = detail
        .progress
        .iter()
        .map(|p| (p.state.to_string(), p.threshold, p.fulfilled_count))
        .collect();
    assert_eq!(
        counts,
        vec![("FL".to_string(), 3, 3), ("TX".to_string(), 4, 4)]
    );

    // More stock arrives; fulfill re-runs the thresholds over the remaining 3.
    seed_leads(&db.pool, "FL", 10).await.unwrap();
    seed_leads(&db.pool, "TX", 10).await.unwrap();

    let done = ctl.fulfill(created.order_id).await.unwrap();
    assert_eq!(done.assigned, 3);
    assert_eq!(done.fulfilled_count, 10);
    assert_eq!(done.status, OrderStatus::Fulfilled);
    assert_eq!(done.message(), "Order fulfilled. Assigned 3 additional leads.");

    let detail = ctl.get(created.order_id).await.unwrap();
    assert_eq!(detail.order.fulfilled_count, 10);
    assert_eq!(detail.order.status, OrderStatus::Fulfilled);
    assert!(detail.order.completed_at_utc.is_some());
    let counts: Vec<(String, i64)> = detail
        .progress
        .iter()
        .map(|p| (p.state.to_string(), p.fulfilled_count))
        .collect();
    assert_eq!(counts, vec![("FL".to_string(), 6), ("TX".to_string(), 4)]);
    assert_eq!(bound_lead_ids(&db.pool, "ORD-FLTX").await.unwrap().len(), 10);

    // Terminal now.
    let err = ctl.fulfill(created.order_id).await.unwrap_err();
    assert!(matches!(err, OrderError::AlreadyFulfilled { .. }));

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn fulfill_without_new_stock_adds_nothing_and_stays_active() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 3).await.unwrap();
    seed_leads(&db.pool, "TX", 4).await.unwrap();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    let created = ctl
        .create(&create_req("ORD-DRY", "FL,TX", 10, Some("FL=3,TX=4")))
        .await
        .unwrap();
    assert_eq!(created.assigned, 7);

    let again = ctl.fulfill(created.order_id).await.unwrap();
    assert_eq!(again.assigned, 0);
    assert_eq!(again.fulfilled_count, 7);
    assert_eq!(again.status, OrderStatus::Active);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn create_fulfill_export_delete_round_trip() {
    let db = setup().await;
    let fl = seed_leads(&db.pool, "FL", 2).await.unwrap();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    let created = ctl.create(&create_req("ORD-RT", "FL", 5, None)).await.unwrap();
    assert_eq!(created.assigned, 2);

    let err = ctl.export(created.order_id).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFulfilled { .. }));

    // New stock arrives; fulfill tops the order up.
    seed_leads(&db.pool, "FL", 4).await.unwrap();
    let filled = ctl.fulfill(created.order_id).await.unwrap();
    assert_eq!(filled.assigned, 3);
    assert_eq!(filled.status, OrderStatus::Fulfilled);
    assert_eq!(filled.fulfilled_count, 5);

    let detail = ctl.get(created.order_id).await.unwrap();
    assert!(detail.order.completed_at_utc.is_some());

    let export = ctl.export(created.order_id).await.unwrap();
    assert_eq!(export.rows.len(), 5);
    assert_eq!(export.file_name(), "order_ORD-RT_export.csv");
    assert!(export.rows.iter().all(|r| r.order_number == "ORD-RT" && r.state == "FL"));

    let deleted = ctl.delete(created.order_id).await.unwrap();
    assert_eq!(deleted.released, 5);
    assert!(bound_lead_ids(&db.pool, "ORD-RT").await.unwrap().is_empty());
    assert_eq!(count_progress_rows(&db.pool, created.order_id).await.unwrap(), 0);
    assert!(matches!(
        ctl.get(created.order_id).await.unwrap_err(),
        OrderError::NotFound { .. }
    ));

    // Released leads are allocatable again, lowest id first.
    let next = ctl.create(&create_req("ORD-NEXT", "FL", 1, None)).await.unwrap();
    assert_eq!(next.allocation.per_state[0].lead_ids, vec![fl[0]]);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn fulfilled_order_is_terminal() {
    let db = setup().await;
    seed_leads(&db.pool, "GA", 3).await.unwrap();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    let created = ctl.create(&create_req("ORD-DONE", "GA", 3, None)).await.unwrap();
    assert_eq!(created.status, OrderStatus::Fulfilled);

    let before = ctl.get(created.order_id).await.unwrap();
    let err = ctl.fulfill(created.order_id).await.unwrap_err();
    assert!(matches!(err, OrderError::AlreadyFulfilled { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let after = ctl.get(created.order_id).await.unwrap();
    assert_eq!(after.order.fulfilled_count, before.order.fulfilled_count);
    assert_eq!(after.order.completed_at_utc, before.order.completed_at_utc);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn unknown_order_is_not_found_everywhere() {
    let db = setup().await;
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    assert_eq!(ctl.fulfill(9999).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(ctl.delete(9999).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(ctl.export(9999).await.unwrap_err().kind(), ErrorKind::NotFound);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn duplicate_order_number_is_rejected_without_side_effects() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 4).await.unwrap();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    ctl.create(&create_req("ORD-DUP", "FL", 2, None)).await.unwrap();
    let err = ctl.create(&create_req("ORD-DUP", "FL", 2, None)).await.unwrap_err();
    assert!(matches!(err, OrderError::DuplicateOrder { .. }));
    assert_eq!(err.to_string(), "Order number already exists");

    assert_eq!(count_orders_named(&db.pool, "ORD-DUP").await.unwrap(), 1);
    assert_eq!(bound_lead_ids(&db.pool, "ORD-DUP").await.unwrap().len(), 2);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn one_time_product_seen_before_is_rejected_with_no_writes() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 4).await.unwrap();
    let guard = MemGuard::seeded("WC-1001");
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), guard.clone());

    let mut req = create_req("ORD-ONCE", "FL", 2, None);
    req.product_name = Some("Aged Leads - One Time".to_string());
    req.actual_order_number = Some("WC-1001".to_string());

    let err = ctl.create(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);
    assert_eq!(err.to_string(), "Order already processed (One Time).");

    assert_eq!(count_orders_named(&db.pool, "ORD-ONCE").await.unwrap(), 0);
    assert!(bound_lead_ids(&db.pool, "ORD-ONCE").await.unwrap().is_empty());
    assert!(guard.records().is_empty());

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn guard_entry_is_recorded_after_commit() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 1).await.unwrap();
    let guard = MemGuard::default();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), guard.clone());

    let mut req = create_req("ORD-REC", "FL", 1, None);
    req.actual_order_number = Some("WC-2002".to_string());
    ctl.create(&req).await.unwrap();

    assert_eq!(
        guard.records(),
        vec![("ORD-REC".to_string(), "WC-2002".to_string())]
    );

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn failing_guard_write_does_not_fail_the_order() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 2).await.unwrap();
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), BrokenGuard);

    let mut req = create_req("ORD-GUARD", "FL", 2, None);
    req.actual_order_number = Some("WC-3003".to_string());
    let created = ctl.create(&req).await.unwrap();

    assert_eq!(created.assigned, 2);
    assert_eq!(count_orders_named(&db.pool, "ORD-GUARD").await.unwrap(), 1);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn pg_guard_ledger_blocks_second_one_time_order() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 4).await.unwrap();
    let ctl = OrderController::new(db.pool.clone(), OrderPolicy::default());

    let mut first = create_req("ORD-OT-1", "FL", 1, None);
    first.product_name = Some("One Time Blast".to_string());
    first.actual_order_number = Some("WC-4004".to_string());
    ctl.create(&first).await.unwrap();

    let mut second = first.clone();
    second.order_number = Some("ORD-OT-2".to_string());
    let err = ctl.create(&second).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn concurrent_fulfills_never_overfill_or_double_bind() {
    let db = setup().await;
    let ctl = OrderController::with_guard(db.pool.clone(), OrderPolicy::default(), MemGuard::default());

    let a = ctl.create(&create_req("ORD-A", "FL", 6, None)).await.unwrap();
    let b = ctl.create(&create_req("ORD-B", "FL", 6, None)).await.unwrap();
    assert_eq!(a.assigned + b.assigned, 0);

    seed_leads(&db.pool, "FL", 8).await.unwrap();

    let mut calls = Vec::new();
    for id in [a.order_id, b.order_id, a.order_id, b.order_id] {
        let ctl = ctl.clone();
        calls.push(tokio::spawn(async move { ctl.fulfill(id).await }));
    }
    for r in futures_util::future::join_all(calls).await {
        match r.unwrap() {
            Ok(_) => {}
            Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidStateTransition, "{e}"),
        }
    }

    let leads_a = bound_lead_ids(&db.pool, "ORD-A").await.unwrap();
    let leads_b = bound_lead_ids(&db.pool, "ORD-B").await.unwrap();
    let overlap: Vec<_> = leads_a.iter().filter(|id| leads_b.contains(id)).collect();
    assert!(overlap.is_empty());
    assert_eq!(leads_a.len() + leads_b.len(), 8);

    for id in [a.order_id, b.order_id] {
        let d = ctl.get(id).await.unwrap();
        assert!(d.order.fulfilled_count <= d.order.quantity);
        let per_state: i64 = d.progress.iter().map(|p| p.fulfilled_count).sum();
        assert_eq!(per_state, d.order.fulfilled_count);
    }

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn list_pages_newest_first_and_stock_counts_free_leads() {
    let db = setup().await;
    seed_leads(&db.pool, "FL", 3).await.unwrap();
    seed_leads(&db.pool, "TX", 2).await.unwrap();
    let policy = OrderPolicy {
        page_size: 2,
        ..OrderPolicy::default()
    };
    let ctl = OrderController::with_guard(db.pool.clone(), policy, MemGuard::default());

    for n in ["ORD-1", "ORD-2", "ORD-3"] {
        ctl.create(&create_req(n, "FL", 1, None)).await.unwrap();
    }

    let p1 = ctl.list(1).await.unwrap();
    assert_eq!(p1.total, 3);
    assert_eq!(p1.total_pages, 2);
    let names: Vec<_> = p1.orders.iter().map(|o| o.order_number.as_str()).collect();
    assert_eq!(names, vec!["ORD-3", "ORD-2"]);

    let p0 = ctl.list(0).await.unwrap();
    assert_eq!(p0.page, 1);

    let stock = ctl.stock().await.unwrap();
    let counts: Vec<(String, i64)> = stock.into_iter().map(|s| (s.state, s.free_leads)).collect();
    assert_eq!(counts, vec![("TX".to_string(), 2)]);

    db.teardown().await.unwrap();
}
