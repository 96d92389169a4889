use std::future::Future;

use anyhow::Result;
use sqlx::PgPool;

/// External one-time guard ledger.
///
/// `already_processed` gates creation of one-time products; `record` runs after
/// a successful create and its failures are only logged.
pub trait GuardLedger: Clone + Send + Sync + 'static {
    fn already_processed(&self, external_ref: &str) -> impl Future<Output = Result<bool>> + Send;

    fn record(&self, order_name: &str, external_ref: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Guard ledger backed by the `automation` table.
#[derive(Debug, Clone)]
pub struct PgGuardLedger {
    pool: PgPool,
}

impl PgGuardLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl GuardLedger for PgGuardLedger {
    async fn already_processed(&self, external_ref: &str) -> Result<bool> {
        ldk_db::guard_entry_exists(&self.pool, external_ref).await
    }

    async fn record(&self, order_name: &str, external_ref: &str) -> Result<()> {
        ldk_db::insert_guard_entry(&self.pool, order_name, external_ref).await
    }
}
