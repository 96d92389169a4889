//! Postgres persistence for the lead desk: lead pool, order ledger and the
//! one-time guard ledger.
//!
//! Functions that take `&mut PgConnection` are meant to run inside a caller's
//! transaction (`&mut *tx`); functions that take `&PgPool` are standalone reads
//! or writes with their own implicit transaction.

mod guard;
mod leads;
mod ledger;

pub use guard::{guard_entry_exists, insert_guard_entry};
pub use leads::{fetch_bound_leads, free_stock_by_state, release_order_leads, PgLeadPool};
pub use ledger::{
    add_order_progress, add_state_progress, count_orders, delete_order, fetch_order,
    fetch_order_for_update, fetch_state_progress, insert_order, insert_state_progress,
    list_orders, order_number_exists, InsertOrderOutcome, NewOrder,
};

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "LDK_DATABASE_URL";

/// Name of the unique constraint guarding client order numbers.
pub const UQ_ORDER_NUMBER: &str = "uq_lead_orders_order_number";

/// Connect to Postgres using LDK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    // to_regclass honours search_path, so isolated test schemas report correctly.
    let (exists,): (bool,) =
        sqlx::query_as::<_, (bool,)>("select to_regclass('lead_orders') is not null")
            .fetch_one(pool)
            .await
            .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // Postgres unique_violation is 23505.
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
