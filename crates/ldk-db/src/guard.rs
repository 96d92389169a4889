//! One-time guard ledger (`automation`).
//!
//! The table belongs to an external workflow; this crate only asks whether an
//! external reference was already processed and appends new entries.

use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn guard_entry_exists(pool: &PgPool, external_ref: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        "select exists (select 1 from automation where order_number = $1)",
    )
    .bind(external_ref)
    .fetch_one(pool)
    .await
    .context("guard_entry_exists failed")?;

    Ok(exists)
}

pub async fn insert_guard_entry(pool: &PgPool, order_name: &str, external_ref: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into automation (order_name, order_number)
        values ($1, $2)
        "#,
    )
    .bind(order_name)
    .bind(external_ref)
    .execute(pool)
    .await
    .context("insert_guard_entry failed")?;

    Ok(())
}
