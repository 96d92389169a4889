//! Lead pool: free-lead selection/binding, release, and read paths.

use anyhow::{Context, Result};
use ldk_allocation::{LeadId, LeadPool};
use ldk_schemas::{FreeStock, LeadExportRow, StateCode};
use sqlx::{PgConnection, PgPool};

/// [`LeadPool`] over a connection that is already inside a transaction.
///
/// Selection takes row locks with `FOR UPDATE SKIP LOCKED`: a concurrent
/// allocation pass never waits on, nor sees, leads another open transaction
/// has picked. The bind `UPDATE` re-checks that each lead is still free, so a
/// lead can only ever be bound once even if the locking were bypassed.
pub struct PgLeadPool<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgLeadPool<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

impl LeadPool for PgLeadPool<'_> {
    async fn bind_free_leads(
        &mut self,
        state: &StateCode,
        limit: i64,
        order_number: &str,
    ) -> Result<Vec<LeadId>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64,)> = sqlx::query_as::<_, (i64,)>(
            r#"
            with picked as (
              select id
              from lead_details
              where state = $1
                and (order_number is null or order_number = '')
              order by id asc
              limit $2
              for update skip locked
            )
            update lead_details l
            set order_number = $3
            from picked
            where l.id = picked.id
              and (l.order_number is null or l.order_number = '')
            returning l.id
            "#,
        )
        .bind(state.as_str())
        .bind(limit)
        .bind(order_number)
        .fetch_all(&mut *self.conn)
        .await
        .context("bind_free_leads failed")?;

        // RETURNING order is unspecified; callers expect ascending ids.
        let mut ids: Vec<LeadId> = rows.into_iter().map(|(id,)| id).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Return every lead bound to `order_number` to the free pool.
pub async fn release_order_leads(conn: &mut PgConnection, order_number: &str) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update lead_details
        set order_number = null
        where order_number = $1
        "#,
    )
    .bind(order_number)
    .execute(conn)
    .await
    .context("release_order_leads failed")?;

    Ok(res.rows_affected())
}

/// Leads bound to `order_number`, ascending lead id.
pub async fn fetch_bound_leads(pool: &PgPool, order_number: &str) -> Result<Vec<LeadExportRow>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as::<_, (String, String, String)>(
        r#"
        select phone_number, state, order_number
        from lead_details
        where order_number = $1
        order by id asc
        "#,
    )
    .bind(order_number)
    .fetch_all(pool)
    .await
    .context("fetch_bound_leads failed")?;

    Ok(rows
        .into_iter()
        .map(|(phone_number, state, order_number)| LeadExportRow {
            phone_number,
            state,
            order_number,
        })
        .collect())
}

/// Free-lead counts per state, sorted by state.
pub async fn free_stock_by_state(pool: &PgPool) -> Result<Vec<FreeStock>> {
    let rows: Vec<(String, i64)> = sqlx::query_as::<_, (String, i64)>(
        r#"
        select state, count(*)::bigint
        from lead_details
        where order_number is null or order_number = ''
        group by state
        order by state asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("free_stock_by_state failed")?;

    Ok(rows
        .into_iter()
        .map(|(state, free_leads)| FreeStock { state, free_leads })
        .collect())
}
