//! Order ledger: `lead_orders` and `lead_order_states`.

use anyhow::{anyhow, bail, Context, Result};
use ldk_schemas::{OrderRecord, OrderStatus, StateCode, StateList, StateProgress};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, Row};

use crate::{is_unique_constraint_violation, UQ_ORDER_NUMBER};

#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub states: &'a StateList,
    pub quantity: i64,
    pub product_name: Option<&'a str>,
    pub external_ref: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOrderOutcome {
    Inserted { order_id: i64 },
    /// `uq_lead_orders_order_number` rejected the row. The surrounding
    /// transaction is aborted and must be dropped.
    DuplicateOrderNumber,
}

/// Insert a new order row (status `active`, fulfilled_count 0).
pub async fn insert_order(conn: &mut PgConnection, order: &NewOrder<'_>) -> Result<InsertOrderOutcome> {
    let res = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into lead_orders (
          order_number, states, quantity, product_name, actual_order_number
        ) values (
          $1, $2, $3, $4, $5
        )
        returning id
        "#,
    )
    .bind(order.order_number)
    .bind(order.states.to_storage())
    .bind(order.quantity)
    .bind(order.product_name)
    .bind(order.external_ref)
    .fetch_one(conn)
    .await;

    match res {
        Ok((order_id,)) => Ok(InsertOrderOutcome::Inserted { order_id }),
        Err(e) if is_unique_constraint_violation(&e, UQ_ORDER_NUMBER) => {
            Ok(InsertOrderOutcome::DuplicateOrderNumber)
        }
        Err(e) => Err(anyhow::Error::new(e).context("insert_order failed")),
    }
}

/// Insert the progress row for one state. `position` is the state's index in
/// the order's list so progress reads back in list order.
pub async fn insert_state_progress(
    conn: &mut PgConnection,
    order_id: i64,
    position: i32,
    state: &StateCode,
    threshold: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into lead_order_states (order_id, state, position, threshold)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id)
    .bind(state.as_str())
    .bind(position)
    .bind(threshold)
    .execute(conn)
    .await
    .with_context(|| format!("insert_state_progress failed: order_id={order_id} state={state}"))?;

    Ok(())
}

pub async fn order_number_exists<'e, E>(ex: E, order_number: &str) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        "select exists (select 1 from lead_orders where order_number = $1)",
    )
    .bind(order_number)
    .fetch_one(ex)
    .await
    .context("order_number_exists failed")?;

    Ok(exists)
}

fn order_from_row(row: &PgRow) -> Result<OrderRecord> {
    let states_raw: String = row.try_get("states")?;
    let status_raw: String = row.try_get("status")?;

    Ok(OrderRecord {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        states: StateList::parse(&states_raw)
            .ok_or_else(|| anyhow!("stored order has no valid states: {:?}", states_raw))?,
        quantity: row.try_get("quantity")?,
        fulfilled_count: row.try_get("fulfilled_count")?,
        status: OrderStatus::parse(&status_raw)
            .ok_or_else(|| anyhow!("invalid order status: {}", status_raw))?,
        product_name: row.try_get("product_name")?,
        external_ref: row.try_get("actual_order_number")?,
        created_at_utc: row.try_get("created_at_utc")?,
        completed_at_utc: row.try_get("completed_at_utc")?,
    })
}

pub async fn fetch_order<'e, E>(ex: E, order_id: i64) -> Result<Option<OrderRecord>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        select
          id,
          order_number,
          states,
          quantity,
          fulfilled_count,
          status,
          product_name,
          actual_order_number,
          created_at_utc,
          completed_at_utc
        from lead_orders
        where id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(ex)
    .await
    .context("fetch_order failed")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Like [`fetch_order`] but takes a row lock held until the transaction ends.
/// Every mutation of an existing order goes through this lock first, which
/// serializes concurrent fulfill/delete calls on the same order.
pub async fn fetch_order_for_update(
    conn: &mut PgConnection,
    order_id: i64,
) -> Result<Option<OrderRecord>> {
    let row = sqlx::query(
        r#"
        select
          id,
          order_number,
          states,
          quantity,
          fulfilled_count,
          status,
          product_name,
          actual_order_number,
          created_at_utc,
          completed_at_utc
        from lead_orders
        where id = $1
        for update
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
    .context("fetch_order_for_update failed")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Per-state progress rows in list order.
pub async fn fetch_state_progress<'e, E>(ex: E, order_id: i64) -> Result<Vec<StateProgress>>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<(String, i64, i64)> = sqlx::query_as::<_, (String, i64, i64)>(
        r#"
        select state, threshold, fulfilled_count
        from lead_order_states
        where order_id = $1
        order by position asc
        "#,
    )
    .bind(order_id)
    .fetch_all(ex)
    .await
    .context("fetch_state_progress failed")?;

    rows.into_iter()
        .map(|(state, threshold, fulfilled_count)| {
            let state = StateCode::parse(&state)
                .ok_or_else(|| anyhow!("invalid stored state code: {:?}", state))?;
            Ok(StateProgress {
                state,
                threshold,
                fulfilled_count,
            })
        })
        .collect()
}

/// Add `added` to the order's fulfilled count and derive status in the same
/// statement. `completed_at_utc` is stamped the first time the target is reached
/// and never moved afterwards.
pub async fn add_order_progress(
    conn: &mut PgConnection,
    order_id: i64,
    added: i64,
) -> Result<OrderRecord> {
    let row = sqlx::query(
        r#"
        update lead_orders
        set fulfilled_count = fulfilled_count + $2,
            status = case
              when fulfilled_count + $2 >= quantity then 'fulfilled'
              else 'active'
            end,
            completed_at_utc = case
              when fulfilled_count + $2 >= quantity then coalesce(completed_at_utc, now())
              else completed_at_utc
            end
        where id = $1
        returning
          id,
          order_number,
          states,
          quantity,
          fulfilled_count,
          status,
          product_name,
          actual_order_number,
          created_at_utc,
          completed_at_utc
        "#,
    )
    .bind(order_id)
    .bind(added)
    .fetch_optional(conn)
    .await
    .context("add_order_progress failed")?;

    match row {
        Some(r) => order_from_row(&r),
        None => bail!("add_order_progress: order not found: {}", order_id),
    }
}

/// Add `added` to one state's fulfilled count.
pub async fn add_state_progress(
    conn: &mut PgConnection,
    order_id: i64,
    state: &StateCode,
    added: i64,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update lead_order_states
        set fulfilled_count = fulfilled_count + $3
        where order_id = $1 and state = $2
        "#,
    )
    .bind(order_id)
    .bind(state.as_str())
    .bind(added)
    .execute(conn)
    .await
    .with_context(|| format!("add_state_progress failed: order_id={order_id} state={state}"))?;

    if res.rows_affected() != 1 {
        bail!(
            "add_state_progress: no progress row for order_id={} state={}",
            order_id,
            state
        );
    }
    Ok(())
}

/// Delete the order's progress rows, then the order row. Returns the number of
/// progress rows removed.
pub async fn delete_order(conn: &mut PgConnection, order_id: i64) -> Result<u64> {
    let states = sqlx::query("delete from lead_order_states where order_id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await
        .context("delete lead_order_states failed")?;

    let order = sqlx::query("delete from lead_orders where id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await
        .context("delete lead_orders failed")?;

    if order.rows_affected() != 1 {
        bail!("delete_order: order not found: {}", order_id);
    }

    Ok(states.rows_affected())
}

/// Newest-first page of orders.
pub async fn list_orders(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<OrderRecord>> {
    let rows = sqlx::query(
        r#"
        select
          id,
          order_number,
          states,
          quantity,
          fulfilled_count,
          status,
          product_name,
          actual_order_number,
          created_at_utc,
          completed_at_utc
        from lead_orders
        order by created_at_utc desc, id desc
        limit $1 offset $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("list_orders failed")?;

    rows.iter().map(order_from_row).collect()
}

pub async fn count_orders(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>("select count(*)::bigint from lead_orders")
        .fetch_one(pool)
        .await
        .context("count_orders failed")?;
    Ok(n)
}
