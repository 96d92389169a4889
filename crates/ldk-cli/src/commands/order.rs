use anyhow::{Context, Result};
use ldk_orders::CreateOrderRequest;
use ldk_schemas::OrderRecord;

use super::{local_time, CliContext};
use crate::OrderCmd;

pub(crate) async fn run(config_paths: &[String], cmd: OrderCmd) -> Result<()> {
    match cmd {
        OrderCmd::Create {
            order_number,
            states,
            quantity,
            thresholds,
            product_name,
            external_ref,
        } => {
            let req = CreateOrderRequest {
                order_number: Some(order_number),
                states: Some(states),
                quantity: Some(quantity),
                thresholds,
                product_name,
                actual_order_number: external_ref,
            };
            // Reject bad input before any connection is opened.
            let order = req.validate()?;

            let ctx = CliContext::connect(config_paths).await?;
            let out = ctx.orders.create_validated(&order).await?;
            println!(
                "order_id={} order_number={} assigned={} status={}",
                out.order_id,
                out.order_number,
                out.assigned,
                out.status.as_str()
            );
            for s in &out.allocation.per_state {
                println!("state={} cap={} assigned={}", s.state.as_str(), s.cap, s.assigned);
            }
        }

        OrderCmd::Fulfill { id } => {
            let ctx = CliContext::connect(config_paths).await?;
            let out = ctx.orders.fulfill(id).await?;
            println!(
                "order_id={} assigned={} fulfilled_count={} quantity={} status={}",
                out.order_id,
                out.assigned,
                out.fulfilled_count,
                out.quantity,
                out.status.as_str()
            );
        }

        OrderCmd::Delete { id, yes } => {
            if !yes {
                anyhow::bail!(
                    "REFUSING DELETE: order {id} will be removed and its leads returned to stock.\n\
                     Re-run with: `ldk order delete --id {id} --yes`"
                );
            }
            let ctx = CliContext::connect(config_paths).await?;
            let out = ctx.orders.delete(id).await?;
            println!(
                "order_id={} order_number={} released={}",
                out.order_id, out.order_number, out.released
            );
        }

        OrderCmd::Show { id, json } => {
            let ctx = CliContext::connect(config_paths).await?;
            let detail = ctx.orders.get(id).await?;
            if json {
                let body = serde_json::to_string_pretty(&detail)
                    .context("order detail serialize failed")?;
                println!("{body}");
            } else {
                print_order(&detail.order, &ctx);
                for p in &detail.progress {
                    println!(
                        "state={} threshold={} fulfilled_count={}",
                        p.state.as_str(),
                        p.threshold,
                        p.fulfilled_count
                    );
                }
            }
        }

        OrderCmd::List { page } => {
            let ctx = CliContext::connect(config_paths).await?;
            let page = ctx.orders.list(page).await?;
            println!(
                "page={} total_pages={} total={}",
                page.page, page.total_pages, page.total
            );
            for o in &page.orders {
                print_order(o, &ctx);
            }
        }

        OrderCmd::Export { id, out } => {
            let ctx = CliContext::connect(config_paths).await?;
            let export = ctx.orders.export(id).await?;
            let csv = export.to_csv()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("failed to write export: {path}"))?;
                    println!("export_path={} rows={}", path, export.rows.len());
                }
                None => print!("{csv}"),
            }
        }
    }

    Ok(())
}

fn print_order(o: &OrderRecord, ctx: &CliContext) {
    let completed = o
        .completed_at_utc
        .map(|t| local_time(t, ctx.display_tz))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "order_id={} order_number={} states={} quantity={} fulfilled_count={} status={} created=\"{}\" completed=\"{}\"",
        o.id,
        o.order_number,
        o.states.to_storage(),
        o.quantity,
        o.fulfilled_count,
        o.status.as_str(),
        local_time(o.created_at_utc, ctx.display_tz),
        completed
    );
}
