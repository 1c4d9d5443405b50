//! `waybill order ...` handlers.

use anyhow::{Context as _, Result};
use chrono::SecondsFormat;
use wb_lifecycle::OrderStatus;
use wb_schemas::LocationFix;
use wb_service::{NewOrder, Outcome};

use super::{opt_dt, opt_str, parse_timestamp, Context};

fn print_outcome(out: &Outcome) {
    println!("order_id={}", out.order.order_id);
    println!("status={}", out.order.status);
    println!("event_type={}", out.record.event_type);
    println!("transaction_id={}", out.record.transaction_id);
    println!("record_hash={}", out.record.record_hash);
}

pub fn create(
    ctx: &Context,
    customer_id: String,
    product_name: String,
    product_id: Option<String>,
    quantity: u32,
) -> Result<()> {
    let svc = ctx.service(false)?;
    let out = svc.create_order(NewOrder {
        customer_id,
        product_name,
        product_id,
        quantity,
    })?;
    print_outcome(&out);
    println!("content_hash={}", out.order.content_hash);
    Ok(())
}

pub fn dispatch(ctx: &Context, order_id: &str, tracker_id: Option<&str>) -> Result<()> {
    let svc = ctx.service(false)?;
    let out = svc.dispatch(order_id, tracker_id)?;
    print_outcome(&out);
    println!("gps_tracker_id={}", opt_str(out.order.gps_tracker_id.as_deref()));
    if let Some(qr) = &out.order.qr_code {
        println!("qr_hash={}", qr.hash);
    }
    Ok(())
}

pub fn status(ctx: &Context, order_id: &str, status: &str) -> Result<()> {
    let next = OrderStatus::parse(status.trim()).with_context(|| {
        format!(
            "unknown status '{status}'. expected one of: {}",
            OrderStatus::ALL.map(|s| s.as_str()).join(" | ")
        )
    })?;

    let svc = ctx.service(false)?;
    let out = svc.update_status(order_id, next)?;
    print_outcome(&out);
    Ok(())
}

pub fn locate(
    ctx: &Context,
    order_id: &str,
    latitude: f64,
    longitude: f64,
    gps_tracker_id: String,
    timestamp: &str,
    signature: String,
) -> Result<()> {
    let fix = LocationFix {
        latitude,
        longitude,
        gps_tracker_id,
        timestamp: parse_timestamp(timestamp)?,
        signature,
    };

    let svc = ctx.service(true)?;
    let out = svc.update_location(order_id, fix)?;
    print_outcome(&out);
    println!("location_count={}", out.order.locations.len());
    Ok(())
}

pub fn deliver(ctx: &Context, order_id: &str, proof: Option<String>) -> Result<()> {
    let svc = ctx.service(false)?;
    let out = svc.deliver(order_id, proof)?;
    print_outcome(&out);
    println!("delivered_at={}", opt_dt(&out.order.delivered_at));
    Ok(())
}

pub fn show(ctx: &Context, order_id: &str) -> Result<()> {
    let details = ctx.service(false)?.get_order(order_id)?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let orders = ctx.service(false)?.list_orders()?;
    println!("{}", serde_json::to_string_pretty(&orders)?);
    Ok(())
}

pub fn verify(ctx: &Context, order_id: &str) -> Result<()> {
    let s = ctx.service(false)?.verify(order_id)?;
    println!("order_id={}", s.order_id);
    println!("status={}", s.status);
    println!("content_hash={}", s.content_hash);
    println!("content_hash_valid={}", s.content_hash_valid);
    println!("ledger_intact={}", s.ledger_intact);
    println!("authentic={}", s.is_authentic());
    println!("transaction_count={}", s.transaction_count);
    println!("location_count={}", s.location_count);
    println!(
        "created_at={}",
        s.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    println!("delivered_at={}", opt_dt(&s.delivered_at));
    Ok(())
}
