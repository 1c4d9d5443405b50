//! `waybill ledger ...` and `waybill tracker ...` handlers.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};

use super::{parse_timestamp, Context};

pub fn ledger_verify(ctx: &Context, order_id: &str) -> Result<()> {
    let records = ctx.service(false)?.audit_ledger(order_id)?;
    println!("order_id={order_id}");
    println!("ledger_intact=true");
    println!("records={records}");
    println!("config_hash={}", ctx.config_hash);
    Ok(())
}

/// Device simulation: the printed fields feed `order locate` unchanged.
pub fn tracker_sign(
    ctx: &Context,
    tracker_id: &str,
    latitude: f64,
    longitude: f64,
    timestamp: Option<&str>,
) -> Result<()> {
    let timestamp = match timestamp {
        Some(raw) => parse_timestamp(raw)?,
        None => Utc::now(),
    };
    let fix = wb_location::sign_fix(&ctx.signing_key()?, latitude, longitude, timestamp, tracker_id);

    println!("gps_tracker_id={}", fix.gps_tracker_id);
    println!("latitude={}", fix.latitude);
    println!("longitude={}", fix.longitude);
    println!(
        "timestamp={}",
        fix.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    println!("signature={}", fix.signature);
    Ok(())
}
