//! Command handlers for the `waybill` CLI.
//!
//! Shared wiring (config, store, service) lives here; command logic lives in
//! the submodules.

pub mod audit;
pub mod order;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use tracing::debug;
use wb_codec::SigningKey;
use wb_config::{LoadedConfig, WaybillConfig};
use wb_location::LocationValidator;
use wb_service::{OrderService, ServiceConfig};
use wb_store::FileStore;

/// Everything a command needs, resolved once per invocation.
pub struct Context {
    pub config: WaybillConfig,
    pub config_hash: String,
    pub store_dir: PathBuf,
}

impl Context {
    /// Load layered config (defaults when no paths are given) and apply the
    /// `--store` override.
    pub fn load(config_paths: &[String], store_override: Option<&str>) -> Result<Self> {
        let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
        let LoadedConfig {
            config_hash,
            config,
            ..
        } = wb_config::load_layered_yaml(&path_refs)?;

        let store_dir = PathBuf::from(store_override.unwrap_or(config.store.dir.as_str()));
        debug!(%config_hash, store = %store_dir.display(), "config loaded");
        Ok(Self {
            config,
            config_hash,
            store_dir,
        })
    }

    pub fn signing_key(&self) -> Result<SigningKey> {
        wb_config::resolve_signing_key(&self.config)
    }

    /// Service over the file store. Commands that never check signatures
    /// run without the signing key being set.
    pub fn service(&self, needs_key: bool) -> Result<OrderService<FileStore>> {
        let key = if needs_key {
            self.signing_key()?
        } else {
            self.signing_key()
                .unwrap_or_else(|_| SigningKey::new(Vec::<u8>::new()))
        };

        let store = FileStore::open(&self.store_dir)
            .with_context(|| format!("open store failed: {}", self.store_dir.display()))?;
        Ok(OrderService::new(
            Arc::new(store),
            LocationValidator::new(self.config.location_config(), key),
            ServiceConfig::from(&self.config),
        ))
    }
}

/// `waybill config-hash <paths>`
pub fn config_hash(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = wb_config::load_layered_yaml(&path_refs)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("invalid RFC 3339 timestamp: {raw}"))?;
    Ok(ts.with_timezone(&Utc))
}

fn opt_dt(v: &Option<DateTime<Utc>>) -> String {
    v.map(|t| t.to_rfc3339()).unwrap_or_else(|| "null".to_string())
}

fn opt_str(v: Option<&str>) -> &str {
    v.unwrap_or("null")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timestamp_normalizes_offsets_to_utc() {
        let ts = parse_timestamp("2026-03-01T12:00:00.250+02:00").unwrap();
        assert_eq!(
            ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2026-03-01T10:00:00.250Z"
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn store_override_wins_over_config() {
        let ctx = Context::load(&[], Some("/tmp/elsewhere")).unwrap();
        assert_eq!(ctx.store_dir, PathBuf::from("/tmp/elsewhere"));

        let ctx = Context::load(&[], None).unwrap();
        assert_eq!(ctx.store_dir, PathBuf::from(wb_config::DEFAULT_STORE_DIR));
    }
}
