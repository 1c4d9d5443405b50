//! wb-config
//!
//! Layered YAML configuration. Documents are deep-merged in order (later
//! wins), converted to JSON, canonicalized and hashed so a deployment can
//! record exactly which configuration produced its ledger.
//!
//! Secrets never live in config: the YAML names the environment variable
//! that holds the GPS signing key, and [`secrets::resolve_signing_key`]
//! reads it once at startup.

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;

pub use secrets::{resolve_signing_key, DEFAULT_SIGNING_KEY_ENV};

/// Known secret-like prefixes. A leaf string starting with one of these
/// aborts loading with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

pub const DEFAULT_VERIFICATION_BASE_URL: &str = "http://localhost:3000/verify";
pub const DEFAULT_TRACKER_ID_PREFIX: &str = "GPS-";
pub const DEFAULT_STORE_DIR: &str = "waybill-data";

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaybillConfig {
    pub location: LocationSection,
    pub dispatch: DispatchSection,
    pub store: StoreSection,
    pub secrets: SecretsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationSection {
    pub max_jump_km: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    /// `<base>/<order_id>` is encoded into the QR descriptor.
    pub verification_base_url: String,
    pub tracker_id_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsSection {
    /// NAME of the env var holding the GPS signing key. Never the key itself.
    pub signing_key_env: String,
}

impl Default for WaybillConfig {
    fn default() -> Self {
        Self {
            location: LocationSection::default(),
            dispatch: DispatchSection::default(),
            store: StoreSection::default(),
            secrets: SecretsSection::default(),
        }
    }
}

impl Default for LocationSection {
    fn default() -> Self {
        Self {
            max_jump_km: wb_location::DEFAULT_MAX_JUMP_KM,
        }
    }
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            verification_base_url: DEFAULT_VERIFICATION_BASE_URL.to_string(),
            tracker_id_prefix: DEFAULT_TRACKER_ID_PREFIX.to_string(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: DEFAULT_STORE_DIR.to_string(),
        }
    }
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            signing_key_env: DEFAULT_SIGNING_KEY_ENV.to_string(),
        }
    }
}

impl WaybillConfig {
    /// Typed view of a merged config document. Missing keys take defaults;
    /// unknown keys and out-of-range values are rejected.
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: WaybillConfig =
            serde_json::from_value(v.clone()).context("config does not match waybill schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let km = self.location.max_jump_km;
        if !km.is_finite() || km <= 0.0 {
            bail!("CONFIG_INVALID location.max_jump_km must be a positive number, got {km}");
        }
        if self.dispatch.verification_base_url.trim().is_empty() {
            bail!("CONFIG_INVALID dispatch.verification_base_url must not be empty");
        }
        if self.store.dir.trim().is_empty() {
            bail!("CONFIG_INVALID store.dir must not be empty");
        }
        if self.secrets.signing_key_env.trim().is_empty() {
            bail!("CONFIG_INVALID secrets.signing_key_env must name an environment variable");
        }
        Ok(())
    }

    pub fn location_config(&self) -> wb_location::LocationConfig {
        wb_location::LocationConfig {
            max_jump_km: self.location.max_jump_km,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
    pub config: WaybillConfig,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Zero documents yields the built-in defaults.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document parses as null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let config = WaybillConfig::from_json(&merged)?;
    let canonical_json = wb_codec::canonical_json(&merged);
    let config_hash = wb_codec::sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
        config,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
