//! Signing-key resolution.
//!
//! Config stores only the env var NAME. [`resolve_signing_key`] is called
//! once at startup and the resulting [`SigningKey`] is passed into
//! constructors. Error messages name the variable, never its value.

use anyhow::{bail, Result};
use wb_codec::SigningKey;

use crate::WaybillConfig;

pub const DEFAULT_SIGNING_KEY_ENV: &str = "WAYBILL_GPS_SIGNING_KEY";

/// Resolve the GPS signing key from the environment variable named in config.
pub fn resolve_signing_key(cfg: &WaybillConfig) -> Result<SigningKey> {
    resolve_signing_key_with(cfg, |name| std::env::var(name).ok())
}

/// Same as [`resolve_signing_key`] with an injectable lookup (tests).
pub fn resolve_signing_key_with<F>(cfg: &WaybillConfig, lookup: F) -> Result<SigningKey>
where
    F: Fn(&str) -> Option<String>,
{
    let var = cfg.secrets.signing_key_env.trim();
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => Ok(SigningKey::from_secret_str(v.trim())),
        _ => bail!("SIGNING_KEY_MISSING: environment variable {var} is unset or empty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_names_variable() {
        let cfg = WaybillConfig::default();
        let err = resolve_signing_key_with(&cfg, |_| None).unwrap_err();
        assert!(err.to_string().contains(DEFAULT_SIGNING_KEY_ENV));
    }

    #[test]
    fn blank_key_is_missing() {
        let cfg = WaybillConfig::default();
        assert!(resolve_signing_key_with(&cfg, |_| Some("   ".into())).is_err());
    }

    #[test]
    fn resolved_key_signs_like_the_literal() {
        let mut cfg = WaybillConfig::default();
        cfg.secrets.signing_key_env = "CUSTOM_KEY_VAR".into();
        let key = resolve_signing_key_with(&cfg, |name| {
            (name == "CUSTOM_KEY_VAR").then(|| "s3cret".to_string())
        })
        .unwrap();
        let expected = SigningKey::from_secret_str("s3cret");
        assert_eq!(
            wb_codec::sign(&key, &["a", "b"]),
            wb_codec::sign(&expected, &["a", "b"])
        );
        assert!(!format!("{key:?}").contains("s3cret"));
    }
}
