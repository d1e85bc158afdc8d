//! Layered YAML configuration loading plus the typed [`AppConfig`] this
//! engine runs on.
//!
//! The merge/canonicalize/hash machinery is a direct generalization of the
//! teacher's `mqk-config::load_layered_yaml`: later files in `paths` deep-merge
//! over earlier ones, and the merged document is canonicalized (sorted keys,
//! compact JSON) before hashing so the same logical config always produces
//! the same `config_hash` regardless of key order in the source YAML.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub mod environment;

pub use environment::Environment;

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Typed view over the §6 "Configuration" table. Every field has the
/// spec-mandated default; `from_env` overlays `CEM_*` environment variables
/// on top of a parsed [`LoadedConfig`] (or on top of bare defaults, for
/// environments with no YAML file at all).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub primary_store_url: Option<String>,
    pub secondary_store_url: Option<String>,
    pub queue_broker_url: Option<String>,

    pub llm_provider: String,
    pub max_tokens_per_job: u32,
    pub daily_cost_limit_usd: f64,
    pub claude_input_cost_per_million: f64,
    pub claude_output_cost_per_million: f64,

    pub match_lookback_days: i64,
    pub match_threshold_high: f64,
    pub match_threshold_medium: f64,
    pub confidence_high_threshold: f64,
    pub confidence_low_threshold: f64,

    pub circuit_breaker_fail_max: u32,
    pub circuit_breaker_reset_timeout_secs: u64,

    pub max_attachment_bytes: u64,

    pub admin_email: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub portal_webhook_url: Option<String>,
    pub portal_webhook_secret: Option<String>,

    pub environment: Environment,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary_store_url: None,
            secondary_store_url: None,
            queue_broker_url: None,
            llm_provider: "anthropic".to_string(),
            max_tokens_per_job: 100_000,
            daily_cost_limit_usd: 50.0,
            claude_input_cost_per_million: 3.0,
            claude_output_cost_per_million: 15.0,
            match_lookback_days: 30,
            match_threshold_high: 0.70,
            match_threshold_medium: 0.15,
            confidence_high_threshold: 0.85,
            confidence_low_threshold: 0.60,
            circuit_breaker_fail_max: 5,
            circuit_breaker_reset_timeout_secs: 60,
            max_attachment_bytes: 20 * 1024 * 1024,
            admin_email: None,
            smtp_host: None,
            smtp_port: None,
            portal_webhook_url: None,
            portal_webhook_secret: None,
            environment: Environment::Development,
        }
    }
}

impl AppConfig {
    /// Builds config from a merged YAML document, falling back to defaults
    /// for any field the YAML doesn't set.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        serde_json::from_value(loaded.config_json.clone())
            .context("config document does not match AppConfig shape")
    }

    /// Overlays `CEM_*` environment variables (useful for secrets that
    /// should never land in a checked-in YAML file, matching `mqk-db`'s
    /// `MQK_DATABASE_URL` pattern).
    pub fn overlay_env(mut self) -> Self {
        if let Ok(v) = std::env::var("CEM_PRIMARY_STORE_URL") {
            self.primary_store_url = Some(v);
        }
        if let Ok(v) = std::env::var("CEM_SECONDARY_STORE_URL") {
            self.secondary_store_url = Some(v);
        }
        if let Ok(v) = std::env::var("CEM_QUEUE_BROKER_URL") {
            self.queue_broker_url = Some(v);
        }
        if let Ok(v) = std::env::var("CEM_ADMIN_EMAIL") {
            self.admin_email = Some(v);
        }
        if let Ok(v) = std::env::var("CEM_PORTAL_WEBHOOK_SECRET") {
            self.portal_webhook_secret = Some(v);
        }
        if let Ok(v) = std::env::var("CEM_ENVIRONMENT") {
            if let Ok(env) = v.parse() {
                self.environment = env;
            }
        }
        self
    }
}

pub const ENV_DB_URL: &str = "CEM_PRIMARY_STORE_URL";

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn deep_merge_overrides_scalars_and_merges_objects() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yaml");
        let override_file = dir.path().join("override.yaml");

        std::fs::write(&base, "daily_cost_limit_usd: 50\nllm_provider: anthropic\n").unwrap();
        std::fs::write(&override_file, "daily_cost_limit_usd: 75\n").unwrap();

        let loaded = load_layered_yaml(&[base.to_str().unwrap(), override_file.to_str().unwrap()])
            .unwrap();
        let cfg = AppConfig::from_loaded(&loaded).unwrap();

        assert_eq!(cfg.daily_cost_limit_usd, 75.0);
        assert_eq!(cfg.llm_provider, "anthropic");
    }

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.max_tokens_per_job, 100_000);
        assert_eq!(cfg.daily_cost_limit_usd, 50.0);
        assert_eq!(cfg.confidence_high_threshold, 0.85);
        assert_eq!(cfg.confidence_low_threshold, 0.60);
    }

    #[test]
    fn config_hash_is_stable_under_key_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.yaml");
        let b = dir.path().join("b.yaml");
        std::fs::write(&a, "llm_provider: anthropic\nmax_tokens_per_job: 1000\n").unwrap();
        std::fs::write(&b, "max_tokens_per_job: 1000\nllm_provider: anthropic\n").unwrap();

        let loaded_a = load_layered_yaml(&[a.to_str().unwrap()]).unwrap();
        let loaded_b = load_layered_yaml(&[b.to_str().unwrap()]).unwrap();
        assert_eq!(loaded_a.config_hash, loaded_b.config_hash);
    }

    #[test]
    fn overlay_env_prefers_env_over_yaml() {
        std::env::set_var("CEM_ADMIN_EMAIL", "ops@example.com");
        let cfg = AppConfig::default().overlay_env();
        assert_eq!(cfg.admin_email.as_deref(), Some("ops@example.com"));
        std::env::remove_var("CEM_ADMIN_EMAIL");
    }

    #[allow(dead_code)]
    fn _use_write(w: &mut impl Write) {
        let _ = w;
    }
}
