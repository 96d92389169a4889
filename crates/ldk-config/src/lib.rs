//! Layered YAML configuration for the lead desk.
//!
//! Documents are merged in order (later layers override earlier ones), checked
//! for secret literals, canonicalized to JSON and hashed. The typed view the
//! binaries run on is [`AppConfig`].

mod consumption;
mod secrets;
mod settings;

pub use consumption::{
    consumed_pointers_for, report_unused_keys, ConfigConsumer, UnusedKeyPolicy, UnusedKeyReport,
};
pub use secrets::enforce_no_secret_literals;
pub use settings::{
    AllocationConfig, AppConfig, CorsConfig, DatabaseConfig, DisplayConfig, GuardConfig,
    ServerConfig,
};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Env var overriding `server.bind_addr` for the daemon.
pub const ENV_DAEMON_ADDR: &str = "LDK_DAEMON_ADDR";

/// Comma-separated config layer paths, lowest precedence first.
pub const ENV_CONFIG_PATHS: &str = "LDK_CONFIG";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view with defaults applied for absent keys.
    pub fn app_config(&self) -> Result<AppConfig> {
        AppConfig::from_json(&self.config_json)
    }
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

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses as null; treat it as an empty layer.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
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

/// Compact JSON; object keys come out sorted because `serde_json::Map` is a
/// `BTreeMap` here.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub(crate) fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
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
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layer_overrides_scalar_and_keeps_siblings() {
        let base = "allocation:\n  default_state_cap: 999\ndisplay:\n  page_size: 25\n";
        let overlay = "display:\n  page_size: 50\n";
        let loaded = load_layered_yaml_from_strings(&[base, overlay]).unwrap();
        assert_eq!(
            loaded.config_json.pointer("/display/page_size"),
            Some(&serde_json::json!(50))
        );
        assert_eq!(
            loaded.config_json.pointer("/allocation/default_state_cap"),
            Some(&serde_json::json!(999))
        );
    }

    #[test]
    fn empty_layer_is_ignored() {
        let a = load_layered_yaml_from_strings(&["display:\n  page_size: 10\n", ""]).unwrap();
        let b = load_layered_yaml_from_strings(&["display:\n  page_size: 10\n"]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn leaf_pointers_escape_tokens() {
        let v = serde_json::json!({"a/b": {"c~d": 1}, "list": [true]});
        let mut out = Vec::new();
        collect_leaf_pointers(&v, "", &mut out);
        out.sort();
        assert_eq!(out, vec!["/a~1b/c~0d".to_string(), "/list/0".to_string()]);
    }
}
