//! scw-config
//!
//! Layered YAML configuration for the sidecar watcher.
//!
//! - Documents merge in order: earlier docs are base, later docs override.
//! - The merged document is canonicalized to JSON and hashed (sha256) so a run
//!   can be tied to the exact configuration it used.
//! - `WatcherConfig` is the typed view the watcher and CLI consume.
//! - `report_unused_keys` flags leaves no code reads.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

/// Overrides `/watcher/sidecar_dir` when set.
pub const ENV_SIDECAR_DIR: &str = "SCW_SIDECAR_DIR";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// JSON-pointer prefixes actually read by code. Keep this in step with
/// `WatcherConfig::from_config_json`.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/watcher/sidecar_dir",
    "/watcher/poll_interval_ms",
    "/watcher/finish_after_first",
    "/report/summary_path",
];

/// Unused keys listed in the failure message before it is cut short.
const UNUSED_PREVIEW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Normalized `CONSUMED_POINTERS`, sorted.
    pub consumed_prefixes: Vec<String>,
    /// Leaves of the merged document that no consumed prefix covers, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walk every leaf of `config_json` and list the ones nothing reads.
/// `Fail` turns a non-empty list into a `CONFIG_UNUSED_KEYS` error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();

    let unused: BTreeSet<String> = leaf_pointers(config_json)
        .into_iter()
        .filter(|leaf| !consumed.iter().any(|c| is_prefix_pointer(c, leaf)))
        .collect();

    let report = UnusedKeyReport {
        consumed_prefixes: consumed.into_iter().collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(UNUSED_PREVIEW)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) are not read by the watcher: {}",
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }

    Ok(report)
}

/// Leading "/" added, trailing "/" dropped; the empty pointer is "/".
fn normalize_pointer(p: &str) -> String {
    let body = p.trim().trim_matches('/');
    format!("/{body}")
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || match leaf.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
}

/// RFC 6901 pointers to every scalar (and empty container) in `root`.
fn leaf_pointers(root: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];

    while let Some((at, v)) = stack.pop() {
        let children: Vec<(String, &Value)> = match v {
            Value::Object(map) => map
                .iter()
                .map(|(k, child)| {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    (format!("{at}/{token}"), child)
                })
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, child)| (format!("{at}/{i}"), child))
                .collect(),
            _ => Vec::new(),
        };

        if children.is_empty() {
            // An empty document has no keys at all.
            if !at.is_empty() || !(v.is_object() || v.is_array()) {
                out.push(if at.is_empty() { "/".to_string() } else { at });
            }
        } else {
            stack.extend(children);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// sha256 of `canonical_json`, lowercase hex.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;

    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {layer}: invalid yaml"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("config layer {layer}: not representable as json"))?;
        // Blank or comment-only layer.
        if doc.is_null() {
            continue;
        }
        overlay(&mut merged, doc);
    }

    let canonical_json =
        serde_json::to_string(&Canonical(&merged)).context("serialize canonical config")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Mappings merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Serializes with mapping keys sorted, so reordering keys in YAML does not
/// move the hash whatever map ordering serde_json was built with.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Canonical<'_>> =
                    map.iter().map(|(k, v)| (k, Canonical(v))).collect();
                sorted.serialize(s)
            }
            Value::Array(items) => s.collect_seq(items.iter().map(Canonical)),
            scalar => scalar.serialize(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Directory the producer writes sidecar files into.
    pub sidecar_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// Signal finish-after-next as soon as the watcher starts.
    pub finish_after_first: bool,
    /// Where to write the JSON run summary, if anywhere.
    pub summary_path: Option<PathBuf>,
}

impl WatcherConfig {
    /// Build from canonical config JSON.
    ///
    /// Required:
    /// - watcher.sidecar_dir (unless `SCW_SIDECAR_DIR` is set, see `with_env_overrides`)
    ///
    /// Optional:
    /// - watcher.poll_interval_ms (> 0); default=250
    /// - watcher.finish_after_first; default=false
    /// - report.summary_path
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let sidecar_dir = cfg
            .pointer("/watcher/sidecar_dir")
            .and_then(Value::as_str)
            .context("config missing watcher.sidecar_dir")?;

        let poll_interval_ms = match cfg.pointer("/watcher/poll_interval_ms") {
            None | Some(Value::Null) => DEFAULT_POLL_INTERVAL_MS,
            Some(v) => v
                .as_u64()
                .context("watcher.poll_interval_ms must be a non-negative integer")?,
        };
        if poll_interval_ms == 0 {
            bail!("watcher.poll_interval_ms must be > 0");
        }

        let finish_after_first = match cfg.pointer("/watcher/finish_after_first") {
            None | Some(Value::Null) => false,
            Some(v) => v
                .as_bool()
                .context("watcher.finish_after_first must be a boolean")?,
        };

        let summary_path = cfg
            .pointer("/report/summary_path")
            .and_then(Value::as_str)
            .map(PathBuf::from);

        Ok(Self {
            sidecar_dir: PathBuf::from(sidecar_dir),
            poll_interval_ms,
            finish_after_first,
            summary_path,
        })
    }

    /// Like `from_config_json`, but `SCW_SIDECAR_DIR` (if non-empty) wins over
    /// the configured directory and satisfies the required key on its own.
    pub fn with_env_overrides(cfg: &Value) -> Result<Self> {
        Self::with_dir_override(cfg, std::env::var(ENV_SIDECAR_DIR).ok())
    }

    fn with_dir_override(cfg: &Value, dir: Option<String>) -> Result<Self> {
        let Some(dir) = dir.filter(|d| !d.trim().is_empty()) else {
            return Self::from_config_json(cfg);
        };
        let mut patched = cfg.clone();
        if !patched.is_object() {
            patched = serde_json::json!({});
        }
        let watcher = patched
            .as_object_mut()
            .context("config root must be a mapping")?
            .entry("watcher")
            .or_insert_with(|| serde_json::json!({}));
        watcher
            .as_object_mut()
            .context("config watcher section must be a mapping")?
            .insert("sidecar_dir".to_string(), Value::String(dir));
        Self::from_config_json(&patched)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
