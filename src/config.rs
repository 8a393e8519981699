//! Data source configuration.
//!
//! The active source is chosen by layering four inputs, lowest precedence
//! first:
//!
//! 1. built-in defaults (`synthetic`, no options)
//! 2. the global configuration file
//! 3. the caller's override (CLI flags, or a hot-swap request)
//! 4. environment variables
//!
//! Options merge key by key; a later layer only replaces the keys it sets.
//!
//! # Configuration file
//!
//! Any format the `config` crate understands, chosen by extension:
//!
//! ```toml
//! type = "polling"
//!
//! [options]
//! endpoint = "http://localhost:8080/api/dashboard"
//! interval = 2000
//! ```
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `DATA_SOURCE_TYPE` / `DATA_SOURCE` | source kind |
//! | `DATA_SOURCE_ENDPOINT` | `options.endpoint` |
//! | `DATA_SOURCE_POLL_INTERVAL` | `options.interval` (ms, positive) |
//! | `DATA_SOURCE_OPTIONS` | JSON object merged into the options |

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::source::SourceKind;

pub const ENV_TYPE: &str = "DATA_SOURCE_TYPE";
pub const ENV_TYPE_SHORT: &str = "DATA_SOURCE";
pub const ENV_ENDPOINT: &str = "DATA_SOURCE_ENDPOINT";
pub const ENV_POLL_INTERVAL: &str = "DATA_SOURCE_POLL_INTERVAL";
pub const ENV_OPTIONS: &str = "DATA_SOURCE_OPTIONS";

/// A partial data source configuration, as written in a file or passed by
/// a caller. Both fields may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl SourceConfig {
    pub fn new(kind: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            kind: Some(kind.into()),
            options,
        }
    }

    /// Load a configuration file. The format follows the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        config
            .try_deserialize()
            .with_context(|| format!("Invalid data source config in {}", path.display()))
    }
}

/// The configuration actually used to build a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedConfig {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub options: Map<String, Value>,
}

/// Source of environment variables.
pub trait Environment: Send + Sync + Debug {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Merges the configuration layers into a [`ResolvedConfig`].
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    global: Option<SourceConfig>,
    env: Arc<dyn Environment>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// A resolver reading the process environment, with no global config.
    pub fn new() -> Self {
        Self {
            global: None,
            env: Arc::new(ProcessEnvironment),
        }
    }

    pub fn with_global(mut self, global: SourceConfig) -> Self {
        self.global = Some(global);
        self
    }

    pub fn with_environment(mut self, env: impl Environment + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn global(&self) -> Option<&SourceConfig> {
        self.global.as_ref()
    }

    /// Resolve the configuration for the given caller override.
    pub fn resolve(&self, overrides: Option<&SourceConfig>) -> ResolvedConfig {
        let mut resolved = ResolvedConfig::default();

        for layer in self.global.iter().chain(overrides) {
            if let Some(kind) = layer.kind.as_deref().filter(|k| !k.trim().is_empty()) {
                resolved.kind = normalize_kind(kind);
            }
            merge(&mut resolved.options, &layer.options);
        }

        let env_kind = self.env_var(ENV_TYPE).or_else(|| self.env_var(ENV_TYPE_SHORT));
        if let Some(kind) = env_kind {
            resolved.kind = normalize_kind(&kind);
        }

        if let Some(endpoint) = self.env_var(ENV_ENDPOINT) {
            resolved.options.insert("endpoint".to_string(), Value::String(endpoint));
        }

        if let Some(raw) = self.env_var(ENV_POLL_INTERVAL) {
            match raw.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0) {
                Some(interval) => {
                    resolved.options.insert("interval".to_string(), number(interval));
                }
                None => warn!(value = %raw, "ignoring invalid {}", ENV_POLL_INTERVAL),
            }
        }

        if let Some(raw) = self.env_var(ENV_OPTIONS) {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(options)) => merge(&mut resolved.options, &options),
                Ok(_) => warn!("ignoring {}: not a JSON object", ENV_OPTIONS),
                Err(e) => warn!(error = %e, "ignoring {}: invalid JSON", ENV_OPTIONS),
            }
        }

        resolved
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.env.var(key).filter(|v| !v.trim().is_empty())
    }
}

fn normalize_kind(kind: &str) -> SourceKind {
    SourceKind::parse(kind).unwrap_or_else(|| {
        warn!(kind, "unknown data source type, using synthetic");
        SourceKind::Synthetic
    })
}

fn merge(target: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (key, value) in layer {
        target.insert(key.clone(), value.clone());
    }
}

/// Integral values stay integers so they print without a fraction.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value <= u64::MAX as f64 {
        Value::Number(Number::from(value as u64))
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn resolver(pairs: &[(&str, &str)]) -> ConfigResolver {
        ConfigResolver::new().with_environment(env(pairs))
    }

    fn config(kind: &str, options: Value) -> SourceConfig {
        SourceConfig::new(kind, options.as_object().unwrap().clone())
    }

    #[test]
    fn test_defaults() {
        let resolved = resolver(&[]).resolve(None);
        assert_eq!(resolved.kind, SourceKind::Synthetic);
        assert!(resolved.options.is_empty());
    }

    #[test]
    fn test_layer_precedence() {
        let resolver = resolver(&[]).with_global(config(
            "polling",
            json!({"endpoint": "http://global", "interval": 1000}),
        ));

        let resolved = resolver.resolve(None);
        assert_eq!(resolved.kind, SourceKind::Polling);
        assert_eq!(resolved.options["endpoint"], "http://global");

        let overrides = config("streaming", json!({"url": "tcp://localhost:9000", "interval": 50}));
        let resolved = resolver.resolve(Some(&overrides));
        assert_eq!(resolved.kind, SourceKind::Streaming);
        // Shallow merge: global keys survive unless overridden
        assert_eq!(resolved.options["endpoint"], "http://global");
        assert_eq!(resolved.options["interval"], 50);
        assert_eq!(resolved.options["url"], "tcp://localhost:9000");
    }

    #[test]
    fn test_blank_override_kind_keeps_previous() {
        let resolver = resolver(&[]).with_global(config("rest", json!({})));
        let overrides = SourceConfig { kind: Some("  ".into()), options: Map::new() };
        assert_eq!(resolver.resolve(Some(&overrides)).kind, SourceKind::Polling);
    }

    #[test]
    fn test_environment_wins() {
        let resolver = resolver(&[
            (ENV_TYPE_SHORT, "websocket"),
            (ENV_ENDPOINT, "http://env/api"),
            (ENV_POLL_INTERVAL, "2500"),
            (ENV_OPTIONS, r#"{"immediate": false, "endpoint": "http://options/api"}"#),
        ]);
        let overrides = config("polling", json!({"endpoint": "http://cli", "interval": 10}));
        let resolved = resolver.resolve(Some(&overrides));

        assert_eq!(resolved.kind, SourceKind::Streaming);
        assert_eq!(resolved.options["interval"], 2500);
        assert_eq!(resolved.options["immediate"], false);
        // DATA_SOURCE_OPTIONS is applied last
        assert_eq!(resolved.options["endpoint"], "http://options/api");
    }

    #[test]
    fn test_long_type_variable_takes_priority() {
        let resolver = resolver(&[(ENV_TYPE, "polling"), (ENV_TYPE_SHORT, "streaming")]);
        assert_eq!(resolver.resolve(None).kind, SourceKind::Polling);
    }

    #[test]
    fn test_invalid_inputs_are_ignored() {
        let garbled = resolver(&[
            (ENV_TYPE, "Carrier-Pigeon"),
            (ENV_POLL_INTERVAL, "-5"),
            (ENV_OPTIONS, "{not json"),
        ]);
        let overrides = config("polling", json!({"interval": 300}));
        let resolved = garbled.resolve(Some(&overrides));

        assert_eq!(resolved.kind, SourceKind::Synthetic);
        assert_eq!(resolved.options["interval"], 300);
        assert_eq!(resolved.options.len(), 1);

        for bad in ["0", "NaN", "inf", "soon"] {
            let resolved = resolver_with_interval(bad).resolve(None);
            assert!(resolved.options.get("interval").is_none(), "accepted {}", bad);
        }

        let resolved = resolver(&[(ENV_OPTIONS, "[1, 2]")]).resolve(None);
        assert!(resolved.options.is_empty());
    }

    fn resolver_with_interval(value: &str) -> ConfigResolver {
        resolver(&[(ENV_POLL_INTERVAL, value)])
    }

    #[test]
    fn test_fractional_interval() {
        let resolved = resolver_with_interval("1500.5").resolve(None);
        assert_eq!(resolved.options["interval"], 1500.5);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "type = \"polling\"\n\n[options]\nendpoint = \"http://localhost:8080/api\"\ninterval = 2000\n"
        )
        .unwrap();

        let loaded = SourceConfig::load(file.path()).unwrap();
        assert_eq!(loaded.kind.as_deref(), Some("polling"));
        assert_eq!(loaded.options["endpoint"], "http://localhost:8080/api");
        assert_eq!(loaded.options["interval"], 2000);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"type": "streaming", "options": {{"url": "tcp://127.0.0.1:9000"}}}}"#)
            .unwrap();

        let loaded = SourceConfig::load(file.path()).unwrap();
        let resolved = resolver(&[]).with_global(loaded).resolve(None);
        assert_eq!(resolved.kind, SourceKind::Streaming);
        assert_eq!(resolved.options["url"], "tcp://127.0.0.1:9000");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceConfig::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_options_only_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[options]\nseed = 7\n").unwrap();
        let loaded = SourceConfig::load(file.path()).unwrap();
        assert_eq!(loaded.kind, None);
        assert_eq!(loaded.options["seed"], 7);
    }
}
