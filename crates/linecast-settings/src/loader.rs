//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LinecastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `LINECAST_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LinecastSettings, LogLevel};

/// Resolve the default settings file path (`~/.linecast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".linecast").join("settings.json")
}

/// Settings plus the environment overrides that were rejected while loading.
///
/// Loading runs before logging is initialised, so rejected overrides are
/// returned for the caller to report once a subscriber exists.
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    /// The merged, validated settings.
    pub settings: LinecastSettings,
    /// Env vars whose values could not be parsed and were ignored.
    pub rejected: Vec<RejectedOverride>,
}

/// An environment override that was ignored because its value was invalid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name, e.g. `LINECAST_PORT`.
    pub key: &'static str,
    /// The raw value that failed to parse.
    pub value: String,
    /// Expected kind of value.
    pub expected: &'static str,
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    let mut settings = read_settings_file(path)?;
    let rejected = apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(LoadedSettings { settings, rejected })
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<LinecastSettings> {
    let defaults = serde_json::to_value(LinecastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LINECAST_*` process environment overrides.
pub fn apply_env_overrides(settings: &mut LinecastSettings) -> Vec<RejectedOverride> {
    apply_overrides_from(settings, |name| std::env::var(name).ok())
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are skipped, leaving the file/default value in place, and
/// returned in the order they were read.
pub fn apply_overrides_from(
    settings: &mut LinecastSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<RejectedOverride> {
    let mut env = EnvReader {
        lookup,
        rejected: Vec::new(),
    };

    if let Some(v) = env.string("LINECAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("LINECAST_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("LINECAST_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.bool("LINECAST_ECHO_TO_SENDER") {
        settings.server.echo_to_sender = v;
    }
    if let Some(v) = env.u64("LINECAST_IDLE_TIMEOUT_SECS", 0, 86_400) {
        settings.server.idle_timeout_secs = v;
    }
    if let Some(v) = env.u16("LINECAST_ADMIN_PORT", 0, 65535) {
        settings.admin.port = Some(v);
    }
    if let Some(v) = env.string("LINECAST_LOG_LEVEL") {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = level,
            None => env.reject("LINECAST_LOG_LEVEL", v, "log level"),
        }
    }
    if let Some(v) = env.bool("LINECAST_LOG_JSON") {
        settings.logging.json = v;
    }
    env.rejected
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
    rejected: Vec<RejectedOverride>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn reject(&mut self, key: &'static str, value: String, expected: &'static str) {
        self.rejected.push(RejectedOverride {
            key,
            value,
            expected,
        });
    }

    fn parsed<T>(
        &mut self,
        name: &'static str,
        kind: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            self.reject(name, val, kind);
        }
        result
    }

    fn bool(&mut self, name: &'static str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&mut self, name: &'static str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&mut self, name: &'static str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&mut self, name: &'static str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
