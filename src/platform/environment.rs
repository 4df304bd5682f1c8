//! Environment-driven defaults: app options and emulator hosts.
//!
//! Sources, in priority order: the `__FIREBASE_DEFAULTS__` JSON variable, a JSON file named by
//! `__FIREBASE_DEFAULTS_PATH`, then product specific variables such as
//! `FIREBASE_STORAGE_EMULATOR_HOST` or `FIREBASE_CONFIG`.

use std::env;
use std::fs;

use serde_json::{Map, Value};

fn firebase_defaults() -> Option<Value> {
    defaults_from_env().or_else(defaults_from_path)
}

fn defaults_from_env() -> Option<Value> {
    let raw = env::var("__FIREBASE_DEFAULTS__").ok()?;
    serde_json::from_str(&raw).ok()
}

fn defaults_from_path() -> Option<Value> {
    let path = env::var("__FIREBASE_DEFAULTS_PATH").ok()?;
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Returns the default app configuration, if the environment provides one.
///
/// `FIREBASE_CONFIG` may hold inline JSON or `key=value` pairs separated by commas.
pub fn default_app_config_json() -> Option<Map<String, Value>> {
    if let Some(config) = firebase_defaults()
        .as_ref()
        .and_then(|defaults| defaults.get("config"))
        .and_then(Value::as_object)
    {
        return Some(config.clone());
    }

    let raw = env::var("FIREBASE_CONFIG").ok()?;
    parse_config_source(&raw)?.as_object().cloned()
}

/// Returns the `host:port` the named product should use when running against the emulator.
///
/// `product` is the lower-case product name (`"storage"`, `"auth"`), matching the keys of
/// `emulatorHosts` in `__FIREBASE_DEFAULTS__` and the `FIREBASE_<PRODUCT>_EMULATOR_HOST` variable.
pub fn default_emulator_host(product: &str) -> Option<String> {
    if let Some(host) = firebase_defaults()
        .as_ref()
        .and_then(|defaults| defaults.get("emulatorHosts"))
        .and_then(|hosts| hosts.get(product))
        .and_then(Value::as_str)
    {
        return Some(host.to_string());
    }

    let variable = format!("FIREBASE_{}_EMULATOR_HOST", product.to_ascii_uppercase());
    env::var(variable).ok().filter(|value| !value.trim().is_empty())
}

/// Splits an emulator `host:port` string, accepting bracketed IPv6 hosts (`[::1]:9199`).
pub fn split_host_and_port(value: &str) -> Option<(String, u16)> {
    let value = value.trim();
    let separator = value.rfind(':')?;
    let (host, port) = (&value[..separator], &value[separator + 1..]);
    let port = port.parse::<u16>().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

fn parse_config_source(raw: &str) -> Option<Value> {
    if let Ok(json) = serde_json::from_str::<Value>(raw) {
        if json.is_object() {
            return Some(json);
        }
    }
    parse_key_value_config(raw)
}

fn parse_key_value_config(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for entry in raw.split(',') {
        let mut parts = entry.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}
