// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `/etc/luni/luni.toml`, `~/.config/luni/luni.toml`,
//! `./luni.toml`, then `LUNI_*` variables, then the legacy `USE_REDIS`,
//! `REDIS_URL` and `REDIS_TTL_SECONDS` variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LuniConfig;

/// Config sections, used to map `LUNI_<SECTION>_<KEY>` to `section.key`.
const SECTIONS: &[&str] = &[
    "agent",
    "store",
    "session",
    "focus",
    "variables",
    "storage",
    "cache",
    "monitoring",
];

/// Unprefixed variables kept for deployments that predate `LUNI_*`.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("use_redis", "store.use_redis"),
    ("redis_url", "store.redis_url"),
    ("redis_ttl_seconds", "store.ttl_seconds"),
];

/// System, user and local config file paths, lowest priority first.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/luni/luni.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("luni/luni.toml"));
    }
    paths.push(PathBuf::from("luni.toml"));
    paths
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<LuniConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<LuniConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LuniConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LuniConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LuniConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(legacy_env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(LuniConfig::default()));
    for path in config_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider()).merge(legacy_env_provider())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `store_redis_url` maps to `store.redis_url` rather than `store.redis.url`.
pub fn env_key_to_path(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}

/// Resolve a legacy variable name to its config path, if it is one.
pub fn legacy_key_to_path(key: &str) -> Option<&'static str> {
    let key = key.to_ascii_lowercase();
    LEGACY_VARS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, path)| *path)
}

fn env_provider() -> Env {
    Env::prefixed("LUNI_").map(|key| env_key_to_path(key.as_str()).into())
}

fn legacy_env_provider() -> Env {
    Env::raw().filter_map(|key| legacy_key_to_path(key.as_str()).map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_prefix_becomes_dot() {
        assert_eq!(env_key_to_path("store_redis_url"), "store.redis_url");
        assert_eq!(env_key_to_path("storage_data_dir"), "storage.data_dir");
        assert_eq!(env_key_to_path("session_message_window"), "session.message_window");
        assert_eq!(env_key_to_path("monitoring_enabled"), "monitoring.enabled");
    }

    #[test]
    fn unknown_section_left_alone() {
        assert_eq!(env_key_to_path("whatever_key"), "whatever_key");
    }

    #[test]
    fn legacy_names_resolve_case_insensitively() {
        assert_eq!(legacy_key_to_path("USE_REDIS"), Some("store.use_redis"));
        assert_eq!(legacy_key_to_path("redis_url"), Some("store.redis_url"));
        assert_eq!(legacy_key_to_path("REDIS_TTL_SECONDS"), Some("store.ttl_seconds"));
        assert_eq!(legacy_key_to_path("HOME"), None);
    }
}
