// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration parsing, layering and diagnostics.

use luni_config::diagnostic::ConfigError;
use luni_config::{LuniConfig, load_and_validate_str, load_config_from_str};

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config should parse");

    assert_eq!(config.agent.name, "luni");
    assert!(!config.store.use_redis);
    assert_eq!(config.store.redis_url, "redis://127.0.0.1:6379");
    assert_eq!(config.store.ttl_seconds, 259_200);
    assert_eq!(config.store.connect_timeout_ms, 5000);
    assert_eq!(config.store.connect_retries, 3);
    assert_eq!(config.store.lock_ttl_seconds, 30);
    assert_eq!(config.session.message_window, 20);
    assert_eq!(config.session.summary_max_chars, 400);
    assert_eq!(config.focus.category_cap, 5);
    assert_eq!(config.variables.max_keys, 200);
    assert_eq!(config.cache.domains.len(), 5);
}

#[test]
fn store_section_parses() {
    let toml = r#"
[store]
use_redis = true
redis_url = "redis://cache.internal:6380/2"
ttl_seconds = 3600
"#;
    let config = load_config_from_str(toml).expect("store section should parse");
    assert!(config.store.use_redis);
    assert_eq!(config.store.redis_url, "redis://cache.internal:6380/2");
    assert_eq!(config.store.ttl().as_secs(), 3600);
}

#[test]
fn numeric_flag_accepted_for_use_redis() {
    let toml = "[store]\nuse_redis = 1\n";
    let config = load_config_from_str(toml).expect("numeric flag should parse");
    assert!(config.store.use_redis);

    let toml = "[store]\nuse_redis = \"0\"\n";
    let config = load_config_from_str(toml).expect("string flag should parse");
    assert!(!config.store.use_redis);
}

/// Dotted overrides take the same path the env provider produces.
#[test]
fn dotted_override_sets_nested_value() {
    use figment::{Figment, providers::Serialized};

    let config: LuniConfig = Figment::new()
        .merge(Serialized::defaults(LuniConfig::default()))
        .merge(("store.redis_url", "redis://from-env:6379"))
        .merge(("store.use_redis", "1"))
        .extract()
        .expect("dotted override should apply");

    assert_eq!(config.store.redis_url, "redis://from-env:6379");
    assert!(config.store.use_redis);
}

#[test]
fn storage_paths_derive_from_data_dir() {
    let toml = r#"
[storage]
data_dir = "/var/lib/luni"
focus_dir = "/srv/focos"
"#;
    let config = load_config_from_str(toml).expect("storage section should parse");
    assert_eq!(
        config.storage.sessions_path(),
        std::path::PathBuf::from("/var/lib/luni/sessions")
    );
    assert_eq!(config.storage.focus_path(), std::path::PathBuf::from("/srv/focos"));
}

#[test]
fn custom_cache_domains_replace_defaults() {
    let toml = r#"
[[cache.domains]]
name = "templates"
ttl_seconds = 60
"#;
    let config = load_config_from_str(toml).expect("cache domains should parse");
    assert_eq!(config.cache.domains.len(), 1);
    assert_eq!(config.cache.domains[0].max_entries, 100);
}

#[test]
fn focus_policy_reflects_config() {
    let toml = "[focus]\ncategory_cap = 3\nmax_age_hours = 24\n";
    let config = load_config_from_str(toml).expect("focus section should parse");
    let policy = config.focus.policy();
    assert_eq!(policy.cap, 3);
    assert_eq!(policy.max_age.num_hours(), 24);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[store]
redis_ulr = "redis://x"
"#;
    let errors = load_and_validate_str(toml).expect_err("unknown key should fail");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, .. }
            if key == "redis_ulr" && suggestion.as_deref() == Some("redis_url"))
    });
    assert!(found, "expected suggestion for redis_ulr, got: {errors:?}");
}

#[test]
fn unknown_section_rejected() {
    let toml = "[webhook]\nurl = \"https://x\"\n";
    let errors = load_and_validate_str(toml).expect_err("unknown section should fail");
    assert!(!errors.is_empty());
}

#[test]
fn wrong_type_reported() {
    let toml = "[session]\nmessage_window = \"twenty\"\n";
    let errors = load_and_validate_str(toml).expect_err("wrong type should fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "got: {errors:?}"
    );
}

#[test]
fn semantic_validation_runs_after_parse() {
    let toml = "[store]\nredis_url = \"memcached://x\"\n";
    let errors = load_and_validate_str(toml).expect_err("bad scheme should fail");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}
