// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::LuniConfig;

/// Longest accepted focus age, ten years in hours.
const MAX_FOCUS_AGE_HOURS: u64 = 24 * 365 * 10;

/// Validate a deserialized configuration.
///
/// Collects every violation instead of stopping at the first.
pub fn validate_config(config: &LuniConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let url = config.store.redis_url.trim();
    if url.is_empty() {
        errors.push(ConfigError::invalid("store.redis_url must not be empty"));
    } else if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
        errors.push(ConfigError::invalid(format!(
            "store.redis_url `{url}` must use the redis:// or rediss:// scheme"
        )));
    }

    if config.store.namespace.trim().is_empty() || config.store.namespace.contains(':') {
        errors.push(ConfigError::invalid(
            "store.namespace must be non-empty and must not contain `:`",
        ));
    }

    for (key, value) in [
        ("store.ttl_seconds", config.store.ttl_seconds),
        ("store.connect_timeout_ms", config.store.connect_timeout_ms),
        ("store.lock_ttl_seconds", config.store.lock_ttl_seconds),
        ("session.fallback_timeout_seconds", config.session.fallback_timeout_seconds),
        ("session.sweep_interval_seconds", config.session.sweep_interval_seconds),
        ("variables.default_ttl_seconds", config.variables.default_ttl_seconds),
        ("cache.sweep_interval_seconds", config.cache.sweep_interval_seconds),
        ("cache.default_ttl_seconds", config.cache.default_ttl_seconds),
    ] {
        if value == 0 {
            errors.push(ConfigError::invalid(format!("{key} must be greater than 0")));
        }
    }

    for (key, value) in [
        ("session.message_window", config.session.message_window),
        ("session.summary_max_chars", config.session.summary_max_chars),
        ("focus.category_cap", config.focus.category_cap),
        ("focus.questions_cap", config.focus.questions_cap),
        ("variables.max_keys", config.variables.max_keys),
        ("cache.default_max_entries", config.cache.default_max_entries),
    ] {
        if value == 0 {
            errors.push(ConfigError::invalid(format!("{key} must be at least 1")));
        }
    }

    if config.focus.max_age_hours == 0 || config.focus.max_age_hours > MAX_FOCUS_AGE_HOURS {
        errors.push(ConfigError::invalid(format!(
            "focus.max_age_hours must be between 1 and {MAX_FOCUS_AGE_HOURS}, got {}",
            config.focus.max_age_hours
        )));
    }

    let mut seen = HashSet::new();
    for domain in &config.cache.domains {
        if domain.name.trim().is_empty() {
            errors.push(ConfigError::invalid("cache.domains entries need a name"));
        } else if !seen.insert(domain.name.as_str()) {
            errors.push(ConfigError::invalid(format!(
                "cache domain `{}` is declared more than once",
                domain.name
            )));
        }
        if domain.ttl_seconds == 0 || domain.max_entries == 0 {
            errors.push(ConfigError::invalid(format!(
                "cache domain `{}` needs a positive ttl_seconds and max_entries",
                domain.name
            )));
        }
    }

    for (key, ratio) in [
        ("monitoring.error_rate_threshold", config.monitoring.error_rate_threshold),
        ("monitoring.hit_rate_threshold", config.monitoring.hit_rate_threshold),
    ] {
        if !(0.0..=1.0).contains(&ratio) {
            errors.push(ConfigError::invalid(format!(
                "{key} must be between 0 and 1, got {ratio}"
            )));
        }
    }

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.data_dir must not be empty"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CacheDomainConfig;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&LuniConfig::default()).is_ok());
    }

    #[test]
    fn bad_scheme_rejected() {
        let mut config = LuniConfig::default();
        config.store.redis_url = "http://localhost:6379".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("redis://"));
    }

    #[test]
    fn all_violations_collected() {
        let mut config = LuniConfig::default();
        config.session.message_window = 0;
        config.focus.category_cap = 0;
        config.monitoring.hit_rate_threshold = 1.5;
        config.cache.domains.push(CacheDomainConfig {
            name: "funil".into(),
            ttl_seconds: 10,
            max_entries: 1,
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "got: {errors:?}");
    }
}
