// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently falling back to a default.

use std::path::PathBuf;
use std::time::Duration;

use luni_core::FocusPolicy;
use serde::{Deserialize, Deserializer, Serialize};

/// Top-level Luni configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LuniConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Remote cache backend settings.
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub focus: FocusConfig,

    #[serde(default)]
    pub variables: VariablesConfig,

    /// Local file layout for the fallback backend and variables.
    #[serde(default)]
    pub storage: StorageConfig,

    /// In-process cache domains.
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_name")]
    pub name: String,

    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_name() -> String {
    "luni".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Remote cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Try the remote backend at startup. Accepts `true`/`false`/`1`/`0`.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub use_redis: bool,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key namespace prefix.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Channel segment of session keys.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// TTL of remote-backed records and remote session liveness.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reconnection attempts after the first failure.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_redis: false,
            redis_url: default_redis_url(),
            namespace: default_namespace(),
            channel: default_channel(),
            ttl_seconds: default_ttl_seconds(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_retries: default_connect_retries(),
            lock_ttl_seconds: default_lock_ttl_seconds(),
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_namespace() -> String {
    "luni".to_string()
}

fn default_channel() -> String {
    "default".to_string()
}

fn default_ttl_seconds() -> u64 {
    72 * 3600
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_connect_retries() -> u32 {
    3
}

fn default_lock_ttl_seconds() -> u64 {
    30
}

/// Session behaviour shared by both backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_message_window")]
    pub message_window: usize,

    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Liveness window of file-backed sessions.
    #[serde(default = "default_fallback_timeout_seconds")]
    pub fallback_timeout_seconds: u64,

    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            message_window: default_message_window(),
            summary_max_chars: default_summary_max_chars(),
            fallback_timeout_seconds: default_fallback_timeout_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl SessionConfig {
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_seconds)
    }
}

fn default_message_window() -> usize {
    luni_core::session::MESSAGE_WINDOW
}

fn default_summary_max_chars() -> usize {
    luni_core::session::SUMMARY_MAX_CHARS
}

fn default_fallback_timeout_seconds() -> u64 {
    12 * 3600
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

/// Focus record limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FocusConfig {
    #[serde(default = "default_category_cap")]
    pub category_cap: usize,

    #[serde(default = "default_category_cap")]
    pub questions_cap: usize,

    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            category_cap: default_category_cap(),
            questions_cap: default_category_cap(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

impl FocusConfig {
    pub fn policy(&self) -> FocusPolicy {
        FocusPolicy::new(self.category_cap, self.questions_cap, self.max_age_hours)
    }
}

fn default_category_cap() -> usize {
    5
}

fn default_max_age_hours() -> u64 {
    72
}

/// Variable store limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VariablesConfig {
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    #[serde(default = "default_variable_ttl_seconds")]
    pub default_ttl_seconds: u64,
}

impl Default for VariablesConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
            default_ttl_seconds: default_variable_ttl_seconds(),
        }
    }
}

impl VariablesConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

fn default_max_keys() -> usize {
    luni_core::variable::MAX_VARIABLE_KEYS
}

fn default_variable_ttl_seconds() -> u64 {
    luni_core::variable::DEFAULT_VARIABLE_TTL_SECS as u64
}

/// Local file layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Overrides `<data_dir>/sessions`.
    #[serde(default)]
    pub sessions_dir: Option<String>,

    /// Overrides `<data_dir>/focus`.
    #[serde(default)]
    pub focus_dir: Option<String>,

    /// Overrides `<data_dir>/variables`.
    #[serde(default)]
    pub variables_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sessions_dir: None,
            focus_dir: None,
            variables_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn sessions_path(&self) -> PathBuf {
        self.resolve(self.sessions_dir.as_deref(), "sessions")
    }

    pub fn focus_path(&self) -> PathBuf {
        self.resolve(self.focus_dir.as_deref(), "focus")
    }

    pub fn variables_path(&self) -> PathBuf {
        self.resolve(self.variables_dir.as_deref(), "variables")
    }

    fn resolve(&self, explicit: Option<&str>, sub: &str) -> PathBuf {
        match explicit {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(&self.data_dir).join(sub),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("luni"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

/// In-process cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    #[serde(default = "default_cache_ttl_seconds")]
    pub default_ttl_seconds: u64,

    #[serde(default = "default_cache_max_entries")]
    pub default_max_entries: usize,

    #[serde(default = "default_domains")]
    pub domains: Vec<CacheDomainConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval_seconds(),
            default_ttl_seconds: default_cache_ttl_seconds(),
            default_max_entries: default_cache_max_entries(),
            domains: default_domains(),
        }
    }
}

/// Policy of one named cache domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheDomainConfig {
    pub name: String,
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl_seconds() -> u64 {
    24 * 3600
}

fn default_cache_max_entries() -> usize {
    100
}

fn default_domains() -> Vec<CacheDomainConfig> {
    let domain = |name: &str, hours: u64| CacheDomainConfig {
        name: name.to_string(),
        ttl_seconds: hours * 3600,
        max_entries: default_cache_max_entries(),
    };
    vec![
        domain("contextoEstatico", 12),
        domain("historicoRecente", 24),
        domain("funil", 24),
        domain("gatilhos", 24),
        domain("personalidade", 24),
    ]
}

/// Operation monitoring thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Average latency above this raises an alert.
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,

    /// Failure ratio (0..1) above this raises an alert.
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Fallback count above this raises an alert.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: u64,

    /// Cache hit ratio (0..1) below this raises an alert.
    #[serde(default = "default_hit_rate_threshold")]
    pub hit_rate_threshold: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_threshold_ms: default_latency_threshold_ms(),
            error_rate_threshold: default_error_rate_threshold(),
            fallback_threshold: default_fallback_threshold(),
            hit_rate_threshold: default_hit_rate_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_latency_threshold_ms() -> u64 {
    50
}

fn default_error_rate_threshold() -> f64 {
    0.05
}

fn default_fallback_threshold() -> u64 {
    10
}

fn default_hit_rate_threshold() -> f64 {
    0.80
}

/// Accept booleans, integers and the usual string spellings of a flag.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => Err(D::Error::custom(format!("`{other}` is not a valid flag"))),
        },
    }
}
