// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiring semantic variables, one document per client.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::LuniError;

/// On-disk format version of a variables document.
pub const VARIABLES_FILE_VERSION: u32 = 2;

/// Default lifetime of a variable, in seconds (48h).
pub const DEFAULT_VARIABLE_TTL_SECS: i64 = 48 * 3600;

/// Default per-client key ceiling.
pub const MAX_VARIABLE_KEYS: usize = 200;

/// Document key holding [`VariablesMeta`]; never usable as a variable name.
pub const META_KEY: &str = "__meta";

fn check_key(key: &str) -> Result<(), LuniError> {
    if key == META_KEY {
        return Err(LuniError::ReservedKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// A single stored variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub valor: Value,
    pub criado_em: DateTime<Utc>,
    pub expira_em: DateTime<Utc>,
}

impl Variable {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expira_em <= now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStats {
    #[serde(default)]
    pub writes: u64,
    #[serde(default)]
    pub prunes: u64,
    #[serde(default)]
    pub expirations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablesMeta {
    pub version: u32,
    #[serde(rename = "lastWrite", default)]
    pub last_write: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: VariableStats,
}

impl Default for VariablesMeta {
    fn default() -> Self {
        Self {
            version: VARIABLES_FILE_VERSION,
            last_write: None,
            stats: VariableStats::default(),
        }
    }
}

/// The per-client variables document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariablesFile {
    #[serde(rename = "__meta", default)]
    pub meta: VariablesMeta,
    #[serde(flatten)]
    pub entries: BTreeMap<String, Variable>,
}

impl VariablesFile {
    /// Write `value` under `key`, merging objects and pruning beyond `max_keys`.
    pub fn set(
        &mut self,
        key: &str,
        value: Value,
        ttl: Duration,
        now: DateTime<Utc>,
        max_keys: usize,
    ) -> Result<(), LuniError> {
        check_key(key)?;
        let valor = match self.entries.get(key) {
            Some(existing) if existing.valor.is_object() && value.is_object() => {
                merge_preferring_new(&existing.valor, value)
            }
            _ => value,
        };
        self.entries.insert(
            key.to_string(),
            Variable {
                valor,
                criado_em: now,
                expira_em: now + ttl,
            },
        );
        self.meta.stats.writes += 1;
        self.meta.version = VARIABLES_FILE_VERSION;
        self.prune_oldest(max_keys);
        Ok(())
    }

    /// Evict oldest-created keys until at most `max_keys` remain.
    pub fn prune_oldest(&mut self, max_keys: usize) -> usize {
        if self.entries.len() <= max_keys {
            return 0;
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|(k, v)| (v.criado_em, k.clone()))
            .collect();
        by_age.sort();
        let excess = self.entries.len() - max_keys;
        for (_, key) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        self.meta.stats.prunes += excess as u64;
        excess
    }

    /// Drop expired keys, returning how many were removed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired(now));
        let removed = before - self.entries.len();
        self.meta.stats.expirations += removed as u64;
        removed
    }

    /// Push `expira_em` forward from `now`. Returns false for unknown keys.
    pub fn renew(&mut self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, LuniError> {
        check_key(key)?;
        Ok(match self.entries.get_mut(key) {
            Some(var) => {
                var.expira_em = now + ttl;
                true
            }
            None => false,
        })
    }

    /// Current values keyed by name.
    pub fn values(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.valor.clone()))
            .collect()
    }
}

/// Deep-merge `incoming` over `existing`; nulls in `incoming` never erase.
pub fn merge_preferring_new(existing: &Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (key, value) in patch {
                if value.is_null() {
                    continue;
                }
                let next = match merged.get(&key) {
                    Some(prev) if prev.is_object() && value.is_object() => {
                        merge_preferring_new(prev, value)
                    }
                    _ => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (prev, Value::Null) => prev.clone(),
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ttl() -> Duration {
        Duration::seconds(DEFAULT_VARIABLE_TTL_SECS)
    }

    #[test]
    fn object_writes_merge_and_nulls_do_not_erase() {
        let mut file = VariablesFile::default();
        file.set("cliente", json!({"nome": "Ana", "cidade": "Recife"}), ttl(), t0(), 200).unwrap();
        file.set("cliente", json!({"cidade": null, "bairro": "Boa Vista"}), ttl(), t0(), 200).unwrap();

        assert_eq!(
            file.entries["cliente"].valor,
            json!({"nome": "Ana", "cidade": "Recife", "bairro": "Boa Vista"})
        );
        assert_eq!(file.meta.stats.writes, 2);
    }

    #[test]
    fn scalar_write_replaces_object() {
        let mut file = VariablesFile::default();
        file.set("x", json!({"a": 1}), ttl(), t0(), 200).unwrap();
        file.set("x", json!(7), ttl(), t0(), 200).unwrap();
        assert_eq!(file.entries["x"].valor, json!(7));
    }

    #[test]
    fn nested_objects_merge_deeply() {
        let merged = merge_preferring_new(
            &json!({"a": {"b": 1, "c": 2}}),
            json!({"a": {"c": 3, "d": null}}),
        );
        assert_eq!(merged, json!({"a": {"b": 1, "c": 3}}));
    }

    #[test]
    fn oldest_keys_pruned_past_ceiling() {
        let mut file = VariablesFile::default();
        for i in 0..5 {
            file.set(&format!("k{i}"), json!(i), ttl(), t0() + Duration::seconds(i), 3).unwrap();
        }
        let keys: Vec<_> = file.entries.keys().cloned().collect();
        assert_eq!(keys, ["k2", "k3", "k4"]);
        assert_eq!(file.meta.stats.prunes, 2);
    }

    #[test]
    fn sweep_removes_expired_and_counts() {
        let mut file = VariablesFile::default();
        file.set("short", json!(1), Duration::milliseconds(1), t0(), 200).unwrap();
        file.set("long", json!(2), ttl(), t0(), 200).unwrap();
        let removed = file.sweep_expired(t0() + Duration::milliseconds(5));
        assert_eq!(removed, 1);
        assert!(!file.entries.contains_key("short"));
        assert_eq!(file.meta.stats.expirations, 1);
    }

    #[test]
    fn renew_extends_expiry() {
        let mut file = VariablesFile::default();
        file.set("x", json!(1), Duration::minutes(1), t0(), 200).unwrap();
        assert!(file.renew("x", Duration::hours(1), t0() + Duration::seconds(30)).unwrap());
        assert!(!file.entries["x"].is_expired(t0() + Duration::minutes(5)));
        assert!(!file.renew("missing", Duration::hours(1), t0()).unwrap());
    }

    #[test]
    fn meta_key_is_reserved() {
        let mut file = VariablesFile::default();
        let err = file.set(META_KEY, json!(1), ttl(), t0(), 200).unwrap_err();
        assert!(matches!(err, LuniError::ReservedKey { ref key } if key == "__meta"));
        assert!(file.renew(META_KEY, ttl(), t0()).is_err());
        assert!(file.entries.is_empty());
        assert_eq!(file.meta.stats.writes, 0);
    }

    #[test]
    fn document_round_trips_with_meta_key() {
        let mut file = VariablesFile::default();
        file.set("x", json!("y"), ttl(), t0(), 200).unwrap();
        let v = serde_json::to_value(&file).unwrap();
        assert_eq!(v["__meta"]["version"], json!(2));
        assert_eq!(v["x"]["valor"], json!("y"));
        let back: VariablesFile = serde_json::from_value(v).unwrap();
        assert_eq!(back, file);
    }
}
