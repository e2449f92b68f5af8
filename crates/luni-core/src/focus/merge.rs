// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Category merge rules for focus records.
//!
//! Each structured category has a pure `(existing, incoming) -> merged`
//! function. Every list leaves here deduplicated by its category key, with
//! stale entries removed and trimmed to the most recent `cap` items.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::model::{
    ContactInfo, FocusRecord, Mention, SchedulingAttempt, UndefinedItem, default_intent,
    default_kind, default_probable_intent,
};

/// Limits applied on every focus write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusPolicy {
    /// Maximum entries per structured list.
    pub cap: usize,
    /// Maximum entries in `duvidasRecentes`.
    pub questions_cap: usize,
    /// Entries older than this are pruned.
    pub max_age: Duration,
}

impl FocusPolicy {
    pub fn new(cap: usize, questions_cap: usize, max_age_hours: u64) -> Self {
        Self {
            cap,
            questions_cap,
            max_age: i64::try_from(max_age_hours)
                .ok()
                .and_then(Duration::try_hours)
                .unwrap_or(Duration::MAX),
        }
    }
}

impl Default for FocusPolicy {
    fn default() -> Self {
        Self::new(5, 5, 72)
    }
}

/// Lowercase, strip accents and collapse whitespace.
pub fn normalize(s: &str) -> String {
    let stripped: String = s.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the last occurrence of each key, preserving the order of survivors.
pub fn dedup_keep_last<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut kept: Vec<T> = items
        .into_iter()
        .rev()
        .filter(|item| seen.insert(key(item)))
        .collect();
    kept.reverse();
    kept
}

/// Keep at most the last `cap` items.
fn keep_last<T>(mut items: Vec<T>, cap: usize) -> Vec<T> {
    if items.len() > cap {
        items.drain(..items.len() - cap);
    }
    items
}

/// An entry is fresh when it has no timestamp or `|now - ts| <= max_age`.
pub fn is_fresh(ts: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    ts.is_none_or(|ts| (now - ts).abs() <= max_age)
}

pub fn mention_key(m: &Mention) -> String {
    format!("prod:{}", normalize(&m.name))
}

pub fn undefined_key(item: &UndefinedItem) -> String {
    let source = item
        .original_message
        .as_deref()
        .or(item.mentioned_name.as_deref())
        .unwrap_or_default();
    format!("indef:{}", normalize(source))
}

pub fn scheduling_key(a: &SchedulingAttempt) -> String {
    format!(
        "agd:{}|{}|{}",
        a.date.as_deref().unwrap_or_default(),
        a.time.as_deref().unwrap_or_default(),
        a.region.as_deref().unwrap_or_default()
    )
}

pub fn merge_questions(existing: &[String], incoming: &[String], cap: usize) -> Vec<String> {
    let all: Vec<String> = existing
        .iter()
        .chain(incoming)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    keep_last(dedup_keep_last(all, |q| normalize(q)), cap)
}

pub fn merge_mentions(
    existing: &[Mention],
    incoming: Vec<Mention>,
    policy: &FocusPolicy,
    now: DateTime<Utc>,
) -> Vec<Mention> {
    let all = existing.iter().cloned().chain(incoming).collect();
    let fresh = dedup_keep_last(all, mention_key)
        .into_iter()
        .filter(|m| is_fresh(m.last_mentioned, now, policy.max_age))
        .collect();
    keep_last(fresh, policy.cap)
}

pub fn merge_undefined(
    existing: &[UndefinedItem],
    incoming: Vec<UndefinedItem>,
    policy: &FocusPolicy,
    now: DateTime<Utc>,
) -> Vec<UndefinedItem> {
    let all = existing.iter().cloned().chain(incoming).collect();
    let fresh = dedup_keep_last(all, undefined_key)
        .into_iter()
        .filter(|i| is_fresh(i.last_mentioned, now, policy.max_age))
        .collect();
    keep_last(fresh, policy.cap)
}

/// Merge scheduling attempts.
///
/// Incoming entries are applied in order. A partial entry (one or two of
/// date/time/region) is folded into the most recent entry whose slots already
/// agree with it, else into the most recent unconfirmed entry, and the target
/// moves to the end. Complete or slot-less entries are appended. Several
/// partials in one update therefore accumulate into the same attempt, and a
/// repeated partial lands on the attempt it built the first time.
pub fn merge_scheduling(
    existing: &[SchedulingAttempt],
    incoming: Vec<SchedulingAttempt>,
    policy: &FocusPolicy,
    now: DateTime<Utc>,
) -> Vec<SchedulingAttempt> {
    let mut acc: Vec<SchedulingAttempt> = existing.to_vec();
    for entry in incoming {
        // Partials go to the newest unconfirmed attempt, preferring one they
        // agree with. With none open, a repeat of a confirmed attempt's slots
        // folds into it.
        let target = if entry.is_partial() {
            acc.iter()
                .rposition(|a| !a.confirmed && a.agrees_with(&entry))
                .or_else(|| acc.iter().rposition(|a| !a.confirmed))
                .or_else(|| acc.iter().rposition(|a| a.agrees_with(&entry)))
        } else {
            None
        };
        match target {
            Some(idx) => {
                let previous = acc.remove(idx);
                acc.push(coalesce(previous, entry));
            }
            None => acc.push(entry),
        }
    }
    let fresh = dedup_keep_last(acc, scheduling_key)
        .into_iter()
        .filter(|a| is_fresh(a.last_interaction, now, policy.max_age))
        .collect();
    keep_last(fresh, policy.cap)
}

fn coalesce(previous: SchedulingAttempt, next: SchedulingAttempt) -> SchedulingAttempt {
    let mut extra = previous.extra;
    extra.extend(next.extra);
    SchedulingAttempt {
        related_service: next.related_service.or(previous.related_service),
        date: next.date.or(previous.date),
        time: next.time.or(previous.time),
        region: next.region.or(previous.region),
        confirmed: previous.confirmed || next.confirmed,
        last_interaction: next.last_interaction.or(previous.last_interaction),
        extra,
    }
}

/// Fold a partial update into `record`.
///
/// Structured categories use their merge function; `contatoCliente` and other
/// object values shallow-merge; anything else overwrites.
pub fn apply_update(
    record: &mut FocusRecord,
    update: &Map<String, Value>,
    policy: &FocusPolicy,
    now: DateTime<Utc>,
) {
    let focos = &mut record.focos;
    for (key, value) in update {
        match key.as_str() {
            "duvidasRecentes" => {
                let incoming = string_list(value);
                focos.recent_questions =
                    merge_questions(&focos.recent_questions, &incoming, policy.questions_cap);
            }
            "produto" | "servico" => {
                let incoming = entries(value)
                    .filter_map(|v| mention_from_value(v, now))
                    .collect();
                let list = if key == "produto" {
                    &mut focos.products
                } else {
                    &mut focos.services
                };
                *list = merge_mentions(list, incoming, policy, now);
            }
            "itemIndefinido" => {
                let incoming = entries(value)
                    .filter_map(|v| undefined_from_value(v, now))
                    .collect();
                focos.undefined_items =
                    merge_undefined(&focos.undefined_items, incoming, policy, now);
            }
            "agendamento" => {
                let incoming = entries(value)
                    .filter_map(|v| scheduling_from_value(v, now))
                    .collect();
                focos.scheduling = merge_scheduling(&focos.scheduling, incoming, policy, now);
            }
            "contatoCliente" => merge_contact(&mut focos.contact, value),
            "intencaoAtual" => focos.current_intent = Some(value.clone()).filter(|v| !v.is_null()),
            _ => match (focos.other.get_mut(key), value) {
                (Some(Value::Object(prev)), Value::Object(next)) => {
                    prev.extend(next.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                _ => {
                    focos.other.insert(key.clone(), value.clone());
                }
            },
        }
    }
    record.atualizado_em = Some(now);
}

/// Drop stale entries in place. Returns whether anything changed.
pub fn prune_expired(record: &mut FocusRecord, policy: &FocusPolicy, now: DateTime<Utc>) -> bool {
    let focos = &mut record.focos;
    let before = focos.products.len()
        + focos.services.len()
        + focos.undefined_items.len()
        + focos.scheduling.len();
    focos
        .products
        .retain(|m| is_fresh(m.last_mentioned, now, policy.max_age));
    focos
        .services
        .retain(|m| is_fresh(m.last_mentioned, now, policy.max_age));
    focos
        .undefined_items
        .retain(|i| is_fresh(i.last_mentioned, now, policy.max_age));
    focos
        .scheduling
        .retain(|a| is_fresh(a.last_interaction, now, policy.max_age));
    let after = focos.products.len()
        + focos.services.len()
        + focos.undefined_items.len()
        + focos.scheduling.len();
    before != after
}

/// A filtered, capped copy of `record` for reading.
pub fn valid_view(record: &FocusRecord, policy: &FocusPolicy, now: DateTime<Utc>) -> FocusRecord {
    let mut view = record.clone();
    prune_expired(&mut view, policy, now);
    let focos = &mut view.focos;
    focos.recent_questions = keep_last(std::mem::take(&mut focos.recent_questions), policy.questions_cap);
    focos.products = keep_last(std::mem::take(&mut focos.products), policy.cap);
    focos.services = keep_last(std::mem::take(&mut focos.services), policy.cap);
    focos.undefined_items = keep_last(std::mem::take(&mut focos.undefined_items), policy.cap);
    focos.scheduling = keep_last(std::mem::take(&mut focos.scheduling), policy.cap);
    view
}

fn merge_contact(contact: &mut ContactInfo, value: &Value) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, v) in map {
        match key.as_str() {
            "nome" => contact.name = v.as_str().map(str::to_string),
            "telefone" => contact.phone = v.as_str().map(str::to_string),
            _ => {
                contact.extra.insert(key.clone(), v.clone());
            }
        }
    }
}

/// Iterate an array, or treat a single value as a one-element list.
fn entries(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Null => Box::new(std::iter::empty()),
        other => Box::new(std::iter::once(other)),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    entries(value)
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect()
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn time_field(map: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    map.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn rest(map: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn mention_from_value(value: &Value, now: DateTime<Utc>) -> Option<Mention> {
    match value {
        Value::String(name) if !name.trim().is_empty() => Some(Mention {
            name: name.clone(),
            aliases: Vec::new(),
            intent: default_intent(),
            last_mentioned: Some(now),
            extra: Map::new(),
        }),
        Value::Object(map) => Some(Mention {
            name: str_field(map, "nome")
                .or_else(|| str_field(map, "item"))
                .unwrap_or_else(|| "produto".to_string()),
            aliases: map.get("apelidos").map(string_list).unwrap_or_default(),
            intent: str_field(map, "intencao").unwrap_or_else(default_intent),
            last_mentioned: time_field(map, "ultimaMencao").or(Some(now)),
            extra: rest(map, &["nome", "item", "apelidos", "intencao", "ultimaMencao"]),
        }),
        _ => None,
    }
}

fn undefined_from_value(value: &Value, now: DateTime<Utc>) -> Option<UndefinedItem> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(UndefinedItem {
            mentioned_name: None,
            kind: default_kind(),
            original_message: Some(text.clone()),
            probable_intent: default_probable_intent(),
            last_mentioned: Some(now),
            extra: Map::new(),
        }),
        Value::Object(map) => Some(UndefinedItem {
            mentioned_name: str_field(map, "nomeMencionado"),
            kind: str_field(map, "tipo").unwrap_or_else(default_kind),
            original_message: str_field(map, "mensagemOriginal"),
            probable_intent: str_field(map, "intencaoProvavel")
                .unwrap_or_else(default_probable_intent),
            last_mentioned: time_field(map, "ultimaMencao").or(Some(now)),
            extra: rest(
                map,
                &[
                    "nomeMencionado",
                    "tipo",
                    "mensagemOriginal",
                    "intencaoProvavel",
                    "ultimaMencao",
                ],
            ),
        }),
        _ => None,
    }
}

fn scheduling_from_value(value: &Value, now: DateTime<Utc>) -> Option<SchedulingAttempt> {
    let Value::Object(map) = value else {
        return None;
    };
    Some(SchedulingAttempt {
        related_service: str_field(map, "servicoRelacionado"),
        date: str_field(map, "data"),
        time: str_field(map, "hora"),
        region: str_field(map, "regiao"),
        confirmed: map
            .get("confirmado")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        last_interaction: time_field(map, "ultimaInteracao").or(Some(now)),
        extra: rest(
            map,
            &[
                "servicoRelacionado",
                "data",
                "hora",
                "regiao",
                "confirmado",
                "ultimaInteracao",
            ],
        ),
    })
}
