// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session model.
//!
//! A [`Session`] is one ongoing conversation with a single end customer. Both
//! backends persist the same shape; field names on the wire are camelCase.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of most recent messages kept in a session's window.
pub const MESSAGE_WINDOW: usize = 20;

/// Maximum characters kept from a session summary.
pub const SUMMARY_MAX_CHARS: usize = 400;

/// Funnel stage assigned to new sessions.
pub const DEFAULT_FUNNEL_STAGE: &str = "descoberta";

/// Tag that marks a change of subject and forces a fresh session.
pub const TOPIC_CHANGE_TAG: &str = "mudanca_assunto";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(alias = "sessionId")]
    pub id: String,
    #[serde(alias = "clienteId")]
    pub client_id: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub last_activity: i64,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub context: SessionContext,
    #[serde(default)]
    pub stats: SessionStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, alias = "focoAtual")]
    pub focus_current: Option<Value>,
    #[serde(default = "default_funnel_stage", alias = "etapaFunil")]
    pub funnel_stage: String,
    #[serde(default = "default_true", alias = "primeiraInteracao")]
    pub first_interaction: bool,
    /// Caller-defined metadata fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            focus_current: None,
            funnel_stage: default_funnel_stage(),
            first_interaction: true,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Oldest first, at most [`MESSAGE_WINDOW`] entries.
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Epoch milliseconds of the last detected intent.
    #[serde(default)]
    pub last_intent_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub total_time: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single inbound or outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A partial update applied with shallow-merge semantics per section.
///
/// Keys present in a section patch replace the matching field; absent keys
/// are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub metadata: Map<String, Value>,
    pub context: Map<String, Value>,
    pub stats: Map<String, Value>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one metadata field.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set one context field.
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Set one stats field.
    pub fn stats(mut self, key: impl Into<String>, value: Value) -> Self {
        self.stats.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.context.is_empty() && self.stats.is_empty()
    }
}

impl Session {
    /// Build a fresh session for `client_id`, overlaying `metadata` on the defaults.
    pub fn new(
        client_id: &str,
        metadata: Map<String, Value>,
        now_ms: i64,
    ) -> Result<Self, serde_json::Error> {
        let mut defaults = SessionMetadata::default();
        merge_section(&mut defaults, &metadata, METADATA_ALIASES)?;
        Ok(Self {
            id: generate_session_id(now_ms),
            client_id: client_id.to_string(),
            created_at: now_ms,
            last_activity: now_ms,
            metadata: defaults,
            context: SessionContext::default(),
            stats: SessionStats::default(),
            summary: None,
        })
    }

    /// Live iff `now - lastActivity < ttl`.
    pub fn is_live(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.last_activity < ttl_ms
    }

    /// Shallow-merge `update` into each section and bump `last_activity`.
    pub fn apply_update(
        &mut self,
        update: &SessionUpdate,
        now_ms: i64,
    ) -> Result<(), serde_json::Error> {
        merge_section(&mut self.metadata, &update.metadata, METADATA_ALIASES)?;
        merge_section(&mut self.context, &update.context, &[])?;
        merge_section(&mut self.stats, &update.stats, &[])?;
        self.last_activity = now_ms;
        Ok(())
    }

    /// Append a message to the window and update counters.
    pub fn record_message(&mut self, message: SessionMessage, window: usize) {
        self.last_activity = self.last_activity.max(message.timestamp);
        self.context.messages.push(message);
        let len = self.context.messages.len();
        if len > window {
            self.context.messages.drain(..len - window);
        }
        self.stats.message_count += 1;
        self.metadata.first_interaction = false;
    }

    /// Most recent `limit` messages, oldest first.
    pub fn recent_messages(&self, limit: usize) -> Vec<SessionMessage> {
        let msgs = &self.context.messages;
        msgs[msgs.len().saturating_sub(limit)..].to_vec()
    }

    /// Record the current focus and the time it was detected.
    pub fn set_focus(&mut self, focus: Value, now_ms: i64) {
        self.metadata.focus_current = Some(focus);
        self.context.last_intent_at = Some(now_ms);
        self.last_activity = now_ms;
    }
}

/// Allocate a session id of the form `sess_<epochMillis>_<9 base36 chars>`.
pub fn generate_session_id(now_ms: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("sess_{now_ms}_{suffix}")
}

/// Truncate a summary to at most `max_chars` characters.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Legacy metadata keys and the wire names they stand for.
const METADATA_ALIASES: &[(&str, &str)] = &[
    ("focoAtual", "focusCurrent"),
    ("etapaFunil", "funnelStage"),
    ("primeiraInteracao", "firstInteraction"),
];

/// Shallow-merge `patch` into a serializable section.
///
/// Legacy keys in `aliases` are renamed before merging so they replace the
/// field instead of sitting next to it.
fn merge_section<T>(
    section: &mut T,
    patch: &Map<String, Value>,
    aliases: &[(&str, &str)],
) -> Result<(), serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    if patch.is_empty() {
        return Ok(());
    }
    let mut current = match serde_json::to_value(&*section)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in patch {
        let key = aliases
            .iter()
            .find(|(legacy, _)| legacy == key)
            .map_or(key.as_str(), |(_, canonical)| canonical);
        current.insert(key.to_string(), value.clone());
    }
    *section = serde_json::from_value(Value::Object(current))?;
    Ok(())
}

fn default_funnel_stage() -> String {
    DEFAULT_FUNNEL_STAGE.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(text: &str, ts: i64) -> SessionMessage {
        SessionMessage {
            text: text.to_string(),
            timestamp: ts,
            tags: vec![],
        }
    }

    #[test]
    fn new_session_has_defaults() {
        let s = Session::new("acme", Map::new(), 1_000).unwrap();
        assert_eq!(s.client_id, "acme");
        assert_eq!(s.metadata.funnel_stage, "descoberta");
        assert!(s.metadata.first_interaction);
        assert!(s.metadata.focus_current.is_none());
        assert_eq!(s.stats.message_count, 0);
        assert!(s.id.starts_with("sess_1000_"));
        assert_eq!(s.id.len(), "sess_1000_".len() + 9);
    }

    #[test]
    fn new_session_overlays_metadata() {
        let mut meta = Map::new();
        meta.insert("funnelStage".into(), json!("proposta"));
        meta.insert("canal".into(), json!("whatsapp"));
        let s = Session::new("acme", meta, 0).unwrap();
        assert_eq!(s.metadata.funnel_stage, "proposta");
        assert_eq!(s.metadata.extra.get("canal"), Some(&json!("whatsapp")));
    }

    #[test]
    fn legacy_metadata_keys_replace_their_fields() {
        let mut meta = Map::new();
        meta.insert("etapaFunil".into(), json!("proposta"));
        meta.insert("focoAtual".into(), json!({"tipo": "produto"}));
        let mut s = Session::new("acme", meta, 0).unwrap();
        assert_eq!(s.metadata.funnel_stage, "proposta");
        assert_eq!(s.metadata.focus_current, Some(json!({"tipo": "produto"})));
        assert!(s.metadata.extra.is_empty());

        let update = SessionUpdate::new().metadata("primeiraInteracao", json!(false));
        s.apply_update(&update, 10).unwrap();
        assert!(!s.metadata.first_interaction);
        assert_eq!(s.metadata.funnel_stage, "proposta");
        assert!(s.metadata.extra.is_empty());
    }

    #[test]
    fn liveness_boundary() {
        let s = Session::new("acme", Map::new(), 10_000).unwrap();
        assert!(s.is_live(10_000 + 999, 1_000));
        assert!(!s.is_live(10_000 + 1_000, 1_000));
        assert!(!s.is_live(10_000 + 1_001, 1_000));
    }

    #[test]
    fn update_is_shallow_per_section() {
        let mut s = Session::new("acme", Map::new(), 0).unwrap();
        s.context.tags = vec!["a".into()];
        let update = SessionUpdate::new()
            .metadata("funnelStage", json!("fechamento"))
            .context("variables", json!({"cidade": "Recife"}));
        s.apply_update(&update, 50).unwrap();

        assert_eq!(s.metadata.funnel_stage, "fechamento");
        assert!(s.metadata.first_interaction);
        assert_eq!(s.context.variables.get("cidade"), Some(&json!("Recife")));
        assert_eq!(s.context.tags, vec!["a".to_string()]);
        assert_eq!(s.last_activity, 50);
    }

    #[test]
    fn update_with_wrong_type_is_rejected() {
        let mut s = Session::new("acme", Map::new(), 0).unwrap();
        let update = SessionUpdate::new().stats("messageCount", json!("many"));
        assert!(s.apply_update(&update, 1).is_err());
    }

    #[test]
    fn message_window_keeps_most_recent() {
        let mut s = Session::new("acme", Map::new(), 0).unwrap();
        for i in 0..25 {
            s.record_message(message(&format!("m{i}"), i), MESSAGE_WINDOW);
        }
        assert_eq!(s.context.messages.len(), MESSAGE_WINDOW);
        assert_eq!(s.context.messages[0].text, "m5");
        assert_eq!(s.context.messages[19].text, "m24");
        assert_eq!(s.stats.message_count, 25);
        assert!(!s.metadata.first_interaction);

        let last = s.recent_messages(3);
        let texts: Vec<_> = last.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m22", "m23", "m24"]);
    }

    #[test]
    fn summary_truncates_on_char_boundary() {
        let text = "ção".repeat(200);
        let truncated = truncate_summary(&text, SUMMARY_MAX_CHARS);
        assert_eq!(truncated.chars().count(), 400);
    }

    #[test]
    fn wire_format_is_camel_case() {
        let s = Session::new("acme", Map::new(), 5).unwrap();
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("clientId").is_some());
        assert!(v.get("lastActivity").is_some());
        assert_eq!(v["metadata"]["firstInteraction"], json!(true));
        assert!(v.get("summary").is_none());
    }
}
