// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Focus record shape. JSON keys keep the established Portuguese names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the "active focus" value stored alongside the categories.
pub const ACTIVE_FOCUS_KEY: &str = "focoAtual";

/// Aggregated, continuously-merged signals for one client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusRecord {
    #[serde(default)]
    pub focos: FocusCategories,
    #[serde(default)]
    pub atualizado_em: Option<DateTime<Utc>>,
    #[serde(rename = "nomeArquivo", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusCategories {
    #[serde(rename = "duvidasRecentes", default)]
    pub recent_questions: Vec<String>,
    #[serde(rename = "intencaoAtual", default)]
    pub current_intent: Option<Value>,
    #[serde(rename = "produto", default)]
    pub products: Vec<Mention>,
    #[serde(rename = "servico", default)]
    pub services: Vec<Mention>,
    #[serde(rename = "itemIndefinido", default)]
    pub undefined_items: Vec<UndefinedItem>,
    #[serde(rename = "agendamento", default)]
    pub scheduling: Vec<SchedulingAttempt>,
    #[serde(rename = "contatoCliente", default)]
    pub contact: ContactInfo,
    /// Unstructured keys; objects shallow-merge, anything else overwrites.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A product or service mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(rename = "nome", default)]
    pub name: String,
    #[serde(rename = "apelidos", default)]
    pub aliases: Vec<String>,
    #[serde(rename = "intencao", default = "default_intent")]
    pub intent: String,
    #[serde(rename = "ultimaMencao", default)]
    pub last_mentioned: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Interest in something that did not match the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndefinedItem {
    #[serde(rename = "nomeMencionado", default)]
    pub mentioned_name: Option<String>,
    #[serde(rename = "tipo", default = "default_kind")]
    pub kind: String,
    #[serde(rename = "mensagemOriginal", default)]
    pub original_message: Option<String>,
    #[serde(rename = "intencaoProvavel", default = "default_probable_intent")]
    pub probable_intent: String,
    #[serde(rename = "ultimaMencao", default)]
    pub last_mentioned: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A scheduling attempt, possibly with only some slots filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingAttempt {
    #[serde(rename = "servicoRelacionado", default)]
    pub related_service: Option<String>,
    #[serde(rename = "data", default)]
    pub date: Option<String>,
    #[serde(rename = "hora", default)]
    pub time: Option<String>,
    #[serde(rename = "regiao", default)]
    pub region: Option<String>,
    #[serde(rename = "confirmado", default)]
    pub confirmed: bool,
    #[serde(rename = "ultimaInteracao", default)]
    pub last_interaction: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(rename = "nome", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A structured category that can be cleared by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusCategory {
    RecentQuestions,
    CurrentIntent,
    Products,
    Services,
    UndefinedItems,
    Scheduling,
    Contact,
}

impl FocusCategory {
    /// Resolve a JSON key to a structured category.
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "duvidasRecentes" => Self::RecentQuestions,
            "intencaoAtual" => Self::CurrentIntent,
            "produto" => Self::Products,
            "servico" => Self::Services,
            "itemIndefinido" => Self::UndefinedItems,
            "agendamento" => Self::Scheduling,
            "contatoCliente" => Self::Contact,
            _ => return None,
        })
    }
}

impl FocusRecord {
    /// An empty record stamped with `now`.
    pub fn empty(client_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            focos: FocusCategories::default(),
            atualizado_em: Some(now),
            file_name: Some(format!("focos_{client_id}.json")),
        }
    }

    pub fn active_focus(&self) -> Option<&Value> {
        self.focos.other.get(ACTIVE_FOCUS_KEY).filter(|v| !v.is_null())
    }

    pub fn set_active_focus(&mut self, value: Value) {
        self.focos.other.insert(ACTIVE_FOCUS_KEY.to_string(), value);
    }

    /// Reset a category to empty. Returns false when there was nothing to clear.
    pub fn remove_category(&mut self, key: &str) -> bool {
        let focos = &mut self.focos;
        match FocusCategory::from_key(key) {
            Some(FocusCategory::RecentQuestions) => {
                !std::mem::take(&mut focos.recent_questions).is_empty()
            }
            Some(FocusCategory::CurrentIntent) => focos.current_intent.take().is_some(),
            Some(FocusCategory::Products) => !std::mem::take(&mut focos.products).is_empty(),
            Some(FocusCategory::Services) => !std::mem::take(&mut focos.services).is_empty(),
            Some(FocusCategory::UndefinedItems) => {
                !std::mem::take(&mut focos.undefined_items).is_empty()
            }
            Some(FocusCategory::Scheduling) => !std::mem::take(&mut focos.scheduling).is_empty(),
            Some(FocusCategory::Contact) => {
                std::mem::take(&mut focos.contact) != ContactInfo::default()
            }
            None => focos.other.remove(key).is_some(),
        }
    }
}

impl SchedulingAttempt {
    /// How many of `date`, `time`, `region` are filled.
    pub fn filled_slots(&self) -> usize {
        [&self.date, &self.time, &self.region]
            .iter()
            .filter(|s| s.as_deref().is_some_and(|v| !v.is_empty()))
            .count()
    }

    /// Every slot filled in `other` holds the same value here.
    pub fn agrees_with(&self, other: &SchedulingAttempt) -> bool {
        [
            (&self.date, &other.date),
            (&self.time, &other.time),
            (&self.region, &other.region),
        ]
        .iter()
        .all(|(mine, theirs)| theirs.is_none() || mine == theirs)
    }

    /// Has at least one slot but not all three.
    pub fn is_partial(&self) -> bool {
        (1..3).contains(&self.filled_slots())
    }
}

pub(crate) fn default_intent() -> String {
    "interesse".to_string()
}

pub(crate) fn default_kind() -> String {
    "desconhecido".to_string()
}

pub(crate) fn default_probable_intent() -> String {
    "possível interesse".to_string()
}
