// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Focus store trait.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::LuniError;
use crate::focus::{FocusPolicy, FocusRecord};
use crate::traits::adapter::PluginAdapter;
use crate::types::BackendKind;

/// CRUD over per-client focus records.
#[async_trait]
pub trait FocusStore: PluginAdapter {
    /// Which backend this store writes to.
    fn backend(&self) -> BackendKind;

    /// Caps and age limit applied on writes and reads.
    fn policy(&self) -> &FocusPolicy;

    /// Merge a partial update and persist the result.
    #[doc(alias = "atualizarFocos")]
    async fn update_focus(
        &self,
        client_id: &str,
        update: Map<String, Value>,
    ) -> Result<FocusRecord, LuniError>;

    /// The stored record as-is, or an empty one for unknown clients.
    #[doc(alias = "getFocos")]
    async fn get_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError>;

    /// Filtered and capped view, computed on read and not persisted.
    #[doc(alias = "getFocosValidos")]
    async fn get_valid_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError>;

    /// Persist removal of stale entries. Returns whether anything changed.
    #[doc(alias = "limparFocosExpirados")]
    async fn prune_expired(&self, client_id: &str) -> Result<bool, LuniError>;

    /// Clear one category by its JSON key.
    #[doc(alias = "removerFocoPorCategoria")]
    async fn remove_category(&self, client_id: &str, category: &str) -> Result<bool, LuniError>;

    /// Replace the record's active focus value.
    #[doc(alias = "setFocoAtivo")]
    async fn set_active_focus(&self, client_id: &str, value: Value) -> Result<(), LuniError>;

    #[doc(alias = "getFocoAtivo")]
    async fn get_active_focus(&self, client_id: &str) -> Result<Option<Value>, LuniError> {
        Ok(self.get_focus(client_id).await?.active_focus().cloned())
    }
}
