// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic JSON documents on disk with backup recovery.
//!
//! A write lands in a temporary file first, the previous document is copied
//! to `<name>_bak.json`, and the temporary file is renamed over the target.
//! Readers therefore see either the old or the new document, never a partial
//! one. A document that fails to parse is restored from its backup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use luni_core::LuniError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

const BACKUP_SUFFIX: &str = "_bak.json";
const TMP_SUFFIX: &str = ".tmp";

/// Bytes escaped in file names. `%` stays escaped so the encoding is reversible.
const FILE_NAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'@')
    .remove(b'+');

/// Percent-encode characters that are unsafe in file names.
///
/// Distinct keys always map to distinct names.
pub fn sanitize_key(key: &str) -> String {
    utf8_percent_encode(key, FILE_NAME_ESCAPES).to_string()
}

/// `foo.json` -> `foo_bak.json`.
pub fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    path.with_file_name(format!("{stem}{BACKUP_SUFFIX}"))
}

/// A directory of JSON documents addressed by file name.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) the directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, LuniError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(LuniError::storage)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Atomically replace `name` with `value`.
    pub async fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), LuniError> {
        let target = self.path_for(name);
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = self
            .dir
            .join(format!("{name}.{}{TMP_SUFFIX}", uuid::Uuid::new_v4().simple()));

        write_synced(&tmp, &bytes).await.map_err(LuniError::storage)?;

        match tokio::fs::copy(&target, backup_path(&target)).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %target.display(), error = %e, "could not refresh backup"),
        }

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            tracing::warn!(path = %target.display(), error = %e, "atomic rename failed, writing in place");
            let direct = tokio::fs::write(&target, &bytes).await;
            let _ = tokio::fs::remove_file(&tmp).await;
            direct.map_err(LuniError::storage)?;
        }
        Ok(())
    }

    /// Read `name`, recovering from the backup when the primary is unreadable.
    ///
    /// Returns `None` when the document is missing or both copies are bad.
    pub async fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let target = self.path_for(name);
        let primary_err = match tokio::fs::read(&target).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => return Some(value),
                Err(e) => e.to_string(),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => e.to_string(),
        };

        let backup = backup_path(&target);
        let recovered = match tokio::fs::read(&backup).await {
            Ok(bytes) => serde_json::from_slice::<T>(&bytes).ok(),
            Err(_) => None,
        };
        match recovered {
            Some(value) => {
                tracing::warn!(path = %target.display(), error = %primary_err, "document unreadable, restored from backup");
                if let Err(e) = tokio::fs::copy(&backup, &target).await {
                    tracing::warn!(path = %target.display(), error = %e, "could not restore primary from backup");
                }
                Some(value)
            }
            None => {
                tracing::warn!(path = %target.display(), error = %primary_err, "document unreadable and no usable backup");
                None
            }
        }
    }

    pub async fn read_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        self.read(name).await.unwrap_or_default()
    }

    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path_for(name))
            .await
            .unwrap_or(false)
    }

    /// Delete a document and its backup. Returns whether the primary existed.
    pub async fn remove(&self, name: &str) -> Result<bool, LuniError> {
        let target = self.path_for(name);
        let _ = tokio::fs::remove_file(backup_path(&target)).await;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LuniError::storage(e)),
        }
    }

    /// Primary document names with the given prefix, skipping backups and temp files.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, LuniError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(LuniError::storage)?;
        while let Some(entry) = entries.next_entry().await.map_err(LuniError::storage)? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix)
                && name.ends_with(".json")
                && !name.ends_with(BACKUP_SUFFIX)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether the directory accepts writes.
    pub async fn probe(&self) -> Result<(), LuniError> {
        let probe = self.dir.join(format!(".probe{TMP_SUFFIX}"));
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(LuniError::storage)?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    async fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("docs")).await.unwrap();
        (dir, store)
    }

    #[test]
    fn backup_name_is_sibling() {
        assert_eq!(
            backup_path(Path::new("/v/acme_vars.json")),
            PathBuf::from("/v/acme_vars_bak.json")
        );
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("../etc/passwd"), "..%2Fetc%2Fpasswd");
        assert_eq!(sanitize_key("5581999@c.us"), "5581999@c.us");
        assert_eq!(sanitize_key("a:b"), "a%3Ab");
        assert_eq!(sanitize_key("a%3Ab"), "a%253Ab");
        assert_eq!(sanitize_key("ação"), "a%C3%A7%C3%A3o");
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, store) = store().await;
        store.write("a.json", &json!({"x": 1})).await.unwrap();
        let v: Value = store.read("a.json").await.unwrap();
        assert_eq!(v, json!({"x": 1}));
        assert!(store.read::<Value>("missing.json").await.is_none());
    }

    #[tokio::test]
    async fn second_write_keeps_previous_as_backup() {
        let (_dir, store) = store().await;
        store.write("a.json", &json!(1)).await.unwrap();
        store.write("a.json", &json!(2)).await.unwrap();
        let backup = tokio::fs::read_to_string(store.path_for("a_bak.json")).await.unwrap();
        assert_eq!(backup.trim(), "1");
        assert_eq!(store.list("").await.unwrap(), ["a.json"]);
    }

    #[tokio::test]
    async fn corrupt_primary_restored_from_backup() {
        let (_dir, store) = store().await;
        store.write("a.json", &json!({"v": 1})).await.unwrap();
        store.write("a.json", &json!({"v": 2})).await.unwrap();
        tokio::fs::write(store.path_for("a.json"), b"{ not json").await.unwrap();

        let v: Value = store.read("a.json").await.unwrap();
        assert_eq!(v, json!({"v": 1}));

        let restored = tokio::fs::read(store.path_for("a.json")).await.unwrap();
        let restored: Value = serde_json::from_slice(&restored).unwrap();
        assert_eq!(restored, json!({"v": 1}));
    }

    #[tokio::test]
    async fn corrupt_without_backup_reads_as_empty() {
        let (_dir, store) = store().await;
        tokio::fs::write(store.path_for("a.json"), b"garbage").await.unwrap();
        assert!(store.read::<Value>("a.json").await.is_none());
        let v: std::collections::BTreeMap<String, Value> = store.read_or_default("a.json").await;
        assert!(v.is_empty());
    }

    #[tokio::test]
    async fn crash_before_rename_leaves_target_intact() {
        let (_dir, store) = store().await;
        store.write("a.json", &json!({"v": "old"})).await.unwrap();

        // A writer that died after the temp write and before the rename.
        let orphan = store.dir().join("a.json.deadbeef.tmp");
        tokio::fs::write(&orphan, b"{\"v\": \"ne").await.unwrap();

        let v: Value = store.read("a.json").await.unwrap();
        assert_eq!(v, json!({"v": "old"}));
        assert_eq!(store.list("a").await.unwrap(), ["a.json"]);
    }

    #[tokio::test]
    async fn remove_deletes_primary_and_backup() {
        let (_dir, store) = store().await;
        store.write("a.json", &json!(1)).await.unwrap();
        store.write("a.json", &json!(2)).await.unwrap();
        assert!(store.remove("a.json").await.unwrap());
        assert!(!store.exists("a.json").await);
        assert!(!store.exists("a_bak.json").await);
        assert!(!store.remove("a.json").await.unwrap());
    }

    #[tokio::test]
    async fn probe_succeeds_on_writable_dir() {
        let (_dir, store) = store().await;
        store.probe().await.unwrap();
    }
}
