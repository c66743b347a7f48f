//! JSON-file backed conversation store.
//!
//! The whole map lives in memory; `set_conversation` and `delete_conversation`
//! only touch that copy and `save` writes it out. Callers choose the flush
//! cadence: the memory manager flushes after every summary and clear, and
//! after ordinary turns only when configured to.
//!
//! Disk problems never escape this module. A missing file starts an empty
//! store, a corrupt one is replaced by an empty store (counted in
//! `MemoryStats::corruption_recoveries` and logged as a warning), and failed
//! writes are logged and reported as `false`.

use crate::errors::BotError;
use crate::memory::Conversation;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was read; holds the number of conversations.
    Loaded(usize),
    /// No file existed; an empty one was created.
    Created,
    /// The file held invalid data and was replaced with an empty store.
    RecoveredFromCorruption,
    /// The file could not be read (permissions, I/O); the store starts empty
    /// and the file is left untouched.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_conversations: usize,
    pub last_saved: Option<DateTime<Utc>>,
    /// Size in bytes of the compact JSON encoding of all conversations.
    pub memory_size: usize,
    pub corruption_recoveries: u64,
}

pub struct MemoryStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, Conversation>>,
    last_saved: RwLock<Option<DateTime<Utc>>>,
    save_lock: tokio::sync::Mutex<()>,
    corruption_recoveries: AtomicU64,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: RwLock::new(BTreeMap::new()),
            last_saved: RwLock::new(None),
            save_lock: tokio::sync::Mutex::new(()),
            corruption_recoveries: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory map with the contents of the backing file.
    pub async fn load(&self) -> LoadOutcome {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                match serde_json::from_str::<BTreeMap<String, Conversation>>(&content) {
                    Ok(conversations) => {
                        let count = conversations.len();
                        *self.write_data() = conversations;
                        info!(
                            "Loaded {} conversations from {}",
                            count,
                            self.path.display()
                        );
                        LoadOutcome::Loaded(count)
                    }
                    Err(e) => {
                        let recoveries = self.corruption_recoveries.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            "Memory file {} is corrupt ({}); discarding its contents and starting empty (recovery #{})",
                            self.path.display(),
                            e,
                            recoveries
                        );
                        self.write_data().clear();
                        self.save().await;
                        LoadOutcome::RecoveredFromCorruption
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Memory file {} not found, creating a new one",
                    self.path.display()
                );
                self.write_data().clear();
                self.save().await;
                LoadOutcome::Created
            }
            Err(e) => {
                error!(
                    "Failed to read memory file {}: {}; starting with an empty store",
                    self.path.display(),
                    e
                );
                self.write_data().clear();
                LoadOutcome::Unreadable
            }
        }
    }

    /// Write the whole map to disk. Returns whether the write succeeded.
    pub async fn save(&self) -> bool {
        match self.write_snapshot().await {
            Ok(count) => {
                debug!("Saved {} conversations to {}", count, self.path.display());
                true
            }
            Err(e) => {
                error!("Failed to save memory to {}: {}", self.path.display(), e);
                false
            }
        }
    }

    async fn write_snapshot(&self) -> Result<usize, BotError> {
        // one writer at a time so concurrent saves never share the temp file
        let _guard = self.save_lock.lock().await;

        let (json, count) = {
            let data = self.read_data();
            (serde_json::to_string_pretty(&*data)?, data.len())
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;

        *self
            .last_saved
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
        Ok(count)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "memory.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn get_conversation(&self, id: &str) -> Option<Conversation> {
        self.read_data().get(id).cloned()
    }

    /// Upsert one record in memory, stamping `updated_at`. Call `save` to persist.
    pub fn set_conversation(&self, id: &str, mut conversation: Conversation) {
        conversation.updated_at = Some(Utc::now());
        self.write_data().insert(id.to_string(), conversation);
    }

    /// Remove one record from memory. Call `save` to persist the deletion.
    pub fn delete_conversation(&self, id: &str) -> bool {
        self.write_data().remove(id).is_some()
    }

    pub fn get_all_conversations(&self) -> BTreeMap<String, Conversation> {
        self.read_data().clone()
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.read_data().keys().cloned().collect()
    }

    pub fn get_memory_stats(&self) -> MemoryStats {
        let (total_conversations, memory_size) = {
            let data = self.read_data();
            let size = serde_json::to_string(&*data).map(|s| s.len()).unwrap_or(0);
            (data.len(), size)
        };

        MemoryStats {
            total_conversations,
            last_saved: *self
                .last_saved
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            memory_size,
            corruption_recoveries: self.corruption_recoveries.load(Ordering::Relaxed),
        }
    }

    /// Forget every conversation and persist the empty store.
    pub async fn clear(&self) -> bool {
        self.write_data().clear();
        let saved = self.save().await;
        info!("Memory store cleared");
        saved
    }

    /// Final flush before the process exits.
    pub async fn shutdown(&self) -> bool {
        info!("Saving memory before shutdown...");
        self.save().await
    }

    fn read_data(&self) -> RwLockReadGuard<'_, BTreeMap<String, Conversation>> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Conversation>> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Message;
    use tempfile::TempDir;

    fn conversation() -> Conversation {
        Conversation {
            messages: vec![Message::user("Hi"), Message::assistant("Hello")],
            summary: Some("GOAL: greet".to_string()),
            message_count: 1,
            updated_at: None,
        }
    }

    fn store_in(dir: &TempDir) -> MemoryStore {
        MemoryStore::new(dir.path().join("summaryMemory.json"))
    }

    #[tokio::test]
    async fn test_missing_file_creates_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.load().await, LoadOutcome::Created);
        assert!(store.path().exists());
        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(on_disk.trim(), "{}");
    }

    #[tokio::test]
    async fn test_round_trip_preserves_everything_but_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_conversation("42", conversation());
        assert!(store.save().await);

        let fresh = store_in(&dir);
        assert_eq!(fresh.load().await, LoadOutcome::Loaded(1));

        let loaded = fresh.get_conversation("42").unwrap();
        assert!(loaded.updated_at.is_some());
        assert_eq!(
            Conversation {
                updated_at: None,
                ..loaded
            },
            conversation()
        );
    }

    #[tokio::test]
    async fn test_file_layout_matches_documented_format() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_conversation("7", conversation());
        assert!(store.save().await);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let record = &raw["7"];
        assert_eq!(record["messages"][0]["role"], "user");
        assert_eq!(record["messages"][1]["content"], "Hello");
        assert_eq!(record["summary"], "GOAL: greet");
        assert_eq!(record["messageCount"], 1);
        assert!(record["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_corrupt_file_resets_and_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ this is not json").unwrap();

        assert_eq!(store.load().await, LoadOutcome::RecoveredFromCorruption);
        assert!(store.get_all_conversations().is_empty());
        assert_eq!(store.get_memory_stats().corruption_recoveries, 1);

        assert!(store.save().await);
        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_conversation("1", conversation());

        assert!(store.save().await);
        assert!(!dir.path().join("summaryMemory.json.tmp").exists());
        assert!(store.get_memory_stats().last_saved.is_some());
    }

    #[tokio::test]
    async fn test_save_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("nested/data/memory.json"));
        store.set_conversation("1", conversation());

        assert!(store.save().await);
        assert!(dir.path().join("nested/data/memory.json").exists());
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        // a directory where the file should be makes the rename fail
        let path = dir.path().join("occupied");
        std::fs::create_dir_all(path.join("child")).unwrap();
        let store = MemoryStore::new(&path);
        store.set_conversation("1", conversation());

        assert!(!store.save().await);
        assert_eq!(store.get_memory_stats().last_saved, None);
    }

    #[tokio::test]
    async fn test_delete_requires_save_to_persist() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_conversation("1", conversation());
        assert!(store.save().await);

        assert!(store.delete_conversation("1"));
        assert!(!store.delete_conversation("1"));

        let before_save = store_in(&dir);
        before_save.load().await;
        assert!(before_save.get_conversation("1").is_some());

        assert!(store.save().await);
        let after_save = store_in(&dir);
        after_save.load().await;
        assert!(after_save.get_conversation("1").is_none());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_conversation("1", conversation());
        store.set_conversation("2", Conversation::default());

        let stats = store.get_memory_stats();
        assert_eq!(stats.total_conversations, 2);
        assert!(stats.memory_size > 2);
        assert_eq!(store.conversation_ids(), vec!["1".to_string(), "2".to_string()]);

        assert!(store.clear().await);
        assert_eq!(store.get_memory_stats().total_conversations, 0);

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.load().await, LoadOutcome::Loaded(0));
    }
}
