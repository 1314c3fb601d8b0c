//! On-disk persistence for session trees.
//!
//! Each session gets an append-only `<id>.jsonl` transcript under the
//! configured sessions directory — one [`Entry`] per line, written in the
//! order entries were created. A sibling `index.json` tracks per-session
//! metadata (title, current leaf, timestamps) — loaded eagerly, flushed
//! after every mutation that changes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use opal_domain::error::{Error, Result};
use opal_domain::message::Message;

use crate::tree::{Entry, EntryId, SessionTree};

/// Per-session metadata persisted in `index.json`, independent of the
/// message entries themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSessionMeta {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub leaf: Option<EntryId>,
}

/// Owns every session tree the process knows about plus the bookkeeping
/// needed to persist them incrementally. One `SessionStore` is shared
/// across all sessions in the process.
pub struct SessionStore {
    dir: PathBuf,
    trees: RwLock<HashMap<String, SessionTree>>,
    meta: RwLock<HashMap<String, StoredSessionMeta>>,
    /// How many of each tree's entries (in creation order) have already
    /// been flushed to its `.jsonl` file — lets `flush` append only what's
    /// new instead of rewriting the whole file.
    flushed_counts: RwLock<HashMap<String, usize>>,
}

impl SessionStore {
    /// Open (creating if absent) the sessions directory under `data_dir`
    /// and load the metadata index. Individual session transcripts are
    /// loaded lazily by [`Self::load`] / [`Self::get_or_create`].
    pub fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("sessions");
        std::fs::create_dir_all(&dir)?;

        let index_path = dir.join("index.json");
        let meta: HashMap<String, StoredSessionMeta> = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(sessions = meta.len(), path = %dir.display(), "session store opened");

        Ok(Self {
            dir,
            trees: RwLock::new(HashMap::new()),
            meta: RwLock::new(meta),
            flushed_counts: RwLock::new(HashMap::new()),
        })
    }

    fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    /// Create a brand new session, generating an id if none is supplied.
    pub fn create(&self, session_id: Option<String>) -> String {
        let id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        self.trees.write().insert(id.clone(), SessionTree::new(id.clone()));
        self.flushed_counts.write().insert(id.clone(), 0);
        self.meta.write().insert(
            id.clone(),
            StoredSessionMeta {
                session_id: id.clone(),
                created_at: now,
                updated_at: now,
                title: None,
                metadata: serde_json::Value::Null,
                leaf: None,
            },
        );
        let _ = self.flush_index();
        id
    }

    /// Load a session's transcript from disk into memory if it isn't
    /// already resident. No-op (and not an error) if the session has
    /// never been persisted.
    pub fn load(&self, session_id: &str) -> Result<()> {
        if self.trees.read().contains_key(session_id) {
            return Ok(());
        }
        let path = self.transcript_path(session_id);
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let mut entries = Vec::new();
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Entry>(line) {
                    Ok(e) => entries.push(e),
                    Err(e) => {
                        tracing::warn!(session_id, error = %e, "skipping malformed transcript line");
                    }
                }
            }
            entries
        } else {
            Vec::new()
        };
        let count = entries.len();
        let leaf = self.meta.read().get(session_id).and_then(|m| m.leaf);
        let title = self.meta.read().get(session_id).and_then(|m| m.title.clone());
        let tree = SessionTree::from_entries(session_id, entries, leaf, title);
        self.trees.write().insert(session_id.to_string(), tree);
        self.flushed_counts.write().insert(session_id.to_string(), count);
        Ok(())
    }

    /// Ensure a tree for `session_id` exists in memory, loading it from
    /// disk or creating it fresh, then return whether it was freshly
    /// created (`is_new`).
    pub fn get_or_create(&self, session_id: &str) -> Result<bool> {
        self.load(session_id)?;
        if self.trees.read().contains_key(session_id) {
            return Ok(false);
        }
        self.create(Some(session_id.to_string()));
        Ok(true)
    }

    fn with_tree<T>(&self, session_id: &str, f: impl FnOnce(&mut SessionTree) -> T) -> Result<T> {
        let mut trees = self.trees.write();
        let tree = trees
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        Ok(f(tree))
    }

    pub fn append(&self, session_id: &str, message: Message) -> Result<EntryId> {
        let id = self.with_tree(session_id, |t| t.append(message))?;
        self.touch(session_id);
        Ok(id)
    }

    pub fn append_many(&self, session_id: &str, messages: Vec<Message>) -> Result<Vec<EntryId>> {
        let ids = self.with_tree(session_id, |t| t.append_many(messages))?;
        self.touch(session_id);
        Ok(ids)
    }

    pub fn branch(&self, session_id: &str, entry_id: EntryId) -> Result<()> {
        self.with_tree(session_id, |t| t.branch(entry_id))??;
        self.touch(session_id);
        self.sync_leaf(session_id);
        self.flush_index()
    }

    pub fn current_path(&self, session_id: &str) -> Result<Vec<Message>> {
        self.with_tree(session_id, |t| t.current_path().into_iter().cloned().collect())
    }

    pub fn current_path_ids(&self, session_id: &str) -> Result<Vec<EntryId>> {
        self.with_tree(session_id, |t| t.current_path_ids())
    }

    pub fn path_to(&self, session_id: &str, entry_id: EntryId) -> Result<Vec<Message>> {
        self.with_tree(session_id, |t| t.path_to(entry_id).into_iter().cloned().collect())
    }

    pub fn len(&self, session_id: &str) -> Result<usize> {
        self.with_tree(session_id, |t| t.len())
    }

    /// Compaction: produces a new branch with
    /// `summary` followed by `tail`, leaving the old branch intact.
    /// Returns the new leaf id.
    pub fn compact(&self, session_id: &str, summary: Message, tail: Vec<Message>) -> Result<EntryId> {
        let leaf = self.with_tree(session_id, |t| t.compact(summary, tail))?;
        self.touch(session_id);
        self.sync_leaf(session_id);
        self.flush_index()?;
        Ok(leaf)
    }

    pub fn set_title(&self, session_id: &str, title: impl Into<String>) -> Result<()> {
        let title = title.into();
        self.with_tree(session_id, |t| t.title = Some(title.clone()))?;
        if let Some(m) = self.meta.write().get_mut(session_id) {
            m.title = Some(title);
            m.updated_at = Utc::now();
        }
        self.flush_index()
    }

    pub fn title(&self, session_id: &str) -> Option<String> {
        self.meta.read().get(session_id).and_then(|m| m.title.clone())
    }

    pub fn set_metadata(&self, session_id: &str, metadata: serde_json::Value) -> Result<()> {
        if let Some(m) = self.meta.write().get_mut(session_id) {
            m.metadata = metadata;
            m.updated_at = Utc::now();
        }
        self.flush_index()
    }

    pub fn metadata(&self, session_id: &str) -> serde_json::Value {
        self.meta
            .read()
            .get(session_id)
            .map(|m| m.metadata.clone())
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn list(&self) -> Vec<StoredSessionMeta> {
        let mut v: Vec<_> = self.meta.read().values().cloned().collect();
        v.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        v
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.meta.read().contains_key(session_id) || self.trees.read().contains_key(session_id)
    }

    /// Delete a session's transcript and metadata. Never silently no-ops
    /// on a missing file — only the missing-session case is an error.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        if !self.exists(session_id) {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        self.trees.write().remove(session_id);
        self.flushed_counts.write().remove(session_id);
        self.meta.write().remove(session_id);
        let path = self.transcript_path(session_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.flush_index()
    }

    fn touch(&self, session_id: &str) {
        if let Some(m) = self.meta.write().get_mut(session_id) {
            m.updated_at = Utc::now();
        }
        let _ = self.flush(session_id);
    }

    fn sync_leaf(&self, session_id: &str) {
        let leaf = self.trees.read().get(session_id).and_then(|t| t.leaf());
        if let Some(m) = self.meta.write().get_mut(session_id) {
            m.leaf = leaf;
        }
    }

    /// Append any entries created since the last flush to the session's
    /// `.jsonl` file. Never rewrites previously-written lines.
    pub fn flush(&self, session_id: &str) -> Result<()> {
        self.sync_leaf(session_id);
        let trees = self.trees.read();
        let Some(tree) = trees.get(session_id) else {
            return Ok(());
        };
        let mut counts = self.flushed_counts.write();
        let already = counts.get(session_id).copied().unwrap_or(0);
        let all: Vec<&Entry> = tree.entries_in_order().collect();
        if already >= all.len() {
            return Ok(());
        }
        let new_entries = &all[already..];
        let mut buf = String::new();
        for e in new_entries {
            buf.push_str(&serde_json::to_string(e)?);
            buf.push('\n');
        }
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(session_id))?;
        file.write_all(buf.as_bytes())?;
        counts.insert(session_id.to_string(), all.len());
        Ok(())
    }

    fn flush_index(&self) -> Result<()> {
        let meta = self.meta.read();
        let json = serde_json::to_string_pretty(&*meta)?;
        std::fs::write(self.index_path(), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_then_append_persists_to_jsonl() {
        let (dir, store) = open_tmp();
        let id = store.create(None);
        store.append(&id, Message::user("m1", "hello")).unwrap();
        store.append(&id, Message::assistant("m2", "hi", None, vec![])).unwrap();

        let path = dir.path().join("sessions").join(format!("{id}.jsonl"));
        let raw = std::fs::read_to_string(path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn reopening_reloads_transcript_and_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = SessionStore::open(dir.path()).unwrap();
            let id = store.create(None);
            store.append(&id, Message::user("m1", "hello")).unwrap();
            store.append(&id, Message::assistant("m2", "hi", None, vec![])).unwrap();
            id
        };

        let store2 = SessionStore::open(dir.path()).unwrap();
        store2.load(&id).unwrap();
        let path = store2.current_path(&id).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[1].content, "hi");
    }

    #[test]
    fn delete_removes_transcript_file_and_metadata() {
        let (dir, store) = open_tmp();
        let id = store.create(None);
        store.append(&id, Message::user("m1", "hello")).unwrap();
        store.delete(&id).unwrap();

        let path = dir.path().join("sessions").join(format!("{id}.jsonl"));
        assert!(!path.exists());
        assert!(store.list().is_empty());
    }

    #[test]
    fn delete_unknown_session_errors() {
        let (_dir, store) = open_tmp();
        assert!(store.delete("missing").is_err());
    }

    #[test]
    fn title_round_trips_through_index() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = SessionStore::open(dir.path()).unwrap();
            let id = store.create(None);
            store.set_title(&id, "My Session").unwrap();
            id
        };
        let store2 = SessionStore::open(dir.path()).unwrap();
        assert_eq!(store2.title(&id), Some("My Session".to_string()));
    }

    #[test]
    fn flush_is_incremental_not_a_rewrite() {
        let (dir, store) = open_tmp();
        let id = store.create(None);
        store.append(&id, Message::user("a", "1")).unwrap();
        let path = dir.path().join("sessions").join(format!("{id}.jsonl"));
        let first_len = std::fs::metadata(&path).unwrap().len();
        store.append(&id, Message::user("b", "2")).unwrap();
        let second_len = std::fs::metadata(&path).unwrap().len();
        assert!(second_len > first_len);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
