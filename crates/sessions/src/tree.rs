//! The branch-capable message tree.
//!
//! A parent→child tree: every entry records the id of its parent, and a
//! single `leaf` pointer names which root→leaf path is the active LLM
//! context. Branching from an interior entry just moves the leaf
//! pointer; it never removes or rewrites existing entries — siblings
//! become unreachable from the current path but stay in `entries` and
//! are reachable again once the leaf is moved back.

use std::collections::HashMap;

use opal_domain::message::Message;
use serde::{Deserialize, Serialize};

pub type EntryId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub parent: Option<EntryId>,
    pub message: Message,
}

/// A single session's message tree plus the bookkeeping 
/// requires: a current leaf, and optional title/metadata.
#[derive(Debug, Clone)]
pub struct SessionTree {
    pub session_id: String,
    entries: HashMap<EntryId, Entry>,
    /// Insertion order, used to replay into a provider-ready path and to
    /// serialize new entries to disk in the order they were created.
    order: Vec<EntryId>,
    leaf: Option<EntryId>,
    next_id: EntryId,
    pub title: Option<String>,
}

impl SessionTree {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: HashMap::new(),
            order: Vec::new(),
            leaf: None,
            next_id: 0,
            title: None,
        }
    }

    /// Reconstruct a tree from previously-persisted entries, in the order
    /// they were written, plus the leaf id that was active when last
    /// saved. Used by `SessionStore::load`.
    pub fn from_entries(session_id: impl Into<String>, entries: Vec<Entry>, leaf: Option<EntryId>, title: Option<String>) -> Self {
        let mut t = Self::new(session_id);
        for e in entries {
            t.next_id = t.next_id.max(e.id + 1);
            t.order.push(e.id);
            t.entries.insert(e.id, e);
        }
        t.leaf = leaf.or_else(|| t.order.last().copied());
        t.title = title;
        t
    }

    pub fn leaf(&self) -> Option<EntryId> {
        self.leaf
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// Append a message as a child of the current leaf. Returns the new
    /// entry's id and makes it the new leaf.
    pub fn append(&mut self, message: Message) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        let parent = self.leaf;
        self.entries.insert(id, Entry { id, parent, message });
        self.order.push(id);
        self.leaf = Some(id);
        id
    }

    pub fn append_many(&mut self, messages: Vec<Message>) -> Vec<EntryId> {
        messages.into_iter().map(|m| self.append(m)).collect()
    }

    /// Make `entry_id` the new leaf. The prior leaf's subtree (if any
    /// exists beyond `entry_id`) stays in `entries`, just unreachable from
    /// the new current path — this is "branching from an interior entry"
    ///.
    pub fn branch(&mut self, entry_id: EntryId) -> opal_domain::error::Result<()> {
        if !self.entries.contains_key(&entry_id) {
            return Err(opal_domain::error::Error::Other(format!("no such entry: {entry_id}")));
        }
        self.leaf = Some(entry_id);
        Ok(())
    }

    /// The root→leaf path that is the current LLM context.
    pub fn current_path(&self) -> Vec<&Message> {
        match self.leaf {
            Some(leaf) => self.path_to(leaf),
            None => Vec::new(),
        }
    }

    /// The root→`entry_id` path.
    pub fn path_to(&self, entry_id: EntryId) -> Vec<&Message> {
        let mut rev = Vec::new();
        let mut cur = Some(entry_id);
        while let Some(id) = cur {
            let Some(e) = self.entries.get(&id) else { break };
            rev.push(&e.message);
            cur = e.parent;
        }
        rev.reverse();
        rev
    }

    pub fn current_path_ids(&self) -> Vec<EntryId> {
        let mut rev = Vec::new();
        let mut cur = self.leaf;
        while let Some(id) = cur {
            let Some(e) = self.entries.get(&id) else { break };
            rev.push(id);
            cur = e.parent;
        }
        rev.reverse();
        rev
    }

    /// All entries in the order they were created — used for
    /// incremental persistence.
    pub fn entries_in_order(&self) -> impl Iterator<Item = &Entry> {
        self.order.iter().filter_map(move |id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Compaction: produces a
    /// new branch containing a summary system message followed by the
    /// recent tail of the prior branch (`tail`, already trimmed by the
    /// caller to the messages to keep). The old branch is left entirely
    /// intact — its old leaf id is still present in `entries` and
    /// reachable via `path_to`/`branch`, just no longer the current leaf.
    /// Returns the new leaf id.
    pub fn compact(&mut self, summary: Message, tail: Vec<Message>) -> EntryId {
        let summary_id = self.next_id;
        self.next_id += 1;
        self.entries.insert(summary_id, Entry { id: summary_id, parent: None, message: summary });
        self.order.push(summary_id);

        let mut parent = summary_id;
        let mut last = summary_id;
        for msg in tail {
            let id = self.next_id;
            self.next_id += 1;
            self.entries.insert(id, Entry { id, parent: Some(parent), message: msg });
            self.order.push(id);
            parent = id;
            last = id;
        }
        self.leaf = Some(last);
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_domain::message::Message;

    fn msg(id: &str, text: &str) -> Message {
        Message::user(id, text)
    }

    #[test]
    fn append_chains_entries_under_current_leaf() {
        let mut t = SessionTree::new("s1");
        let a = t.append(msg("a", "hi"));
        let b = t.append(msg("b", "there"));
        assert_eq!(t.leaf(), Some(b));
        assert_eq!(t.get(b).unwrap().parent, Some(a));
        assert_eq!(t.current_path().len(), 2);
    }

    #[test]
    fn branch_moves_leaf_without_deleting_old_branch() {
        let mut t = SessionTree::new("s1");
        let a = t.append(msg("a", "root"));
        let b = t.append(msg("b", "branch-1-leaf"));
        t.branch(a).unwrap();
        let c = t.append(msg("c", "branch-2-leaf"));

        assert_eq!(t.current_path().len(), 2);
        assert_eq!(t.leaf(), Some(c));
        // Old branch is still reachable from its own terminal leaf.
        assert!(t.get(b).is_some());
        let restored = t.path_to(b);
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn branch_to_unknown_entry_errors() {
        let mut t = SessionTree::new("s1");
        t.append(msg("a", "root"));
        assert!(t.branch(999).is_err());
    }

    #[test]
    fn session_branch_then_restore_prior_leaf_yields_original_path() {
        let mut t = SessionTree::new("s1");
        let a = t.append(msg("a", "1"));
        let b = t.append(msg("b", "2"));
        let original: Vec<String> = t.current_path().iter().map(|m| m.content.clone()).collect();

        t.branch(a).unwrap();
        t.append(msg("c", "alt"));
        t.branch(b).unwrap();

        let restored: Vec<String> = t.current_path().iter().map(|m| m.content.clone()).collect();
        assert_eq!(restored, original);
    }

    #[test]
    fn compact_produces_new_branch_with_summary_then_tail() {
        let mut t = SessionTree::new("s1");
        t.append(msg("a", "1"));
        t.append(msg("b", "2"));
        let old_leaf = t.append(msg("c", "3"));

        let summary = Message::system("sum", "summary of 1,2,3");
        let tail = vec![msg("c2", "3")];
        let new_leaf = t.compact(summary, tail);

        assert_eq!(t.leaf(), Some(new_leaf));
        let path = t.current_path();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].content, "summary of 1,2,3");

        // Old branch untouched and still reachable.
        assert!(t.get(old_leaf).is_some());
        assert_eq!(t.path_to(old_leaf).len(), 3);
    }

    #[test]
    fn from_entries_rebuilds_leaf_and_next_id() {
        let mut t = SessionTree::new("s1");
        let a = t.append(msg("a", "1"));
        let b = t.append(msg("b", "2"));
        let entries: Vec<Entry> = t.entries_in_order().cloned().collect();

        let rebuilt = SessionTree::from_entries("s1", entries, Some(b), None);
        assert_eq!(rebuilt.leaf(), Some(b));
        assert_eq!(rebuilt.current_path().len(), 2);
        assert_eq!(rebuilt.get(a).unwrap().message.content, "1");
    }
}
