//! The branch-capable message tree and its on-disk persistence.
//!
//! [`tree::SessionTree`] is the in-memory data structure; [`store::SessionStore`]
//! owns a collection of trees keyed by session id, flushes new entries to
//! `<data_dir>/sessions/<id>.jsonl`, and tracks per-session metadata
//! (title) in a sibling `sessions.json` index — per-message JSONL for the
//! transcript, a small JSON index for metadata, kept as two files so
//! either can be rewritten without touching the other.

pub mod store;
pub mod tree;

pub use store::{SessionStore, StoredSessionMeta};
pub use tree::{Entry, EntryId, SessionTree};
