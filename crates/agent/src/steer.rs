//! The steer queue: user messages sent while a turn is already running.
//!
//! A message arriving mid-turn is never interleaved into the in-flight
//! provider call — it's queued (`message_queued`) and applied
//! (`message_applied`) as a fresh user turn once the current one reaches a
//! safe boundary. The only safe boundary inside a turn is between tool
//! calls (`opal_agent::tool_runner::ToolRunner::run`), which is why a
//! non-empty queue there skips the rest of the current batch instead of
//! letting it run to completion against now-stale context.

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Default)]
pub struct SteerQueue {
    pending: Mutex<VecDeque<String>>,
}

impl SteerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message — emitting `message_queued` is left to the caller,
    /// which holds the event bus handle this module doesn't need.
    pub fn push(&self, text: impl Into<String>) {
        self.pending.lock().push_back(text.into());
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drain every queued message, in arrival order, for the caller to
    /// apply as the next turn's input.
    pub fn drain(&self) -> Vec<String> {
        self.pending.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain_preserves_order() {
        let q = SteerQueue::new();
        q.push("first");
        q.push("second");
        assert!(q.has_pending());
        assert_eq!(q.drain(), vec!["first".to_string(), "second".to_string()]);
        assert!(!q.has_pending());
    }

    #[test]
    fn drain_on_empty_queue_is_empty() {
        let q = SteerQueue::new();
        assert!(q.drain().is_empty());
    }

    #[test]
    fn len_and_is_empty_reflect_pending_count() {
        let q = SteerQueue::new();
        assert!(q.is_empty());
        q.push("x");
        assert_eq!(q.len(), 1);
        assert!(!q.is_empty());
    }
}
