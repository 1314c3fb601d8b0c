//! Per-session token accounting, hybrid estimation, and overflow detection.
//!
//! The error-based half of overflow detection (substring-matching a
//! provider error message) lives in `opal_providers::classifier`; this
//! module owns the stateful, usage-report half: tracking
//! `last_prompt_tokens`, the hybrid token estimate, and the
//! `overflow_detected` flag.

use opal_domain::message::Message;
use opal_domain::stream::Usage;

/// Rough per-message structural overhead (role marker, field wrappers) on
/// top of content-byte estimation, in tokens.
const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Heuristic token estimator for messages without a provider report:
/// ~1 token per 4 bytes of UTF-8, plus per-message overhead.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

pub fn estimate_message_tokens(message: &Message) -> u64 {
    let mut total = estimate_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS;
    if let Some(thinking) = &message.thinking {
        total += estimate_tokens(thinking);
    }
    for call in &message.tool_calls {
        total += estimate_tokens(&call.tool_name) + estimate_tokens(&call.arguments.to_string());
    }
    total
}

pub fn estimate_messages_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Per-session usage bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct UsageTracker {
    cumulative_input: u64,
    cumulative_output: u64,
    last_prompt_tokens: u64,
    /// How many messages were in the session's current path the last time
    /// a usage report was recorded — the hybrid estimate only needs to
    /// estimate messages appended *since* then.
    message_count_at_last_report: usize,
    overflow_detected: bool,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a provider usage report. `message_count` is the length of
    /// the session's current path at the time of the report.
    pub fn record_usage(&mut self, usage: Usage, message_count: usize) {
        self.cumulative_input += usage.input_tokens;
        self.cumulative_output += usage.output_tokens;
        self.last_prompt_tokens = usage.input_tokens;
        self.message_count_at_last_report = message_count;
    }

    /// Cumulative counters for display, distinct from
    /// `current_context_tokens` which is the *last* report, not a sum.
    pub fn cumulative(&self) -> Usage {
        Usage { input_tokens: self.cumulative_input, output_tokens: self.cumulative_output }
    }

    /// `current_context_tokens`: MUST equal the last observed provider
    /// `input_tokens`, never the cumulative total.
    pub fn current_context_tokens(&self) -> u64 {
        self.last_prompt_tokens
    }

    /// Hybrid estimate: the last provider-reported
    /// input token count plus heuristic tokens for messages appended to
    /// the path since that report.
    pub fn hybrid_estimate(&self, current_path: &[Message]) -> u64 {
        let appended = current_path.get(self.message_count_at_last_report..).unwrap_or(&[]);
        self.last_prompt_tokens + estimate_messages_tokens(appended)
    }

    /// Auto-compact trigger: hybrid estimate
    /// exceeds `threshold` (default 0.8) of the context window.
    pub fn should_auto_compact(&self, current_path: &[Message], context_window: u64, threshold: f64) -> bool {
        if context_window == 0 {
            return false;
        }
        let estimate = self.hybrid_estimate(current_path);
        (estimate as f64) > (context_window as f64) * threshold
    }

    /// Usage-based overflow detection: the provider
    /// reported more input tokens than the model's context window.
    pub fn check_usage_overflow(&mut self, context_window: u64) {
        if opal_providers::classifier::usage_exceeds_window(self.last_prompt_tokens, context_window) {
            self.overflow_detected = true;
        }
    }

    pub fn mark_overflow(&mut self) {
        self.overflow_detected = true;
    }

    pub fn overflow_detected(&self) -> bool {
        self.overflow_detected
    }

    /// Clear the flag and report its prior value.
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflow_detected)
    }

    /// After a compaction, the kept tail becomes the new baseline for the
    /// hybrid estimate.
    pub fn reset_after_compaction(&mut self, new_path_len: usize) {
        self.message_count_at_last_report = new_path_len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_domain::message::ToolCall;

    fn msg(text: &str) -> Message {
        Message::user("m", text)
    }

    #[test]
    fn estimate_tokens_is_roughly_one_per_four_bytes() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn message_estimate_includes_overhead_and_tool_calls() {
        let mut m = Message::assistant("a", "", None, vec![ToolCall {
            call_id: "c1".into(),
            tool_name: "read_file".into(),
            arguments: serde_json::json!({"path": "a.txt"}),
        }]);
        m.content = String::new();
        let estimate = estimate_message_tokens(&m);
        assert!(estimate > MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn current_context_tokens_is_last_report_not_cumulative() {
        let mut t = UsageTracker::new();
        t.record_usage(Usage { input_tokens: 100, output_tokens: 10 }, 2);
        t.record_usage(Usage { input_tokens: 150, output_tokens: 5 }, 4);
        assert_eq!(t.current_context_tokens(), 150);
        assert_eq!(t.cumulative().input_tokens, 250);
    }

    #[test]
    fn hybrid_estimate_adds_only_messages_since_last_report() {
        let mut t = UsageTracker::new();
        let path = vec![msg("hello"), msg("world")];
        t.record_usage(Usage { input_tokens: 1000, output_tokens: 10 }, path.len());

        let mut longer_path = path.clone();
        longer_path.push(msg("a new message that was appended after the last report"));

        let estimate = t.hybrid_estimate(&longer_path);
        assert!(estimate > 1000);
        assert_eq!(t.hybrid_estimate(&path), 1000);
    }

    #[test]
    fn should_auto_compact_fires_at_threshold_not_before() {
        let mut t = UsageTracker::new();
        t.record_usage(Usage { input_tokens: 799, output_tokens: 0 }, 0);
        assert!(!t.should_auto_compact(&[], 1000, 0.8));

        let mut t2 = UsageTracker::new();
        t2.record_usage(Usage { input_tokens: 801, output_tokens: 0 }, 0);
        assert!(t2.should_auto_compact(&[], 1000, 0.8));
    }

    #[test]
    fn usage_based_overflow_sets_flag() {
        let mut t = UsageTracker::new();
        t.record_usage(Usage { input_tokens: 9000, output_tokens: 0 }, 0);
        assert!(!t.overflow_detected());
        t.check_usage_overflow(8192);
        assert!(t.overflow_detected());
    }

    #[test]
    fn take_overflow_clears_flag_and_returns_prior_value() {
        let mut t = UsageTracker::new();
        t.mark_overflow();
        assert!(t.take_overflow());
        assert!(!t.overflow_detected());
    }
}
