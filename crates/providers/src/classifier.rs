//! Overflow and retry error classification. Pure
//! substring matching against the stringified provider error — no network
//! I/O, fully unit-testable.

/// Case-insensitive substring patterns that indicate the provider rejected
/// the request because the context window was exceeded. Vendors phrase
/// the same condition differently and there is no shared error code to
/// key off instead.
const OVERFLOW_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "maximum context length",
    "prompt is too long",
    "token limit",
    "input too long",
    "exceeds the model's maximum",
    "reduce the length",
    "content_too_large",
    "context window",
    "too many tokens",
];

/// Substrings indicating a transient, retryable failure: network blips,
/// 5xx responses, rate limiting.
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "temporarily unavailable",
    "service unavailable",
    "internal server error",
    "bad gateway",
    "gateway timeout",
    "rate limit",
    "too many requests",
    "overloaded",
    "try again",
    "502",
    "503",
    "504",
    "429",
];

/// Returns true if the stringified provider error indicates the model's
/// context window was exceeded.
pub fn is_overflow_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    OVERFLOW_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Returns true if the stringified provider error should be retried with
/// backoff rather than surfaced as fatal.
pub fn is_retryable_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Usage-based overflow detection: the provider
/// reported more input tokens than the model's advertised context window.
pub fn usage_exceeds_window(input_tokens: u64, context_window_tokens: u64) -> bool {
    input_tokens > context_window_tokens
}
