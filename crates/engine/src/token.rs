//! Token estimation and text clipping.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Identical inputs always yield identical estimates, which keeps routing
//! reproducible.

/// Estimate the token count for a string. Empty text is zero tokens.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Like [`estimate_tokens`] but never below one. Used for step metrics.
pub fn approx_tokens(text: &str) -> u64 {
    estimate_tokens(text).max(1)
}

/// Clip `text` to `max_chars` characters, ending with `...` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(approx_tokens(""), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn truncate_adds_ellipsis_within_limit() {
        let out = truncate(&"x".repeat(400), 320);
        assert_eq!(out.chars().count(), 320);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let out = truncate(&"é".repeat(10), 5);
        assert_eq!(out, "éé...");
    }
}
