//! Small helpers shared across the crate.

/// Truncates a string to at most `max_chars` characters, adding "..." if
/// anything was cut.
///
/// Counts characters rather than slicing at byte offsets, so multi-byte
/// content (tool output is arbitrary UTF-8) never panics a log line.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    // Byte length bounds char count, so short strings skip the char walk.
    if s.len() <= max_chars || s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let mut out: String = s.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}
