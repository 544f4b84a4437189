//! Small string helpers shared by the model client and the tasks.

/// Keep at most `max_chars` characters of `s`, marking the cut.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}... [truncated]", &s[..cut]),
    }
}
