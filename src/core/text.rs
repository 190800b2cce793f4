//! Small text helpers shared by prompt builders and generators.

use once_cell::sync::Lazy;
use regex::Regex;

/// A fence whose opening and closing markers each sit on their own line.
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```[ \t]*\r?$")
        .expect("fence pattern is valid")
});

/// Fallback for a closing fence glued to the last line of code.
static INLINE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)```").expect("inline fence pattern is valid")
});

/// The first `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Strip markdown code fences from a model response.
///
/// When the response contains a fenced block, the first block's body is
/// returned. The block ends at the first line holding only a closing fence,
/// so backticks inside the body do not cut it short. Otherwise the trimmed
/// response is returned unchanged.
pub fn strip_code_fences(response: &str) -> String {
    for pattern in [&*FENCED_BLOCK, &*INLINE_FENCE] {
        if let Some(body) = pattern.captures(response).and_then(|caps| caps.get(1)) {
            return body.as_str().trim().to_string();
        }
    }
    response.trim().trim_matches('`').trim().to_string()
}
