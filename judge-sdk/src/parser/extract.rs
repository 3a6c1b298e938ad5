//! Locating JSON inside noisy model output

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").ok());

/// Contents of the first fenced code block, language tag stripped
pub fn extract_fenced_block(raw: &str) -> Option<&str> {
    FENCED_BLOCK
        .as_ref()?
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The first balanced top-level `{...}` in `raw`
///
/// Braces inside JSON strings are ignored, so `{"a": "}"}` is matched whole.
pub fn find_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let remainder = &raw[start..];
    find_matching_brace(remainder).map(|end| &remainder[..end])
}

/// Byte offset just past the brace closing the one at position 0
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
