//! Small text helpers shared across the pipeline.

use md5::{Digest, Md5};

/// Trim, drop empties, and deduplicate while preserving first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for tag in tags {
        let value = tag.trim();
        if value.is_empty() || !seen.insert(value.to_string()) {
            continue;
        }
        result.push(value.to_string());
    }
    result
}

pub fn unique_strings(values: &[String]) -> Vec<String> {
    normalize_tags(values)
}

/// Truncate to at most `limit` characters, respecting char boundaries.
pub fn truncate_chars(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    value.chars().take(limit).collect()
}

/// Lowercase ASCII-alphanumeric slug joined by single dashes.
pub fn slugify(text: &str) -> String {
    let mut out = String::new();
    let mut last_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if matches!(c, ' ' | '-' | '_') && !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// MD5 hex digest. A change-detection token, not a security primitive.
pub fn md5_hex(value: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
