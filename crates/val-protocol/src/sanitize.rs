//! Filename and path sanitizers applied by the sender before a name ever
//! reaches the wire.
//!
//! Receivers must never trust a sender-supplied path for filesystem use
//! (the sender-provided path in [`crate::payload::Meta`] is a display hint
//! only); these helpers exist so senders populate that hint consistently
//! and so embedders have a ready-made basename cleaner for their own
//! adapter code.

use crate::constants::MAX_NAME_LEN;

/// Strip directory components and reject control characters, returning a
/// basename safe to place in [`crate::payload::Meta::filename`].
///
/// Directory separators (`/` and `\`), NUL bytes, and other ASCII control
/// characters are dropped. A name that becomes empty after cleaning is
/// replaced with `"_"`. The result is truncated to
/// [`MAX_NAME_LEN`] bytes, never splitting a UTF-8 code point.
#[must_use]
pub fn clean_filename(name: &str) -> String {
    let basename = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let mut cleaned: String = basename
        .chars()
        .filter(|c| !c.is_control() && *c != '/' && *c != '\\')
        .collect();

    if cleaned == "." || cleaned == ".." {
        cleaned = "_".to_string();
    }
    if cleaned.is_empty() {
        cleaned = "_".to_string();
    }

    truncate_at_char_boundary(&cleaned, MAX_NAME_LEN)
}

/// Clean a full path hint for display purposes: collapses `..` and `.`
/// segments and strips control characters, but does not resolve the
/// filesystem. Never used by receivers to construct an output path.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let sep = if path.contains('\\') && !path.contains('/') {
        '\\'
    } else {
        '/'
    };

    let mut segments: Vec<String> = Vec::new();
    for segment in path.split(['/', '\\']) {
        let segment: String = segment.chars().filter(|c| !c.is_control()).collect();
        match segment.as_str() {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let joined = segments.join(&sep.to_string());
    truncate_at_char_boundary(&joined, MAX_NAME_LEN)
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
