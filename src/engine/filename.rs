use std::sync::LazyLock;

use regex::Regex;

use crate::config::{FALLBACK_EXTENSION, FALLBACK_FILENAME};

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());

/// Reduce an extension to lower-cased ASCII letters and digits, `bin` when nothing is left.
pub fn sanitize_extension(extension: &str) -> String {
    let ext: String = extension
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() {
        FALLBACK_EXTENSION.to_string()
    } else {
        ext
    }
}

/// Turn a free-text title into `<stem>.<ext>` safe for any filesystem.
///
/// Keeps word characters, whitespace and hyphens, trims, turns the remaining
/// whitespace into underscores and falls back to `book` when nothing is left.
/// The extension goes through [`sanitize_extension`].
pub fn sanitize_filename(title: &str, extension: &str) -> String {
    let stripped = DISALLOWED.replace_all(title, "");
    let stem: String = stripped
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let stem = if stem.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        stem
    };
    format!("{}.{}", stem, sanitize_extension(extension))
}
