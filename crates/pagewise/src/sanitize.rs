//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Upload directories and remote site URLs can carry user names, tenant
//! names or access tokens; these helpers keep them out of logs.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo, query string and fragment from a URL.
///
/// - `https://user:pw@host/sites/a?token=x` → `https://****@host/sites/a`
/// - `https://host/sites/a#frag` → `https://host/sites/a`
pub fn redact_url(url: &str) -> String {
    let without_tail = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_tail.find("://") {
        let scheme = &without_tail[..scheme_end + 3];
        let rest = &without_tail[scheme_end + 3..];
        let authority_end = rest.find('/').unwrap_or(rest.len());
        if let Some(at_pos) = rest[..authority_end].rfind('@') {
            return format!("{}****@{}", scheme, &rest[at_pos + 1..]);
        }
    }

    without_tail.to_string()
}

/// Shortens free text (prompts, model output) for log fields.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
