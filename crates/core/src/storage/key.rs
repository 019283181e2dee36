//! Object key derivation and file name sanitization.

/// Characters that are unsafe in file names on common filesystems.
const UNSAFE_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

fn is_unsafe(c: char) -> bool {
    UNSAFE_CHARS.contains(&c) || c.is_control()
}

/// Sanitize a client supplied file name.
///
/// Filesystem-unsafe characters become `_` and every `..` sequence is removed,
/// so the result can never escape the project prefix of an object key.
/// Returns an empty string when nothing usable remains.
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    let mut cleaned: String = file_name
        .chars()
        .map(|c| if is_unsafe(c) { '_' } else { c })
        .collect();

    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", "");
    }

    let cleaned = cleaned.trim();
    if cleaned == "." {
        return String::new();
    }
    cleaned.to_string()
}

/// Whether a project ID can be used verbatim as a key prefix.
#[must_use]
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.trim() == segment
        && segment != "."
        && !segment.contains("..")
        && !segment.chars().any(is_unsafe)
}

/// Object key for a project and an already sanitized file name.
///
/// Format: `{project_id}/{file_name}`
#[must_use]
pub fn object_key(project_id: &str, sanitized_file_name: &str) -> String {
    format!("{project_id}/{sanitized_file_name}")
}
