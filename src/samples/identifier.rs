use regex::Regex;
use std::sync::LazyLock;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-.\s]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Derives the short sample id from a file's base name.
///
/// Drops every character outside `[A-Za-z0-9_-.]` and whitespace, turns
/// whitespace runs into `_`, strips the last extension and lowercases.
/// Only the base name is used, so equal names in different folders collide.
pub fn sample_id(basename: &str) -> String {
    let cleaned = DISALLOWED.replace_all(basename, "");
    let underscored = WHITESPACE.replace_all(&cleaned, "_");
    strip_extension(&underscored).to_lowercase()
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        // Un punto inicial (".hidden") no es una extensión
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
