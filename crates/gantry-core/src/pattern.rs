//! Lightweight glob matching for branch and ref patterns.
//!
//! Supports `*`, `**`, `prefix/*`, `prefix/**` and a single infix `*`.
//! Full filesystem globbing (artifact paths) uses the `glob` crate instead;
//! this matcher exists for ref names, which are not paths on disk.

/// Match a branch-style glob pattern against a ref name.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return text.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let prefix_slash = format!("{}/", prefix);
        if text.starts_with(&prefix_slash) {
            return !text[prefix_slash.len()..].contains('/');
        }
        return false;
    }
    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 2 {
            return text.starts_with(parts[0]) && text.ends_with(parts[1]);
        }
    }
    pattern == text
}

/// True when any pattern matches; an empty pattern list matches everything.
pub fn any_match(patterns: &[String], text: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| glob_match(p, text))
}
