//! Name normalization for Kubernetes object names.

use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;

const MAX_NAME_LEN: usize = 63;
const SHORT_ID_LEN: usize = 10;

static INVALID_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9.-]+").expect("static dns1123 regex"));

static SEPARATOR_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.-]{2,}").expect("static dns1123 separator regex"));

/// Turn an arbitrary principal name into a DNS-1123 compatible token.
///
/// Lowercases, collapses every run of disallowed characters (`@`, `_`,
/// spaces, ...) into a single `-`, folds adjacent separators (`..`, `.-`)
/// into one `-`, strips leading and trailing `-`/`.`, and truncates to 63
/// characters. May return an empty string.
pub fn dns1123(name: &str) -> String {
    let lowered = name.to_lowercase();
    let replaced = INVALID_RUN.replace_all(&lowered, "-");
    let separated = SEPARATOR_RUN.replace_all(&replaced, "-");
    let trimmed = separated.trim_matches(|c| c == '-' || c == '.');

    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    truncated.trim_end_matches(|c| c == '-' || c == '.').to_string()
}

/// Short practically-unique identifier for one login session
pub fn short_id() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(SHORT_ID_LEN).map(char::from).collect()
}
