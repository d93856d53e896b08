//! Hierarchical permission scopes.
//!
//! Scopes are colon-segmented strings such as `admin:categories`. A granted
//! scope authorizes every scope nested beneath it, so `admin` covers
//! `admin:categories` but `admin:categories` does not cover `admin`.

/// Separator between scope segments.
pub const SCOPE_SEPARATOR: char = ':';

/// Scopes that may be baked into a static service token.
pub const VALID_STATIC_TOKEN_SCOPES: &[&str] = &[
    "login",
    "dev",
    "gsg",
    "gsg:streamer",
    "admin",
    "admin:categories",
    "admin:collection",
    "admin:events",
    "admin:filters",
    "admin:stream",
    "admin:tokens",
    "admin:users",
];

/// Returns `true` when any granted scope authorizes `required`.
///
/// A grant authorizes a requirement when the grant's segments are a prefix
/// of the requirement's segments. Comparison is case-sensitive. An empty
/// requirement or an empty grant set never matches.
pub fn match_scope<I, S>(granted: I, required: &str) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if required.is_empty() {
        return false;
    }
    granted
        .into_iter()
        .any(|scope| covers(scope.as_ref(), required))
}

fn covers(granted: &str, required: &str) -> bool {
    if granted.is_empty() {
        return false;
    }
    let mut required_segments = required.split(SCOPE_SEPARATOR);
    for segment in granted.split(SCOPE_SEPARATOR) {
        match required_segments.next() {
            Some(wanted) if wanted == segment => {}
            _ => return false,
        }
    }
    true
}

/// Split a space-delimited scope claim into individual scopes.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Join scopes into the space-delimited form stored in claims and rows.
pub fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep only the scopes a static token is allowed to carry, without duplicates.
pub fn retain_valid_static_scopes<S: AsRef<str>>(requested: &[S]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for scope in requested {
        let scope = scope.as_ref();
        if VALID_STATIC_TOKEN_SCOPES.contains(&scope) && !kept.iter().any(|k| k == scope) {
            kept.push(scope.to_string());
        }
    }
    kept
}
