//! Small shared helpers for environment and time handling.

/// Get environment variable with QUOTEWISE_ prefix, falling back to unprefixed version
///
/// Checks `QUOTEWISE_{key}` first, then falls back to `{key}` for
/// compatibility with standard environment variable naming.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("QUOTEWISE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
