use std::env;
use std::str::FromStr;

/// Read an environment variable, treating empty or whitespace-only values as unset.
pub(super) fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag value.
///
/// Accepts `1/true/yes/y/on` and `0/false/no/n/off`, case-insensitive.
pub(super) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean environment variable, falling back to `default` when unset
/// or unparseable.
pub(super) fn env_bool(name: &str, default: bool) -> bool {
    let Some(raw) = env_var(name) else {
        return default;
    };
    parse_bool(&raw).unwrap_or_else(|| {
        tracing::warn!("Invalid {} value: {:?}. Using default={}", name, raw, default);
        default
    })
}

/// Parse a numeric (or any `FromStr`) environment variable.
pub(super) fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} value '{raw}': {e}")),
        None => Ok(None),
    }
}
