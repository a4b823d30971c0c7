//! Typed environment variable lookups
//!
//! Unset variables fall back to the given default. A variable that is set but
//! cannot be parsed is an error rather than a silent fallback.

use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Read a string variable, returning `default` when unset or empty
pub fn var_or(name: &str, default: &str) -> String {
    var_opt(name).unwrap_or_else(|| default.to_string())
}

/// Read an optional string variable; empty values count as unset
pub fn var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, returning `default` when unset
pub fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var_opt(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

/// Parse a raw value on behalf of the variable `name`
pub fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| CommonError::InvalidEnv {
        name: name.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
