//! API tokens from the environment

use std::env;

/// Read a non-empty token from `var`
pub fn token_from_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
