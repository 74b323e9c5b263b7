//! API key lookup for the Anthropic client

use scribe_core::{Result, ScribeError};
use std::env;

const FALLBACK_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Get the API key for model calls
///
/// Priority:
/// 1. The configured variable (`models.api_key_env`)
/// 2. ANTHROPIC_API_KEY
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    for var in [api_key_env, FALLBACK_KEY_ENV] {
        if let Ok(key) = env::var(var) {
            if !key.trim().is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(ScribeError::Auth(format!(
        "No API key found. Set {} (or {}).",
        api_key_env, FALLBACK_KEY_ENV
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        result
    }

    #[test]
    fn test_configured_variable_wins() {
        with_env_vars(
            &[
                ("SCRIBE_TEST_KEY", Some("configured")),
                ("ANTHROPIC_API_KEY", Some("fallback")),
            ],
            || assert_eq!(get_auth_token("SCRIBE_TEST_KEY").unwrap(), "configured"),
        );
    }

    #[test]
    fn test_falls_back_to_anthropic_key() {
        with_env_vars(
            &[
                ("SCRIBE_TEST_KEY", Some("   ")),
                ("ANTHROPIC_API_KEY", Some("fallback")),
            ],
            || assert_eq!(get_auth_token("SCRIBE_TEST_KEY").unwrap(), "fallback"),
        );
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        with_env_vars(
            &[("SCRIBE_TEST_KEY", None), ("ANTHROPIC_API_KEY", None)],
            || {
                let err = get_auth_token("SCRIBE_TEST_KEY").unwrap_err();
                assert!(matches!(err, ScribeError::Auth(_)));
                assert!(err.to_string().contains("SCRIBE_TEST_KEY"));
            },
        );
    }
}
