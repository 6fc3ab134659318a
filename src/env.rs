//! Environment variable names used by this crate for configuring the
//! logging layer from a service's environment.
//!
//! [`LayerConfig::from_env`] reads them; unset or unparsable values fall
//! back to [`LayerConfig::default`].

use crate::init::{LayerConfig, Output};
use std::str::FromStr;
use tracing::Level;

/// Key to nest user fields under, e.g. `labels`.
pub const ECS_LOG_DATA_KEY_ENV: &str = "ECS_LOG_DATA_KEY";

/// Indent JSON output (`true`/`false`).
pub const ECS_LOG_PRETTY_ENV: &str = "ECS_LOG_PRETTY";

/// Write `<`, `>` and `&` unescaped (`true`/`false`).
pub const ECS_LOG_DISABLE_HTML_ESCAPE_ENV: &str = "ECS_LOG_DISABLE_HTML_ESCAPE";

/// Emit `log.origin.*` fields (`true`/`false`).
pub const ECS_LOG_REPORT_CALLER_ENV: &str = "ECS_LOG_REPORT_CALLER";

/// Most verbose level written, e.g. `debug`.
pub const ECS_LOG_LEVEL_ENV: &str = "ECS_LOG_LEVEL";

/// `stdout` or `stderr`.
pub const ECS_LOG_OUTPUT_ENV: &str = "ECS_LOG_OUTPUT";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl LayerConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LayerConfig::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .as_deref()
                .and_then(parse_flag)
                .unwrap_or(default)
        };

        LayerConfig {
            data_key: lookup(ECS_LOG_DATA_KEY_ENV).filter(|key| !key.is_empty()),
            pretty_print: flag(ECS_LOG_PRETTY_ENV, defaults.pretty_print),
            disable_html_escape: flag(ECS_LOG_DISABLE_HTML_ESCAPE_ENV, defaults.disable_html_escape),
            report_caller: flag(ECS_LOG_REPORT_CALLER_ENV, defaults.report_caller),
            max_level: lookup(ECS_LOG_LEVEL_ENV)
                .and_then(|level| Level::from_str(level.trim()).ok())
                .unwrap_or(defaults.max_level),
            output: match lookup(ECS_LOG_OUTPUT_ENV).as_deref().map(str::trim) {
                Some(out) if out.eq_ignore_ascii_case("stderr") => Output::Stderr,
                Some(out) if out.eq_ignore_ascii_case("stdout") => Output::Stdout,
                _ => defaults.output,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> LayerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LayerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = config_from(&[]);
        let defaults = LayerConfig::default();

        assert_eq!(config.data_key, defaults.data_key);
        assert_eq!(config.max_level, defaults.max_level);
        assert_eq!(config.output, defaults.output);
        assert!(!config.pretty_print);
    }

    #[test]
    fn reads_every_variable() {
        let config = config_from(&[
            (ECS_LOG_DATA_KEY_ENV, "labels"),
            (ECS_LOG_PRETTY_ENV, "true"),
            (ECS_LOG_DISABLE_HTML_ESCAPE_ENV, "1"),
            (ECS_LOG_REPORT_CALLER_ENV, "yes"),
            (ECS_LOG_LEVEL_ENV, "debug"),
            (ECS_LOG_OUTPUT_ENV, "STDERR"),
        ]);

        assert_eq!(config.data_key.as_deref(), Some("labels"));
        assert!(config.pretty_print);
        assert!(config.disable_html_escape);
        assert!(config.report_caller);
        assert_eq!(config.max_level, Level::DEBUG);
        assert_eq!(config.output, Output::Stderr);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = config_from(&[
            (ECS_LOG_DATA_KEY_ENV, ""),
            (ECS_LOG_PRETTY_ENV, "sometimes"),
            (ECS_LOG_LEVEL_ENV, "loud"),
            (ECS_LOG_OUTPUT_ENV, "syslog"),
        ]);

        assert!(config.data_key.is_none());
        assert!(!config.pretty_print);
        assert_eq!(config.max_level, Level::INFO);
        assert_eq!(config.output, Output::Stdout);
    }

    #[test]
    fn env_or_falls_back_when_unset() {
        assert_eq!(env_or("ECS_LOG_SURELY_UNSET_FOR_TESTS", "fallback"), "fallback");
    }
}
