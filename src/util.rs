use std::collections::HashMap;
use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ConfigError;

/// Source of configuration variables. The process environment in production,
/// a plain map in tests.
pub(crate) trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

pub(crate) struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

pub(crate) fn env_required(
    source: &dyn EnvSource,
    name: &'static str,
    hint: &'static str,
) -> Result<String, ConfigError> {
    env_optional(source, name).ok_or(ConfigError::Missing { name, hint })
}

pub(crate) fn env_optional(source: &dyn EnvSource, name: &str) -> Option<String> {
    source.var(name).filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(
    source: &dyn EnvSource,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env_optional(source, name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

pub(crate) fn env_u64(source: &dyn EnvSource, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    env_parsed(source, name, default)
}

pub(crate) fn env_usize(
    source: &dyn EnvSource,
    name: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    env_parsed(source, name, default)
}

pub(crate) fn env_f64(source: &dyn EnvSource, name: &'static str, default: f64) -> Result<f64, ConfigError> {
    env_parsed(source, name, default)
}

/// Comma-separated list; blank items are dropped.
pub(crate) fn env_list(source: &dyn EnvSource, name: &str) -> Option<Vec<String>> {
    env_optional(source, name).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
}

pub(crate) fn jitter_ratio() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Capped exponential backoff. A server-provided `retry-after` can lengthen
/// the wait up to `max_secs`, never beyond it.
pub(crate) fn retry_delay(
    attempt: usize,
    base_secs: f64,
    max_secs: f64,
    retry_after: Option<f64>,
    jitter: f64,
) -> Duration {
    let mut delay = (base_secs * 2.0_f64.powi(attempt as i32)).min(max_secs);
    if let Some(retry_after) = retry_after {
        delay = delay.max(retry_after.min(max_secs));
    }
    delay *= 1.0 + jitter * 0.2;
    Duration::try_from_secs_f64(delay)
        .or_else(|_| Duration::try_from_secs_f64(max_secs))
        .unwrap_or(Duration::ZERO)
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<f64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}
