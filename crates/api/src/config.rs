//! Runtime configuration, read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use stockflow_infra::command_dispatcher::DEFAULT_ATTEMPTS;
use stockflow_ledger::LockPolicy;
use stockflow_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Total attempts per command when the ledger or store reports contention.
    pub dispatch_attempts: u32,
    pub lock_policy: LockPolicy,
    /// JSON seed for the in-memory reference gateway.
    pub reference_data: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            dispatch_attempts: DEFAULT_ATTEMPTS,
            lock_policy: LockPolicy::default(),
            reference_data: None,
            log_format: LogFormat::default(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values are logged
    /// and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lock_defaults = defaults.lock_policy;

        let backoff_ms = parse_or(
            &lookup,
            "STOCKFLOW_LOCK_BACKOFF_MS",
            lock_defaults.backoff.as_millis() as u64,
        );

        Self {
            bind_addr: parse_or(&lookup, "STOCKFLOW_BIND_ADDR", defaults.bind_addr),
            dispatch_attempts: parse_or(&lookup, "STOCKFLOW_DISPATCH_ATTEMPTS", defaults.dispatch_attempts)
                .max(1),
            lock_policy: LockPolicy {
                attempts: parse_or(&lookup, "STOCKFLOW_LOCK_ATTEMPTS", lock_defaults.attempts).max(1),
                backoff: Duration::from_millis(backoff_ms),
            },
            reference_data: lookup("STOCKFLOW_REFERENCE_DATA")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            log_format: parse_or(&lookup, "LOG_FORMAT", defaults.log_format),
        }
    }
}

/// `LOG_FORMAT` alone, for initializing logging before the rest of the config
/// is read (so its warnings are not lost).
pub fn log_format_from_env() -> LogFormat {
    std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: core::str::FromStr + core::fmt::Debug,
    T::Err: core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(key, value = %raw, error = %err, ?default, "invalid config value, using default");
            default
        }
    }
}
