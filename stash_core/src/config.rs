/**
 * Dispatcher configuration.
 *
 * Every field has a default, so the common case is
 *
 * ```ignore
 * let options = stash_core::Options {
 *     endpoint: stash_core::Endpoint::new("logstash.internal", 5044),
 *     ..Default::default()
 * };
 * ```
 *
 * `Options::from_env()` builds the same struct from `STASH_*` environment
 * variables for deployments that configure through the environment.
 */
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RETRY_DELAY, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_SOCKET_TIMEOUT,
    DEFAULT_WORKER_PRIORITY,
};
use crate::protocol::endpoint::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Collector address. Resolved on every connection attempt.
    pub endpoint: Endpoint,

    /// Upper bound on establishing a TCP connection.
    pub connect_timeout: Duration,

    /// Read/write timeout on the established socket.
    pub socket_timeout: Duration,

    /// Maximum number of pending messages (queued plus the one in flight).
    /// Anything beyond is dropped.
    pub queue_capacity: usize,

    /// Pause between two attempts at delivering the same message.
    pub retry_delay: Duration,

    /// How long shutdown may block waiting for the queue to drain.
    pub shutdown_timeout: Duration,

    /// Scheduling hint for the worker thread. Recorded and logged; std
    /// threads offer no portable way to honour it.
    pub worker_priority: i32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new(DEFAULT_HOST, DEFAULT_PORT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_delay: DEFAULT_RETRY_DELAY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            worker_priority: DEFAULT_WORKER_PRIORITY,
        }
    }
}

impl Options {
    /**
     * Reads options from the process environment.
     *
     * Unset variables fall back to the defaults; a variable that is set but
     * does not parse is an error rather than a silent fallback.
     *
     * | variable | field |
     * |---|---|
     * | `STASH_HOST` / `STASH_PORT` | `endpoint` |
     * | `STASH_CONNECT_TIMEOUT_MS` | `connect_timeout` |
     * | `STASH_SOCKET_TIMEOUT_MS` | `socket_timeout` |
     * | `STASH_QUEUE_CAPACITY` | `queue_capacity` |
     * | `STASH_RETRY_DELAY_MS` | `retry_delay` |
     * | `STASH_SHUTDOWN_TIMEOUT_MS` | `shutdown_timeout` |
     * | `STASH_WORKER_PRIORITY` | `worker_priority` |
     */
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("STASH_HOST").unwrap_or_else(|| defaults.endpoint.host().to_string());
        let port = parse_var(&lookup, "STASH_PORT")?.unwrap_or(defaults.endpoint.port());

        let options = Self {
            endpoint: Endpoint::new(host, port),
            connect_timeout: parse_millis(&lookup, "STASH_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connect_timeout),
            socket_timeout: parse_millis(&lookup, "STASH_SOCKET_TIMEOUT_MS")?
                .unwrap_or(defaults.socket_timeout),
            queue_capacity: parse_var(&lookup, "STASH_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            retry_delay: parse_millis(&lookup, "STASH_RETRY_DELAY_MS")?
                .unwrap_or(defaults.retry_delay),
            shutdown_timeout: parse_millis(&lookup, "STASH_SHUTDOWN_TIMEOUT_MS")?
                .unwrap_or(defaults.shutdown_timeout),
            worker_priority: parse_var(&lookup, "STASH_WORKER_PRIORITY")?
                .unwrap_or(defaults.worker_priority),
        };

        options.validate()?;
        Ok(options)
    }

    /// Rejects options the dispatcher cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint.validate()?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroConnectTimeout);
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

fn parse_millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<F, u64>(lookup, key)?.map(Duration::from_millis))
}
