/*!
 * Stash: ship log events to a remote collector over TCP.
 *
 * This is the crate applications depend on. It re-exports the core
 * dispatch API and wires up addons (panic hook) through a single `init`.
 *
 * # Quick start
 *
 * ```ignore
 * fn main() {
 *     let _guard = stash::init("logstash.internal:5044").unwrap();
 *
 *     stash::dispatch(r#"{"@message":"Application started"}"#);
 *
 *     // panics are shipped too (catch_panics defaults to true)
 *     // _guard is dropped here → the queue is drained before exit
 * }
 * ```
 *
 * # With options
 *
 * ```ignore
 * let _guard = stash::init(stash::Options {
 *     core: stash::CoreOptions {
 *         endpoint: stash::Endpoint::new("logstash.internal", 5044),
 *         queue_capacity: 10_000,
 *         ..Default::default()
 *     },
 *     application: Some("billing".into()),
 *     catch_panics: false,
 *     ..Default::default()
 * })
 * .unwrap();
 * ```
 */

// ---------------------------------------------------------------------------
// Re-exports from stash_core: the public surface area
// ---------------------------------------------------------------------------

pub use stash_core::{
    dispatch, flush, shutdown, stats, ConfigError, Dispatcher, DropReason, Endpoint, Enqueued,
    Error, Guard, Lifecycle, Message, ShutdownOutcome, StatsSnapshot, TcpTransport, Transport,
    TransportError, LINE_TERMINATOR, STASH_VERSION,
};

/// Dispatcher options (collector address, timeouts, capacity).
pub use stash_core::Options as CoreOptions;

use tracing::debug;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/**
 * Configuration for `init`.
 *
 * Implements `From<&str>` (a `host:port` string) and `From<Endpoint>` so the
 * common case needs no struct at all. Defaults:
 * - `catch_panics` = `true`
 * - `application` / `source_host` = `None`
 */
#[derive(Debug, Clone)]
pub struct Options {
    pub core: CoreOptions,

    /// Whether to install a panic hook that ships panics as events.
    pub catch_panics: bool,

    /// Application name stamped into panic events.
    pub application: Option<String>,

    /// Overrides the host name stamped into panic events.
    pub source_host: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            core: CoreOptions::default(),
            catch_panics: true,
            application: None,
            source_host: None,
        }
    }
}

impl From<CoreOptions> for Options {
    fn from(core: CoreOptions) -> Self {
        Self {
            core,
            ..Default::default()
        }
    }
}

impl From<Endpoint> for Options {
    fn from(endpoint: Endpoint) -> Self {
        CoreOptions {
            endpoint,
            ..Default::default()
        }
        .into()
    }
}

/**
 * Parses `host:port`. An unparsable string becomes a host with port 0,
 * which `init` then rejects.
 */
impl From<&str> for Options {
    fn from(endpoint: &str) -> Self {
        match endpoint.parse::<Endpoint>() {
            Ok(endpoint) => endpoint.into(),
            Err(_) => Endpoint::new(endpoint, 0).into(),
        }
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/**
 * Creates the process-wide dispatcher and installs the addons.
 *
 * ```ignore
 * // Simple: just an address (panics caught by default)
 * let _guard = stash::init("127.0.0.1:5000")?;
 *
 * // From STASH_* environment variables
 * let _guard = stash::init(stash::CoreOptions::from_env()?)?;
 * ```
 *
 * # Errors
 * Invalid options, or `init` called more than once.
 *
 * # Returns
 * A `Guard`: keep it alive for the duration of your app. When it drops,
 * pending events are drained for at most `shutdown_timeout`.
 */
pub fn init(options: impl Into<Options>) -> Result<Guard, Error> {
    let opts = options.into();

    debug!(endpoint = %opts.core.endpoint, "initializing stash");
    let guard = stash_core::init(opts.core)?;

    if opts.catch_panics {
        stash_panic::install(stash_panic::Settings {
            application: opts.application,
            source_host: opts.source_host,
        });
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_str() {
        let options = Options::from("logs.internal:5044");
        assert_eq!(options.core.endpoint, Endpoint::new("logs.internal", 5044));
        assert!(options.catch_panics);
    }

    #[test]
    fn test_options_from_bad_str_fails_validation() {
        let options = Options::from("no-port-here");
        assert_eq!(
            options.core.validate(),
            Err(ConfigError::InvalidPort("0".into()))
        );
    }

    #[test]
    fn test_init_rejects_invalid_options_then_accepts_once() {
        assert!(matches!(init("no-port-here"), Err(Error::Config(_))));

        let guard = init(Options {
            catch_panics: false,
            ..Options::from("127.0.0.1:1")
        })
        .unwrap();
        assert!(matches!(init("127.0.0.1:1"), Err(Error::AlreadyInitialized)));

        drop(guard);
        assert_eq!(dispatch("late"), Enqueued::Dropped(DropReason::ShuttingDown));
    }
}
