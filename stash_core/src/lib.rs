/*!
 * Stash Core: the dispatch engine.
 *
 * Ships pre-formatted event lines to a remote collector (e.g. a Logstash
 * TCP input) from a single background thread, so that a slow or missing
 * collector can never block or crash the producing application.
 *
 * End users should depend on the `stash` facade crate instead, which
 * re-exports everything and wires up addons (panic hook, etc.).
 *
 * # Module structure
 *
 * - `protocol/`: what we send: messages, endpoints, constants
 * - `transport/`: how we deliver: TCP socket, background worker
 * - `dispatcher`: bounded queue, lifecycle, global instance
 * - `guard`: RAII shutdown-on-drop
 * - `config`, `error`, `stats`: options, error types, counters
 */

mod config;
mod dispatcher;
mod error;
mod guard;
mod protocol;
mod stats;
mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use config::Options;
pub use dispatcher::{DropReason, Dispatcher, Enqueued, Lifecycle, ShutdownOutcome};
pub use error::{ConfigError, Error, TransportError};
pub use guard::Guard;
pub use protocol::constants::{LINE_TERMINATOR, STASH_VERSION};
pub use protocol::endpoint::Endpoint;
pub use protocol::message::Message;
pub use stats::StatsSnapshot;
pub use transport::{TcpTransport, Transport};

use std::time::Duration;

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/**
 * Creates the process-wide dispatcher.
 *
 * Returns a `Guard` that shuts it down (draining for at most
 * `options.shutdown_timeout`) when dropped: keep it alive for the
 * duration of your app.
 *
 * Returns `Err` if the options are invalid or `init` was already called.
 */
pub fn init(options: Options) -> Result<Guard, Error> {
    dispatcher::init_global(options)
}

/**
 * Queues a fully formatted event for delivery.
 *
 * Never blocks and never fails visibly: before `init`, after shutdown, or
 * with the queue full, the event is dropped and counted.
 */
pub fn dispatch(message: impl Into<Message>) -> Enqueued {
    match dispatcher::get_dispatcher() {
        Some(dispatcher) => dispatcher.enqueue(message),
        None => Enqueued::Dropped(DropReason::ShuttingDown),
    }
}

/**
 * Blocks until everything dispatched so far has been delivered, or
 * `timeout` elapses. `true` if nothing was left behind.
 */
pub fn flush(timeout: Duration) -> bool {
    match dispatcher::get_dispatcher() {
        Some(dispatcher) => dispatcher.flush(timeout),
        None => true,
    }
}

/**
 * Shuts the process-wide dispatcher down explicitly. Normally the `Guard`
 * does this.
 */
pub fn shutdown(timeout: Duration) -> ShutdownOutcome {
    match dispatcher::get_dispatcher() {
        Some(dispatcher) => dispatcher.shutdown(timeout),
        None => ShutdownOutcome::NeverStarted,
    }
}

/// Delivery counters of the process-wide dispatcher.
pub fn stats() -> StatsSnapshot {
    dispatcher::get_dispatcher()
        .map(|dispatcher| dispatcher.stats())
        .unwrap_or_default()
}
