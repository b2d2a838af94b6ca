/**
 * Transport layer: TCP delivery and the background worker thread.
 *
 * Everything related to *how* messages reach the collector:
 * - `tcp`: the single lazily-connected socket
 * - `worker`: background thread, retry loop, flush and exit signalling
 */

pub mod tcp;
pub mod worker;

pub use tcp::TcpTransport;
pub use worker::{Completion, Worker, WorkerMsg};

use crate::error::TransportError;
use crate::protocol::message::Message;

/**
 * Delivers one message at a time to one collector.
 *
 * Only the dispatcher's worker writes; `close` may additionally be called
 * from the thread running shutdown, so implementations must be `Sync`.
 */
pub trait Transport: Send + Sync {
    /**
     * Writes `message` followed by the line terminator and flushes it to the
     * OS, connecting first if needed.
     *
     * Fails fast: a connect or write failure is returned, never retried.
     */
    fn write_message(&self, message: &Message) -> Result<(), TransportError>;

    /// Releases the connection, if any. Idempotent and infallible.
    fn close(&self);
}
