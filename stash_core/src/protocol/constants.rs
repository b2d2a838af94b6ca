/**
 * Wire constants and built-in defaults.
 *
 * The collector speaks a bare newline-delimited byte stream: one message per
 * line, no framing, no handshake, nothing read back.
 */
use std::time::Duration;

/// Appended after every message on the wire.
pub const LINE_TERMINATOR: &[u8] = b"\n";

/// Number of messages that may be pending (queued or in flight) at once.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Upper bound on establishing a TCP connection to the collector.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read/write timeout applied to an established socket.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between two delivery attempts of the same message.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long `shutdown` (and `Guard::drop`) may block draining the queue.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Slightly below a "normal" priority of 5.
pub const DEFAULT_WORKER_PRIORITY: i32 = 4;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

pub const WORKER_THREAD_NAME: &str = "stash-dispatcher";

/// Crate version, handy for producers that stamp it into their documents.
pub const STASH_VERSION: &str = concat!("stash-rust/", env!("CARGO_PKG_VERSION"));
