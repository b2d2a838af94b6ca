/*!
 * TCP transport to the collector.
 *
 * Design decisions:
 * - **One connection, opened lazily**: nothing touches the network until
 *   the first message is written.
 * - **Flush after every write**: throughput is traded for failure
 *   detection on the call that caused it. The payload and the terminator
 *   go out as two separate sends: a peer that has gone away answers the
 *   first with a reset, which the second then reports.
 * - **No retries here**: a failed connect or write drops the connection
 *   and returns the error. Retrying is the dispatcher's job.
 * - **Write-only**: the read half is shut down right after connecting.
 *   The collector never answers.
 */
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use tracing::debug;

use super::Transport;
use crate::config::Options;
use crate::error::TransportError;
use crate::protocol::constants::LINE_TERMINATOR;
use crate::protocol::endpoint::Endpoint;
use crate::protocol::message::Message;

pub struct TcpTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    socket_timeout: Duration,

    /// The live connection, `None` while unconnected. Held for the whole of
    /// a write so reconnect and write never interleave.
    connection: Mutex<Option<TcpStream>>,

    /// Second handle on the same socket, kept outside `connection` so that
    /// `close()` can shut the socket down while a write is blocked on it.
    control: Mutex<Option<TcpStream>>,

    connects: AtomicU64,
}

impl TcpTransport {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration, socket_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            socket_timeout,
            connection: Mutex::new(None),
            control: Mutex::new(None),
            connects: AtomicU64::new(0),
        }
    }

    pub fn from_options(options: &Options) -> Self {
        Self::new(
            options.endpoint.clone(),
            options.connect_timeout,
            options.socket_timeout,
        )
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Number of connections established so far.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.connection).is_some()
    }

    /**
     * Opens a fresh connection, trying every resolved address in turn.
     *
     * Returns the error of the last address tried if none accepts.
     */
    fn establish(&self) -> Result<TcpStream, TransportError> {
        let addrs = self.endpoint.resolve()?;

        let mut last_err = None;
        for addr in addrs {
            let connected = if self.connect_timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, self.connect_timeout)
            };

            match connected {
                Ok(stream) => {
                    self.configure(&stream)
                        .map_err(|source| self.connect_error(source))?;

                    let control = stream
                        .try_clone()
                        .map_err(|source| self.connect_error(source))?;
                    *lock(&self.control) = Some(control);

                    self.connects.fetch_add(1, Ordering::Relaxed);
                    debug!(endpoint = %self.endpoint, %addr, "connected to collector");
                    return Ok(stream);
                }
                Err(err) => {
                    debug!(endpoint = %self.endpoint, %addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(self.connect_error(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no address accepted the connection")
        })))
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;
        if !self.socket_timeout.is_zero() {
            stream.set_write_timeout(Some(self.socket_timeout))?;
            stream.set_read_timeout(Some(self.socket_timeout))?;
        }
        stream.shutdown(Shutdown::Read)
    }

    fn connect_error(&self, source: io::Error) -> TransportError {
        TransportError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    fn write_error(&self, source: io::Error) -> TransportError {
        TransportError::Write {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    fn drop_control(&self) {
        if let Some(control) = lock(&self.control).take() {
            let _ = control.shutdown(Shutdown::Both);
        }
    }
}

impl Transport for TcpTransport {
    fn write_message(&self, message: &Message) -> Result<(), TransportError> {
        let mut connection = lock(&self.connection);

        let mut stream = match connection.take() {
            Some(stream) => stream,
            None => self.establish()?,
        };

        match write_line(&mut stream, message.as_bytes()) {
            Ok(()) => {
                *connection = Some(stream);
                Ok(())
            }
            Err(source) => {
                // The stream is dropped here; the next call reconnects.
                drop(stream);
                self.drop_control();
                Err(self.write_error(source))
            }
        }
    }

    fn close(&self) {
        self.drop_control();

        /*
         * If a write is in progress the connection lock is busy. The control
         * shutdown above already made that write fail, and the writer drops
         * the stream itself.
         */
        let stream = match self.connection.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => None,
        };

        if let Some(stream) = stream {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(endpoint = %self.endpoint, "closed collector connection");
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_line(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    stream.write_all(payload)?;
    stream.flush()?;
    stream.write_all(LINE_TERMINATOR)?;
    stream.flush()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
