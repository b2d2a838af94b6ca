/**
 * The dispatcher: owns the bounded queue, the single worker thread and the
 * transport it writes through.
 *
 * Lifecycle:
 * 1. `Dispatcher::new(options)` only validates and stores the options.
 * 2. The first `enqueue` starts the worker and creates the transport. This
 *    happens exactly once, even under concurrent first use (`OnceLock`).
 * 3. `enqueue` never blocks: a message is either admitted or dropped.
 * 4. `shutdown(timeout)` closes the intake, lets the worker drain for at
 *    most `timeout`, then aborts whatever is left.
 *
 * The process-wide instance used by the free functions in `lib.rs` lives in
 * `GLOBAL_DISPATCHER`; embedders that want several collectors can hold
 * their own `Dispatcher`s.
 */
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, error, warn};

use crate::config::Options;
use crate::error::Error;
use crate::guard::Guard;
use crate::protocol::message::Message;
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::{Completion, TcpTransport, Transport, Worker, WorkerMsg};

// ---------------------------------------------------------------------------
// Global singleton
// ---------------------------------------------------------------------------

static GLOBAL_DISPATCHER: OnceLock<Arc<Dispatcher>> = OnceLock::new();

/// Returns the process-wide dispatcher, or `None` before `init()`.
pub fn get_dispatcher() -> Option<&'static Arc<Dispatcher>> {
    GLOBAL_DISPATCHER.get()
}

/**
 * Builds the process-wide dispatcher and returns the guard that shuts it
 * down. Fails if the options are invalid or it already exists.
 */
pub fn init_global(options: Options) -> Result<Guard, Error> {
    if GLOBAL_DISPATCHER.get().is_some() {
        return Err(Error::AlreadyInitialized);
    }

    let dispatcher = Arc::new(Dispatcher::new(options)?);

    GLOBAL_DISPATCHER
        .set(dispatcher.clone())
        .map_err(|_| Error::AlreadyInitialized)?;

    Ok(dispatcher.guard())
}

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    Dropped(DropReason),
}

impl Enqueued {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Enqueued::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Capacity reached; the incoming message is the one dropped.
    QueueFull,
    /// Shutdown has begun or finished.
    ShuttingDown,
    /// The worker could not be started or has died.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued message was handled before the deadline.
    Drained,
    /// The deadline passed; the worker was aborted and leftovers dropped.
    TimedOut,
    /// The worker had died earlier; queued messages may have been lost.
    Degraded,
    /// Nothing was ever enqueued, so there was nothing to stop.
    NeverStarted,
    /// Shutdown had already been requested; this call did nothing.
    AlreadyTerminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    ShuttingDown,
    Terminated,
}

const ACTIVE: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const TERMINATED: u8 = 2;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

type TransportFactory = Box<dyn FnOnce(&Options) -> Arc<dyn Transport> + Send>;

/// Handles to a started worker.
struct Running {
    /// `None` once shutdown has closed the intake.
    intake: RwLock<Option<Sender<WorkerMsg>>>,
    /// Dropping the sender aborts the worker.
    abort: Mutex<Option<Sender<()>>>,
    transport: Arc<dyn Transport>,
    degraded: Arc<AtomicBool>,
    exited: Arc<Completion>,
}

impl Running {
    fn close_intake(&self) {
        self.intake
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn abort(&self) {
        self.abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.transport.close();
    }

}

pub struct Dispatcher {
    options: Options,
    factory: Mutex<Option<TransportFactory>>,
    lifecycle: AtomicU8,
    running: OnceLock<Option<Running>>,
    pending: Arc<AtomicUsize>,
    stats: Arc<Stats>,
}

impl Dispatcher {
    /**
     * Creates a dispatcher that ships to `options.endpoint` over TCP.
     *
     * Nothing is spawned and nothing connects until the first `enqueue`.
     */
    pub fn new(options: Options) -> Result<Self, Error> {
        Self::with_transport(options, |options| {
            Arc::new(TcpTransport::from_options(options)) as Arc<dyn Transport>
        })
    }

    /**
     * Like `new`, with a caller-supplied transport. `factory` runs at most
     * once, on first use.
     */
    pub fn with_transport<F>(options: Options, factory: F) -> Result<Self, Error>
    where
        F: FnOnce(&Options) -> Arc<dyn Transport> + Send + 'static,
    {
        options.validate()?;

        Ok(Self {
            options,
            factory: Mutex::new(Some(Box::new(factory))),
            lifecycle: AtomicU8::new(ACTIVE),
            running: OnceLock::new(),
            pending: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(Stats::default()),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn state(&self) -> Lifecycle {
        match self.lifecycle.load(Ordering::Acquire) {
            ACTIVE => Lifecycle::Active,
            SHUTTING_DOWN => Lifecycle::ShuttingDown,
            _ => Lifecycle::Terminated,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Messages admitted but not yet delivered or abandoned.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns a guard that shuts this dispatcher down when dropped.
    pub fn guard(self: &Arc<Self>) -> Guard {
        Guard::new(self.clone())
    }

    /**
     * Hands a message to the worker without blocking.
     *
     * The message is dropped (and counted) when the queue is at capacity,
     * when shutdown has begun, or when the worker is unavailable. The caller
     * is never told anything beyond the returned value.
     */
    pub fn enqueue(&self, message: impl Into<Message>) -> Enqueued {
        if self.state() != Lifecycle::Active {
            return self.drop_message(DropReason::ShuttingDown);
        }

        let Some(running) = self.running.get_or_init(|| self.start()) else {
            // Lost the race against shutdown, or the worker failed to spawn.
            let reason = if self.state() == Lifecycle::Active {
                DropReason::Degraded
            } else {
                DropReason::ShuttingDown
            };
            return self.drop_message(reason);
        };

        if running.degraded.load(Ordering::Acquire) {
            return self.drop_message(DropReason::Degraded);
        }

        if !self.reserve_slot() {
            return self.drop_message(DropReason::QueueFull);
        }

        let intake = running.intake.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = intake.as_ref() else {
            self.release_slot();
            return self.drop_message(DropReason::ShuttingDown);
        };

        match sender.try_send(WorkerMsg::Line(message.into())) {
            Ok(()) => {
                self.stats.record_accepted();
                Enqueued::Accepted
            }
            Err(TrySendError::Full(_)) => {
                self.release_slot();
                self.drop_message(DropReason::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.release_slot();
                self.drop_message(DropReason::Degraded)
            }
        }
    }

    /**
     * Blocks until every message accepted before this call has been handled
     * by the worker, or `timeout` elapses.
     *
     * Returns `true` right away if nothing was ever enqueued. Once shutdown
     * has closed the intake this waits for the worker to exit instead.
     */
    pub fn flush(&self, timeout: Duration) -> bool {
        let Some(Some(running)) = self.running.get() else {
            return true;
        };

        let signal = Arc::new(Completion::new());

        /*
         * The channel is FIFO, so by the time the worker reaches this marker
         * everything queued ahead of it has been delivered or abandoned. No
         * sender clone outlives the read lock, so a concurrent shutdown is
         * never kept from closing the intake.
         */
        let queued = running
            .intake
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|sender| sender.try_send(WorkerMsg::Flush(signal.clone())).is_ok());

        match queued {
            Some(true) => signal.wait_timeout(timeout),
            Some(false) => false,
            None => running.exited.wait_timeout(timeout),
        }
    }

    /**
     * Stops accepting messages and drains the queue, blocking for at most
     * `timeout`.
     *
     * When the deadline passes, the worker is aborted, the transport is
     * force-closed and the call returns. Whatever was still queued is lost.
     * Only the first call does anything; later calls return
     * `AlreadyTerminated` immediately.
     */
    pub fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        if self
            .lifecycle
            .compare_exchange(ACTIVE, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ShutdownOutcome::AlreadyTerminated;
        }

        /*
         * Settle lazy start: a concurrent first `enqueue` has either finished
         * starting the worker, or now never will.
         */
        let outcome = match self.running.get_or_init(|| None) {
            None => ShutdownOutcome::NeverStarted,
            Some(running) => {
                running.close_intake();

                if running.exited.wait_timeout(timeout) {
                    if running.degraded.load(Ordering::Acquire) {
                        ShutdownOutcome::Degraded
                    } else {
                        ShutdownOutcome::Drained
                    }
                } else {
                    warn!(
                        ?timeout,
                        pending = self.pending(),
                        "shutdown timed out before the queue drained"
                    );
                    running.abort();
                    ShutdownOutcome::TimedOut
                }
            }
        };

        self.lifecycle.store(TERMINATED, Ordering::Release);
        debug!(?outcome, "dispatcher terminated");
        outcome
    }

    /// Spawns the worker. Runs once, inside `running.get_or_init`.
    fn start(&self) -> Option<Running> {
        let factory = self
            .factory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let transport = factory(&self.options);

        // `pending` bounds the messages; flush markers ride along uncounted.
        let (sender, receiver) = crossbeam_channel::unbounded();
        let (abort_tx, abort_rx) = crossbeam_channel::bounded(0);
        let degraded = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(Completion::new());

        let worker = Worker {
            receiver,
            abort: abort_rx,
            transport: transport.clone(),
            retry_delay: self.options.retry_delay,
            priority: self.options.worker_priority,
            stats: self.stats.clone(),
            pending: self.pending.clone(),
            degraded: degraded.clone(),
            exited: exited.clone(),
        };

        if let Err(err) = worker.spawn() {
            error!(error = %Error::Spawn(err), "messages will be dropped");
            return None;
        }

        debug!(
            endpoint = %self.options.endpoint,
            capacity = self.options.queue_capacity,
            "dispatcher started"
        );

        Some(Running {
            intake: RwLock::new(Some(sender)),
            abort: Mutex::new(Some(abort_tx)),
            transport,
            degraded,
            exited,
        })
    }

    fn reserve_slot(&self) -> bool {
        let capacity = self.options.queue_capacity;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    fn drop_message(&self, reason: DropReason) -> Enqueued {
        match reason {
            DropReason::QueueFull => self.stats.record_dropped_full(),
            DropReason::ShuttingDown | DropReason::Degraded => self.stats.record_dropped_shutdown(),
        }
        debug!(?reason, endpoint = %self.options.endpoint, "dropping message");
        Enqueued::Dropped(reason)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown(self.options.shutdown_timeout);
    }
}
