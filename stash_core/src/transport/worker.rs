/**
 * Background worker thread that drains the message queue into the
 * transport.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌──────────────┐    crossbeam channel   ┌─────────────────┐
 *  │  Producers    │ ───── WorkerMsg ─────► │  Worker thread   │
 *  │  (any thread) │                        │  (single)        │
 *  └──────────────┘                        └────────┬────────┘
 *                                                   │
 *                                       Transport::write_message()
 *                                          │ ok          │ err
 *                                        next     close, wait, retry
 *                                                   │
 *                                            ┌──────▼──────┐
 *                                            │  Collector   │
 *                                            └─────────────┘
 * ```
 *
 * The worker stops in one of two ways:
 * - **Drain**: every sender has been dropped and the queue is empty.
 * - **Abort**: the abort channel disconnects. The retry wait is cut short,
 *   the message in hand and everything still queued are abandoned.
 */
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, error, warn};

use super::Transport;
use crate::protocol::constants::WORKER_THREAD_NAME;
use crate::protocol::message::Message;
use crate::stats::Stats;

// ---------------------------------------------------------------------------
// WorkerMsg: the messages sent through the queue channel
// ---------------------------------------------------------------------------

pub enum WorkerMsg {
    /// A message to deliver.
    Line(Message),

    /**
     * A flush request. The worker completes the signal once every message
     * queued *before* this one has been delivered.
     */
    Flush(Arc<Completion>),
}

// ---------------------------------------------------------------------------
// Completion: condvar-based one-shot notification
// ---------------------------------------------------------------------------

/**
 * One-shot "done" flag a thread can wait on with a timeout.
 *
 * Used both for flush requests and for the worker announcing that it has
 * exited.
 */
pub struct Completion {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut done = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        self.condvar.notify_all();
    }

    /**
     * Blocks until `notify` has been called or `timeout` elapses.
     *
     * # Returns
     * `true` if completed in time, `false` if the timeout expired.
     */
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());

        match self.condvar.wait_timeout_while(guard, timeout, |done| !*done) {
            Ok((_, result)) => !result.timed_out(),
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Worker: the background thread
// ---------------------------------------------------------------------------

/**
 * State handed to the worker thread at spawn time.
 *
 * `pending` is shared with the dispatcher: producers increment it when a
 * message is admitted, the worker decrements it once the message is
 * delivered or abandoned.
 */
pub struct Worker {
    pub receiver: Receiver<WorkerMsg>,
    pub abort: Receiver<()>,
    pub transport: Arc<dyn Transport>,
    pub retry_delay: Duration,
    pub priority: i32,
    pub stats: Arc<Stats>,
    pub pending: Arc<AtomicUsize>,
    pub degraded: Arc<AtomicBool>,
    pub exited: Arc<Completion>,
}

enum Delivery {
    Delivered,
    Aborted,
}

impl Worker {
    /**
     * Spawns the worker on a dedicated named thread.
     *
     * A panic anywhere in the loop is caught: the dispatcher is flagged as
     * degraded instead of the panic taking anything else down. Whatever the
     * exit path, the transport is closed and `exited` is completed.
     */
    pub fn spawn(self) -> std::io::Result<()> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                debug!(priority = self.priority, "dispatcher worker started");

                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    self.run_loop();
                }));

                if result.is_err() {
                    error!("dispatcher worker panicked; pending messages will be dropped");
                    self.degraded.store(true, Ordering::Release);
                }

                self.transport.close();
                self.exited.notify();
                debug!("dispatcher worker exited");
            })
            .map(|_| ())
    }

    fn run_loop(&self) {
        loop {
            select! {
                recv(self.receiver) -> msg => match msg {
                    Ok(WorkerMsg::Line(message)) => {
                        let outcome = self.deliver(&message);
                        self.pending.fetch_sub(1, Ordering::AcqRel);
                        if let Delivery::Aborted = outcome {
                            self.abandon(1);
                            return;
                        }
                    }
                    Ok(WorkerMsg::Flush(signal)) => signal.notify(),
                    // Intake closed and queue drained.
                    Err(_) => return,
                },
                recv(self.abort) -> _ => {
                    self.abandon(0);
                    return;
                }
            }
        }
    }

    /**
     * Delivers one message, retrying until it goes through or the worker is
     * aborted. Never moves on to another message in between.
     */
    fn deliver(&self, message: &Message) -> Delivery {
        let mut attempt: u64 = 0;

        loop {
            if self.aborted() {
                return Delivery::Aborted;
            }

            attempt += 1;
            match self.transport.write_message(message) {
                Ok(()) => {
                    self.stats.record_delivered();
                    if attempt > 1 {
                        debug!(attempt, "message delivered after retry");
                    }
                    return Delivery::Delivered;
                }
                Err(err) => {
                    self.stats.record_failed_attempt();
                    if attempt == 1 {
                        warn!(error = %err, retry_delay = ?self.retry_delay, "delivery failed, will retry");
                    } else {
                        debug!(attempt, error = %err, "delivery retry failed");
                    }

                    self.transport.close();

                    match self.abort.recv_timeout(self.retry_delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            return Delivery::Aborted;
                        }
                    }
                }
            }
        }
    }

    fn aborted(&self) -> bool {
        !matches!(self.abort.try_recv(), Err(TryRecvError::Empty))
    }

    /**
     * Counts `in_hand` plus everything still queued as abandoned. Queued
     * flush requests are completed, since nothing ahead of them is left.
     */
    fn abandon(&self, in_hand: u64) {
        let mut abandoned = in_hand;
        for msg in self.receiver.try_iter() {
            match msg {
                WorkerMsg::Line(_) => {
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                    abandoned += 1;
                }
                WorkerMsg::Flush(signal) => signal.notify(),
            }
        }

        if abandoned > 0 {
            self.stats.record_abandoned(abandoned);
            warn!(abandoned, "dispatcher aborted with undelivered messages");
        }
    }
}
