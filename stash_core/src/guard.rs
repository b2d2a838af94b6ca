/**
 * RAII guard that shuts a dispatcher down.
 *
 * Rust has no JVM-style shutdown hooks, so the "flush before exit" step is
 * tied to scope instead:
 *
 * ```ignore
 * fn main() {
 *     let _guard = stash_core::init(stash_core::Options::default()).unwrap();
 *
 *     // ... application logic, events dispatched here ...
 *
 * }   // <-- _guard is dropped here, draining the queue for at most
 *     //     `Options::shutdown_timeout`
 * ```
 *
 * If the drain times out the guard logs a warning and lets go. Best-effort
 * delivery is the contract.
 */
use std::sync::Arc;

use tracing::warn;

use crate::dispatcher::{Dispatcher, ShutdownOutcome};

pub struct Guard {
    dispatcher: Arc<Dispatcher>,
}

impl Guard {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        let timeout = self.dispatcher.options().shutdown_timeout;
        let outcome = self.dispatcher.shutdown(timeout);

        if outcome == ShutdownOutcome::TimedOut {
            warn!(
                ?timeout,
                "shutdown drain timed out; some events were not delivered"
            );
        }
    }
}
