//! Run-scoped broadcast stop signal.
//!
//! The signal is a zero-capacity channel that never carries a message. Raising it drops the only
//! sender, which disconnects the channel for every cloned receiver at once. That makes "set" a
//! one-way transition that all threads observe without any extra locking.
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Creates a fresh, unset signal. Each load test run gets its own pair.
pub fn stop_signal() -> (StopTrigger, StopListener) {
    let (sender, receiver) = bounded(0);

    (StopTrigger { _sender: sender }, StopListener { receiver })
}

/// Write side of the signal. Owned by exactly one party; raising consumes it.
#[derive(Debug)]
pub struct StopTrigger {
    _sender: Sender<()>,
}

impl StopTrigger {
    /// Raise the signal. Dropping the trigger has the same effect.
    pub fn raise(self) {
        drop(self);
    }
}

/// Read side of the signal, cheap to clone and hand to every worker.
#[derive(Debug, Clone)]
pub struct StopListener {
    receiver: Receiver<()>,
}

impl StopListener {
    /// Non-blocking poll.
    pub fn is_set(&self) -> bool {
        match self.receiver.try_recv() {
            Ok(_) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Sleep for up to `timeout`, waking early if the signal is raised. Returns whether the
    /// signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}
