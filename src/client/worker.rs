use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::client::{RequestCounter, Transport};
use crate::config::ErrorPolicy;
use crate::signal::StopListener;
use crate::util::normalize_url;

/// Pause after a failed request before retrying, so a dead target doesn't turn into a hot loop.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopping,
    Terminated,
}

/// Why a worker left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Stopped,
    Failed(String),
}

/// Sent back to the coordinator once a worker has terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub name: String,
    pub requests: u64,
    pub exit: WorkerExit,
}

impl fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.exit {
            WorkerExit::Stopped => write!(f, "{}: {} requests", self.name, self.requests),
            WorkerExit::Failed(e) => write!(
                f,
                "{}: {} requests, failed: {}",
                self.name, self.requests, e
            ),
        }
    }
}

/// Requests one url over and over until the stop signal is raised.
pub struct Worker {
    name: String,
    url: String,
    counter: RequestCounter,
    stop: StopListener,
    transport: Arc<dyn Transport>,
    error_policy: ErrorPolicy,
    state: WorkerState,
    requests: u64,
}

impl Worker {
    pub fn new(
        name: String,
        url: &str,
        counter: RequestCounter,
        stop: StopListener,
        transport: Arc<dyn Transport>,
        error_policy: ErrorPolicy,
    ) -> Worker {
        Worker {
            name,
            url: normalize_url(url),
            counter,
            stop,
            transport,
            error_policy,
            state: WorkerState::Running,
            requests: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Start the worker on its own named OS thread. The report is sent on `done` right before the
    /// thread exits.
    pub fn spawn(self, done: Sender<WorkerReport>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let report = self.run();
                // the coordinator may have given up on us already
                done.send(report).ok();
            })
    }

    /// Drive the request loop to completion on the current thread.
    pub fn run(mut self) -> WorkerReport {
        info!("{} triggered...", self.name);
        let mut exit = WorkerExit::Stopped;

        while self.state == WorkerState::Running {
            if self.stop.is_set() {
                self.transition(WorkerState::Stopping);
                break;
            }

            debug!("Request {} on: {}", self.requests + 1, self.name);

            if let Err(e) = self.request() {
                error!("{} request failed: '{}'", self.name, e);

                match self.error_policy {
                    ErrorPolicy::Continue => {
                        self.stop.wait_timeout(ERROR_BACKOFF);
                    }
                    ErrorPolicy::Stop => {
                        exit = WorkerExit::Failed(e.to_string());
                        self.transition(WorkerState::Stopping);
                    }
                }
            }
        }

        self.transition(WorkerState::Terminated);
        info!("{} finished.", self.name);

        WorkerReport {
            name: self.name,
            requests: self.requests,
            exit,
        }
    }

    /// One request cycle. Timeouts are swallowed without counting; any response, whatever its
    /// status, counts as a completed cycle.
    fn request(&mut self) -> io::Result<()> {
        let status = match self.transport.get(&self.url) {
            Ok(status) => status,
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => return Ok(()),
            Err(e) => return Err(e),
        };

        if status == 200 {
            info!("Status: {}, URL: {}", status, self.url);
        } else {
            warn!("Bad response: {}, URL: {}", status, self.url);
        }

        self.requests += 1;
        self.counter.increment();

        Ok(())
    }

    fn transition(&mut self, next: WorkerState) {
        debug!("{}: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
    }
}
