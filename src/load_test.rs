use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::client::{RequestCounter, RunStatistics, Transport, Worker, WorkerExit, WorkerReport};
use crate::config::Config;
use crate::signal::{stop_signal, StopListener};

/// Something that cut the ramp-up or steady state short. The shutdown sequence runs regardless.
#[derive(Debug)]
pub enum RunError {
    Interrupted,
    Spawn(io::Error),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::Interrupted => write!(f, "run interrupted"),
            RunError::Spawn(e) => write!(f, "failed to start worker: {}", e),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunError::Spawn(e) => Some(e),
            RunError::Interrupted => None,
        }
    }
}

type SpawnFn = fn(Worker, Sender<WorkerReport>) -> io::Result<JoinHandle<()>>;

/// Owns the worker pool for one run.
///
/// Workers are started one at a time with `stagger_delay` between them, then held at full
/// concurrency for the peak window:
///
/// ```txt
/// worker 1:  |==========================================|
/// worker 2:  .......|===================================|
/// worker 3:  ..............|============================|
///            ^ start        ^ all active        end ^   ^ stop, drain, join
/// ```
pub struct LoadTest {
    config: Config,
    transport: Arc<dyn Transport>,
    interrupt: Option<StopListener>,
    spawn: SpawnFn,
}

impl LoadTest {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> LoadTest {
        LoadTest {
            config,
            transport,
            interrupt: None,
            spawn: Worker::spawn,
        }
    }

    /// Cut the ramp-up and steady state short when `interrupt` is raised, e.g. on ctrl-c.
    pub fn interrupt(mut self, interrupt: StopListener) -> LoadTest {
        self.interrupt = Some(interrupt);
        self
    }

    #[cfg(test)]
    fn spawner(mut self, spawn: SpawnFn) -> LoadTest {
        self.spawn = spawn;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> RunStatistics {
        info!(
            "Total load test time will be: {} seconds",
            self.config.intended_runtime().as_secs()
        );

        let start = Instant::now();
        let counter = RequestCounter::new();
        let (trigger, stop) = stop_signal();
        let (done_sender, done_receiver) = unbounded();
        let mut workers = HashMap::new();

        match self.ramp_and_hold(&counter, &stop, &done_sender, &mut workers) {
            Ok(()) => info!("Completed load test. Stopping workers."),
            Err(e) => error!("Stopping workers. {}", e),
        }
        let end = Instant::now();

        trigger.raise();
        debug!("draining for {:?}", self.config.drain_timeout);
        thread::sleep(self.config.drain_timeout);

        // only the workers hold senders now, so the channel disconnects once they've all exited
        drop(done_sender);
        self.join(workers, &done_receiver);

        let stats = RunStatistics::new(end - start, counter.read());
        stats.log();
        info!("All done.");

        stats
    }

    fn ramp_and_hold(
        &self,
        counter: &RequestCounter,
        stop: &StopListener,
        done: &Sender<WorkerReport>,
        workers: &mut HashMap<String, JoinHandle<()>>,
    ) -> Result<(), RunError> {
        for i in 0..self.config.threads {
            let worker = Worker::new(
                format!("Worker-{}", i + 1),
                &self.config.url,
                counter.clone(),
                stop.clone(),
                self.transport.clone(),
                self.config.error_policy,
            );
            let name = worker.name().to_string();

            let handle = (self.spawn)(worker, done.clone()).map_err(RunError::Spawn)?;
            workers.insert(name, handle);

            self.pause(self.config.stagger_delay)?;
        }

        info!("All workers active");
        self.pause(self.config.peak_duration())
    }

    fn pause(&self, duration: Duration) -> Result<(), RunError> {
        match &self.interrupt {
            Some(interrupt) if interrupt.wait_timeout(duration) => Err(RunError::Interrupted),
            Some(_) => Ok(()),
            None => {
                thread::sleep(duration);
                Ok(())
            }
        }
    }

    /// Wait for each worker to report in. Every worker was stopped at the same moment, so they all
    /// share one `join_timeout` deadline; whoever hasn't reported by then is detached.
    fn join(&self, mut workers: HashMap<String, JoinHandle<()>>, done: &Receiver<WorkerReport>) {
        let deadline = Instant::now().checked_add(self.config.join_timeout);

        while !workers.is_empty() {
            let next = match deadline {
                Some(deadline) => done.recv_deadline(deadline),
                None => done.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok(report) => {
                    match &report.exit {
                        WorkerExit::Stopped => info!("{}", report),
                        WorkerExit::Failed(_) => warn!("{}", report),
                    }
                    if let Some(handle) = workers.remove(&report.name) {
                        if handle.join().is_err() {
                            error!("{} panicked", report.name);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    for name in workers.keys() {
                        warn!(
                            "{} did not terminate within {:?}; detaching",
                            name, self.config.join_timeout
                        );
                    }
                    return;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // every sender is gone, so anything left exited without reporting
        for (name, handle) in workers {
            if handle.join().is_err() {
                error!("{} panicked", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, ErrorPolicy};
    use crate::signal::stop_signal;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct Ok200 {
        attempts: AtomicU64,
    }

    impl Transport for Ok200 {
        fn get(&self, _url: &str) -> io::Result<u16> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            Ok(200)
        }
    }

    /// Each worker's requests take longer the later it was started: 400ms for `Worker-1`, 800ms
    /// for `Worker-2` and so on.
    struct SlowerPerWorker;

    impl Transport for SlowerPerWorker {
        fn get(&self, _url: &str) -> io::Result<u16> {
            let n: u64 = thread::current()
                .name()
                .and_then(|name| name.trim_start_matches("Worker-").parse().ok())
                .unwrap_or(1);
            thread::sleep(Duration::from_millis(400 * n));
            Ok(200)
        }
    }

    #[derive(Default)]
    struct ByThread {
        attempts: AtomicU64,
        threads: Mutex<HashSet<String>>,
    }

    impl Transport for ByThread {
        fn get(&self, _url: &str) -> io::Result<u16> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(name) = thread::current().name() {
                self.threads.lock().unwrap().insert(name.to_string());
            }
            thread::sleep(Duration::from_millis(1));
            Ok(200)
        }
    }

    fn refuse_second_worker(
        worker: Worker,
        done: Sender<WorkerReport>,
    ) -> io::Result<JoinHandle<()>> {
        if worker.name() == "Worker-2" {
            return Err(io::Error::new(io::ErrorKind::Other, "out of threads"));
        }
        worker.spawn(done)
    }

    struct Hangs;

    impl Transport for Hangs {
        fn get(&self, _url: &str) -> io::Result<u16> {
            thread::sleep(Duration::from_secs(3));
            Ok(200)
        }
    }

    struct Panics;

    impl Transport for Panics {
        fn get(&self, _url: &str) -> io::Result<u16> {
            panic!("transport blew up");
        }
    }

    fn quick_config(threads: u32) -> ConfigBuilder {
        ConfigBuilder::new("example.test")
            .threads(threads)
            .minutes(0)
            .stagger_delay(Duration::from_millis(20))
            .drain_timeout(Duration::from_millis(20))
            .join_timeout(Duration::from_secs(2))
    }

    #[test]
    fn spawn_phase_waits_between_workers() {
        let config = quick_config(3)
            .stagger_delay(Duration::from_millis(50))
            .build()
            .unwrap();
        let transport = Arc::new(Ok200 {
            attempts: AtomicU64::new(0),
        });

        let stats = LoadTest::new(config, transport).run();

        assert!(stats.total_time >= Duration::from_millis(100));
    }

    #[test]
    fn every_attempt_is_counted_once() {
        let config = quick_config(2).build().unwrap();
        let transport = Arc::new(Ok200 {
            attempts: AtomicU64::new(0),
        });

        let stats = LoadTest::new(config, transport.clone()).run();

        assert!(stats.total_requests > 0);
        assert_eq!(stats.total_requests, transport.attempts.load(Ordering::SeqCst));
    }

    #[test]
    fn interrupt_cuts_the_run_short() {
        let config = quick_config(2)
            .minutes(10)
            .stagger_delay(Duration::from_secs(60))
            .build()
            .unwrap();
        let transport = Arc::new(Ok200 {
            attempts: AtomicU64::new(0),
        });
        let (trigger, listener) = stop_signal();

        let handle = thread::spawn(move || LoadTest::new(config, transport).interrupt(listener).run());
        thread::sleep(Duration::from_millis(50));
        trigger.raise();

        let stats = handle.join().unwrap();
        assert!(stats.total_time < Duration::from_secs(60));
    }

    #[test]
    fn stuck_worker_is_detached() {
        let config = quick_config(1)
            .join_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let start = Instant::now();

        let stats = LoadTest::new(config, Arc::new(Hangs)).run();

        assert_eq!(stats.total_requests, 0);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn panicking_worker_does_not_hang_the_run() {
        let config = quick_config(2)
            .error_policy(ErrorPolicy::Stop)
            .build()
            .unwrap();

        let stats = LoadTest::new(config, Arc::new(Panics)).run();

        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn join_deadline_is_shared_by_all_workers() {
        let config = quick_config(3)
            .stagger_delay(Duration::from_millis(0))
            .drain_timeout(Duration::from_millis(0))
            .join_timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let start = Instant::now();

        // reports trickle in 400ms apart, each inside join_timeout of the last
        LoadTest::new(config, Arc::new(SlowerPerWorker)).run();

        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn failed_spawn_still_shuts_down() {
        let config = quick_config(3)
            .stagger_delay(Duration::from_millis(50))
            .build()
            .unwrap();
        let transport = Arc::new(ByThread::default());

        let stats = LoadTest::new(config, transport.clone())
            .spawner(refuse_second_worker)
            .run();

        assert!(stats.total_requests > 0);
        assert_eq!(stats.total_requests, transport.attempts.load(Ordering::SeqCst));

        let threads = transport.threads.lock().unwrap();
        assert!(threads.contains("Worker-1"));
        assert!(!threads.contains("Worker-3"));
    }
}
