pub mod stats;
pub mod transport;
pub mod worker;

pub use stats::{RequestCounter, RunStatistics};
pub use transport::{HttpTransport, Transport};
pub use worker::{Worker, WorkerExit, WorkerReport, WorkerState};
