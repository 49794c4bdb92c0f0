//! # Tool for HTTP load testing
//!
//! `barrage` points a number of worker threads at a single url for a bounded amount of time.
//! Workers are started one at a time with a pause between each so the load ramps up instead of
//! arriving as a single spike, then every worker keeps requesting until the peak window is over.
//! If you're interested in reading the code, `load_test.rs` is where the run is orchestrated.
//!
//! This library is used internally by the main.rs binary and the tests, and is not intended for
//! general use in other projects.
//!
//! ## Examples
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use barrage::{ConfigBuilder, HttpTransport, LoadTest};
//! let config = ConfigBuilder::new("localhost:8000")
//!     .threads(4)
//!     .minutes(1)
//!     .stagger_delay(Duration::from_secs(5))
//!     .build()?;
//! let transport = HttpTransport::new(config.request_timeout)?;
//!
//! let stats = LoadTest::new(config, Arc::new(transport)).run();
//! println!("{:.2} req/s", stats.throughput());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
pub mod client;
pub mod config;
pub mod load_test;
pub mod server;
pub mod signal;
pub mod util;

pub use client::{HttpTransport, RequestCounter, RunStatistics, Transport};
pub use config::{Config, ConfigBuilder, ErrorPolicy};
pub use load_test::LoadTest;

use log::LevelFilter;
use std::path::Path;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

pub fn setup_logger(log_level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log_level)
        // keep hyper's connection chatter out of debug output
        .level_for("hyper", LevelFilter::Warn)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;

    Ok(())
}
