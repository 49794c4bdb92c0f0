use std::path::Path;
use std::process;
use std::sync::{Arc, Mutex};

use barrage::config::FileConfig;
use barrage::signal::{stop_signal, StopTrigger};
use barrage::util::parse_duration;
use barrage::{setup_logger, ConfigBuilder, ErrorPolicy, HttpTransport, LoadTest, Result};
use clap::{App, Arg, ArgMatches};
use log::{error, info, warn, LevelFilter};

/// Conventional exit status for a process ended by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn main() {
    let matches = cli().get_matches();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    setup_logger(log_level, matches.value_of("log-file").map(Path::new))?;

    let builder = match matches.value_of("config") {
        Some(path) => FileConfig::from_file(Path::new(path))?.into_builder(),
        None => ConfigBuilder::new(""),
    };
    let config = settings_from_argmatches(matches, builder)?.build()?;

    info!("Starting: {:#?}", config);

    // the first ctrl-c drains and reports as usual, a second one exits immediately
    let (interrupt, listener) = stop_signal();
    let interrupt = Mutex::new(Some(interrupt));
    ctrlc::set_handler(move || {
        if !interrupt_once(&interrupt) {
            warn!("Interrupted again, exiting without waiting for workers");
            process::exit(INTERRUPTED_EXIT_CODE);
        }
    })?;

    let transport = HttpTransport::new(config.request_timeout)?;
    LoadTest::new(config, Arc::new(transport))
        .interrupt(listener)
        .run();

    Ok(())
}

/// Raise the interrupt if it hasn't been already. Returns false when it had.
fn interrupt_once(slot: &Mutex<Option<StopTrigger>>) -> bool {
    let trigger = match slot.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    match trigger {
        Some(trigger) => {
            info!("Interrupted, shutting down");
            trigger.raise();
            true
        }
        None => false,
    }
}

fn cli() -> App<'static, 'static> {
    App::new("barrage")
        .version(env!("CARGO_PKG_VERSION"))
        .about(
            "Requests a url on a number of threads [-t] for a time in minutes [-m]. \
             Threads are started one at a time before the peak window begins.",
        )
        .arg(
            Arg::with_name("url")
                .short("u")
                .long("url")
                .value_name("URL")
                .help("URL to load test. http:// is assumed if no scheme is given.")
                .takes_value(true)
                .required_unless("config"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .value_name("T")
                .help("Number of threads to use during the load test. Default = 1.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("minutes")
                .short("m")
                .long("minutes")
                .value_name("M")
                .help("How many minutes to hold peak load once every thread is running. Default = 1.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("PATH")
                .help("TOML file with run settings. Flags override the file.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("stagger")
                .long("stagger")
                .value_name("DURATION")
                .help("Pause between starting threads, e.g. '30s'. Default = 30s.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("drain-timeout")
                .long("drain-timeout")
                .value_name("DURATION")
                .help("Time in-flight requests get to finish after stopping. Default = 5s.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("join-timeout")
                .long("join-timeout")
                .value_name("DURATION")
                .help("How long to wait for threads to exit once stopped. Default = 10s.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("request-timeout")
                .long("request-timeout")
                .value_name("DURATION")
                .help("Timeout for each request. Default = 30s.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("stop-on-error")
                .long("stop-on-error")
                .help("Retire a thread on its first non-timeout request error."),
        )
        .arg(
            Arg::with_name("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Also write logs to this file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
}

fn settings_from_argmatches(
    matches: &ArgMatches,
    mut builder: ConfigBuilder,
) -> Result<ConfigBuilder> {
    if let Some(url) = matches.value_of("url") {
        builder = builder.url(url);
    }

    if let Some(threads) = matches.value_of("threads") {
        builder = builder.threads(
            threads
                .parse::<u32>()
                .map_err(|e| format!("Failed to parse threads '{}': {}", threads, e))?,
        );
    }

    if let Some(minutes) = matches.value_of("minutes") {
        builder = builder.minutes(
            minutes
                .parse::<u64>()
                .map_err(|e| format!("Failed to parse minutes '{}': {}", minutes, e))?,
        );
    }

    if let Some(value) = matches.value_of("stagger") {
        builder = builder.stagger_delay(duration_arg("stagger", value)?);
    }

    if let Some(value) = matches.value_of("drain-timeout") {
        builder = builder.drain_timeout(duration_arg("drain-timeout", value)?);
    }

    if let Some(value) = matches.value_of("join-timeout") {
        builder = builder.join_timeout(duration_arg("join-timeout", value)?);
    }

    if let Some(value) = matches.value_of("request-timeout") {
        builder = builder.request_timeout(duration_arg("request-timeout", value)?);
    }

    if matches.is_present("stop-on-error") {
        builder = builder.error_policy(ErrorPolicy::Stop);
    }

    Ok(builder)
}

fn duration_arg(name: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| format!("Failed to parse {} '{}': {}", name, value, e).into())
}
