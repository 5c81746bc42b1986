//! Command-line entry point for the median-stream pipeline.
//!
//! Wires the configured input files into a readers manager, starts the
//! median calculator on its own thread, and runs until the inputs are
//! exhausted (batch) or the operator interrupts the process (streaming).
//!
//! # Usage
//!
//! ```bash
//! # Batch run over the files named by config.toml
//! median-stream --config config.toml
//!
//! # Keep tailing the inputs until Ctrl-C
//! median-stream --config config.toml --streaming
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use median_stream::{Config, MedianCalculator, OutputSink, ReadersManager, Result};

/// Command-line arguments
struct Args {
    /// Path to the TOML configuration file
    config: PathBuf,

    /// Override for the config file's streaming_mode flag
    streaming: Option<bool>,
}

fn parse_args() -> std::result::Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut config: Option<PathBuf> = None;
    let mut streaming: Option<bool> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path".to_string());
                }
                config = Some(PathBuf::from(&args[i]));
            }
            "--streaming" | "-s" => {
                streaming = Some(true);
            }
            "--batch" => {
                streaming = Some(false);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => {
                if config.is_none() {
                    config = Some(PathBuf::from(arg));
                } else {
                    return Err(format!("Unknown argument: {arg}"));
                }
            }
        }
        i += 1;
    }

    Ok(Args {
        config: config.unwrap_or_else(|| PathBuf::from("config.toml")),
        streaming,
    })
}

fn print_help() {
    eprintln!(
        r#"
median-stream - running median over append-only CSV price feeds

USAGE:
    median-stream [OPTIONS] [CONFIG]

OPTIONS:
    -c, --config <PATH>   Configuration file (default: config.toml)
    -s, --streaming       Tail the inputs for appended data until Ctrl-C
        --batch           Process existing content and exit
    -h, --help            Print this help message

The config file selects the input directory, filename masks, output path,
t-digest compression and extra statistic columns; --streaming/--batch
override its streaming_mode flag.
"#
    );
}

fn run(config: Config) -> Result<()> {
    let sink = OutputSink::open(&config.output_file, config.extra_quantiles.clone())?;
    info!("writing medians to {}", config.output_file.display());

    let mut manager = ReadersManager::new(config.streaming_mode);
    for file in &config.input_files {
        if let Err(e) = manager.add_csv_file(file) {
            // Join any readers that already started before surfacing
            manager.stop();
            return Err(e);
        }
    }
    manager.run()?;

    let calculator = MedianCalculator::new(
        manager.tasks(),
        sink,
        config.extra_quantiles.clone(),
        config.digest_compression,
    );
    let calc_thread = thread::spawn(move || calculator.run());

    if config.streaming_mode {
        let interrupted = Arc::new(AtomicBool::new(false));
        {
            let interrupted = Arc::clone(&interrupted);
            ctrlc::set_handler(move || {
                interrupted.store(true, Ordering::Relaxed);
            })
            .map_err(|e| {
                median_stream::MedianStreamError::generic(format!(
                    "cannot install interrupt handler: {e}"
                ))
            })?;
        }

        info!("streaming: tailing {} file(s), Ctrl-C to stop", config.input_files.len());
        while !interrupted.load(Ordering::Relaxed) && !calc_thread.is_finished() {
            thread::sleep(Duration::from_millis(100));
        }
        info!("shutting down");
    }

    manager.stop();

    let report = match calc_thread.join() {
        Ok(result) => result?,
        Err(_) => {
            return Err(median_stream::MedianStreamError::generic(
                "calculator thread panicked",
            ))
        }
    };

    info!(
        "done: {} records merged, {} rows written",
        manager.total_tasks(),
        report.rows_emitted
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let config = match Config::load(&args.config) {
        Ok(mut config) => {
            if let Some(streaming) = args.streaming {
                config.streaming_mode = streaming;
            }
            config
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    info!(
        "{} input file(s), streaming={}, compression={}",
        config.input_files.len(),
        config.streaming_mode,
        config.digest_compression
    );

    if let Err(e) = run(config) {
        error!("{e}");
        std::process::exit(1);
    }
}
