//! # median-stream
//!
//! Streaming running-median pipeline over append-only CSV price feeds.
//!
//! The pipeline turns N independently growing CSV files into one
//! timestamp-ordered record stream and maintains its running quantile
//! summary in bounded memory:
//!
//! 1. **Tailing readers** memory-map each input file, detect growth, and
//!    parse appended lines into records in file order.
//! 2. A **k-way merger** forwards records from the per-reader queues to a
//!    single global queue in minimum-timestamp order.
//! 3. A **t-digest** ingests the merged prices and answers median / p90 /
//!    p95 / p99 with interpolation in O(compression) memory.
//! 4. The **median calculator** emits a CSV row whenever the estimated
//!    median moves by more than a small epsilon.
//!
//! Two modes: *batch* processes existing file content to completion,
//! *streaming* keeps the files open and tails newly appended bytes until
//! the process is asked to stop.
//!
//! ## Quick Start
//!
//! ```no_run
//! use median_stream::{MedianCalculator, OutputSink, ReadersManager};
//!
//! # fn main() -> median_stream::Result<()> {
//! let mut manager = ReadersManager::new(false);
//! manager.add_csv_file("data/trades_a.csv")?;
//! manager.add_csv_file("data/trades_b.csv")?;
//! manager.run()?;
//!
//! let sink = OutputSink::open("median.csv", Vec::new())?;
//! let calculator = MedianCalculator::new(manager.tasks(), sink, Vec::new(), 25);
//! let handle = std::thread::spawn(move || calculator.run());
//!
//! manager.stop();
//! let report = handle.join().expect("calculator thread panicked")?;
//! println!("{} rows emitted", report.rows_emitted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | `Record` value type and CSV line parsing |
//! | [`queue`] | `RecordQueue`: blocking FIFO with cooperative stop |
//! | [`reader`] | `CsvReader`: memory-mapped tailing reader |
//! | [`manager`] | `ReadersManager`: reader threads + k-way merge |
//! | [`tdigest`] | `TDigest`: streaming quantile estimator |
//! | [`calculator`] | `MedianCalculator`: change-triggered emission |
//! | [`sink`] | `OutputSink`: append-only CSV writer |
//! | [`config`] | TOML configuration and input discovery |

pub mod calculator;
pub mod config;
pub mod error;
pub mod manager;
pub mod queue;
pub mod reader;
pub mod sink;
pub mod tdigest;
pub mod types;

// Re-exports - Core types
pub use error::{MedianStreamError, Result};
pub use types::Record;

// Re-exports - Pipeline stages
pub use calculator::{CalculatorReport, MedianCalculator, EPSILON};
pub use manager::ReadersManager;
pub use queue::RecordQueue;
pub use reader::{CsvReader, ReaderStats, POLL_INTERVAL};
pub use sink::OutputSink;

// Re-exports - Quantile estimation
pub use tdigest::{Centroid, TDigest, DEFAULT_COMPRESSION};

// Re-exports - Configuration
pub use config::Config;
