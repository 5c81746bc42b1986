//! Change-triggered median computation over the merged record stream.
//!
//! The calculator consumes the global queue on a single thread, folds every
//! price into its t-digest, and emits a row whenever the estimated median
//! moves by more than [`EPSILON`]. The first record after any data always
//! produces a row.

use std::sync::Arc;

use log::{debug, error};

use crate::error::Result;
use crate::queue::RecordQueue;
use crate::sink::OutputSink;
use crate::tdigest::TDigest;

/// Median-change threshold below which no row is emitted.
pub const EPSILON: f64 = 1e-10;

/// Summary of a finished calculator run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorReport {
    /// Records consumed from the global queue
    pub records_consumed: u64,

    /// Rows written to the sink
    pub rows_emitted: u64,
}

/// Consumes the merged stream and writes median rows to the sink.
pub struct MedianCalculator {
    digest: TDigest,
    tasks: Arc<RecordQueue>,
    sink: OutputSink,
    extra_names: Vec<String>,
    last_median: f64,
}

impl MedianCalculator {
    /// Build a calculator over `tasks`, writing to `sink`.
    ///
    /// `extra_names` selects the additional statistics emitted with every
    /// row; they must match the sink's configured columns.
    pub fn new(
        tasks: Arc<RecordQueue>,
        sink: OutputSink,
        extra_names: Vec<String>,
        digest_compression: usize,
    ) -> Self {
        Self {
            digest: TDigest::new(digest_compression),
            tasks,
            sink,
            extra_names,
            // NaN sentinel: the first comparison always emits
            last_median: f64::NAN,
        }
    }

    /// Process records until the input queue reports end-of-stream.
    ///
    /// Returns the run summary; the sink is flushed before returning. A
    /// sink write failure is fatal: the error is propagated after the sink
    /// state is logged, and the caller is expected to shut the pipeline
    /// down.
    pub fn run(mut self) -> Result<CalculatorReport> {
        let mut report = CalculatorReport::default();

        while let Some(record) = self.tasks.wait_and_pop() {
            report.records_consumed += 1;

            self.digest.add(record.price);
            let median = self.digest.median()?;

            if self.last_median.is_nan() || (median - self.last_median).abs() > EPSILON {
                let extras = self.digest.extra_values(&self.extra_names);
                if let Err(e) = self.sink.write_median(record.receive_ts, median, &extras) {
                    error!("median output failed, shutting down: {e}");
                    let _ = self.sink.flush();
                    self.tasks.stop();
                    return Err(e);
                }
                report.rows_emitted += 1;
                self.last_median = median;
            }
        }

        self.sink.flush()?;
        debug!(
            "calculator finished: {} records consumed, {} rows emitted",
            report.records_consumed, report.rows_emitted
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_file(name: &str) -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "calc_test_{}_{}_{}.csv",
            std::process::id(),
            name,
            counter
        ))
    }

    fn run_over(records: &[Record], extra_names: Vec<String>, path: &PathBuf) -> CalculatorReport {
        let _ = fs::remove_file(path);
        let tasks = Arc::new(RecordQueue::new());
        for r in records {
            tasks.push(*r);
        }
        tasks.stop();

        let sink = OutputSink::open(path, extra_names.clone()).unwrap();
        let calc = MedianCalculator::new(tasks, sink, extra_names, 25);
        calc.run().unwrap()
    }

    #[test]
    fn test_running_medians_single_source() {
        let path = unique_temp_file("medians");
        let records: Vec<Record> = [10.0, 20.0, 30.0, 40.0, 50.0]
            .iter()
            .enumerate()
            .map(|(i, p)| Record::new(1000 + i as i64, *p))
            .collect();

        let report = run_over(&records, Vec::new(), &path);
        assert_eq!(report.records_consumed, 5);
        assert_eq!(report.rows_emitted, 5);

        let content = fs::read_to_string(&path).unwrap();
        let expected = "receive_ts;median\n\
                        1000;10.00000000\n\
                        1001;15.00000000\n\
                        1002;20.00000000\n\
                        1003;25.00000000\n\
                        1004;30.00000000\n";
        assert_eq!(content, expected);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unchanged_median_is_not_emitted() {
        let path = unique_temp_file("threshold");
        // Identical prices keep the median constant after the first record
        let records: Vec<Record> = (0..10).map(|i| Record::new(i, 7.0)).collect();

        let report = run_over(&records, Vec::new(), &path);
        assert_eq!(report.records_consumed, 10);
        assert_eq!(report.rows_emitted, 1);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "receive_ts;median\n0;7.00000000\n");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_first_record_always_emits() {
        let path = unique_temp_file("first");
        let report = run_over(&[Record::new(1, 0.0)], Vec::new(), &path);
        assert_eq!(report.rows_emitted, 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_extra_columns_flow_through() {
        let path = unique_temp_file("extras");
        let records: Vec<Record> = (1..=4).map(|i| Record::new(i, i as f64)).collect();
        let names = vec!["mean".to_string(), "p90".to_string()];

        run_over(&records, names, &path);

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("receive_ts;median;mean;p90"));
        for line in lines {
            assert_eq!(line.split(';').count(), 4);
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_empty_stream_emits_nothing() {
        let path = unique_temp_file("empty");
        let report = run_over(&[], Vec::new(), &path);
        assert_eq!(report.records_consumed, 0);
        assert_eq!(report.rows_emitted, 0);

        // No write happened, so not even the header exists
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_blocked_calculator_exits_on_stop() {
        let path = unique_temp_file("stop");
        let _ = fs::remove_file(&path);

        let tasks = Arc::new(RecordQueue::new());
        let sink = OutputSink::open(&path, Vec::new()).unwrap();
        let calc = MedianCalculator::new(Arc::clone(&tasks), sink, Vec::new(), 25);

        let handle = std::thread::spawn(move || calc.run());
        std::thread::sleep(std::time::Duration::from_millis(50));
        tasks.stop();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.records_consumed, 0);

        let _ = fs::remove_file(&path);
    }
}
