//! Append-only CSV output sink.
//!
//! Rows are written as `receive_ts;median[;extra…]` with fixed 8-digit
//! float precision. A header line naming the columns is written on the
//! first row only when the file was empty at open time, so re-running
//! against an existing output appends without repeating the header.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{MedianStreamError, Result};

/// Buffered append-mode CSV writer for median rows.
pub struct OutputSink {
    writer: BufWriter<File>,
    path: PathBuf,
    extra_names: Vec<String>,
    header_pending: bool,
    total_records: u64,
}

impl OutputSink {
    /// Open `path` for appending, creating it if absent.
    ///
    /// `extra_names` are the additional statistic columns after `median`,
    /// in emission order.
    pub fn open(path: impl AsRef<Path>, extra_names: Vec<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MedianStreamError::Output {
                path: path.clone(),
                source: e,
            })?;

        let empty = file
            .metadata()
            .map_err(|e| MedianStreamError::Output {
                path: path.clone(),
                source: e,
            })?
            .len()
            == 0;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            extra_names,
            header_pending: empty,
            total_records: 0,
        })
    }

    /// The file this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count of rows written so far.
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Append one median row; emits the header first if it is still due.
    ///
    /// `extras` must match the configured column names in order; only the
    /// values are written.
    pub fn write_median(
        &mut self,
        receive_ts: i64,
        median: f64,
        extras: &[(String, f64)],
    ) -> Result<()> {
        if self.header_pending {
            self.write_header()?;
            self.header_pending = false;
        }

        let mut row = format!("{receive_ts};{median:.8}");
        for (_, value) in extras {
            row.push_str(&format!(";{value:.8}"));
        }
        row.push('\n');

        self.writer
            .write_all(row.as_bytes())
            .map_err(|e| self.output_error(e))?;
        self.total_records += 1;
        Ok(())
    }

    /// Flush buffered rows to the file.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| self.output_error(e))
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = String::from("receive_ts;median");
        for name in &self.extra_names {
            header.push(';');
            header.push_str(name);
        }
        header.push('\n');

        self.writer
            .write_all(header.as_bytes())
            .map_err(|e| self.output_error(e))
    }

    fn output_error(&self, source: std::io::Error) -> MedianStreamError {
        MedianStreamError::Output {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_file(name: &str) -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "sink_test_{}_{}_{}.csv",
            std::process::id(),
            name,
            counter
        ))
    }

    #[test]
    fn test_header_and_fixed_precision() {
        let path = unique_temp_file("basic");
        let _ = fs::remove_file(&path);

        let mut sink = OutputSink::open(&path, Vec::new()).unwrap();
        sink.write_median(1000, 10.0, &[]).unwrap();
        sink.write_median(1001, 15.5, &[]).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.total_records(), 2);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "receive_ts;median\n1000;10.00000000\n1001;15.50000000\n"
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_extra_columns() {
        let path = unique_temp_file("extras");
        let _ = fs::remove_file(&path);

        let names = vec!["mean".to_string(), "p99".to_string()];
        let mut sink = OutputSink::open(&path, names).unwrap();
        sink.write_median(
            5,
            1.0,
            &[("mean".to_string(), 1.25), ("p99".to_string(), 2.0)],
        )
        .unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "receive_ts;median;mean;p99\n5;1.00000000;1.25000000;2.00000000\n"
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_header_written_once_across_reopens() {
        let path = unique_temp_file("reopen");
        let _ = fs::remove_file(&path);

        {
            let mut sink = OutputSink::open(&path, Vec::new()).unwrap();
            sink.write_median(1, 1.0, &[]).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = OutputSink::open(&path, Vec::new()).unwrap();
            sink.write_median(2, 2.0, &[]).unwrap();
            sink.flush().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let headers = content
            .lines()
            .filter(|l| l.starts_with("receive_ts"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(content.lines().count(), 3);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_negative_timestamp_row() {
        let path = unique_temp_file("negative");
        let _ = fs::remove_file(&path);

        let mut sink = OutputSink::open(&path, Vec::new()).unwrap();
        sink.write_median(-42, -0.5, &[]).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("-42;-0.50000000\n"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_open_failure_is_output_error() {
        let result = OutputSink::open("/nonexistent-dir/out.csv", Vec::new());
        assert!(matches!(result, Err(MedianStreamError::Output { .. })));
    }
}
