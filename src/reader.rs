//! Memory-mapped tailing reader for append-only CSV files.
//!
//! Each reader owns one input file. It maps the file read-only, skips the
//! header line, then scans complete `\n`-terminated lines, parsing each into
//! a [`Record`](crate::types::Record) pushed to the reader's local queue.
//!
//! In batch mode the reader exits at end-of-file. In streaming mode it
//! re-maps the file whenever the scan reaches the mapped end: if the file
//! has grown the scan continues immediately, otherwise the reader sleeps
//! for [`POLL_INTERVAL`] before polling again. A partially written trailing
//! line is carried across re-maps and completed once its `\n` arrives.
//!
//! The producer contract is append-only; truncation of an input file is
//! outside the contract and the reader simply keeps its cursor, which means
//! bytes rewritten below the cursor are never re-read.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use memmap2::Mmap;

use crate::error::{MedianStreamError, Result};
use crate::queue::RecordQueue;
use crate::types;

/// How long a streaming reader sleeps when the file has not grown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters describing what a reader has produced so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderStats {
    /// Lines successfully parsed and pushed to the local queue
    pub records_parsed: u64,

    /// Malformed lines that were logged and skipped
    pub lines_skipped: u64,
}

/// Tailing reader over one memory-mapped CSV file.
pub struct CsvReader {
    path: PathBuf,
    mmap: Option<Mmap>,
    size: usize,
    position: usize,
    header_skipped: bool,
    streaming: bool,
    queue: Arc<RecordQueue>,
    stats: ReaderStats,
}

impl CsvReader {
    /// Open and map `path` for tailing.
    ///
    /// # Errors
    ///
    /// [`MedianStreamError::MappingFailure`] if the file cannot be opened or
    /// mapped. An empty file is not an error: the mapping is deferred until
    /// the first refresh observes content.
    pub fn new(path: impl AsRef<Path>, queue: Arc<RecordQueue>, streaming: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (mmap, size) = map_file(&path)?;

        Ok(Self {
            path,
            mmap,
            size,
            position: 0,
            header_skipped: false,
            streaming,
            queue,
            stats: ReaderStats::default(),
        })
    }

    /// The file this reader tails.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counters for parsed and skipped lines.
    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Tail the file until exhaustion (batch) or until `stop` is requested
    /// (streaming).
    ///
    /// Runs on the caller's thread; the readers manager spawns one thread
    /// per reader invoking this.
    pub fn run(&mut self, stop: &AtomicBool) {
        debug!("reader {}: started (streaming={})", self.path.display(), self.streaming);
        let mut line: Vec<u8> = Vec::new();

        loop {
            if stop.load(Ordering::Relaxed) {
                debug!("reader {}: stop requested", self.path.display());
                break;
            }

            if self.scan_line(&mut line) {
                self.finish_line(&mut line);
                continue;
            }

            // Mapped bytes exhausted
            if !self.streaming {
                if !line.is_empty() {
                    debug!(
                        "reader {}: discarding unterminated trailing line ({} bytes)",
                        self.path.display(),
                        line.len()
                    );
                }
                break;
            }

            let previous_size = self.size;
            match self.refresh() {
                Ok(()) if self.size > previous_size => {} // new bytes, rescan now
                Ok(()) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    warn!("reader {}: refresh failed, retrying: {e}", self.path.display());
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        debug!(
            "reader {}: finished, {} records parsed, {} lines skipped",
            self.path.display(),
            self.stats.records_parsed,
            self.stats.lines_skipped
        );
    }

    /// Accumulate bytes into `line` until a `\n` is consumed (true) or the
    /// mapped region is exhausted (false).
    fn scan_line(&mut self, line: &mut Vec<u8>) -> bool {
        let Some(map) = self.mmap.as_ref() else {
            return false;
        };
        let data = map.as_ref();

        while self.position < self.size {
            let byte = data[self.position];
            self.position += 1;
            if byte == b'\n' {
                return true;
            }
            line.push(byte);
        }
        false
    }

    /// Consume one complete line: skip it if it is the header, otherwise
    /// parse and push.
    fn finish_line(&mut self, line: &mut Vec<u8>) {
        if !self.header_skipped {
            self.header_skipped = true;
            line.clear();
            return;
        }
        if line.is_empty() {
            return;
        }

        // Tolerate CRLF input
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        match std::str::from_utf8(line).ok().and_then(types::parse_line) {
            Some(record) => {
                self.queue.push(record);
                self.stats.records_parsed += 1;
            }
            None => {
                warn!(
                    "reader {}: skipping malformed line: {:?}",
                    self.path.display(),
                    String::from_utf8_lossy(line)
                );
                self.stats.lines_skipped += 1;
            }
        }
        line.clear();
    }

    /// Re-map the file to observe newly appended bytes.
    ///
    /// The read cursor is preserved; only the mapped length changes.
    fn refresh(&mut self) -> Result<()> {
        let (mmap, size) = map_file(&self.path)?;
        self.mmap = mmap;
        self.size = size;
        Ok(())
    }
}

/// Map a file read-only. An empty file yields no mapping (length-zero maps
/// are rejected by the OS).
fn map_file(path: &Path) -> Result<(Option<Mmap>, usize)> {
    let file = File::open(path).map_err(|e| MedianStreamError::MappingFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let len = file
        .metadata()
        .map_err(|e| MedianStreamError::MappingFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .len();

    if len == 0 {
        return Ok((None, 0));
    }

    // Safety: the producer contract is append-only, so the mapped prefix is
    // never rewritten underneath us.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| MedianStreamError::MappingFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let size = mmap.len();
    Ok((Some(mmap), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::atomic::AtomicU64;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_file(name: &str) -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "reader_test_{}_{}_{}.csv",
            std::process::id(),
            name,
            counter
        ))
    }

    fn drain(queue: &RecordQueue) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(rec) = queue.try_pop() {
            out.push(rec);
        }
        out
    }

    use crate::types::Record;

    #[test]
    fn test_nonexistent_file() {
        let queue = Arc::new(RecordQueue::new());
        let result = CsvReader::new("/nonexistent/input.csv", queue, false);
        assert!(matches!(
            result,
            Err(MedianStreamError::MappingFailure { .. })
        ));
    }

    #[test]
    fn test_batch_reads_all_lines() {
        let path = unique_temp_file("batch");
        fs::write(
            &path,
            "receive_ts;exchange_ts;price;quantity\n1000;x;10.0;1\n1001;x;20.0;1\n1002;x;30.0;1\n",
        )
        .unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), false).unwrap();
        let stop = AtomicBool::new(false);
        reader.run(&stop);

        let records = drain(&queue);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], Record::new(1000, 10.0));
        assert_eq!(records[1], Record::new(1001, 20.0));
        assert_eq!(records[2], Record::new(1002, 30.0));
        assert_eq!(reader.stats().records_parsed, 3);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_batch_discards_unterminated_trailing_line() {
        let path = unique_temp_file("partial");
        fs::write(&path, "header\n1000;x;10.0\n1001;x;20.0").unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), false).unwrap();
        reader.run(&AtomicBool::new(false));

        let records = drain(&queue);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].receive_ts, 1000);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let path = unique_temp_file("malformed");
        fs::write(
            &path,
            "header\n1000;x;10.0\nnot a record\n1001;x\n1002;x;30.0\n",
        )
        .unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), false).unwrap();
        reader.run(&AtomicBool::new(false));

        let records = drain(&queue);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].receive_ts, 1000);
        assert_eq!(records[1].receive_ts, 1002);
        assert_eq!(reader.stats().lines_skipped, 2);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_crlf_lines() {
        let path = unique_temp_file("crlf");
        fs::write(&path, "header\r\n1000;x;10.0\r\n1001;x;20.0\r\n").unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), false).unwrap();
        reader.run(&AtomicBool::new(false));

        let records = drain(&queue);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Record::new(1001, 20.0));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_empty_file_batch_exits() {
        let path = unique_temp_file("empty");
        fs::write(&path, "").unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), false).unwrap();
        reader.run(&AtomicBool::new(false));
        assert!(queue.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_streaming_tail_picks_up_appends() {
        let path = unique_temp_file("tail");
        fs::write(&path, "header\n1;x;1.0\n2;x;2.0\n").unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), true).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                reader.run(&stop);
                reader
            })
        };

        // Wait for the initial content
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.total_count() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(queue.total_count(), 2);

        // Append in two chunks, splitting a line across writes
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"3;x;3").unwrap();
        file.flush().unwrap();
        thread::sleep(Duration::from_millis(250));
        file.write_all(b".0\n4;x;4.0\n").unwrap();
        file.flush().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.total_count() < 4 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        stop.store(true, Ordering::Relaxed);
        let reader = handle.join().unwrap();

        let records = drain(&queue);
        assert_eq!(records.len(), 4);
        let prices: Vec<f64> = records.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.stats().records_parsed, 4);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_streaming_starts_on_initially_empty_file() {
        let path = unique_temp_file("grow_from_empty");
        fs::write(&path, "").unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), true).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || reader.run(&stop))
        };

        thread::sleep(Duration::from_millis(150));
        fs::write(&path, "header\n10;x;5.5\n").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.total_count() < 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        let records = drain(&queue);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], Record::new(10, 5.5));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_streaming_stop_is_prompt() {
        let path = unique_temp_file("prompt_stop");
        fs::write(&path, "header\n1;x;1.0\n").unwrap();

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(&path, Arc::clone(&queue), true).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || reader.run(&stop))
        };

        thread::sleep(Duration::from_millis(150));
        let start = std::time::Instant::now();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        // One poll interval plus margin
        assert!(start.elapsed() < Duration::from_millis(500));

        let _ = fs::remove_file(&path);
    }
}
