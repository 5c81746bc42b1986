//! Reader thread management and k-way time-ordered merge.
//!
//! The manager owns one tailing reader thread per input file plus a single
//! merger thread. Every reader pushes into its own local queue; the merger
//! repeatedly picks, among the local queue heads currently present, the
//! record with the minimum `receive_ts` (ties go to the lower reader index)
//! and forwards it to the global queue consumed by the calculator.
//!
//! The merge is greedy per step: it never waits for a lagging reader that
//! might still produce an earlier timestamp. Records within one source
//! arrive in source order, so the global stream is near-sorted, bounded by
//! how far the slowest producer lags.
//!
//! # Shutdown
//!
//! Two distinct stop tokens make the drain race-free: the readers' token is
//! requested first (streaming only; batch readers exit at end-of-file) and
//! the reader threads are joined. The merger's own token is requested only
//! afterwards, and the merger keeps forwarding until every local queue is
//! empty before it exits. Finally the global queue is stopped so the
//! consumer drains and sees end-of-stream.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};

use crate::error::{MedianStreamError, Result};
use crate::queue::RecordQueue;
use crate::reader::CsvReader;

/// How long the merger sleeps when every local queue is empty.
const MERGE_IDLE: Duration = Duration::from_millis(1);

struct ReaderSlot {
    queue: Arc<RecordQueue>,
    thread: Option<JoinHandle<()>>,
}

/// Owns the tailing readers, their threads, and the merger thread.
pub struct ReadersManager {
    slots: Vec<ReaderSlot>,
    tasks: Arc<RecordQueue>,
    streaming: bool,
    readers_stop: Arc<AtomicBool>,
    merger_stop: Arc<AtomicBool>,
    merger: Option<JoinHandle<()>>,
}

impl ReadersManager {
    /// Create a manager with an empty reader set and a fresh global queue.
    pub fn new(streaming: bool) -> Self {
        Self {
            slots: Vec::new(),
            tasks: Arc::new(RecordQueue::new()),
            streaming,
            readers_stop: Arc::new(AtomicBool::new(false)),
            merger_stop: Arc::new(AtomicBool::new(false)),
            merger: None,
        }
    }

    /// The global queue the merger feeds.
    pub fn tasks(&self) -> Arc<RecordQueue> {
        Arc::clone(&self.tasks)
    }

    /// Lifetime count of records forwarded to the global queue.
    pub fn total_tasks(&self) -> u64 {
        self.tasks.total_count()
    }

    /// Register an input file and start its reader thread.
    ///
    /// # Errors
    ///
    /// * [`MedianStreamError::FileNotFound`] if the path does not exist
    /// * [`MedianStreamError::NotRegularFile`] if it is not a regular file
    /// * [`MedianStreamError::MappingFailure`] if the initial mapping fails
    pub fn add_csv_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MedianStreamError::FileNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(MedianStreamError::NotRegularFile(path.to_path_buf()));
        }

        let queue = Arc::new(RecordQueue::new());
        let mut reader = CsvReader::new(path, Arc::clone(&queue), self.streaming)?;

        let index = self.slots.len();
        let stop = Arc::clone(&self.readers_stop);
        let thread = thread::Builder::new()
            .name(format!("reader-{index}"))
            .spawn(move || reader.run(&stop))?;

        info!("tailing {} (reader {index})", path.display());
        self.slots.push(ReaderSlot {
            queue,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Start the merger thread.
    pub fn run(&mut self) -> Result<()> {
        let locals: Vec<Arc<RecordQueue>> =
            self.slots.iter().map(|s| Arc::clone(&s.queue)).collect();
        let tasks = Arc::clone(&self.tasks);
        let stop = Arc::clone(&self.merger_stop);

        let thread = thread::Builder::new()
            .name("merger".to_string())
            .spawn(move || merge_loop(&locals, &tasks, &stop))?;
        self.merger = Some(thread);
        Ok(())
    }

    /// Stop every stage in order and join all threads.
    ///
    /// In batch mode the readers are not signalled; joining them simply
    /// waits until each has reached end-of-file.
    pub fn stop(&mut self) {
        if self.streaming {
            debug!("requesting reader stop");
            self.readers_stop.store(true, Ordering::Relaxed);
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(handle) = slot.thread.take() {
                if handle.join().is_err() {
                    error!("reader {index} panicked");
                }
            }
        }

        // Readers are joined, so the merger exits only once every local
        // queue has been drained.
        self.merger_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.merger.take() {
            if handle.join().is_err() {
                error!("merger panicked");
            }
        }

        self.tasks.stop();
        debug!("all reader stages stopped, {} records merged", self.total_tasks());
    }
}

/// Forward records from the local queues to the global queue in
/// minimum-timestamp order until stopped and drained.
fn merge_loop(locals: &[Arc<RecordQueue>], tasks: &RecordQueue, stop: &AtomicBool) {
    loop {
        let mut best: Option<(usize, i64)> = None;
        for (index, queue) in locals.iter().enumerate() {
            if let Some(ts) = queue.peek_ts() {
                // Strict comparison keeps the lowest index on equal stamps
                match best {
                    Some((_, best_ts)) if best_ts <= ts => {}
                    _ => best = Some((index, ts)),
                }
            }
        }

        match best {
            Some((index, _)) => {
                // The merger is the only consumer of local queues, so the
                // peeked head is still there.
                if let Some(record) = locals[index].try_pop() {
                    tasks.push(record);
                }
            }
            None => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(MERGE_IDLE);
            }
        }
    }
}
