//! Transform workers and their completion signals.
//!
//! A worker owns one [`Fragment`] and XORs it in place against the key,
//! indexed by absolute payload position so the result does not depend on
//! where fragment boundaries fall. When it is done it fires a one-shot
//! completion signal that the coordinator waits on.

use crate::planner::Fragment;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What a worker reports when it finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Fragment index
    pub index: usize,
    /// First byte processed
    pub start: usize,
    /// One past the last byte processed
    pub end: usize,
    /// Time spent transforming
    pub elapsed: Duration,
}

impl WorkerReport {
    /// Bytes processed by this worker
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.end - self.start
    }
}

/// XOR `data` against `key`, where `data[0]` sits at absolute `offset`
///
/// Byte `i` of `data` is combined with `key[(offset + i) % key.len()]`. An
/// empty key leaves `data` untouched.
///
/// # Example
///
/// ```
/// use xorshard_core::xor_range;
///
/// let mut tail = [0x00u8, 0x00];
/// xor_range(&mut tail, 3, &[1, 2, 3]);
/// assert_eq!(tail, [1, 2]);
/// ```
pub fn xor_range(data: &mut [u8], offset: usize, key: &[u8]) {
    if key.is_empty() {
        return;
    }
    let phase = offset % key.len();
    for (byte, k) in data.iter_mut().zip(key.iter().cycle().skip(phase)) {
        *byte ^= k;
    }
}

/// Single-threaded transform of a whole buffer
///
/// Produces exactly what a job produces for any thread count.
pub fn transform_in_place(data: &mut [u8], key: &[u8]) {
    xor_range(data, 0, key);
}

/// Run one fragment to completion on the current thread
pub fn run_fragment(fragment: Fragment<'_>) -> WorkerReport {
    let range = fragment.range();
    debug!(
        "Worker {} started: start_idx={}, end_idx={}",
        range.index, range.start, range.end
    );

    let started = Instant::now();
    let (data, offset, key) = fragment.into_parts();
    xor_range(data, offset, key);
    let elapsed = started.elapsed();

    debug!(
        "Worker {} finished: {} bytes in {:?}",
        range.index,
        range.len(),
        elapsed
    );

    WorkerReport {
        index: range.index,
        start: range.start,
        end: range.end,
        elapsed,
    }
}

/// Worker side of a completion signal
///
/// Consumed on use, so a worker can signal at most once.
#[derive(Debug)]
pub(crate) struct CompletionSignal {
    index: usize,
    tx: Sender<WorkerReport>,
}

impl CompletionSignal {
    pub(crate) fn complete(self, report: WorkerReport) {
        if self.tx.send(report).is_err() {
            warn!("Worker {} completed but its waiter is gone", self.index);
        }
    }
}

/// Coordinator side of a completion signal
#[derive(Debug)]
pub(crate) struct CompletionWaiter {
    index: usize,
    rx: Receiver<WorkerReport>,
}

impl CompletionWaiter {
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Block until the worker signals; `None` if it died without signaling
    pub(crate) fn wait(&self) -> Option<WorkerReport> {
        self.rx.recv().ok()
    }
}

/// Create a single-writer, single-reader completion signal for one worker
pub(crate) fn completion_signal(index: usize) -> (CompletionSignal, CompletionWaiter) {
    let (tx, rx) = bounded(1);
    (
        CompletionSignal { index, tx },
        CompletionWaiter { index, rx },
    )
}
