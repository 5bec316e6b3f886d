use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::{IoError, Operation, Result};

pub const DEFAULT_NR_HW_QUEUES: usize = 1;
pub const DEFAULT_QUEUE_DEPTH: u32 = 128;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub requests: u64,
    pub completed_ok: u64,
    pub io_errors: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// One hardware dispatch context.
///
/// A queue hands out at most `depth` in-flight slots; each request holds one slot from
/// submission until completion.
#[derive(Debug)]
pub struct HwQueue {
    index: usize,
    depth: u32,
    in_flight: AtomicU32,
    requests: AtomicU64,
    completed_ok: AtomicU64,
    io_errors: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl HwQueue {
    fn new(index: usize, depth: u32) -> Self {
        Self {
            index,
            depth,
            in_flight: AtomicU32::new(0),
            requests: AtomicU64::new(0),
            completed_ok: AtomicU64::new(0),
            io_errors: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            requests: self.requests.load(Ordering::Relaxed),
            completed_ok: self.completed_ok.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Claims an in-flight slot, failing with [`IoError::QueueFull`] at `depth`.
    pub(crate) fn start(&self) -> Result<InFlight<'_>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let claimed = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.depth).then_some(n + 1)
            });
        if claimed.is_err() {
            self.io_errors.fetch_add(1, Ordering::Relaxed);
            return Err(IoError::QueueFull {
                queue: self.index,
                depth: self.depth,
            });
        }
        Ok(InFlight { queue: self })
    }

    /// Records the bytes actually copied, including those of a request that failed part way.
    pub(crate) fn account(&self, op: Operation, bytes: u64, ok: bool) {
        match op {
            Operation::Read => self.bytes_read.fetch_add(bytes, Ordering::Relaxed),
            Operation::Write => self.bytes_written.fetch_add(bytes, Ordering::Relaxed),
            Operation::Flush | Operation::Discard => 0,
        };
        if ok {
            self.completed_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.io_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Slot held by a request in flight; released on drop.
pub(crate) struct InFlight<'a> {
    queue: &'a HwQueue,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The set of hardware queues allocated for a registered device.
#[derive(Debug)]
pub struct QueueSet {
    queues: Vec<HwQueue>,
}

impl QueueSet {
    pub fn new(nr_hw_queues: usize, depth: u32) -> Self {
        Self {
            queues: (0..nr_hw_queues).map(|i| HwQueue::new(i, depth)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&HwQueue> {
        self.queues.get(index).ok_or(IoError::NoSuchQueue {
            queue: index,
            count: self.queues.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &HwQueue> {
        self.queues.iter()
    }

    /// Sum of the statistics of every queue.
    pub fn total_stats(&self) -> QueueStats {
        self.queues
            .iter()
            .map(HwQueue::stats)
            .fold(QueueStats::default(), |acc, s| QueueStats {
                requests: acc.requests + s.requests,
                completed_ok: acc.completed_ok + s.completed_ok,
                io_errors: acc.io_errors + s.io_errors,
                bytes_read: acc.bytes_read + s.bytes_read,
                bytes_written: acc.bytes_written + s.bytes_written,
            })
    }
}
