//! Bounded consumer queue behind the Synchronizer
//!
//! The producer side never blocks: on overflow the configured policy decides
//! which frame set is discarded. `DropOldest` pops from the receiving end
//! (crossbeam receivers are clonable) before retrying the send.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{FrameSet, OverflowPolicy, QueueConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{trace, warn};

/// Queue counters
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub enqueued: AtomicU64,
    pub dropped: AtomicU64,
    pub delivered: AtomicU64,
    pub queue_len: AtomicUsize,
}

impl QueueMetrics {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub queue_len: usize,
}

/// Producer + consumer ends of one session's queue
pub struct FrameQueue {
    tx: Sender<FrameSet>,
    rx: Receiver<FrameSet>,
    policy: OverflowPolicy,
    metrics: Arc<QueueMetrics>,
}

impl FrameQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let (tx, rx) = bounded(config.capacity.max(1));
        Self {
            tx,
            rx,
            policy: config.overflow,
            metrics: Arc::new(QueueMetrics::default()),
        }
    }

    /// Non-blocking push. Returns `false` when a frame set was discarded.
    pub fn push(&self, set: FrameSet) -> bool {
        let set = match self.tx.try_send(set) {
            Ok(()) => return self.enqueued(),
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(set)) => set,
        };

        self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_queue_overflow(policy_name(self.policy));

        match self.policy {
            OverflowPolicy::DropNewest => {
                warn!(policy = "drop_newest", "frame queue full, incoming frame set dropped");
                false
            }
            OverflowPolicy::DropOldest => {
                let _ = self.rx.try_recv();
                warn!(policy = "drop_oldest", "frame queue full, oldest frame set dropped");
                // A concurrent producer may have refilled the slot
                match self.tx.try_send(set) {
                    Ok(()) => {
                        self.enqueued();
                        false
                    }
                    Err(_) => {
                        self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                        false
                    }
                }
            }
        }
    }

    /// Consumer handle that does not keep the queue alive
    pub fn consumer(&self) -> FrameConsumer {
        FrameConsumer {
            rx: self.rx.clone(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn try_pop(&self) -> Option<FrameSet> {
        self.consumer().try_pop()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.metrics.queue_len.store(self.rx.len(), Ordering::Relaxed);
        self.metrics.snapshot()
    }

    fn enqueued(&self) -> bool {
        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        self.metrics.queue_len.store(self.rx.len(), Ordering::Relaxed);
        trace!(len = self.rx.len(), "frame set queued");
        true
    }
}

/// Why a blocking wait returned empty-handed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    TimedOut,
    /// Every producer handle is gone (the session was torn down)
    Closed,
}

/// Receiving end used by blocked waiters
#[derive(Clone)]
pub struct FrameConsumer {
    rx: Receiver<FrameSet>,
    metrics: Arc<QueueMetrics>,
}

impl FrameConsumer {
    pub fn wait(&self, timeout: Duration) -> Result<FrameSet, WaitOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(set) => Ok(self.delivered(set)),
            Err(RecvTimeoutError::Timeout) => Err(WaitOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(WaitOutcome::Closed),
        }
    }

    pub fn try_pop(&self) -> Option<FrameSet> {
        self.rx.try_recv().ok().map(|set| self.delivered(set))
    }

    fn delivered(&self, set: FrameSet) -> FrameSet {
        self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
        self.metrics.queue_len.store(self.rx.len(), Ordering::Relaxed);
        observability::metrics::record_frameset_delivered(set.len());
        set
    }
}

fn policy_name(policy: OverflowPolicy) -> &'static str {
    match policy {
        OverflowPolicy::DropOldest => "drop_oldest",
        OverflowPolicy::DropNewest => "drop_newest",
    }
}
