//! Thread-safe Synchronizer front end.
//!
//! Sits between the device-level per-frame callback and the consumer queue.
//! The engine lock is only held while buffering and grouping; output
//! callbacks run after it is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{Frame, FrameCallback, FrameSetCallback, StreamProfile, SyncConfig};

use crate::engine::{SyncEngine, SyncStats};

pub struct Synchronizer {
    engine: Mutex<SyncEngine>,
    output: FrameSetCallback,
}

impl Synchronizer {
    pub fn new(profiles: &[StreamProfile], config: &SyncConfig, output: FrameSetCallback) -> Self {
        Self {
            engine: Mutex::new(SyncEngine::new(profiles, config)),
            output,
        }
    }

    /// Synchronizer input hook
    pub fn push(&self, frame: Frame) {
        let sets = self.engine().push(frame);
        for set in sets {
            (self.output)(set);
        }
    }

    /// Per-frame callback feeding this synchronizer
    pub fn frame_callback(self: &Arc<Self>) -> FrameCallback {
        let this = Arc::clone(self);
        Arc::new(move |frame: Frame| this.push(frame))
    }

    /// Emit everything still buffered
    pub fn flush(&self) {
        let sets = self.engine().flush();
        for set in sets {
            (self.output)(set);
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.engine().stats()
    }

    pub fn window_ms(&self) -> f64 {
        self.engine().window_ms()
    }

    fn engine(&self) -> MutexGuard<'_, SyncEngine> {
        // A panicking output callback must not wedge the producer thread
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
