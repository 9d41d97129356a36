//! Frame - producer output, FrameSet - Synchronizer output
//!
//! A `Frame` is an ownership-transferring handle: it is intentionally not
//! `Clone` and is moved from the sensor callback into the Synchronizer and
//! from there into the consumer queue.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{StreamKey, StreamProfile, StreamType};

/// Clock a frame timestamp was taken from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampDomain {
    /// Device hardware clock
    #[default]
    HardwareClock,
    /// Host system time
    SystemTime,
}

/// One captured unit of sensor data
#[derive(Debug)]
pub struct Frame {
    /// Profile the frame was produced with
    pub profile: StreamProfile,

    /// Per-stream sequence number
    pub frame_number: u64,

    /// Capture timestamp (milliseconds)
    pub timestamp: f64,

    /// Timestamp clock
    pub domain: TimestampDomain,

    /// Raw sample data (zero-copy)
    pub data: Bytes,
}

impl Frame {
    pub fn new(profile: StreamProfile, frame_number: u64, timestamp: f64, data: Bytes) -> Self {
        Self {
            profile,
            frame_number,
            timestamp,
            domain: TimestampDomain::default(),
            data,
        }
    }

    pub fn stream(&self) -> StreamType {
        self.profile.stream()
    }

    pub fn key(&self) -> StreamKey {
        self.profile.key()
    }
}

/// Time-correlated group of frames from distinct streams
#[derive(Debug, Default)]
pub struct FrameSet {
    /// Frames ordered by stream key
    frames: Vec<Frame>,
}

impl FrameSet {
    /// Build a set; frames are ordered by stream key
    pub fn new(mut frames: Vec<Frame>) -> Self {
        frames.sort_by_key(|f| f.key());
        Self { frames }
    }

    /// Set holding a single frame
    pub fn single(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// First frame of the given stream type
    pub fn first_or_default(&self, stream: StreamType) -> Option<&Frame> {
        self.frames.iter().find(|f| f.stream() == stream)
    }

    pub fn depth_frame(&self) -> Option<&Frame> {
        self.first_or_default(StreamType::Depth)
    }

    pub fn color_frame(&self) -> Option<&Frame> {
        self.first_or_default(StreamType::Color)
    }

    /// Earliest capture timestamp in the set
    pub fn timestamp(&self) -> Option<f64> {
        self.frames.iter().map(|f| f.timestamp).reduce(f64::min)
    }

    pub fn keys(&self) -> Vec<StreamKey> {
        self.frames.iter().map(|f| f.key()).collect()
    }
}

/// Producer-side per-frame hook
///
/// Invoked on a producer-owned thread; implementations must not block.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Synchronizer output hook
pub type FrameSetCallback = Arc<dyn Fn(FrameSet) + Send + Sync>;
