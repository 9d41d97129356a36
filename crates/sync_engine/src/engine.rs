//! Timestamp-proximity grouping engine.
//!
//! Single-threaded core: callers own it behind `&mut`. The thread-safe
//! callback front end is [`Synchronizer`](crate::Synchronizer).

use std::collections::BTreeMap;

use contracts::{Frame, FrameSet, StreamKey, StreamProfile, SyncConfig};
use tracing::{debug, instrument, trace};

use crate::buffer::FrameBuffer;

const DEFAULT_FRAME_PERIOD_MS: f64 = 1000.0 / 30.0;
const MIN_WINDOW_FLOOR_MS: f64 = 5.0;

/// Sync engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// No frames in buffers
    Idle,
    /// Some enabled streams have no data yet
    Buffering,
    /// Every enabled stream has data
    Ready,
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub frames_in: u64,
    pub framesets_out: u64,
    pub frames_dropped: u64,
    pub out_of_order: u64,
    pub buffered: usize,
}

/// Groups frames of the enabled streams by capture timestamp.
///
/// The reference instant is the earliest buffered timestamp. A group is
/// emitted for it once every enabled stream has data, or once any buffered
/// frame is newer than the reference by more than the matching window (the
/// instant has passed; lagging streams are left out). Each group takes, per
/// stream, the frame closest to the reference within the window.
#[derive(Debug)]
pub struct SyncEngine {
    enabled: Vec<StreamKey>,
    buffers: BTreeMap<StreamKey, FrameBuffer>,
    buffer_size: usize,
    window_ms: f64,
    state: SyncState,
    frames_in: u64,
    framesets_out: u64,
    frames_dropped: u64,
}

impl SyncEngine {
    /// Create an engine for the given active stream profiles
    pub fn new(profiles: &[StreamProfile], config: &SyncConfig) -> Self {
        let mut enabled: Vec<StreamKey> = profiles.iter().map(|p| p.key()).collect();
        enabled.sort();
        enabled.dedup();

        let window_ms = derive_window_ms(profiles, config);
        let buffers = enabled
            .iter()
            .map(|key| (*key, FrameBuffer::new(config.buffer_size)))
            .collect();

        debug!(streams = enabled.len(), window_ms, "sync engine created");

        Self {
            enabled,
            buffers,
            buffer_size: config.buffer_size,
            window_ms,
            state: SyncState::Idle,
            frames_in: 0,
            framesets_out: 0,
            frames_dropped: 0,
        }
    }

    /// Matching window (milliseconds)
    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }

    /// Push a frame; returns every frame set that became complete
    #[instrument(
        level = "trace",
        name = "sync_engine_push",
        skip(self, frame),
        fields(stream = %frame.key(), timestamp = frame.timestamp)
    )]
    pub fn push(&mut self, frame: Frame) -> Vec<FrameSet> {
        self.frames_in += 1;
        let key = frame.key();
        let buffer_size = self.buffer_size;

        let buffer = self
            .buffers
            .entry(key)
            .or_insert_with(|| FrameBuffer::new(buffer_size));
        if let Some(evicted) = buffer.push(frame) {
            self.frames_dropped += 1;
            metrics::counter!("sync_frames_dropped_total", "stream" => key.to_string()).increment(1);
            trace!(stream = %key, frame = evicted.frame_number, "buffer full, oldest frame dropped");
        }

        self.update_state();

        let mut out = Vec::new();
        while let Some(set) = self.try_sync() {
            out.push(set);
        }
        out
    }

    /// Emit everything still buffered, grouped the same way
    pub fn flush(&mut self) -> Vec<FrameSet> {
        let mut out = Vec::new();
        while let Some(t_ref) = self.reference_timestamp() {
            out.push(self.collect(t_ref));
        }
        out
    }

    /// Drop every buffered frame
    pub fn clear(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.drain();
        }
        self.update_state();
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            frames_in: self.frames_in,
            framesets_out: self.framesets_out,
            frames_dropped: self.frames_dropped,
            out_of_order: self.buffers.values().map(|b| b.out_of_order_count()).sum(),
            buffered: self.buffers.values().map(|b| b.len()).sum(),
        }
    }

    fn update_state(&mut self) {
        self.state = if self.buffers.values().all(|b| b.is_empty()) {
            SyncState::Idle
        } else if self.all_enabled_have_data() {
            SyncState::Ready
        } else {
            SyncState::Buffering
        };
    }

    fn all_enabled_have_data(&self) -> bool {
        self.enabled
            .iter()
            .all(|key| self.buffers.get(key).is_some_and(|b| !b.is_empty()))
    }

    fn reference_timestamp(&self) -> Option<f64> {
        self.buffers
            .values()
            .filter_map(|b| b.earliest_timestamp())
            .reduce(f64::min)
    }

    fn latest_timestamp(&self) -> Option<f64> {
        self.buffers
            .values()
            .filter_map(|b| b.latest_timestamp())
            .reduce(f64::max)
    }

    fn try_sync(&mut self) -> Option<FrameSet> {
        let t_ref = self.reference_timestamp()?;
        match self.state {
            SyncState::Idle => None,
            SyncState::Ready => Some(self.collect(t_ref)),
            SyncState::Buffering => {
                let latest = self.latest_timestamp()?;
                if latest - t_ref > self.window_ms {
                    Some(self.collect(t_ref))
                } else {
                    None
                }
            }
        }
    }

    /// Take, per stream, the frame closest to `t_ref` within the window.
    /// The reference frame itself always qualifies, so every call makes progress.
    fn collect(&mut self, t_ref: f64) -> FrameSet {
        let window = self.window_ms;
        let frames: Vec<Frame> = self
            .buffers
            .values_mut()
            .filter_map(|b| b.take_closest(t_ref, window))
            .collect();

        self.framesets_out += 1;
        metrics::counter!("sync_framesets_total").increment(1);
        if !self.enabled.is_empty() {
            let completeness = frames.len() as f64 / self.enabled.len() as f64;
            metrics::histogram!("sync_completeness_ratio").record(completeness.min(1.0));
        }
        trace!(t_ref, frames = frames.len(), "frame set emitted");

        self.update_state();
        FrameSet::new(frames)
    }
}

/// Matching window: the configured value, or half the longest frame period
/// of the enabled streams, capped at `max_window_ms` and floored at 5ms.
pub fn derive_window_ms(profiles: &[StreamProfile], config: &SyncConfig) -> f64 {
    if let Some(window) = config.window_ms {
        return window;
    }

    let max_period = profiles
        .iter()
        .map(|p| p.frame_period_ms())
        .fold(0.0, f64::max);
    let base = if max_period > 0.0 {
        max_period / 2.0
    } else {
        DEFAULT_FRAME_PERIOD_MS / 2.0
    };

    base.min(config.max_window_ms).max(MIN_WINDOW_FLOOR_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Format, MotionStreamProfile, StreamType, VideoStreamProfile};

    fn video(stream: StreamType, fps: u32) -> StreamProfile {
        StreamProfile::Video(VideoStreamProfile {
            stream,
            index: 0,
            width: 4,
            height: 4,
            format: Format::Z16,
            fps,
            is_default: true,
        })
    }

    fn gyro() -> StreamProfile {
        StreamProfile::Motion(MotionStreamProfile {
            stream: StreamType::Gyro,
            index: 0,
            format: Format::MotionXyz32f,
            fps: 200,
            is_default: true,
        })
    }

    fn frame(profile: StreamProfile, number: u64, timestamp: f64) -> Frame {
        Frame::new(profile, number, timestamp, Bytes::new())
    }

    #[test]
    fn test_derived_window() {
        let config = SyncConfig::default();
        let window = derive_window_ms(&[video(StreamType::Depth, 30), gyro()], &config);
        assert!((window - 1000.0 / 60.0).abs() < 1e-9);

        let slow = derive_window_ms(&[video(StreamType::Depth, 6)], &config);
        assert_eq!(slow, 50.0);

        let fast = derive_window_ms(&[gyro()], &config);
        assert_eq!(fast, 5.0);

        let fixed = SyncConfig {
            window_ms: Some(8.0),
            ..SyncConfig::default()
        };
        assert_eq!(derive_window_ms(&[gyro()], &fixed), 8.0);
    }

    #[test]
    fn test_single_stream_passes_through() {
        let depth = video(StreamType::Depth, 30);
        let mut engine = SyncEngine::new(&[depth], &SyncConfig::default());

        let sets = engine.push(frame(depth, 1, 100.0));
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 1);
        assert_eq!(engine.stats().buffered, 0);
    }

    #[test]
    fn test_groups_matching_timestamps() {
        let depth = video(StreamType::Depth, 30);
        let color = video(StreamType::Color, 30);
        let mut engine = SyncEngine::new(&[depth, color], &SyncConfig::default());

        assert!(engine.push(frame(depth, 1, 100.0)).is_empty());
        let sets = engine.push(frame(color, 1, 101.0));

        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.len(), 2);
        assert!(set.depth_frame().is_some());
        assert!(set.color_frame().is_some());
    }

    #[test]
    fn test_lone_frame_forwarded_after_window() {
        let depth = video(StreamType::Depth, 30);
        let color = video(StreamType::Color, 30);
        let mut engine = SyncEngine::new(&[depth, color], &SyncConfig::default());

        assert!(engine.push(frame(depth, 1, 100.0)).is_empty());
        let sets = engine.push(frame(depth, 2, 133.3));

        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 1);
        assert_eq!(sets[0].frames()[0].frame_number, 1);
        assert_eq!(engine.stats().buffered, 1);
    }

    #[test]
    fn test_far_apart_frames_not_grouped() {
        let depth = video(StreamType::Depth, 30);
        let color = video(StreamType::Color, 30);
        let mut engine = SyncEngine::new(&[depth, color], &SyncConfig::default());

        engine.push(frame(depth, 1, 100.0));
        let sets = engine.push(frame(color, 1, 160.0));

        // depth@100 alone, color@160 stays buffered waiting for its depth
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].keys(), vec![depth.key()]);
        assert_eq!(engine.stats().buffered, 1);
    }

    #[test]
    fn test_flush_drains_everything() {
        let depth = video(StreamType::Depth, 30);
        let color = video(StreamType::Color, 30);
        let mut engine = SyncEngine::new(&[depth, color], &SyncConfig::default());

        engine.push(frame(depth, 1, 100.0));
        let sets = engine.flush();
        assert_eq!(sets.len(), 1);
        assert_eq!(engine.stats().buffered, 0);
        assert_eq!(engine.stats().framesets_out, 1);
    }

    #[test]
    fn test_buffer_overflow_counts_drops() {
        let depth = video(StreamType::Depth, 30);
        let color = video(StreamType::Color, 30);
        let config = SyncConfig {
            buffer_size: 2,
            window_ms: Some(1000.0),
            ..SyncConfig::default()
        };
        let mut engine = SyncEngine::new(&[depth, color], &config);

        // wide window: depth frames keep waiting for a color counterpart
        engine.push(frame(depth, 1, 0.0));
        engine.push(frame(depth, 2, 1.0));
        engine.push(frame(depth, 3, 2.0));

        let stats = engine.stats();
        assert_eq!(stats.frames_in, 3);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.buffered, 2);
    }
}
