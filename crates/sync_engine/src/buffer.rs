//! Per-stream frame buffer with timestamp-based selection.
//!
//! Uses index-based separation:
//! - HeapRb stores lightweight metadata (timestamp + slab key)
//! - Slab stores the owned `Frame`
//!
//! Frames are never cloned; selection removes them from the buffer.

use std::fmt;

use contracts::Frame;
use ringbuf::{traits::*, HeapRb};
use slab::Slab;

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    timestamp: f64,
    slab_key: usize,
}

/// Per-stream buffer, drop-oldest when full
pub struct FrameBuffer {
    index: HeapRb<FrameMeta>,
    storage: Slab<Frame>,
    max_size: usize,
    dropped_count: u64,
    out_of_order_count: u64,
    last_timestamp: Option<f64>,
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.index.occupied_len())
            .field("max_size", &self.max_size)
            .field("dropped", &self.dropped_count)
            .finish()
    }
}

impl FrameBuffer {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            index: HeapRb::new(max_size),
            storage: Slab::with_capacity(max_size),
            max_size,
            dropped_count: 0,
            out_of_order_count: 0,
            last_timestamp: None,
        }
    }

    /// Push a frame. If the buffer is full the oldest frame is dropped
    /// and returned.
    #[inline]
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let timestamp = frame.timestamp;

        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                self.out_of_order_count += 1;
            }
        }
        self.last_timestamp = Some(timestamp);

        let evicted = if self.index.is_full() {
            self.dropped_count += 1;
            self.index
                .try_pop()
                .map(|old| self.storage.remove(old.slab_key))
        } else {
            None
        };

        let slab_key = self.storage.insert(frame);
        let _ = self.index.try_push(FrameMeta {
            timestamp,
            slab_key,
        });
        evicted
    }

    /// Earliest buffered timestamp
    #[inline]
    pub fn earliest_timestamp(&self) -> Option<f64> {
        self.index.iter().map(|m| m.timestamp).reduce(f64::min)
    }

    /// Latest buffered timestamp
    #[inline]
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.index.iter().map(|m| m.timestamp).reduce(f64::max)
    }

    /// Remove and return the frame closest to `target` with `|t - target| <= tolerance`
    pub fn take_closest(&mut self, target: f64, tolerance: f64) -> Option<Frame> {
        let position = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, m)| (m.timestamp - target).abs() <= tolerance)
            .min_by(|(_, a), (_, b)| {
                (a.timestamp - target)
                    .abs()
                    .total_cmp(&(b.timestamp - target).abs())
            })
            .map(|(i, _)| i)?;

        Some(self.remove_at(position))
    }

    /// Remove and return the earliest frame
    pub fn pop_earliest(&mut self) -> Option<Frame> {
        let position = self
            .index
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.timestamp.total_cmp(&b.timestamp))
            .map(|(i, _)| i)?;

        Some(self.remove_at(position))
    }

    /// Remove every buffered frame, earliest first
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut metas: Vec<FrameMeta> = self.index.pop_iter().collect();
        metas.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        metas
            .into_iter()
            .map(|m| self.storage.remove(m.slab_key))
            .collect()
    }

    /// Remove the entry at ring position `position`, rebuilding the index
    /// (only small metadata moves, never payloads)
    fn remove_at(&mut self, position: usize) -> Frame {
        let mut metas: Vec<FrameMeta> = self.index.pop_iter().collect();
        let removed = metas.remove(position);
        for m in metas {
            let _ = self.index.try_push(m);
        }
        self.storage.remove(removed.slab_key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Format, StreamProfile, StreamType, VideoStreamProfile};

    fn make_frame(number: u64, timestamp: f64) -> Frame {
        let profile = StreamProfile::Video(VideoStreamProfile {
            stream: StreamType::Depth,
            index: 0,
            width: 2,
            height: 2,
            format: Format::Z16,
            fps: 30,
            is_default: true,
        });
        Frame::new(profile, number, timestamp, Bytes::new())
    }

    #[test]
    fn test_pop_earliest_order() {
        let mut buffer = FrameBuffer::new(10);

        buffer.push(make_frame(1, 3.0));
        buffer.push(make_frame(2, 1.0));
        buffer.push(make_frame(3, 2.0));

        assert_eq!(buffer.pop_earliest().unwrap().timestamp, 1.0);
        assert_eq!(buffer.pop_earliest().unwrap().timestamp, 2.0);
        assert_eq!(buffer.pop_earliest().unwrap().timestamp, 3.0);
        assert!(buffer.pop_earliest().is_none());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buffer = FrameBuffer::new(3);

        assert!(buffer.push(make_frame(1, 1.0)).is_none());
        buffer.push(make_frame(2, 2.0));
        buffer.push(make_frame(3, 3.0));
        let evicted = buffer.push(make_frame(4, 4.0)).unwrap();

        assert_eq!(evicted.frame_number, 1);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped_count(), 1);
        assert_eq!(buffer.earliest_timestamp(), Some(2.0));
        assert_eq!(buffer.latest_timestamp(), Some(4.0));
    }

    #[test]
    fn test_take_closest_within_tolerance() {
        let mut buffer = FrameBuffer::new(10);

        buffer.push(make_frame(1, 100.0));
        buffer.push(make_frame(2, 133.0));
        buffer.push(make_frame(3, 166.0));

        let closest = buffer.take_closest(130.0, 10.0).unwrap();
        assert_eq!(closest.frame_number, 2);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.take_closest(150.0, 10.0).is_none());
    }

    #[test]
    fn test_drain_is_ordered() {
        let mut buffer = FrameBuffer::new(4);
        buffer.push(make_frame(1, 5.0));
        buffer.push(make_frame(2, 1.0));

        let drained: Vec<_> = buffer.drain().iter().map(|f| f.frame_number).collect();
        assert_eq!(drained, vec![2, 1]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_out_of_order_detection() {
        let mut buffer = FrameBuffer::new(10);

        buffer.push(make_frame(1, 1.0));
        buffer.push(make_frame(2, 3.0));
        buffer.push(make_frame(3, 2.0));

        assert_eq!(buffer.out_of_order_count(), 1);
    }
}
