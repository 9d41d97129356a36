//! Pipeline metrics
//!
//! Thin recording helpers over the `metrics` facade plus an in-memory
//! aggregator for end-of-run summaries.

use std::collections::BTreeMap;
use std::fmt;

use contracts::FrameSet;
use metrics::{counter, gauge, histogram};

/// One {resolve → open → start} attempt finished (`ok`, `retry` or `failed`)
pub fn record_start_attempt(attempt: u32, outcome: &str) {
    counter!(
        "depthpipe_start_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    gauge!("depthpipe_start_last_attempt").set(f64::from(attempt));
}

/// A frame set reached the consumer
pub fn record_frameset_delivered(frames: usize) {
    counter!("depthpipe_framesets_delivered_total").increment(1);
    histogram!("depthpipe_frameset_size").record(frames as f64);
}

/// The consumer queue was full and a frame set was discarded
pub fn record_queue_overflow(policy: &str) {
    counter!(
        "depthpipe_queue_overflow_total",
        "policy" => policy.to_string()
    )
    .increment(1);
}

/// `wait_for_frames` timed out with the device still connected
pub fn record_wait_timeout() {
    counter!("depthpipe_wait_timeouts_total").increment(1);
}

/// Disconnect recovery finished
pub fn record_reconnect(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!(
        "depthpipe_reconnects_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// Delivery statistics accumulated by a consumer
#[derive(Debug, Clone, Default)]
pub struct DeliveryStats {
    pub framesets: u64,
    pub frames: u64,
    /// Sets missing at least one enabled stream
    pub incomplete: u64,
    pub per_stream: BTreeMap<String, u64>,
    /// Capture-time spacing between consecutive sets (ms)
    pub interval_ms: RunningStats,
    /// Capture-time spread inside one set (ms)
    pub spread_ms: RunningStats,
    last_timestamp: Option<f64>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one delivered set out of `enabled_streams` streams
    pub fn update(&mut self, set: &FrameSet, enabled_streams: usize) {
        self.framesets += 1;
        self.frames += set.len() as u64;
        if set.len() < enabled_streams {
            self.incomplete += 1;
        }

        for frame in set.frames() {
            *self.per_stream.entry(frame.key().to_string()).or_insert(0) += 1;
        }

        let timestamps = set.frames().iter().map(|f| f.timestamp);
        let earliest = timestamps.clone().fold(f64::INFINITY, f64::min);
        let latest = timestamps.fold(f64::NEG_INFINITY, f64::max);
        if earliest.is_finite() {
            self.spread_ms.push(latest - earliest);
            if let Some(previous) = self.last_timestamp {
                self.interval_ms.push(earliest - previous);
            }
            self.last_timestamp = Some(earliest);
        }
    }

    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            framesets: self.framesets,
            frames: self.frames,
            incomplete: self.incomplete,
            incomplete_rate: if self.framesets > 0 {
                self.incomplete as f64 / self.framesets as f64 * 100.0
            } else {
                0.0
            },
            per_stream: self.per_stream.clone(),
            interval_ms: StatsSummary::from(&self.interval_ms),
            spread_ms: StatsSummary::from(&self.spread_ms),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Printable delivery summary
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub framesets: u64,
    pub frames: u64,
    pub incomplete: u64,
    pub incomplete_rate: f64,
    pub per_stream: BTreeMap<String, u64>,
    pub interval_ms: StatsSummary,
    pub spread_ms: StatsSummary,
}

impl fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Frame sets: {}", self.framesets)?;
        writeln!(f, "Frames: {}", self.frames)?;
        writeln!(
            f,
            "Incomplete sets: {} ({:.2}%)",
            self.incomplete, self.incomplete_rate
        )?;
        writeln!(f, "Set interval (ms): {}", self.interval_ms)?;
        writeln!(f, "Set spread (ms): {}", self.spread_ms)?;
        if !self.per_stream.is_empty() {
            writeln!(f, "Frames per stream:")?;
            for (stream, count) in &self.per_stream {
                writeln!(f, "  {stream}: {count}")?;
            }
        }
        Ok(())
    }
}

/// Summary of a [`RunningStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return f.write_str("N/A");
        }
        write!(
            f,
            "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                mean: value,
                m2: 0.0,
                min: value,
                max: value,
            };
            return;
        }

        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
