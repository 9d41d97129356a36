//! Simulated sensor
//!
//! Implements the `Sensor` contract. Frames are produced on a background
//! thread (synthetic or replayed) or injected manually, and are delivered
//! through the callback handed to `start`, consistent with real sensor
//! behavior.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{
    ContractError, Format, Frame, FrameCallback, Result, Sensor, StreamKey, StreamProfile,
    StreamType,
};
use tracing::{debug, info, trace, warn};

use crate::recorder::RecordedFrame;

/// Replay configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Playback speed multiplier (1.0 = original pacing)
    pub speed_multiplier: f64,

    /// Restart from the first frame when the recording ends
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            loop_playback: false,
        }
    }
}

/// Where a sensor's frames come from once started
#[derive(Debug, Clone)]
pub enum StreamMode {
    /// Frames only arrive through [`SimulatedSensor::inject`] / [`SimulatedSensor::emit`]
    Manual,
    /// Synthetic frames at each opened profile's frame rate
    Synthetic,
    /// Recorded frames replayed with their original timestamps
    Replay(ReplayConfig, Arc<Vec<RecordedFrame>>),
}

#[derive(Default)]
struct SensorState {
    opened: Vec<StreamProfile>,
    callback: Option<FrameCallback>,
    frame_numbers: HashMap<StreamKey, u64>,
    worker: Option<JoinHandle<()>>,
}

/// Simulated sensor
pub struct SimulatedSensor {
    name: String,
    profiles: Vec<StreamProfile>,
    mode: StreamMode,
    clock: Instant,
    connected: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    state: Mutex<SensorState>,
    open_attempts: AtomicU32,
    fail_opens: AtomicU32,
    fail_starts: AtomicU32,
}

impl SimulatedSensor {
    /// Create a manually driven sensor
    pub fn new(name: impl Into<String>, profiles: Vec<StreamProfile>) -> Self {
        Self {
            name: name.into(),
            profiles,
            mode: StreamMode::Manual,
            clock: Instant::now(),
            connected: Arc::new(AtomicBool::new(true)),
            streaming: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(SensorState::default()),
            open_attempts: AtomicU32::new(0),
            fail_opens: AtomicU32::new(0),
            fail_starts: AtomicU32::new(0),
        }
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    /// Share the owning device's clock and connection flag
    pub(crate) fn attach(mut self, clock: Instant, connected: Arc<AtomicBool>) -> Self {
        self.clock = clock;
        self.connected = connected;
        self
    }

    /// Make the next `count` calls to `open` fail
    pub fn fail_next_opens(&self, count: u32) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `start` fail
    pub fn fail_next_starts(&self, count: u32) {
        self.fail_starts.store(count, Ordering::SeqCst);
    }

    /// Number of `open` calls so far, failed ones included
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts.load(Ordering::SeqCst)
    }

    /// Profiles currently opened
    pub fn opened_profiles(&self) -> Vec<StreamProfile> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Deliver a frame through the active callback.
    ///
    /// Returns `false` if the sensor is not streaming or the device is disconnected.
    pub fn inject(&self, frame: Frame) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let callback = {
            let state = self.state.lock().unwrap();
            match (&state.callback, self.streaming.load(Ordering::SeqCst)) {
                (Some(cb), true) => cb.clone(),
                _ => return false,
            }
        };
        callback(frame);
        true
    }

    /// Synthesize and deliver one frame of the opened profile with `key`.
    pub fn emit(&self, key: StreamKey, timestamp: f64) -> bool {
        let frame = {
            let mut state = self.state.lock().unwrap();
            let Some(profile) = state.opened.iter().find(|p| p.key() == key).copied() else {
                return false;
            };
            let number = state.frame_numbers.entry(key).or_insert(0);
            *number += 1;
            Frame::new(profile, *number, timestamp, synthetic_payload(&profile))
        };
        self.inject(frame)
    }

    fn consume_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn spawn_worker(&self, opened: Vec<StreamProfile>, callback: FrameCallback) -> Option<JoinHandle<()>> {
        let name = self.name.clone();
        let streaming = self.streaming.clone();
        let connected = self.connected.clone();

        match &self.mode {
            StreamMode::Manual => None,
            StreamMode::Synthetic => {
                let clock = self.clock;
                Some(thread::spawn(move || {
                    run_synthetic(&name, opened, clock, &streaming, &connected, callback)
                }))
            }
            StreamMode::Replay(config, records) => {
                let config = config.clone();
                let records = records.clone();
                Some(thread::spawn(move || {
                    run_replay(&name, &records, &opened, &config, &streaming, &connected, callback)
                }))
            }
        }
    }
}

impl Sensor for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream_profiles(&self) -> Vec<StreamProfile> {
        self.profiles.clone()
    }

    fn open(&self, profiles: &[StreamProfile]) -> Result<()> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.connected.load(Ordering::SeqCst) {
            return Err(ContractError::backend(&self.name, "device disconnected"));
        }
        if Self::consume_failure(&self.fail_opens) {
            return Err(ContractError::backend(&self.name, "injected open failure"));
        }
        if profiles.is_empty() {
            return Err(ContractError::invalid_value("no stream profiles to open"));
        }
        if let Some(unsupported) = profiles.iter().find(|p| !self.profiles.contains(p)) {
            return Err(ContractError::invalid_value(format!(
                "profile {unsupported} is not supported by sensor '{}'",
                self.name
            )));
        }

        let mut state = self.state.lock().unwrap();
        if !state.opened.is_empty() {
            return Err(ContractError::backend(&self.name, "sensor already opened"));
        }
        state.opened = profiles.to_vec();
        debug!(sensor = %self.name, profiles = profiles.len(), "sensor opened");
        Ok(())
    }

    fn start(&self, callback: FrameCallback) -> Result<()> {
        if Self::consume_failure(&self.fail_starts) {
            return Err(ContractError::backend(&self.name, "injected start failure"));
        }

        let mut state = self.state.lock().unwrap();
        if state.opened.is_empty() {
            return Err(ContractError::backend(&self.name, "sensor not opened"));
        }
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Err(ContractError::backend(&self.name, "sensor already streaming"));
        }

        state.callback = Some(callback.clone());
        state.worker = self.spawn_worker(state.opened.clone(), callback);
        debug!(sensor = %self.name, mode = ?self.mode_name(), "sensor started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.streaming.store(false, Ordering::SeqCst);

        let worker = {
            let mut state = self.state.lock().unwrap();
            state.callback = None;
            state.worker.take()
        };

        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!(sensor = %self.name, "streaming thread panicked");
            }
            debug!(sensor = %self.name, "sensor stopped");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.is_streaming() {
            self.stop()?;
        }
        let mut state = self.state.lock().unwrap();
        state.opened.clear();
        state.frame_numbers.clear();
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

impl SimulatedSensor {
    fn mode_name(&self) -> &'static str {
        match self.mode {
            StreamMode::Manual => "manual",
            StreamMode::Synthetic => "synthetic",
            StreamMode::Replay(..) => "replay",
        }
    }
}

/// Zero-filled payload sized for the profile
pub(crate) fn synthetic_payload(profile: &StreamProfile) -> Bytes {
    match profile {
        StreamProfile::Video(p) => {
            let bpp = p.format.bytes_per_pixel().unwrap_or(1);
            Bytes::from(vec![0u8; p.width as usize * p.height as usize * bpp])
        }
        StreamProfile::Motion(p) => {
            let sample: &[f32] = match (p.format, p.stream) {
                (Format::SixDof, _) => &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
                (_, StreamType::Accel) => &[0.0, 0.0, 9.81],
                _ => &[0.0, 0.0, 0.0],
            };
            Bytes::from(sample.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>())
        }
    }
}

fn elapsed_ms(clock: Instant) -> f64 {
    clock.elapsed().as_secs_f64() * 1000.0
}

/// Next slot on the profile's period grid, so streams at the same rate share timestamps
fn next_slot(now_ms: f64, period_ms: f64) -> f64 {
    (now_ms / period_ms).ceil() * period_ms
}

fn run_synthetic(
    name: &str,
    profiles: Vec<StreamProfile>,
    clock: Instant,
    streaming: &AtomicBool,
    connected: &AtomicBool,
    callback: FrameCallback,
) {
    let payloads: Vec<Bytes> = profiles.iter().map(synthetic_payload).collect();
    let periods: Vec<f64> = profiles.iter().map(|p| p.frame_period_ms()).collect();
    let now = elapsed_ms(clock);
    let mut next_due: Vec<f64> = periods.iter().map(|p| next_slot(now, *p)).collect();
    let mut numbers = vec![0u64; profiles.len()];

    debug!(sensor = %name, streams = profiles.len(), "synthetic stream started");

    while streaming.load(Ordering::Relaxed) {
        let now = elapsed_ms(clock);
        for (i, profile) in profiles.iter().enumerate() {
            if now < next_due[i] {
                continue;
            }
            numbers[i] += 1;
            if connected.load(Ordering::Relaxed) {
                callback(Frame::new(*profile, numbers[i], next_due[i], payloads[i].clone()));
                trace!(sensor = %name, stream = %profile.key(), frame = numbers[i], "synthetic frame sent");
            }
            next_due[i] += periods[i];
            if next_due[i] < now {
                next_due[i] = next_slot(now, periods[i]);
            }
        }

        let earliest = next_due.iter().copied().fold(f64::INFINITY, f64::min);
        let wait_ms = (earliest - elapsed_ms(clock)).clamp(0.5, 50.0);
        thread::sleep(Duration::from_secs_f64(wait_ms / 1000.0));
    }

    debug!(sensor = %name, "synthetic stream stopped");
}

fn run_replay(
    name: &str,
    records: &[RecordedFrame],
    opened: &[StreamProfile],
    config: &ReplayConfig,
    streaming: &AtomicBool,
    connected: &AtomicBool,
    callback: FrameCallback,
) {
    let records: Vec<&RecordedFrame> = records
        .iter()
        .filter(|r| opened.contains(&r.profile))
        .collect();
    if records.is_empty() {
        warn!(sensor = %name, "no recorded frames for the opened profiles");
        return;
    }

    let speed = if config.speed_multiplier > 0.0 {
        config.speed_multiplier
    } else {
        1.0
    };

    loop {
        let start_time = Instant::now();
        let first_timestamp = records[0].timestamp;

        for record in &records {
            let offset = Duration::from_secs_f64(((record.timestamp - first_timestamp) / speed).max(0.0) / 1000.0);
            loop {
                if !streaming.load(Ordering::Relaxed) {
                    debug!(sensor = %name, "replay stopped");
                    return;
                }
                let elapsed = start_time.elapsed();
                if elapsed >= offset {
                    break;
                }
                thread::sleep((offset - elapsed).min(Duration::from_millis(10)));
            }

            if connected.load(Ordering::Relaxed) {
                let data = Bytes::from(vec![0u8; record.size]);
                callback(Frame::new(record.profile, record.frame_number, record.timestamp, data));
            }
        }

        if !config.loop_playback {
            info!(sensor = %name, frames = records.len(), "replay completed");
            return;
        }
        debug!(sensor = %name, "looping replay");
    }
}
