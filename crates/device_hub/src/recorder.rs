//! Recording decorator
//!
//! `JsonlRecorder` wraps a device so that every frame its sensors stream is
//! logged to a JSONL file before being forwarded. The first line is the
//! device description; each following line is one frame's metadata.
//!
//! The file is created when the first recording sensor starts, so wrapping
//! a device (as resolution does) never touches the disk.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use contracts::{
    CameraInfo, Device, Frame, FrameCallback, RecordingFactory, Sensor, StreamProfile,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::description::DeviceDescription;
use crate::error::{DeviceHubError, Result};

/// Metadata of one recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Sensor index on the recorded device
    pub sensor: usize,
    pub profile: StreamProfile,
    pub frame_number: u64,
    pub timestamp: f64,
    /// Payload size in bytes
    pub size: usize,
}

/// One line of a recording
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RecordEntry {
    Header(DeviceDescription),
    Frame(RecordedFrame),
}

/// Append-only JSONL frame log, created on first [`open`](Self::open)
pub struct JsonlFrameLog {
    path: PathBuf,
    header: DeviceDescription,
    writer: Mutex<Option<BufWriter<File>>>,
    frames_written: AtomicU64,
}

impl JsonlFrameLog {
    pub fn new(path: &Path, header: DeviceDescription) -> Self {
        Self {
            path: path.to_path_buf(),
            header,
            writer: Mutex::new(None),
            frames_written: AtomicU64::new(0),
        }
    }

    /// Create the file and write the header line; no-op once open
    pub fn open(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        if writer.is_some() {
            return Ok(());
        }

        let file = File::create(&self.path).map_err(|e| {
            DeviceHubError::recording(&self.path, format!("cannot create file: {e}"))
        })?;
        let mut file = BufWriter::new(file);
        Self::write_line(&self.path, &mut file, &RecordEntry::Header(self.header.clone()))?;
        file.flush()
            .map_err(|e| DeviceHubError::recording(&self.path, e.to_string()))?;
        debug!(path = %self.path.display(), "recording file created");
        *writer = Some(file);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().unwrap().is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Log one frame streamed by sensor `sensor`
    pub fn append(&self, sensor: usize, frame: &Frame) -> Result<()> {
        self.write_entry(&RecordEntry::Frame(RecordedFrame {
            sensor,
            profile: frame.profile,
            frame_number: frame.frame_number,
            timestamp: frame.timestamp,
            size: frame.data.len(),
        }))?;
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        match self.writer.lock().unwrap().as_mut() {
            Some(writer) => writer
                .flush()
                .map_err(|e| DeviceHubError::recording(&self.path, e.to_string())),
            None => Ok(()),
        }
    }

    fn write_entry(&self, entry: &RecordEntry) -> Result<()> {
        match self.writer.lock().unwrap().as_mut() {
            Some(writer) => Self::write_line(&self.path, writer, entry),
            None => Err(DeviceHubError::recording(&self.path, "recording is not open")),
        }
    }

    fn write_line(path: &Path, writer: &mut BufWriter<File>, entry: &RecordEntry) -> Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| DeviceHubError::recording(path, e.to_string()))?;
        writeln!(writer, "{line}").map_err(|e| DeviceHubError::recording(path, e.to_string()))
    }
}

/// Read a recording back: header plus frames sorted by timestamp
pub fn read_recording(path: &Path) -> Result<(DeviceDescription, Vec<RecordedFrame>)> {
    let file = File::open(path).map_err(|e| DeviceHubError::file_load(path, e.to_string()))?;
    let reader = BufReader::new(file);

    let mut header = None;
    let mut frames = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DeviceHubError::file_load(path, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: RecordEntry = serde_json::from_str(&line).map_err(|e| {
            DeviceHubError::file_load(path, format!("line {}: {e}", line_no + 1))
        })?;
        match entry {
            RecordEntry::Header(desc) if header.is_none() => header = Some(desc),
            RecordEntry::Header(_) => {
                return Err(DeviceHubError::file_load(path, "duplicate header line"));
            }
            RecordEntry::Frame(frame) => frames.push(frame),
        }
    }

    let header = header.ok_or_else(|| DeviceHubError::file_load(path, "missing header line"))?;
    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok((header, frames))
}

/// Sensor decorator that logs every frame before forwarding it
struct RecordingSensor {
    index: usize,
    inner: Arc<dyn Sensor>,
    log: Arc<JsonlFrameLog>,
}

impl Sensor for RecordingSensor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn stream_profiles(&self) -> Vec<StreamProfile> {
        self.inner.stream_profiles()
    }

    fn open(&self, profiles: &[StreamProfile]) -> contracts::Result<()> {
        self.inner.open(profiles)
    }

    fn start(&self, callback: FrameCallback) -> contracts::Result<()> {
        self.log.open()?;
        let index = self.index;
        let log = self.log.clone();
        self.inner.start(Arc::new(move |frame: Frame| {
            if let Err(e) = log.append(index, &frame) {
                warn!(error = %e, "failed to record frame");
            }
            callback(frame);
        }))
    }

    fn stop(&self) -> contracts::Result<()> {
        self.inner.stop()?;
        self.log.flush()?;
        Ok(())
    }

    fn close(&self) -> contracts::Result<()> {
        self.inner.close()
    }

    fn is_streaming(&self) -> bool {
        self.inner.is_streaming()
    }
}

/// Device decorator whose sensors record what they stream
pub struct RecordingDevice {
    inner: Arc<dyn Device>,
    sensors: Vec<Arc<RecordingSensor>>,
    log: Arc<JsonlFrameLog>,
}

impl RecordingDevice {
    pub fn create(inner: Arc<dyn Device>, target: &Path) -> Result<Self> {
        let header = DeviceDescription::from_device(inner.as_ref())?;
        let log = Arc::new(JsonlFrameLog::new(target, header));

        let mut sensors = Vec::with_capacity(inner.sensor_count());
        for index in 0..inner.sensor_count() {
            sensors.push(Arc::new(RecordingSensor {
                index,
                inner: inner.sensor(index)?,
                log: log.clone(),
            }));
        }

        info!(target = %target.display(), sensors = sensors.len(), "recording device created");
        Ok(Self { inner, sensors, log })
    }

    pub fn log(&self) -> &JsonlFrameLog {
        &self.log
    }
}

impl Device for RecordingDevice {
    fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    fn sensor(&self, index: usize) -> contracts::Result<Arc<dyn Sensor>> {
        match self.sensors.get(index) {
            Some(sensor) => Ok(sensor.clone() as Arc<dyn Sensor>),
            None => self.inner.sensor(index),
        }
    }

    fn supports_info(&self, info: CameraInfo) -> bool {
        self.inner.supports_info(info)
    }

    fn info(&self, info: CameraInfo) -> contracts::Result<String> {
        self.inner.info(info)
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        if let Err(e) = self.log.flush() {
            warn!(error = %e, "failed to flush recording");
        }
        debug!(frames = self.log.frames_written(), "recording closed");
    }
}

/// `RecordingFactory` writing JSONL frame logs
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonlRecorder;

impl RecordingFactory for JsonlRecorder {
    fn wrap(&self, device: Arc<dyn Device>, target: &Path) -> contracts::Result<Arc<dyn Device>> {
        Ok(Arc::new(RecordingDevice::create(device, target)?))
    }
}
