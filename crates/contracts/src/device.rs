//! Device collaborator traits
//!
//! The pipeline core never talks to a transport directly. It only sees the
//! narrow interfaces below, implemented by real backends or by the simulated
//! devices in the `device_hub` crate.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FrameCallback, Result, StreamProfile};

/// Device information fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraInfo {
    Name,
    SerialNumber,
    FirmwareVersion,
    ProductLine,
    PhysicalPort,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraInfo::Name => "name",
            CameraInfo::SerialNumber => "serial_number",
            CameraInfo::FirmwareVersion => "firmware_version",
            CameraInfo::ProductLine => "product_line",
            CameraInfo::PhysicalPort => "physical_port",
        };
        f.write_str(name)
    }
}

/// A sensor: a group of streams that are opened and started together.
///
/// # Lifecycle
///
/// `open(profiles)` → `start(callback)` → `stop()` → `close()`.
/// `stop` and `close` are idempotent.
pub trait Sensor: Send + Sync {
    /// Human readable sensor name
    fn name(&self) -> &str;

    /// Every profile this sensor can produce
    fn stream_profiles(&self) -> Vec<StreamProfile>;

    /// Reserve the sensor for the given profiles
    fn open(&self, profiles: &[StreamProfile]) -> Result<()>;

    /// Start producing frames into `callback` (called on a producer thread)
    fn start(&self, callback: FrameCallback) -> Result<()>;

    /// Stop producing frames
    fn stop(&self) -> Result<()>;

    /// Release the sensor
    fn close(&self) -> Result<()>;

    /// Whether the sensor is currently streaming
    fn is_streaming(&self) -> bool;
}

/// A physical or virtual device
pub trait Device: Send + Sync {
    /// Number of sensors
    fn sensor_count(&self) -> usize;

    /// Sensor by index
    fn sensor(&self, index: usize) -> Result<Arc<dyn Sensor>>;

    /// Whether the info field is available
    fn supports_info(&self, info: CameraInfo) -> bool;

    /// Info field value
    fn info(&self, info: CameraInfo) -> Result<String>;
}

/// Enumerated but not yet instantiated device
pub trait DeviceInfo: Send + Sync {
    /// Serial number, if the backend reports one
    fn serial(&self) -> Option<String>;

    /// Instantiate the device
    fn create_device(&self) -> Result<Arc<dyn Device>>;
}

/// Device enumeration and hot-plug collaborator
pub trait DeviceHub: Send + Sync {
    /// Connected devices in discovery order
    fn query_devices(&self) -> Vec<Arc<dyn DeviceInfo>>;

    /// Wait for a connected device, optionally with the given serial.
    ///
    /// # Errors
    /// `ContractError::Timeout` if no matching device shows up within `timeout`.
    fn wait_for_device(&self, timeout: Duration, serial: Option<&str>) -> Result<Arc<dyn Device>>;

    /// Whether the device is still connected
    fn is_connected(&self, device: &dyn Device) -> bool;
}

/// Opens file-backed (playback) devices
pub trait PlaybackFactory: Send + Sync {
    fn open_from_file(&self, path: &Path) -> Result<Arc<dyn Device>>;
}

/// Decorates a device so that streamed frames are recorded to `target`
pub trait RecordingFactory: Send + Sync {
    fn wrap(&self, device: Arc<dyn Device>, target: &Path) -> Result<Arc<dyn Device>>;
}

/// Serial number of a device, if reported
pub fn device_serial(device: &dyn Device) -> Option<String> {
    if device.supports_info(CameraInfo::SerialNumber) {
        device.info(CameraInfo::SerialNumber).ok()
    } else {
        None
    }
}

/// Every stream profile across every sensor of a device, tagged with the sensor index
pub fn device_profiles(device: &dyn Device) -> Result<Vec<(usize, StreamProfile)>> {
    let mut profiles = Vec::new();
    for index in 0..device.sensor_count() {
        let sensor = device.sensor(index)?;
        profiles.extend(sensor.stream_profiles().into_iter().map(|p| (index, p)));
    }
    Ok(profiles)
}
