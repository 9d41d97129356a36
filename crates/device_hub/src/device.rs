//! Simulated device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use contracts::{CameraInfo, ContractError, Device, DeviceInfo, Result, Sensor};

use crate::description::DeviceDescription;
use crate::sensor::{SimulatedSensor, StreamMode};

/// A device assembled from a [`DeviceDescription`]
pub struct SimulatedDevice {
    description: DeviceDescription,
    sensors: Vec<Arc<SimulatedSensor>>,
    connected: Arc<AtomicBool>,
}

impl SimulatedDevice {
    /// Device whose sensors are driven manually
    pub fn new(description: DeviceDescription) -> Self {
        Self::build(description, |_| StreamMode::Manual)
    }

    /// Device whose sensors produce synthetic frames once started
    pub fn synthetic(description: DeviceDescription) -> Self {
        Self::build(description, |_| StreamMode::Synthetic)
    }

    /// Device with a per-sensor stream mode
    pub fn build(description: DeviceDescription, mut mode: impl FnMut(usize) -> StreamMode) -> Self {
        let clock = Instant::now();
        let connected = Arc::new(AtomicBool::new(true));
        let sensors = description
            .sensors
            .iter()
            .enumerate()
            .map(|(index, sensor)| {
                Arc::new(
                    SimulatedSensor::new(sensor.name.clone(), sensor.profiles.clone())
                        .with_mode(mode(index))
                        .attach(clock, connected.clone()),
                )
            })
            .collect();

        Self {
            description,
            sensors,
            connected,
        }
    }

    pub fn description(&self) -> &DeviceDescription {
        &self.description
    }

    pub fn serial(&self) -> Option<&str> {
        self.description.serial.as_deref()
    }

    /// Concrete sensor handle (for frame injection in tests)
    pub fn simulated_sensor(&self, index: usize) -> Option<Arc<SimulatedSensor>> {
        self.sensors.get(index).cloned()
    }

    pub fn simulated_sensors(&self) -> &[Arc<SimulatedSensor>] {
        &self.sensors
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Flip the connection flag; a disconnected device stops delivering frames
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Device for SimulatedDevice {
    fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    fn sensor(&self, index: usize) -> Result<Arc<dyn Sensor>> {
        self.sensors
            .get(index)
            .map(|s| s.clone() as Arc<dyn Sensor>)
            .ok_or_else(|| {
                ContractError::invalid_value(format!(
                    "sensor index {index} out of range (device has {})",
                    self.sensors.len()
                ))
            })
    }

    fn supports_info(&self, info: CameraInfo) -> bool {
        match info {
            CameraInfo::Name => true,
            CameraInfo::SerialNumber => self.description.serial.is_some(),
            CameraInfo::FirmwareVersion => self.description.firmware_version.is_some(),
            CameraInfo::ProductLine => self.description.product_line.is_some(),
            CameraInfo::PhysicalPort => false,
        }
    }

    fn info(&self, info: CameraInfo) -> Result<String> {
        let value = match info {
            CameraInfo::Name => Some(&self.description.name),
            CameraInfo::SerialNumber => self.description.serial.as_ref(),
            CameraInfo::FirmwareVersion => self.description.firmware_version.as_ref(),
            CameraInfo::ProductLine => self.description.product_line.as_ref(),
            CameraInfo::PhysicalPort => None,
        };
        value
            .cloned()
            .ok_or_else(|| ContractError::invalid_value(format!("info '{info}' is not supported")))
    }
}

/// Enumeration entry handed out by the hub
pub struct SimulatedDeviceInfo {
    device: Arc<SimulatedDevice>,
}

impl SimulatedDeviceInfo {
    pub fn new(device: Arc<SimulatedDevice>) -> Self {
        Self { device }
    }
}

impl DeviceInfo for SimulatedDeviceInfo {
    fn serial(&self) -> Option<String> {
        self.device.serial().map(str::to_string)
    }

    fn create_device(&self) -> Result<Arc<dyn Device>> {
        if !self.device.is_connected() {
            return Err(ContractError::device_unavailable("device was disconnected"));
        }
        Ok(self.device.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{device_profiles, device_serial};

    #[test]
    fn test_device_info_fields() {
        let device = SimulatedDevice::new(DeviceDescription::depth_camera("831612073525"));

        assert_eq!(device.sensor_count(), 2);
        assert_eq!(device_serial(&device).as_deref(), Some("831612073525"));
        assert!(!device.supports_info(CameraInfo::PhysicalPort));
        assert!(device.info(CameraInfo::PhysicalPort).is_err());
        assert!(device.sensor(2).is_err());
    }

    #[test]
    fn test_device_profiles_tagged_by_sensor() {
        let device = SimulatedDevice::new(DeviceDescription::depth_camera("1"));
        let profiles = device_profiles(&device).unwrap();
        assert!(profiles
            .iter()
            .all(|(index, p)| (*index == 1) == (p.stream() == contracts::StreamType::Color)));
    }

    #[test]
    fn test_disconnected_sensor_refuses_open() {
        let device = SimulatedDevice::new(DeviceDescription::stereo_camera("1"));
        let sensor = device.sensor(0).unwrap();
        let profile = sensor.stream_profiles()[0];

        device.set_connected(false);
        assert!(sensor.open(&[profile]).is_err());
        device.set_connected(true);
        assert!(sensor.open(&[profile]).is_ok());
    }
}
