//! Serializable device descriptions
//!
//! A `DeviceDescription` is both the JSON device manifest consumed by
//! [`FilePlayback`](crate::FilePlayback) and the header line of a recording.

use contracts::{
    device_serial, CameraInfo, Device, Format, MotionStreamProfile, StreamProfile, StreamType,
    VideoStreamProfile,
};
use serde::{Deserialize, Serialize};

/// Static description of a device and its sensors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub name: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub product_line: Option<String>,
    pub sensors: Vec<SensorDescription>,
}

/// One sensor and every profile it advertises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescription {
    pub name: String,
    pub profiles: Vec<StreamProfile>,
}

impl DeviceDescription {
    /// Snapshot of a live device (used for recording headers)
    pub fn from_device(device: &dyn Device) -> contracts::Result<Self> {
        let info = |kind: CameraInfo| {
            if device.supports_info(kind) {
                device.info(kind).ok()
            } else {
                None
            }
        };

        let mut sensors = Vec::with_capacity(device.sensor_count());
        for index in 0..device.sensor_count() {
            let sensor = device.sensor(index)?;
            sensors.push(SensorDescription {
                name: sensor.name().to_string(),
                profiles: sensor.stream_profiles(),
            });
        }

        Ok(Self {
            name: info(CameraInfo::Name).unwrap_or_else(|| "Unknown Device".to_string()),
            serial: device_serial(device),
            firmware_version: info(CameraInfo::FirmwareVersion),
            product_line: info(CameraInfo::ProductLine),
            sensors,
        })
    }

    /// Stereo depth module plus an RGB camera.
    ///
    /// Defaults: depth 640x480 Z16, infrared[1] and infrared[2] 640x480 Y8,
    /// color 640x480 RGB8, all at 30 fps.
    pub fn depth_camera(serial: impl Into<String>) -> Self {
        Self {
            name: "Simulated Depth Camera".to_string(),
            serial: Some(serial.into()),
            firmware_version: Some("5.16.0.1".to_string()),
            product_line: Some("D400".to_string()),
            sensors: vec![stereo_module(), rgb_camera()],
        }
    }

    /// Stereo depth module only (no color stream)
    pub fn stereo_camera(serial: impl Into<String>) -> Self {
        Self {
            name: "Simulated Stereo Camera".to_string(),
            serial: Some(serial.into()),
            firmware_version: Some("5.16.0.1".to_string()),
            product_line: Some("D400".to_string()),
            sensors: vec![stereo_module()],
        }
    }

    /// Add a motion module (gyro + accel)
    pub fn with_motion_module(mut self) -> Self {
        self.sensors.push(SensorDescription {
            name: "Motion Module".to_string(),
            profiles: vec![
                motion(StreamType::Gyro, 200, true),
                motion(StreamType::Gyro, 400, false),
                motion(StreamType::Accel, 100, false),
                motion(StreamType::Accel, 200, true),
            ],
        });
        self
    }
}

fn stereo_module() -> SensorDescription {
    SensorDescription {
        name: "Stereo Module".to_string(),
        profiles: vec![
            video(StreamType::Depth, 0, 640, 480, Format::Z16, 30, true),
            video(StreamType::Depth, 0, 640, 480, Format::Z16, 15, false),
            video(StreamType::Depth, 0, 1280, 720, Format::Z16, 30, false),
            video(StreamType::Infrared, 1, 640, 480, Format::Y8, 30, true),
            video(StreamType::Infrared, 1, 1280, 720, Format::Y8, 30, false),
            video(StreamType::Infrared, 2, 640, 480, Format::Y8, 30, true),
        ],
    }
}

fn rgb_camera() -> SensorDescription {
    SensorDescription {
        name: "RGB Camera".to_string(),
        profiles: vec![
            video(StreamType::Color, 0, 640, 480, Format::Rgb8, 30, true),
            video(StreamType::Color, 0, 640, 480, Format::Bgr8, 30, false),
            video(StreamType::Color, 0, 1280, 720, Format::Rgb8, 30, false),
            video(StreamType::Color, 0, 1920, 1080, Format::Rgb8, 15, false),
        ],
    }
}

fn video(
    stream: StreamType,
    index: u32,
    width: u32,
    height: u32,
    format: Format,
    fps: u32,
    is_default: bool,
) -> StreamProfile {
    StreamProfile::Video(VideoStreamProfile {
        stream,
        index,
        width,
        height,
        format,
        fps,
        is_default,
    })
}

fn motion(stream: StreamType, fps: u32, is_default: bool) -> StreamProfile {
    StreamProfile::Motion(MotionStreamProfile {
        stream,
        index: 0,
        format: Format::MotionXyz32f,
        fps,
        is_default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_camera_defaults() {
        let desc = DeviceDescription::depth_camera("123");
        let defaults: Vec<_> = desc
            .sensors
            .iter()
            .flat_map(|s| s.profiles.iter())
            .filter(|p| p.is_default())
            .map(|p| p.key())
            .collect();

        assert_eq!(defaults.len(), 4);
        assert!(defaults.iter().any(|k| k.stream == StreamType::Color));
        assert!(defaults.iter().any(|k| k.stream == StreamType::Infrared));
    }

    #[test]
    fn test_description_json_shape() {
        let desc = DeviceDescription::stereo_camera("42").with_motion_module();
        let json = serde_json::to_string(&desc).unwrap();
        let parsed: DeviceDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sensors.len(), 2);
        assert_eq!(parsed.serial.as_deref(), Some("42"));
    }
}
