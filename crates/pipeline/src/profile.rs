//! Resolved profile: one device bound to concrete stream profiles

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use contracts::{
    device_serial, Device, RecordingFactory, Result, StreamProfile, StreamType,
};
use tracing::info;

use crate::binding::StreamBinding;

/// Bound stream profiles keyed by sensor index
pub type SensorStreams = BTreeMap<usize, Vec<StreamProfile>>;

/// Ready-to-open binding of one device to a set of stream profiles.
///
/// Owns the sensors it binds for its whole lifetime. When a recording
/// target is set, the device is the recording decorator, not the raw device.
pub struct Profile {
    device: Arc<dyn Device>,
    binding: StreamBinding,
    recording_target: Option<PathBuf>,
}

impl Profile {
    pub(crate) fn bind(
        device: Arc<dyn Device>,
        streams: SensorStreams,
        record: Option<&Path>,
        recorder: &dyn RecordingFactory,
    ) -> Result<Self> {
        let device = match record {
            Some(target) => {
                info!(target = %target.display(), "recording enabled");
                recorder.wrap(device, target)?
            }
            None => device,
        };
        let binding = StreamBinding::new(device.as_ref(), streams)?;

        Ok(Self {
            device,
            binding,
            recording_target: record.map(Path::to_path_buf),
        })
    }

    pub fn device(&self) -> Arc<dyn Device> {
        self.device.clone()
    }

    /// Every bound stream profile
    pub fn active_streams(&self) -> Vec<StreamProfile> {
        self.binding.profiles().copied().collect()
    }

    /// Bound profile of the given stream, if any
    pub fn stream(&self, stream: StreamType, index: u32) -> Option<StreamProfile> {
        self.binding
            .profiles()
            .find(|p| p.stream() == stream && p.index() == index)
            .copied()
    }

    pub fn recording_target(&self) -> Option<&Path> {
        self.recording_target.as_deref()
    }

    pub(crate) fn binding(&self) -> &StreamBinding {
        &self.binding
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("serial", &device_serial(self.device.as_ref()))
            .field("streams", &self.active_streams())
            .field("recording_target", &self.recording_target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::depth_camera;
    use contracts::{CameraInfo, Format, VideoStreamProfile};
    use device_hub::JsonlRecorder;

    fn depth_640() -> StreamProfile {
        StreamProfile::Video(VideoStreamProfile {
            stream: StreamType::Depth,
            index: 0,
            width: 640,
            height: 480,
            format: Format::Z16,
            fps: 30,
            is_default: true,
        })
    }

    #[test]
    fn test_stream_lookup() {
        let device = depth_camera("p1");
        let streams = SensorStreams::from([(0, vec![depth_640()])]);
        let profile = Profile::bind(device, streams, None, &JsonlRecorder).unwrap();

        assert_eq!(profile.active_streams(), vec![depth_640()]);
        assert_eq!(profile.stream(StreamType::Depth, 0), Some(depth_640()));
        assert_eq!(profile.stream(StreamType::Color, 0), None);
        assert!(profile.recording_target().is_none());
        assert_eq!(
            profile.device().info(CameraInfo::SerialNumber).unwrap(),
            "p1"
        );
    }

    #[test]
    fn test_unknown_sensor_index_fails() {
        let device = depth_camera("p2");
        let streams = SensorStreams::from([(7, vec![depth_640()])]);
        assert!(Profile::bind(device, streams, None, &JsonlRecorder).is_err());
    }
}
