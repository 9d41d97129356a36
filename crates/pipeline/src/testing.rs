//! Fixtures shared by the unit tests

use std::sync::Arc;

use contracts::{Format, StreamType};
use device_hub::{DeviceDescription, FilePlayback, JsonlRecorder, SimulatedDevice, SimulatedHub};

use crate::{Config, PipelineContext};

pub(crate) fn depth_camera(serial: &str) -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(DeviceDescription::depth_camera(serial)))
}

pub(crate) fn stereo_camera(serial: &str) -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(DeviceDescription::stereo_camera(serial)))
}

pub(crate) fn motion_camera(serial: &str) -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(
        DeviceDescription::depth_camera(serial).with_motion_module(),
    ))
}

pub(crate) fn context(hub: Arc<SimulatedHub>) -> PipelineContext {
    PipelineContext::new(hub, Arc::new(FilePlayback::manual()), Arc::new(JsonlRecorder))
}

/// Depth 640x480 Z16 @30
pub(crate) fn depth_config() -> Arc<Config> {
    let config = Config::new();
    config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);
    Arc::new(config)
}
