//! File-backed devices
//!
//! `.json` files hold a [`DeviceDescription`]; the device streams synthetic
//! frames. `.jsonl` files are recordings written by
//! [`JsonlRecorder`](crate::JsonlRecorder); the device replays them with
//! their original pacing.

use std::path::Path;
use std::sync::Arc;

use contracts::{Device, PlaybackFactory};
use tracing::info;

use crate::description::DeviceDescription;
use crate::device::SimulatedDevice;
use crate::error::{DeviceHubError, Result};
use crate::recorder::read_recording;
use crate::sensor::{ReplayConfig, StreamMode};

/// `PlaybackFactory` over description and recording files
#[derive(Debug, Clone, Default)]
pub struct FilePlayback {
    replay: ReplayConfig,
    manual: bool,
}

impl FilePlayback {
    pub fn new(replay: ReplayConfig) -> Self {
        Self {
            replay,
            manual: false,
        }
    }

    /// Devices opened by this factory only deliver injected frames
    pub fn manual() -> Self {
        Self {
            replay: ReplayConfig::default(),
            manual: true,
        }
    }

    /// Open a file as a concrete simulated device
    pub fn open(&self, path: &Path) -> Result<Arc<SimulatedDevice>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let device = match ext.as_str() {
            "json" => {
                let description = load_description(path)?;
                if self.manual {
                    SimulatedDevice::new(description)
                } else {
                    SimulatedDevice::synthetic(description)
                }
            }
            "jsonl" => {
                let (description, frames) = read_recording(path)?;
                let count = frames.len();
                let frames = Arc::new(frames);
                let device = SimulatedDevice::build(description, |index| {
                    if self.manual {
                        return StreamMode::Manual;
                    }
                    let own: Vec<_> = frames.iter().filter(|f| f.sensor == index).cloned().collect();
                    StreamMode::Replay(self.replay.clone(), Arc::new(own))
                });
                info!(path = %path.display(), frames = count, "recording loaded");
                device
            }
            _ => {
                return Err(DeviceHubError::file_load(
                    path,
                    format!("unsupported playback format '.{ext}'"),
                ))
            }
        };

        Ok(Arc::new(device))
    }
}

impl PlaybackFactory for FilePlayback {
    fn open_from_file(&self, path: &Path) -> contracts::Result<Arc<dyn Device>> {
        Ok(self.open(path)?)
    }
}

/// Parse a JSON device description file
pub fn load_description(path: &Path) -> Result<DeviceDescription> {
    let content =
        std::fs::read_to_string(path).map_err(|e| DeviceHubError::file_load(path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| DeviceHubError::file_load(path, e.to_string()))
}
