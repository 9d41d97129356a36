//! # Device Hub
//!
//! Simulated implementations of the device collaborator contracts.
//!
//! Responsibilities:
//! - Enumerate devices and wait for hot-plug arrival (`SimulatedHub`)
//! - Expose sensors that stream synthetic, replayed or injected frames
//! - Open file-backed devices (`FilePlayback`)
//! - Decorate devices so streamed frames are recorded (`JsonlRecorder`)

pub mod description;
pub mod device;
pub mod error;
pub mod hub;
pub mod playback;
pub mod recorder;
pub mod sensor;

pub use description::{DeviceDescription, SensorDescription};
pub use device::{SimulatedDevice, SimulatedDeviceInfo};
pub use error::{DeviceHubError, Result};
pub use hub::SimulatedHub;
pub use playback::{load_description, FilePlayback};
pub use recorder::{read_recording, JsonlFrameLog, JsonlRecorder, RecordedFrame, RecordingDevice};
pub use sensor::{ReplayConfig, SimulatedSensor, StreamMode};
