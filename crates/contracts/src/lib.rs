//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! stream/profile data model, frame hand-off types, the collaborator traits
//! the pipeline core consumes (device hub, device, sensor, playback and
//! recording factories) and the unified error taxonomy.
//! Business crates depend on this crate only, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Frame timestamps are device clock milliseconds (`f64`)
//! - `frame_number` is per-stream and monotonically increasing

mod device;
mod error;
mod frame;
mod manifest;
mod settings;
mod stream;

pub use device::*;
pub use error::*;
pub use frame::*;
pub use manifest::*;
pub use settings::*;
pub use stream::*;
