//! # Pipeline
//!
//! Configuration resolution, lifecycle and frame delivery.
//!
//! Responsibilities:
//! - Record stream / device requests (`Config`)
//! - Resolve requests against connected or file-backed devices (`Profile`)
//! - Start / stop streaming with retry of transient failures (`Pipeline`)
//! - Recover from device disconnection while waiting for frames
//! - Hand synchronized frame sets to the consumer through a bounded queue
//!
//! ## Usage
//!
//! ```ignore
//! use pipeline::{Config, Pipeline, PipelineContext};
//!
//! let config = Arc::new(Config::new());
//! config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);
//!
//! let pipeline = Pipeline::new(PipelineContext::new(hub, playback, recorder));
//! let profile = pipeline.start(config)?;
//! loop {
//!     match pipeline.wait_for_frames(Duration::from_secs(1))? {
//!         Some(set) => handle(set),
//!         None => continue, // restarted after a disconnect
//!     }
//! }
//! ```

mod binding;
mod config;
mod context;
mod pipeline;
mod profile;
mod queue;
mod resolver;

#[cfg(test)]
mod testing;

pub use binding::StreamBinding;
pub use config::{Config, DeviceRequest, RequestSet};
pub use context::PipelineContext;
pub use pipeline::Pipeline;
pub use profile::{Profile, SensorStreams};
pub use queue::{FrameConsumer, FrameQueue, QueueMetrics, QueueSnapshot, WaitOutcome};
