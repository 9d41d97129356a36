//! # Sync Engine
//!
//! Multi-stream frame synchronizer.
//!
//! Responsibilities:
//! - Buffer frames per stream (drop-oldest, bounded)
//! - Group frames of the enabled streams by capture timestamp proximity
//! - Forward lone frames once their capture instant has passed
//! - Emit `FrameSet`s through an output callback
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::Synchronizer;
//!
//! let sync = Arc::new(Synchronizer::new(&profiles, &settings.sync, output));
//! sensor.start(sync.frame_callback())?;
//! ```

mod buffer;
mod engine;
mod synchronizer;

pub use buffer::FrameBuffer;
pub use engine::{derive_window_ms, SyncEngine, SyncStats};
pub use synchronizer::Synchronizer;

pub use contracts::{Frame, FrameSet, SyncConfig};
