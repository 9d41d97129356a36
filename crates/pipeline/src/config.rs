//! Configuration request set
//!
//! A `Config` records what the user asked for: which streams, which device,
//! whether to replay from or record to a file. Nothing touches hardware until
//! [`Config::resolve`] turns the requests into a [`Profile`].
//!
//! Every operation runs under the config's own lock. Resolution holds that
//! lock for its whole duration (hub waits included), so concurrent mutation of
//! the same config is blocked rather than interleaved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    ContractError, Format, PipelineManifest, Result, StreamKey, StreamRequest, StreamType,
};
use tracing::{debug, instrument};

use crate::context::PipelineContext;
use crate::profile::Profile;
use crate::resolver;

/// Device selection part of a request set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRequest {
    pub serial: Option<String>,
    pub filename: Option<PathBuf>,
    pub record_output: Option<PathBuf>,
}

/// Snapshot of everything a config currently asks for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSet {
    /// Explicit stream requests, one per (type, index)
    pub streams: BTreeMap<StreamKey, StreamRequest>,
    pub enable_all: bool,
    pub device: DeviceRequest,
}

/// User-facing configuration request set
#[derive(Debug, Default)]
pub struct Config {
    requests: Mutex<RequestSet>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a request set from a loaded manifest.
    ///
    /// Goes through the regular enable operations, so the same conflict
    /// rules apply as for hand-built configs.
    pub fn from_manifest(manifest: &PipelineManifest) -> Result<Self> {
        let config = Self::new();
        if let Some(serial) = &manifest.device.serial {
            config.enable_device(serial.clone());
        }
        if let Some(path) = &manifest.device.playback_file {
            config.enable_device_from_file(path)?;
        }
        if let Some(path) = &manifest.device.record_file {
            config.enable_record_to_file(path)?;
        }
        if manifest.enable_all_streams {
            config.enable_all_streams();
        }
        for request in &manifest.streams {
            config.enable_request(*request);
        }
        Ok(config)
    }

    /// Request a stream. A second request for the same (type, index)
    /// replaces the first.
    pub fn enable_stream(
        &self,
        stream: StreamType,
        index: u32,
        width: u32,
        height: u32,
        format: Format,
        fps: u32,
    ) {
        self.enable_request(StreamRequest::new(stream, index, width, height, format, fps));
    }

    pub fn enable_request(&self, request: StreamRequest) {
        debug!(request = %request, "stream enabled");
        self.lock().streams.insert(request.key(), request);
    }

    /// Ask for every stream the device exposes; explicit requests are dropped
    pub fn enable_all_streams(&self) {
        let mut requests = self.lock();
        requests.streams.clear();
        requests.enable_all = true;
    }

    pub fn enable_device(&self, serial: impl Into<String>) {
        self.lock().device.serial = Some(serial.into());
    }

    /// Replay from a recording instead of a live device.
    ///
    /// # Errors
    /// `ConfigConflict` when recording to a file was already requested.
    pub fn enable_device_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut requests = self.lock();
        if requests.device.record_output.is_some() {
            return Err(ContractError::config_conflict(
                "configuring both device from file, and record to file is unsupported",
            ));
        }
        requests.device.filename = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Record the streamed session to a file.
    ///
    /// # Errors
    /// `ConfigConflict` when replaying from a file was already requested.
    pub fn enable_record_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut requests = self.lock();
        if requests.device.filename.is_some() {
            return Err(ContractError::config_conflict(
                "configuring both device from file, and record to file is unsupported",
            ));
        }
        requests.device.record_output = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Remove every request of the given stream type, whatever its index
    pub fn disable_stream(&self, stream: StreamType) {
        self.lock().streams.retain(|key, _| key.stream != stream);
    }

    /// Remove a single (type, index) request
    pub fn disable_stream_index(&self, stream: StreamType, index: u32) {
        self.lock().streams.remove(&StreamKey::new(stream, index));
    }

    pub fn disable_all_streams(&self) {
        let mut requests = self.lock();
        requests.streams.clear();
        requests.enable_all = false;
    }

    /// Bind the requests to a concrete device and stream profiles.
    ///
    /// Holds the config lock for the whole resolution.
    #[instrument(name = "config_resolve", skip(self, ctx))]
    pub fn resolve(&self, ctx: &PipelineContext) -> Result<Arc<Profile>> {
        let requests = self.lock();
        resolver::resolve(&requests, ctx).map(Arc::new)
    }

    /// Whether the requests can currently be satisfied
    pub fn can_resolve(&self, ctx: &PipelineContext) -> bool {
        match self.resolve(ctx) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "config cannot be resolved");
                false
            }
        }
    }

    pub fn requests(&self) -> RequestSet {
        self.lock().clone()
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.lock().streams.values().copied().collect()
    }

    pub fn all_streams_enabled(&self) -> bool {
        self.lock().enable_all
    }

    pub fn device_request(&self) -> DeviceRequest {
        self.lock().device.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RequestSet> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
