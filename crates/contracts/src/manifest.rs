//! PipelineManifest - Config Loader output
//!
//! File-level description of a pipeline: which device, which streams,
//! and runtime tuning.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{PipelineSettings, StreamRequest};

/// Manifest version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ManifestVersion {
    #[default]
    V1,
}

/// Complete pipeline manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineManifest {
    /// Manifest version
    #[serde(default)]
    pub version: ManifestVersion,

    /// Device selection
    #[serde(default)]
    pub device: DeviceRequestConfig,

    /// Enable every stream the device exposes
    #[serde(default)]
    pub enable_all_streams: bool,

    /// Explicit stream requests
    #[serde(default)]
    pub streams: Vec<StreamRequest>,

    /// Runtime tuning
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Device selection: serial, playback file or record target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequestConfig {
    /// Serial number of a live device
    #[serde(default)]
    pub serial: Option<String>,

    /// Play back a recorded / described device from this file
    #[serde(default)]
    pub playback_file: Option<PathBuf>,

    /// Record the streamed session to this file
    #[serde(default)]
    pub record_file: Option<PathBuf>,
}
