//! Device Hub error types

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Device Hub specific error
#[derive(Debug, Error)]
pub enum DeviceHubError {
    /// Device description / recording could not be loaded
    #[error("failed to load device file '{}': {message}", path.display())]
    FileLoad { path: PathBuf, message: String },

    /// Recording sink failure
    #[error("recording to '{}' failed: {message}", path.display())]
    Recording { path: PathBuf, message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl DeviceHubError {
    /// Create file load error
    pub fn file_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create recording error
    pub fn recording(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Recording {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<DeviceHubError> for ContractError {
    fn from(err: DeviceHubError) -> Self {
        match err {
            DeviceHubError::FileLoad { .. } => ContractError::backend("playback", err.to_string()),
            DeviceHubError::Recording { .. } => ContractError::backend("recorder", err.to_string()),
            DeviceHubError::Contract(inner) => inner,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, DeviceHubError>;
