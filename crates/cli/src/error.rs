//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to load device description {}: {source}", path.display())]
    DeviceFile {
        path: PathBuf,
        #[source]
        source: device_hub::DeviceHubError,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] contracts::ContractError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
