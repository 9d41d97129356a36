//! # Config Loader
//!
//! Pipeline manifest loading and parsing.
//!
//! Responsibilities:
//! - Parse TOML/JSON manifest files
//! - Validate manifest legality
//! - Produce a `PipelineManifest`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let manifest = ConfigLoader::load_from_path(Path::new("pipeline.toml")).unwrap();
//! println!("streams: {}", manifest.streams.len());
//! ```

mod parser;
mod validator;

pub use contracts::PipelineManifest;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Manifest loader
///
/// Provides static methods to load manifests from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a manifest from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PipelineManifest, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        debug!(path = %path.display(), ?format, "loading pipeline manifest");
        Self::load_from_str(&content, format)
    }

    /// Load a manifest from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PipelineManifest, ContractError> {
        let manifest = parser::parse(content, format)?;
        validator::validate(&manifest)?;
        Ok(manifest)
    }

    /// Serialize a manifest to TOML string
    pub fn to_toml(manifest: &PipelineManifest) -> Result<String, ContractError> {
        toml::to_string_pretty(manifest)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize a manifest to JSON string
    pub fn to_json(manifest: &PipelineManifest) -> Result<String, ContractError> {
        serde_json::to_string_pretty(manifest)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer manifest format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
