//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::PipelineManifest;
use pipeline::Config;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ManifestSummary>,
}

#[derive(Serialize)]
struct ManifestSummary {
    version: String,
    device: String,
    enable_all_streams: bool,
    streams: Vec<String>,
    start_attempts: u32,
    queue_capacity: usize,
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating manifest");

    let result = validate_manifest(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Manifest validation failed")
    }
}

fn validate_manifest(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();
    let invalid = |error: String| ValidationResult {
        valid: false,
        config_path: config_path.clone(),
        error: Some(error),
        warnings: Vec::new(),
        summary: None,
    };

    if !args.config.exists() {
        return invalid(format!("File not found: {config_path}"));
    }

    let manifest = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(manifest) => manifest,
        Err(e) => return invalid(e.to_string()),
    };

    // Request-level conflicts surface only through the enable operations
    if let Err(e) = Config::from_manifest(&manifest) {
        return invalid(e.to_string());
    }

    ValidationResult {
        valid: true,
        config_path: config_path.clone(),
        error: None,
        warnings: collect_warnings(&manifest),
        summary: Some(summarize(&manifest)),
    }
}

/// Non-fatal issues
fn collect_warnings(manifest: &PipelineManifest) -> Vec<String> {
    let mut warnings = Vec::new();

    if manifest.enable_all_streams && !manifest.streams.is_empty() {
        warnings.push(format!(
            "enable_all_streams is set - {} explicit stream request(s) are ignored",
            manifest.streams.len()
        ));
    }
    if !manifest.enable_all_streams && manifest.streams.is_empty() {
        warnings.push("No streams requested - device defaults will be used".to_string());
    }

    let mut seen = std::collections::HashSet::new();
    for request in &manifest.streams {
        if !seen.insert(request.key()) {
            warnings.push(format!(
                "{} requested more than once - the last request wins",
                request.key()
            ));
        }
    }

    if manifest.device.record_file.is_some() && manifest.device.serial.is_none() {
        warnings.push("record_file without a serial records whichever device resolves first".to_string());
    }

    warnings
}

fn summarize(manifest: &PipelineManifest) -> ManifestSummary {
    let device = &manifest.device;
    let device = match (&device.serial, &device.playback_file) {
        (_, Some(path)) => format!("playback {}", path.display()),
        (Some(serial), None) => format!("serial {serial}"),
        (None, None) => "any connected device".to_string(),
    };

    ManifestSummary {
        version: format!("{:?}", manifest.version),
        device,
        enable_all_streams: manifest.enable_all_streams,
        streams: manifest.streams.iter().map(ToString::to_string).collect(),
        start_attempts: manifest.pipeline.start_attempts,
        queue_capacity: manifest.pipeline.queue.capacity,
    }
}

fn print_validation_result(result: &ValidationResult) {
    if !result.valid {
        println!("✗ Manifest is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
        return;
    }

    println!("✓ Manifest is valid: {}", result.config_path);
    if let Some(ref summary) = result.summary {
        println!("\n  Version: {}", summary.version);
        println!("  Device: {}", summary.device);
        if summary.enable_all_streams {
            println!("  Streams: all");
        } else {
            println!("  Streams ({}):", summary.streams.len());
            for stream in &summary.streams {
                println!("    - {stream}");
            }
        }
        println!("  Start attempts: {}", summary.start_attempts);
        println!("  Queue capacity: {}", summary.queue_capacity);
    }

    if !result.warnings.is_empty() {
        println!("\n⚠ Warnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_for(content: &str) -> (tempfile::TempDir, ValidateArgs) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, content).unwrap();
        (dir, ValidateArgs { config: path, json: true })
    }

    #[test]
    fn test_missing_file() {
        let result = validate_manifest(&ValidateArgs {
            config: PathBuf::from("/nonexistent/pipeline.toml"),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_default_streams_warning() {
        let (_dir, args) = args_for("[device]\nserial = \"D1\"\n");
        let result = validate_manifest(&args);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("device defaults"));
        assert_eq!(result.summary.unwrap().device, "serial D1");
    }

    #[test]
    fn test_duplicate_request_warning() {
        let stream = "[[streams]]\nstream = \"depth\"\nindex = 0\nwidth = 640\nheight = 480\nformat = \"z16\"\nfps = 30\n";
        let (_dir, args) = args_for(&format!("{stream}{stream}"));
        let result = validate_manifest(&args);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("last request wins")));
    }

    #[test]
    fn test_playback_with_record_rejected() {
        let (_dir, args) = args_for(
            "[device]\nplayback_file = \"in.jsonl\"\nrecord_file = \"out.jsonl\"\n",
        );
        let result = validate_manifest(&args);
        assert!(!result.valid);
    }
}
