//! Manifest validation
//!
//! Rules:
//! - fps > 0 for every stream request
//! - video formats need non-zero width / height
//! - playback_file and record_file are mutually exclusive
//! - start_attempts >= 1, queue.capacity >= 1, device_timeout_ms > 0
//! - sync windows are positive

use contracts::{ContractError, PipelineManifest};

/// Validate a `PipelineManifest`
///
/// Returns the first error encountered.
pub fn validate(manifest: &PipelineManifest) -> Result<(), ContractError> {
    validate_device(manifest)?;
    validate_streams(manifest)?;
    validate_settings(manifest)?;
    Ok(())
}

fn validate_device(manifest: &PipelineManifest) -> Result<(), ContractError> {
    let device = &manifest.device;
    if device.playback_file.is_some() && device.record_file.is_some() {
        return Err(ContractError::config_validation(
            "device.playback_file / device.record_file",
            "playback_file and record_file are mutually exclusive",
        ));
    }
    if let Some(serial) = &device.serial {
        if serial.trim().is_empty() {
            return Err(ContractError::config_validation(
                "device.serial",
                "serial cannot be empty",
            ));
        }
    }
    Ok(())
}

fn validate_streams(manifest: &PipelineManifest) -> Result<(), ContractError> {
    for (idx, request) in manifest.streams.iter().enumerate() {
        if request.fps == 0 {
            return Err(ContractError::config_validation(
                format!("streams[{idx}].fps"),
                format!("fps must be > 0 for {}", request.key()),
            ));
        }
        if request.format.is_video() && (request.width == 0 || request.height == 0) {
            return Err(ContractError::config_validation(
                format!("streams[{idx}].width / streams[{idx}].height"),
                format!(
                    "video format {} needs non-zero resolution, got {}x{}",
                    request.format, request.width, request.height
                ),
            ));
        }
    }
    Ok(())
}

fn validate_settings(manifest: &PipelineManifest) -> Result<(), ContractError> {
    let settings = &manifest.pipeline;

    if settings.start_attempts == 0 {
        return Err(ContractError::config_validation(
            "pipeline.start_attempts",
            "start_attempts must be >= 1",
        ));
    }
    if settings.device_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "pipeline.device_timeout_ms",
            "device_timeout_ms must be > 0",
        ));
    }
    if settings.queue.capacity == 0 {
        return Err(ContractError::config_validation(
            "pipeline.queue.capacity",
            "capacity must be >= 1",
        ));
    }
    if settings.sync.buffer_size == 0 {
        return Err(ContractError::config_validation(
            "pipeline.sync.buffer_size",
            "buffer_size must be >= 1",
        ));
    }
    if settings.sync.max_window_ms <= 0.0 {
        return Err(ContractError::config_validation(
            "pipeline.sync.max_window_ms",
            format!("max_window_ms must be > 0, got {}", settings.sync.max_window_ms),
        ));
    }
    if let Some(window) = settings.sync.window_ms {
        if window <= 0.0 {
            return Err(ContractError::config_validation(
                "pipeline.sync.window_ms",
                format!("window_ms must be > 0, got {window}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DeviceRequestConfig, Format, StreamRequest, StreamType};

    fn minimal_manifest() -> PipelineManifest {
        PipelineManifest {
            device: DeviceRequestConfig {
                serial: Some("1234".into()),
                ..Default::default()
            },
            streams: vec![StreamRequest::new(
                StreamType::Depth,
                0,
                640,
                480,
                Format::Z16,
                30,
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_manifest() {
        assert!(validate(&minimal_manifest()).is_ok());
    }

    #[test]
    fn test_zero_fps() {
        let mut manifest = minimal_manifest();
        manifest.streams[0].fps = 0;
        let err = validate(&manifest).unwrap_err().to_string();
        assert!(err.contains("fps must be > 0"), "got: {err}");
    }

    #[test]
    fn test_video_without_resolution() {
        let mut manifest = minimal_manifest();
        manifest.streams[0].width = 0;
        let err = validate(&manifest).unwrap_err().to_string();
        assert!(err.contains("non-zero resolution"), "got: {err}");
    }

    #[test]
    fn test_motion_without_resolution_is_fine() {
        let mut manifest = minimal_manifest();
        manifest.streams.push(StreamRequest::new(
            StreamType::Accel,
            0,
            0,
            0,
            Format::MotionXyz32f,
            250,
        ));
        assert!(validate(&manifest).is_ok());
    }

    #[test]
    fn test_playback_and_record_conflict() {
        let mut manifest = minimal_manifest();
        manifest.device.playback_file = Some("in.json".into());
        manifest.device.record_file = Some("out.jsonl".into());
        let err = validate(&manifest).unwrap_err().to_string();
        assert!(err.contains("mutually exclusive"), "got: {err}");
    }

    #[test]
    fn test_zero_start_attempts() {
        let mut manifest = minimal_manifest();
        manifest.pipeline.start_attempts = 0;
        let err = validate(&manifest).unwrap_err().to_string();
        assert!(err.contains("start_attempts"), "got: {err}");
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut manifest = minimal_manifest();
        manifest.pipeline.queue.capacity = 0;
        let err = validate(&manifest).unwrap_err().to_string();
        assert!(err.contains("capacity must be >= 1"), "got: {err}");
    }

    #[test]
    fn test_negative_window() {
        let mut manifest = minimal_manifest();
        manifest.pipeline.sync.window_ms = Some(-1.0);
        let err = validate(&manifest).unwrap_err().to_string();
        assert!(err.contains("window_ms"), "got: {err}");
    }
}
