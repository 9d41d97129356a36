//! Request set → device + stream profile binding
//!
//! Device precedence: playback file, then serial, then whatever the stream
//! requests can be matched against. Stream precedence: enable-all, then the
//! device's default configuration when nothing was requested, then the
//! explicit requests.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{
    device_profiles, device_serial, ContractError, Device, Result, StreamKey, StreamProfile,
    StreamRequest, StreamType,
};
use tracing::{debug, warn};

use crate::config::{DeviceRequest, RequestSet};
use crate::context::PipelineContext;
use crate::profile::{Profile, SensorStreams};

pub(crate) fn resolve(requests: &RequestSet, ctx: &PipelineContext) -> Result<Profile> {
    let requested_device = resolve_device(&requests.device, ctx)?;
    let record = requests.device.record_output.as_deref();

    if requests.enable_all {
        let device = match requested_device {
            Some(device) => device,
            None => first_available_device(ctx)?,
        };
        let streams = best_quality_streams(device.as_ref())?;
        return Profile::bind(device, streams, record, ctx.recorder().as_ref());
    }

    if requests.streams.is_empty() {
        let device = match requested_device {
            Some(device) => device,
            None => first_available_device(ctx)?,
        };
        let defaults = default_requests(device.as_ref())?;
        let streams = match_requests(device.as_ref(), &defaults)?;
        return Profile::bind(device, streams, record, ctx.recorder().as_ref());
    }

    if let Some(device) = requested_device {
        let streams = match_requests(device.as_ref(), &requests.streams)?;
        return Profile::bind(device, streams, record, ctx.recorder().as_ref());
    }

    for (position, info) in ctx.hub().query_devices().into_iter().enumerate() {
        let candidate = info.create_device().and_then(|device| {
            let streams = match_requests(device.as_ref(), &requests.streams)?;
            Profile::bind(device, streams, record, ctx.recorder().as_ref())
        });
        match candidate {
            Ok(profile) => {
                debug!(candidate = position, serial = ?info.serial(), "device matched requests");
                return Ok(profile);
            }
            Err(e) => {
                warn!(candidate = position, serial = ?info.serial(), error = %e, "candidate device rejected");
            }
        }
    }

    Err(ContractError::resolution(
        "config couldn't configure pipeline: no connected device satisfies every stream request",
    ))
}

/// The device pinned by a playback file or serial, if any
fn resolve_device(request: &DeviceRequest, ctx: &PipelineContext) -> Result<Option<Arc<dyn Device>>> {
    if let Some(path) = &request.filename {
        let invalid = |reason: String| {
            ContractError::resolution(format!(
                "request to enable_device_from_file(\"{}\") was invalid: {reason}",
                path.display()
            ))
        };

        let device = ctx
            .playback()
            .open_from_file(path)
            .map_err(|e| invalid(e.to_string()))?;

        // The file wins over the serial, but they must agree
        if let Some(serial) = &request.serial {
            match device_serial(device.as_ref()) {
                None => {
                    return Err(invalid(format!(
                        "file does not contain a device with serial {serial}"
                    )))
                }
                Some(actual) if actual != *serial => {
                    return Err(invalid(format!(
                        "file contains device with different serial number ({actual})"
                    )))
                }
                Some(_) => {}
            }
        }

        debug!(path = %path.display(), "device resolved from file");
        return Ok(Some(device));
    }

    if let Some(serial) = &request.serial {
        let device = ctx
            .hub()
            .wait_for_device(ctx.settings().device_timeout(), Some(serial))?;
        debug!(serial = %serial, "device resolved from serial");
        return Ok(Some(device));
    }

    Ok(None)
}

fn first_available_device(ctx: &PipelineContext) -> Result<Arc<dyn Device>> {
    ctx.hub()
        .wait_for_device(ctx.settings().device_timeout(), None)
        .map_err(|e| ContractError::resolution(format!("no device available: {e}")))
}

/// Highest quality profile of every stream the device exposes
fn best_quality_streams(device: &dyn Device) -> Result<SensorStreams> {
    let mut best: BTreeMap<StreamKey, (usize, StreamProfile)> = BTreeMap::new();
    for (sensor, profile) in device_profiles(device)? {
        match best.entry(profile.key()) {
            Entry::Vacant(slot) => {
                slot.insert((sensor, profile));
            }
            Entry::Occupied(mut slot) => {
                if profile.quality_rank() > slot.get().1.quality_rank() {
                    slot.insert((sensor, profile));
                }
            }
        }
    }

    if best.is_empty() {
        return Err(ContractError::resolution("device exposes no streams"));
    }

    let mut streams = SensorStreams::new();
    for (sensor, profile) in best.into_values() {
        streams.entry(sensor).or_default().push(profile);
    }
    Ok(streams)
}

/// Requests reproducing the device's default-flagged profiles.
///
/// Infrared defaults are dropped when a color default exists; they duplicate
/// the color capability on these devices.
fn default_requests(device: &dyn Device) -> Result<BTreeMap<StreamKey, StreamRequest>> {
    let mut defaults: Vec<StreamProfile> = device_profiles(device)?
        .into_iter()
        .filter(|(_, profile)| profile.is_default())
        .map(|(_, profile)| profile)
        .collect();

    if defaults.iter().any(|p| p.stream() == StreamType::Color) {
        defaults.retain(|p| p.stream() != StreamType::Infrared);
    }

    let requests: BTreeMap<StreamKey, StreamRequest> = defaults
        .iter()
        .map(|profile| {
            let request = StreamRequest::from_profile(profile);
            (request.key(), request)
        })
        .collect();

    if requests.is_empty() {
        return Err(ContractError::resolution(
            "device has no default stream profiles",
        ));
    }
    Ok(requests)
}

/// Exact match of every request against the device's profiles
fn match_requests(
    device: &dyn Device,
    requests: &BTreeMap<StreamKey, StreamRequest>,
) -> Result<SensorStreams> {
    let available = device_profiles(device)?;
    let mut streams = SensorStreams::new();

    for request in requests.values() {
        let (sensor, profile) = available
            .iter()
            .find(|(_, profile)| request.matches(profile))
            .ok_or_else(|| {
                ContractError::resolution(format!("no stream profile matches {request}"))
            })?;
        streams.entry(*sensor).or_default().push(*profile);
    }
    Ok(streams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, depth_camera, motion_camera, stereo_camera};
    use crate::Config;
    use contracts::{Format, PipelineSettings};
    use device_hub::{DeviceDescription, SimulatedHub};
    use std::time::{Duration, Instant};

    fn keys(profile: &Profile) -> Vec<StreamKey> {
        let mut keys: Vec<_> = profile.active_streams().iter().map(|p| p.key()).collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_default_config_drops_infrared_when_color_present() {
        let hub = Arc::new(SimulatedHub::with_devices([depth_camera("d1")]));
        let profile = Config::new().resolve(&context(hub)).unwrap();

        assert_eq!(
            keys(&profile),
            vec![
                StreamKey::new(StreamType::Depth, 0),
                StreamKey::new(StreamType::Color, 0),
            ]
        );
    }

    #[test]
    fn test_default_config_keeps_infrared_without_color() {
        let hub = Arc::new(SimulatedHub::with_devices([stereo_camera("s1")]));
        let profile = Config::new().resolve(&context(hub)).unwrap();

        assert_eq!(
            keys(&profile),
            vec![
                StreamKey::new(StreamType::Depth, 0),
                StreamKey::new(StreamType::Infrared, 1),
                StreamKey::new(StreamType::Infrared, 2),
            ]
        );
    }

    #[test]
    fn test_latest_request_wins() {
        let hub = Arc::new(SimulatedHub::with_devices([depth_camera("d1")]));
        let config = Config::new();
        config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);
        config.enable_stream(StreamType::Depth, 0, 1280, 720, Format::Z16, 30);

        let profile = config.resolve(&context(hub)).unwrap();
        let streams = profile.active_streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].resolution(), (1280, 720));
    }

    #[test]
    fn test_enable_all_ignores_explicit_requests() {
        let hub = Arc::new(SimulatedHub::with_devices([motion_camera("d1")]));
        let config = Config::new();
        config.enable_stream(StreamType::Depth, 0, 1280, 720, Format::Z16, 30);
        config.enable_all_streams();

        let profile = config.resolve(&context(hub)).unwrap();
        assert_eq!(profile.active_streams().len(), 6);

        // default-flagged profiles win the quality ranking
        let depth = profile.stream(StreamType::Depth, 0).unwrap();
        assert_eq!(depth.resolution(), (640, 480));
        assert_eq!(depth.fps(), 30);
        let gyro = profile.stream(StreamType::Gyro, 0).unwrap();
        assert_eq!(gyro.fps(), 200);
    }

    #[test]
    fn test_enable_all_outranks_later_explicit_request() {
        let hub = Arc::new(SimulatedHub::with_devices([motion_camera("d1")]));
        let config = Config::new();
        config.enable_all_streams();
        config.enable_stream(StreamType::Depth, 0, 1280, 720, Format::Z16, 30);
        assert!(config.all_streams_enabled());

        let profile = config.resolve(&context(hub)).unwrap();
        assert_eq!(profile.active_streams().len(), 6);
        let depth = profile.stream(StreamType::Depth, 0).unwrap();
        assert_eq!(depth.resolution(), (640, 480));
    }

    #[test]
    fn test_resolve_with_record_target_leaves_disk_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("session.jsonl");
        let hub = Arc::new(SimulatedHub::with_devices([depth_camera("d1")]));
        let ctx = context(hub);
        let config = Config::new();
        config.enable_record_to_file(&target).unwrap();

        assert!(config.can_resolve(&ctx));
        let profile = config.resolve(&ctx).unwrap();
        assert_eq!(profile.recording_target(), Some(target.as_path()));
        assert!(!target.exists());
    }

    #[test]
    fn test_explicit_requests_pick_first_matching_device() {
        // only the second device has a color stream
        let hub = Arc::new(SimulatedHub::with_devices([
            stereo_camera("s1"),
            depth_camera("d1"),
        ]));
        let config = Config::new();
        config.enable_stream(StreamType::Color, 0, 640, 480, Format::Rgb8, 30);

        let profile = config.resolve(&context(hub)).unwrap();
        assert_eq!(device_serial(profile.device().as_ref()).as_deref(), Some("d1"));
    }

    #[test]
    fn test_explicit_requests_exhaust_candidates() {
        let hub = Arc::new(SimulatedHub::with_devices([
            stereo_camera("s1"),
            depth_camera("d1"),
        ]));
        let config = Config::new();
        config.enable_stream(StreamType::Color, 0, 320, 240, Format::Rgb8, 30);

        let err = config.resolve(&context(hub)).unwrap_err();
        assert!(matches!(err, ContractError::ResolutionFailure { .. }));
    }

    #[test]
    fn test_serial_pins_device_without_fallback() {
        let hub = Arc::new(SimulatedHub::with_devices([
            stereo_camera("s1"),
            depth_camera("d1"),
        ]));
        let config = Config::new();
        config.enable_device("s1");
        config.enable_stream(StreamType::Color, 0, 640, 480, Format::Rgb8, 30);

        let err = config.resolve(&context(hub)).unwrap_err();
        assert!(matches!(err, ContractError::ResolutionFailure { .. }));
    }

    #[test]
    fn test_missing_serial_times_out() {
        let hub = Arc::new(SimulatedHub::with_devices([depth_camera("d1")]));
        let settings = PipelineSettings {
            device_timeout_ms: 50,
            ..PipelineSettings::default()
        };
        let ctx = context(hub).with_settings(settings);
        let config = Config::new();
        config.enable_device("nope");

        let start = Instant::now();
        let err = config.resolve(&ctx).unwrap_err();
        assert!(matches!(err, ContractError::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(!config.can_resolve(&ctx));
    }

    #[test]
    fn test_no_device_is_resolution_failure() {
        let settings = PipelineSettings {
            device_timeout_ms: 20,
            ..PipelineSettings::default()
        };
        let ctx = context(Arc::new(SimulatedHub::new())).with_settings(settings);
        let err = Config::new().resolve(&ctx).unwrap_err();
        assert!(matches!(err, ContractError::ResolutionFailure { .. }));
    }

    #[test]
    fn test_file_takes_precedence_over_serial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        let description = DeviceDescription::stereo_camera("file-1");
        std::fs::write(&path, serde_json::to_string(&description).unwrap()).unwrap();

        let hub = Arc::new(SimulatedHub::with_devices([depth_camera("d1")]));
        let ctx = context(hub);

        let config = Config::new();
        config.enable_device_from_file(&path).unwrap();
        config.enable_device("file-1");
        let profile = config.resolve(&ctx).unwrap();
        assert_eq!(
            device_serial(profile.device().as_ref()).as_deref(),
            Some("file-1")
        );

        let mismatched = Config::new();
        mismatched.enable_device_from_file(&path).unwrap();
        mismatched.enable_device("d1");
        let err = mismatched.resolve(&ctx).unwrap_err();
        assert!(matches!(err, ContractError::ResolutionFailure { .. }));
        assert!(err.to_string().contains("different serial number (file-1)"));
    }

    #[test]
    fn test_record_target_wraps_device() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("session.jsonl");
        let hub = Arc::new(SimulatedHub::with_devices([depth_camera("d1")]));

        let config = Config::new();
        config.enable_record_to_file(&target).unwrap();
        let profile = config.resolve(&context(hub)).unwrap();

        assert_eq!(profile.recording_target(), Some(target.as_path()));
        assert!(target.exists());
    }
}
