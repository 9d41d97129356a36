//! # Integration Tests
//!
//! Cross-crate scenarios run against the simulated collaborators:
//! - manifest → request set → running pipeline
//! - default-configuration and all-streams resolution on full devices
//! - record a session, then play it back
//! - recovery and retry across the whole stack

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use device_hub::{
        DeviceDescription, FilePlayback, JsonlRecorder, ReplayConfig, SimulatedDevice,
        SimulatedHub,
    };
    use pipeline::PipelineContext;

    pub fn synthetic(description: DeviceDescription) -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::synthetic(description))
    }

    pub fn manual(description: DeviceDescription) -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::new(description))
    }

    pub fn context(hub: Arc<SimulatedHub>) -> PipelineContext {
        PipelineContext::new(
            hub,
            Arc::new(FilePlayback::new(ReplayConfig::default())),
            Arc::new(JsonlRecorder),
        )
    }
}

#[cfg(test)]
mod manifest_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{device_serial, ContractError, StreamKey, StreamType};
    use device_hub::{DeviceDescription, SimulatedHub};
    use observability::DeliveryStats;
    use pipeline::{Config, Pipeline};

    use crate::support::{context, synthetic};

    const DEPTH_COLOR: &str = r#"
[device]
serial = "D2"

[[streams]]
stream = "depth"
index = 0
width = 640
height = 480
format = "z16"
fps = 30

[[streams]]
stream = "color"
index = 0
width = 640
height = 480
format = "rgb8"
fps = 30

[pipeline.queue]
capacity = 4
"#;

    #[test]
    fn test_manifest_drives_pipeline() {
        let manifest = ConfigLoader::load_from_str(DEPTH_COLOR, ConfigFormat::Toml).unwrap();
        let config = Arc::new(Config::from_manifest(&manifest).unwrap());

        let hub = Arc::new(SimulatedHub::with_devices([
            synthetic(DeviceDescription::depth_camera("D1")),
            synthetic(DeviceDescription::depth_camera("D2")),
        ]));
        let pipeline = Pipeline::new(context(hub).with_settings(manifest.pipeline.clone()));

        let profile = pipeline.start(config).unwrap();
        assert_eq!(device_serial(profile.device().as_ref()).as_deref(), Some("D2"));
        assert_eq!(profile.active_streams().len(), 2);

        let mut stats = DeliveryStats::new();
        while stats.framesets < 10 {
            let set = pipeline
                .wait_for_frames(Duration::from_secs(2))
                .unwrap()
                .expect("device stays connected");
            stats.update(&set, 2);
        }
        pipeline.stop().unwrap();

        let summary = stats.summary();
        assert!(summary.per_stream.contains_key(&StreamKey::new(StreamType::Depth, 0).to_string()));
        assert!(summary.per_stream.contains_key(&StreamKey::new(StreamType::Color, 0).to_string()));
        assert!(summary.incomplete < summary.framesets);
    }

    #[test]
    fn test_manifest_conflict_rejected_before_start() {
        let manifest = ConfigLoader::load_from_str(
            "[device]\nplayback_file = \"in.jsonl\"\nrecord_file = \"out.jsonl\"\n",
            ConfigFormat::Toml,
        );
        assert!(matches!(manifest, Err(ContractError::ConfigValidation { .. })));
    }

    #[test]
    fn test_manifest_settings_bound_retries() {
        let manifest = ConfigLoader::load_from_str(
            "[pipeline]\nstart_attempts = 2\n",
            ConfigFormat::Toml,
        )
        .unwrap();

        let device = crate::support::manual(DeviceDescription::depth_camera("D1"));
        let sensor = device.simulated_sensor(0).unwrap();
        sensor.fail_next_opens(5);

        let hub = Arc::new(SimulatedHub::with_devices([device]));
        let pipeline = Pipeline::new(context(hub).with_settings(manifest.pipeline.clone()));
        let config = Arc::new(Config::from_manifest(&manifest).unwrap());

        assert!(pipeline.start(config).is_err());
        assert_eq!(sensor.open_attempts(), 2);
        assert!(!pipeline.is_active());
    }
}

#[cfg(test)]
mod resolution_tests {
    use std::sync::Arc;

    use contracts::{Format, StreamType};
    use device_hub::{DeviceDescription, SimulatedHub};
    use pipeline::Config;

    use crate::support::{context, manual};

    fn resolved_types(description: DeviceDescription, config: &Config) -> Vec<StreamType> {
        let hub = Arc::new(SimulatedHub::with_devices([manual(description)]));
        let profile = config.resolve(&context(hub)).unwrap();
        profile.active_streams().iter().map(|p| p.stream()).collect()
    }

    #[test]
    fn test_defaults_drop_infrared_when_color_present() {
        let types = resolved_types(DeviceDescription::depth_camera("D1"), &Config::new());
        assert!(types.contains(&StreamType::Depth));
        assert!(types.contains(&StreamType::Color));
        assert!(!types.contains(&StreamType::Infrared));
    }

    #[test]
    fn test_defaults_keep_infrared_without_color() {
        let types = resolved_types(DeviceDescription::stereo_camera("S1"), &Config::new());
        assert!(types.contains(&StreamType::Depth));
        assert!(types.contains(&StreamType::Infrared));
        assert!(!types.contains(&StreamType::Color));
    }

    #[test]
    fn test_enable_all_ignores_explicit_requests() {
        let config = Config::new();
        config.enable_stream(StreamType::Depth, 0, 1280, 720, Format::Z16, 99);
        config.enable_all_streams();

        let description = DeviceDescription::depth_camera("D1").with_motion_module();
        let types = resolved_types(description, &config);
        assert!(types.contains(&StreamType::Gyro));
        assert!(types.contains(&StreamType::Accel));
        assert!(types.contains(&StreamType::Infrared));
    }

    #[test]
    fn test_can_resolve_reports_unsatisfiable_requests() {
        let hub = Arc::new(SimulatedHub::with_devices([manual(
            DeviceDescription::stereo_camera("S1"),
        )]));
        let ctx = context(hub);

        let config = Config::new();
        config.enable_stream(StreamType::Color, 0, 640, 480, Format::Rgb8, 30);
        assert!(!config.can_resolve(&ctx));

        config.disable_stream(StreamType::Color);
        config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);
        assert!(config.can_resolve(&ctx));
    }
}

#[cfg(test)]
mod playback_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{device_serial, Format, StreamKey, StreamType};
    use device_hub::{read_recording, DeviceDescription, SimulatedHub};
    use pipeline::{Config, Pipeline};

    use crate::support::{context, manual};

    fn depth_config() -> Config {
        let config = Config::new();
        config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);
        config
    }

    #[test]
    fn test_record_then_play_back() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("session.jsonl");
        let depth = StreamKey::new(StreamType::Depth, 0);

        // Record three frames from a live device
        let device = manual(DeviceDescription::depth_camera("REC1"));
        let sensor = device.simulated_sensor(0).unwrap();
        let hub = Arc::new(SimulatedHub::with_devices([device]));
        let recorder = Pipeline::new(context(hub.clone()));
        recorder
            .start_with_record(Arc::new(depth_config()), &target)
            .unwrap();
        for timestamp in [10.0, 42.5, 75.0] {
            assert!(sensor.emit(depth, timestamp));
        }
        recorder.stop().unwrap();
        drop(recorder);

        let (header, frames) = read_recording(&target).unwrap();
        assert_eq!(header.serial.as_deref(), Some("REC1"));
        assert_eq!(frames.len(), 3);

        // Play it back with no live device at all
        let config = depth_config();
        config.enable_device_from_file(&target).unwrap();
        let player = Pipeline::new(context(Arc::new(SimulatedHub::new())));
        let profile = player.start(Arc::new(config)).unwrap();
        assert_eq!(device_serial(profile.device().as_ref()).as_deref(), Some("REC1"));

        let mut timestamps = Vec::new();
        while timestamps.len() < 3 {
            let set = player
                .wait_for_frames(Duration::from_secs(2))
                .unwrap()
                .expect("playback device never disconnects");
            timestamps.extend(set.frames().iter().map(|f| f.timestamp));
        }
        assert_eq!(timestamps, vec![10.0, 42.5, 75.0]);
        player.stop().unwrap();
    }

    #[test]
    fn test_playback_serial_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        let description = DeviceDescription::depth_camera("FILE1");
        std::fs::write(&path, serde_json::to_string(&description).unwrap()).unwrap();

        let config = depth_config();
        config.enable_device_from_file(&path).unwrap();
        config.enable_device("OTHER");

        let ctx = context(Arc::new(SimulatedHub::new()));
        let err = config.resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("different serial number"), "{err}");
    }
}

#[cfg(test)]
mod recovery_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use contracts::{device_serial, ContractError, Format, PipelineSettings, StreamType};
    use device_hub::{DeviceDescription, SimulatedHub};
    use pipeline::{Config, Pipeline};

    use crate::support::{context, synthetic};

    fn depth_config() -> Arc<Config> {
        let config = Config::new();
        config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);
        Arc::new(config)
    }

    #[test]
    fn test_streaming_survives_hot_swap() {
        let hub = Arc::new(SimulatedHub::with_devices([synthetic(
            DeviceDescription::depth_camera("A"),
        )]));
        let pipeline = Pipeline::new(context(hub.clone()));
        pipeline.start(depth_config()).unwrap();
        assert!(pipeline.wait_for_frames(Duration::from_secs(2)).unwrap().is_some());

        hub.add_device(synthetic(DeviceDescription::depth_camera("B")));
        hub.disconnect("A");

        // Drain whatever the old session had buffered, then expect a restart
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut restarted = false;
        while Instant::now() < deadline {
            if pipeline.wait_for_frames(Duration::from_millis(200)).unwrap().is_none() {
                restarted = true;
                break;
            }
        }
        assert!(restarted);

        let profile = pipeline.active_profile().unwrap();
        assert_eq!(device_serial(profile.device().as_ref()).as_deref(), Some("B"));
        assert!(pipeline.wait_for_frames(Duration::from_secs(2)).unwrap().is_some());
    }

    #[test]
    fn test_wait_timeout_with_connected_device() {
        let hub = Arc::new(SimulatedHub::with_devices([crate::support::manual(
            DeviceDescription::depth_camera("A"),
        )]));
        let pipeline = Pipeline::new(context(hub));
        pipeline.start(depth_config()).unwrap();

        let start = Instant::now();
        let err = pipeline.wait_for_frames(Duration::from_millis(1000)).unwrap_err();
        assert!(matches!(err, ContractError::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn test_concurrent_stop_during_wait() {
        let hub = Arc::new(SimulatedHub::with_devices([crate::support::manual(
            DeviceDescription::depth_camera("A"),
        )]));
        let settings = PipelineSettings {
            device_timeout_ms: 100,
            ..PipelineSettings::default()
        };
        let pipeline = Arc::new(Pipeline::new(context(hub).with_settings(settings)));
        pipeline.start(depth_config()).unwrap();

        let waiter = {
            let pipeline = pipeline.clone();
            thread::spawn(move || pipeline.wait_for_frames(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(50));
        pipeline.stop().unwrap();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(ContractError::WrongCallSequence { .. })));
        assert!(!pipeline.is_active());
    }
}
