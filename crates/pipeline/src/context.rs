//! Collaborators handed to the resolver and the pipeline

use std::fmt;
use std::sync::Arc;

use contracts::{DeviceHub, PipelineSettings, PlaybackFactory, RecordingFactory};

/// Device hub, file factories and tuning knobs shared by one pipeline
#[derive(Clone)]
pub struct PipelineContext {
    hub: Arc<dyn DeviceHub>,
    playback: Arc<dyn PlaybackFactory>,
    recorder: Arc<dyn RecordingFactory>,
    settings: PipelineSettings,
}

impl PipelineContext {
    pub fn new(
        hub: Arc<dyn DeviceHub>,
        playback: Arc<dyn PlaybackFactory>,
        recorder: Arc<dyn RecordingFactory>,
    ) -> Self {
        Self {
            hub,
            playback,
            recorder,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn hub(&self) -> &Arc<dyn DeviceHub> {
        &self.hub
    }

    pub fn playback(&self) -> &Arc<dyn PlaybackFactory> {
        &self.playback
    }

    pub fn recorder(&self) -> &Arc<dyn RecordingFactory> {
        &self.recorder
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
