//! Sensor ↔ stream profile binding of one resolved profile
//!
//! Opens and starts every bound sensor as a unit. A failure part way
//! through rolls back the sensors already handled, so a failed attempt
//! leaves nothing reserved. `stop` and `close` are idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{ContractError, Device, FrameCallback, Result, Sensor, StreamProfile};
use tracing::{debug, warn};

use crate::profile::SensorStreams;

struct SensorBinding {
    index: usize,
    sensor: Arc<dyn Sensor>,
    profiles: Vec<StreamProfile>,
}

pub struct StreamBinding {
    sensors: Vec<SensorBinding>,
    opened: AtomicBool,
    streaming: AtomicBool,
}

impl StreamBinding {
    pub(crate) fn new(device: &dyn Device, streams: SensorStreams) -> Result<Self> {
        let mut sensors = Vec::with_capacity(streams.len());
        for (index, profiles) in streams {
            sensors.push(SensorBinding {
                index,
                sensor: device.sensor(index)?,
                profiles,
            });
        }
        Ok(Self {
            sensors,
            opened: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
        })
    }

    /// Bound profiles, grouped by sensor index
    pub fn profiles(&self) -> impl Iterator<Item = &StreamProfile> {
        self.sensors.iter().flat_map(|s| s.profiles.iter())
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for (position, binding) in self.sensors.iter().enumerate() {
            if let Err(e) = binding.sensor.open(&binding.profiles) {
                warn!(sensor = binding.sensor.name(), error = %e, "sensor open failed, rolling back");
                for opened in &self.sensors[..position] {
                    if let Err(e) = opened.sensor.close() {
                        debug!(sensor = opened.sensor.name(), error = %e, "close during rollback failed");
                    }
                }
                self.opened.store(false, Ordering::SeqCst);
                return Err(e);
            }
            debug!(sensor = binding.sensor.name(), index = binding.index, streams = binding.profiles.len(), "sensor opened");
        }
        Ok(())
    }

    pub fn start(&self, callback: FrameCallback) -> Result<()> {
        if !self.is_open() {
            return Err(ContractError::wrong_call_sequence(
                "start",
                "stream binding is not open",
            ));
        }
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for (position, binding) in self.sensors.iter().enumerate() {
            if let Err(e) = binding.sensor.start(callback.clone()) {
                warn!(sensor = binding.sensor.name(), error = %e, "sensor start failed, rolling back");
                for started in &self.sensors[..position] {
                    if let Err(e) = started.sensor.stop() {
                        debug!(sensor = started.sensor.name(), error = %e, "stop during rollback failed");
                    }
                }
                self.streaming.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop every sensor; the first error is returned after all were tried
    pub fn stop(&self) -> Result<()> {
        if !self.streaming.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        first_error(self.sensors.iter().map(|b| b.sensor.stop()))
    }

    /// Close every sensor, stopping first if needed
    pub fn close(&self) -> Result<()> {
        let stopped = self.stop();
        if !self.opened.swap(false, Ordering::SeqCst) {
            return stopped;
        }
        let closed = first_error(self.sensors.iter().map(|b| b.sensor.close()));
        stopped.and(closed)
    }
}

impl Drop for StreamBinding {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "stream binding release failed");
        }
    }
}

fn first_error(results: impl Iterator<Item = Result<()>>) -> Result<()> {
    let mut first = Ok(());
    for result in results {
        if let Err(e) = result {
            if first.is_ok() {
                first = Err(e);
            }
        }
    }
    first
}
