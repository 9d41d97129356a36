//! Simulated Device Hub
//!
//! Keeps a list of devices in discovery order, supports hot-plug
//! (add / disconnect / reconnect) and bounded waits for arrival.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use contracts::{device_serial, ContractError, Device, DeviceHub, DeviceInfo, Result};
use tracing::{debug, info, instrument};

use crate::device::{SimulatedDevice, SimulatedDeviceInfo};

/// In-process Device Hub
#[derive(Default)]
pub struct SimulatedHub {
    devices: Mutex<Vec<Arc<SimulatedDevice>>>,
    changed: Condvar,
}

impl SimulatedHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: impl IntoIterator<Item = Arc<SimulatedDevice>>) -> Self {
        let hub = Self::new();
        for device in devices {
            hub.add_device(device);
        }
        hub
    }

    /// Plug in a device
    pub fn add_device(&self, device: Arc<SimulatedDevice>) {
        device.set_connected(true);
        info!(serial = ?device.serial(), "device added");
        self.devices.lock().unwrap().push(device);
        self.changed.notify_all();
    }

    /// Device registered under `serial`, connected or not
    pub fn device(&self, serial: &str) -> Option<Arc<SimulatedDevice>> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.serial() == Some(serial))
            .cloned()
    }

    /// Simulate unplugging. Returns `false` for an unknown serial.
    pub fn disconnect(&self, serial: &str) -> bool {
        self.set_connected(serial, false)
    }

    /// Simulate plugging back in. Returns `false` for an unknown serial.
    pub fn reconnect(&self, serial: &str) -> bool {
        self.set_connected(serial, true)
    }

    fn set_connected(&self, serial: &str, connected: bool) -> bool {
        // Flip under the list lock so a waiter cannot miss the notification
        {
            let devices = self.devices.lock().unwrap();
            let Some(device) = devices.iter().find(|d| d.serial() == Some(serial)) else {
                return false;
            };
            device.set_connected(connected);
        }
        info!(serial, connected, "device connection changed");
        self.changed.notify_all();
        true
    }

    fn find_connected(devices: &[Arc<SimulatedDevice>], serial: Option<&str>) -> Option<Arc<SimulatedDevice>> {
        devices
            .iter()
            .filter(|d| d.is_connected())
            .find(|d| serial.map_or(true, |s| d.serial() == Some(s)))
            .cloned()
    }
}

impl DeviceHub for SimulatedHub {
    fn query_devices(&self) -> Vec<Arc<dyn DeviceInfo>> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.is_connected())
            .map(|d| Arc::new(SimulatedDeviceInfo::new(d.clone())) as Arc<dyn DeviceInfo>)
            .collect()
    }

    #[instrument(name = "hub_wait_for_device", skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    fn wait_for_device(&self, timeout: Duration, serial: Option<&str>) -> Result<Arc<dyn Device>> {
        // None: the timeout is too large to represent, wait without a deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut devices = self.devices.lock().unwrap();

        loop {
            if let Some(device) = Self::find_connected(&devices, serial) {
                debug!(serial = ?device.serial(), "device available");
                return Ok(device);
            }

            let Some(deadline) = deadline else {
                devices = self.changed.wait(devices).unwrap();
                continue;
            };

            let now = Instant::now();
            if now >= deadline {
                let what = match serial {
                    Some(s) => format!("device with serial {s}"),
                    None => "any device".to_string(),
                };
                return Err(ContractError::timeout(timeout.as_millis() as u64, what));
            }

            devices = self.changed.wait_timeout(devices, deadline - now).unwrap().0;
        }
    }

    /// A device the hub never enumerated (file-backed devices) cannot be
    /// unplugged from it and always reports connected.
    fn is_connected(&self, device: &dyn Device) -> bool {
        let devices = self.devices.lock().unwrap();
        let serial = device_serial(device);
        let tracked = devices.iter().find(|d| match &serial {
            Some(serial) => d.serial() == Some(serial.as_str()),
            None => std::ptr::addr_eq(Arc::as_ptr(d), device as *const dyn Device),
        });
        tracked.map_or(true, |d| d.is_connected())
    }
}
