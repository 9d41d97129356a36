//! Simulated hub population from device description files

use std::path::PathBuf;
use std::sync::Arc;

use device_hub::{load_description, DeviceDescription, SimulatedDevice, SimulatedHub};
use tracing::info;

use crate::cli::DeviceArgs;
use crate::error::CliError;

/// Serial of the built-in camera used when no description is given
pub const BUILTIN_SERIAL: &str = "SIM0001";

/// Descriptions named on the command line, or the built-in camera
pub fn descriptions(args: &DeviceArgs) -> Result<Vec<DeviceDescription>, CliError> {
    if args.device_files.is_empty() {
        return Ok(vec![
            DeviceDescription::depth_camera(BUILTIN_SERIAL).with_motion_module()
        ]);
    }

    args.device_files
        .iter()
        .map(|path| {
            load_description(path).map_err(|source| CliError::DeviceFile {
                path: PathBuf::from(path),
                source,
            })
        })
        .collect()
}

/// Hub with one synthetic device per description
pub fn build_hub(args: &DeviceArgs) -> Result<Arc<SimulatedHub>, CliError> {
    let hub = SimulatedHub::new();
    for description in descriptions(args)? {
        info!(name = %description.name, serial = ?description.serial, "plugging in device");
        hub.add_device(Arc::new(SimulatedDevice::synthetic(description)));
    }
    Ok(Arc::new(hub))
}
