//! `devices` command implementation.

use anyhow::{Context, Result};

use crate::cli::DevicesArgs;
use crate::devices::descriptions;

pub fn run_devices(args: &DevicesArgs) -> Result<()> {
    let descriptions = descriptions(&args.devices)?;

    if args.json {
        let json = serde_json::to_string_pretty(&descriptions)
            .context("Failed to serialize device list")?;
        println!("{json}");
        return Ok(());
    }

    for description in &descriptions {
        println!(
            "{} (serial: {})",
            description.name,
            description.serial.as_deref().unwrap_or("none")
        );
        if let Some(firmware) = &description.firmware_version {
            println!("  Firmware: {firmware}");
        }
        for (index, sensor) in description.sensors.iter().enumerate() {
            println!("  [{index}] {}", sensor.name);
            for profile in &sensor.profiles {
                let marker = if profile.is_default() { " (default)" } else { "" };
                println!("      {profile}{marker}");
            }
        }
        println!();
    }
    Ok(())
}
