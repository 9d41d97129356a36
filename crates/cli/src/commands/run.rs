//! `run` command implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{device_serial, ContractError};
use device_hub::{FilePlayback, JsonlRecorder, ReplayConfig};
use observability::DeliveryStats;
use pipeline::{Config, Pipeline, PipelineContext, Profile};
use tracing::{debug, info, warn};

use crate::cli::RunArgs;
use crate::devices::build_hub;
use crate::error::CliError;

#[derive(Debug, Clone, Copy)]
struct ConsumeLimits {
    max_frames: Option<u64>,
    wait: Duration,
}

pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading manifest");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let manifest = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load manifest from {}", args.config.display()))?;
    let config = Config::from_manifest(&manifest).map_err(CliError::from)?;
    if let Some(path) = &args.playback {
        info!(path = %path.display(), "Overriding device with playback file");
        config.enable_device_from_file(path).map_err(CliError::from)?;
    }
    let config = Arc::new(config);

    let playback = FilePlayback::new(ReplayConfig {
        speed_multiplier: args.replay_speed,
        loop_playback: args.replay_loop,
    });
    let ctx = PipelineContext::new(
        build_hub(&args.devices)?,
        Arc::new(playback),
        Arc::new(JsonlRecorder),
    )
    .with_settings(manifest.pipeline.clone());

    if args.dry_run {
        info!("Dry run mode - resolving only");
        let profile = config.resolve(&ctx).map_err(CliError::from)?;
        print_profile(&profile);
        return Ok(());
    }

    let pipeline = Arc::new(Pipeline::new(ctx));
    let profile = match &args.record {
        Some(path) => pipeline.start_with_record(config, path),
        None => pipeline.start(config),
    }
    .map_err(CliError::from)
    .context("Failed to start pipeline")?;
    print_profile(&profile);

    let limits = ConsumeLimits {
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        wait: Duration::from_millis(args.wait_ms),
    };
    let enabled = profile.active_streams().len();
    let stop = Arc::new(AtomicBool::new(false));
    let started = Instant::now();

    let mut consumer = tokio::task::spawn_blocking({
        let pipeline = pipeline.clone();
        let stop = stop.clone();
        move || consume(&pipeline, &stop, limits, enabled)
    });

    let timeout = args.timeout;
    let deadline = async move {
        if timeout > 0 {
            tokio::time::sleep(Duration::from_secs(timeout)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    let finished = tokio::select! {
        result = &mut consumer => Some(result),
        _ = setup_shutdown_signal() => {
            warn!("Received shutdown signal, stopping pipeline...");
            None
        }
        _ = deadline => {
            info!(timeout_secs = timeout, "Timeout reached, stopping pipeline...");
            None
        }
    };

    let joined = match finished {
        Some(result) => result,
        None => {
            stop.store(true, Ordering::Relaxed);
            // Wakes a consumer blocked in wait_for_frames
            if let Err(e) = pipeline.stop() {
                debug!(error = %e, "pipeline already stopped");
            }
            consumer.await
        }
    };
    let stats = joined
        .context("Consumer task panicked")?
        .map_err(CliError::from)
        .context("Pipeline execution failed")?;

    if pipeline.is_active() {
        pipeline.stop().map_err(CliError::from)?;
    }

    let elapsed = started.elapsed();
    let fps = if elapsed.as_secs_f64() > 0.0 {
        stats.framesets as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    info!(
        framesets = stats.framesets,
        duration_secs = elapsed.as_secs_f64(),
        fps = format!("{fps:.2}"),
        "Pipeline finished"
    );
    println!("\n{}", stats.summary());
    println!("Duration: {:.2}s ({fps:.2} sets/s)", elapsed.as_secs_f64());
    Ok(())
}

/// Pull frame sets until the stop flag, the frame limit or a fatal error
fn consume(
    pipeline: &Pipeline,
    stop: &AtomicBool,
    limits: ConsumeLimits,
    enabled_streams: usize,
) -> contracts::Result<DeliveryStats> {
    let mut stats = DeliveryStats::new();

    while !stop.load(Ordering::Relaxed) {
        match pipeline.wait_for_frames(limits.wait) {
            Ok(Some(set)) => {
                stats.update(&set, enabled_streams);
                if limits.max_frames.is_some_and(|max| stats.framesets >= max) {
                    info!(framesets = stats.framesets, "Frame limit reached");
                    break;
                }
            }
            Ok(None) => info!("Pipeline restarted after device disconnect"),
            Err(e @ ContractError::Timeout { .. }) => warn!(error = %e, "No frames yet"),
            Err(_) if stop.load(Ordering::Relaxed) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(stats)
}

async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_profile(profile: &Profile) {
    let device = profile.device();
    println!("\n=== Resolved Profile ===\n");
    println!(
        "Device: {}",
        device_serial(device.as_ref()).unwrap_or_else(|| "unknown".to_string())
    );
    if let Some(target) = profile.recording_target() {
        println!("Recording to: {}", target.display());
    }
    println!("Streams:");
    for stream in profile.active_streams() {
        println!("  - {stream}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Format, StreamType};
    use device_hub::{DeviceDescription, SimulatedDevice, SimulatedHub};

    fn running_pipeline() -> Pipeline {
        let hub = SimulatedHub::with_devices([Arc::new(SimulatedDevice::synthetic(
            DeviceDescription::depth_camera("D1"),
        ))]);
        let ctx = PipelineContext::new(
            Arc::new(hub),
            Arc::new(FilePlayback::default()),
            Arc::new(JsonlRecorder),
        );
        let config = Config::new();
        config.enable_stream(StreamType::Depth, 0, 640, 480, Format::Z16, 30);

        let pipeline = Pipeline::new(ctx);
        pipeline.start(Arc::new(config)).unwrap();
        pipeline
    }

    #[test]
    fn test_consume_stops_at_frame_limit() {
        let pipeline = running_pipeline();
        let limits = ConsumeLimits {
            max_frames: Some(3),
            wait: Duration::from_secs(2),
        };

        let stats = consume(&pipeline, &AtomicBool::new(false), limits, 1).unwrap();
        assert_eq!(stats.framesets, 3);
        assert_eq!(stats.incomplete, 0);
        pipeline.stop().unwrap();
    }

    #[test]
    fn test_consume_honors_stop_flag() {
        let pipeline = running_pipeline();
        let limits = ConsumeLimits {
            max_frames: None,
            wait: Duration::from_secs(2),
        };

        let stats = consume(&pipeline, &AtomicBool::new(true), limits, 1).unwrap();
        assert_eq!(stats.framesets, 0);
    }

    #[test]
    fn test_consume_ends_quietly_after_external_stop() {
        let pipeline = Arc::new(running_pipeline());
        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let pipeline = pipeline.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                stop.store(true, Ordering::Relaxed);
                pipeline.stop().unwrap();
            })
        };

        let limits = ConsumeLimits {
            max_frames: None,
            wait: Duration::from_secs(2),
        };
        assert!(consume(&pipeline, &stop, limits, 1).is_ok());
        stopper.join().unwrap();
    }
}
