//! # Extmodule Pulses
//!
//! Runs the external module pulse driver against simulated hardware.
//!
//! The configured protocol is started once, then a frame is handed to the
//! driver every frame period. A helper task plays the part of the hardware:
//! it completes the DMA transfer after the configured transfer time and
//! raises the two interrupts of the shutdown sequence.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use extmodule_pulses::config::Config;
use extmodule_pulses::frames::{demo_pattern, ppm_frame};
use extmodule_pulses::hal::sim::{SimModulePower, SimPulseTimer};
use extmodule_pulses::pulses::driver::PulseDriver;
use extmodule_pulses::pulses::protocol::ProtocolKind;
use extmodule_pulses::service::{IrqEvent, IrqLine, PulseService};

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Delay between DMA completion and the timer update event
const UPDATE_EVENT_DELAY: Duration = Duration::from_micros(500);

/// Attempts to deliver the update event before giving up on a frame
const UPDATE_EVENT_RETRIES: u32 = 4;

/// Main entry point
///
/// # Control Flow
///
/// 1. Load configuration (first argument or `config/default.toml`)
/// 2. Set up logging (stdout, plus a file when configured)
/// 3. Spawn the pulse service over simulated hardware and start the module
/// 4. Send a frame every frame period until Ctrl+C
/// 5. Stop the module and log totals
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or the service
/// task dies.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config)?;

    info!("Extmodule pulses v{} starting...", env!("CARGO_PKG_VERSION"));

    let timer = SimPulseTimer::new();
    let power = SimModulePower::new();
    let driver = PulseDriver::new(timer.clone(), power.clone());
    let (handle, service_task) = PulseService::spawn(driver, config.service.queue_depth);
    let irq = handle.irq_line();

    let protocol = config.protocol();
    handle.start(protocol).await?;

    let frame = match protocol.kind() {
        ProtocolKind::Ppm => ppm_frame(
            config.ppm.channels,
            config.ppm.pulse_us,
            config.module.frame_period_ms * 1000,
        ),
        kind => demo_pattern(kind),
    };

    let transfer_time = Duration::from_micros(config.module.transfer_time_us);
    let mut frame_interval = interval(Duration::from_millis(config.module.frame_period_ms));

    info!(
        "Sending {:?} frames of {} pulses every {}ms",
        protocol.kind(),
        frame.len(),
        config.module.frame_period_ms
    );
    info!("Press Ctrl+C to exit");

    let mut last_logged: u64 = 0;

    loop {
        tokio::select! {
            _ = frame_interval.tick() => {
                match handle.send_next_frame(&frame, protocol).await {
                    Ok(true) => {
                        simulate_transfer(timer.clone(), irq.clone(), transfer_time);
                    }
                    Ok(false) => {
                        debug!("Frame dropped, module still busy");
                    }
                    Err(e) => {
                        warn!("Frame rejected: {}", e);
                        break;
                    }
                }

                let (state, stats) = handle.status().await?;
                if stats.frames_sent - last_logged >= config.service.stats_interval_frames {
                    info!(
                        "Sent {} frames ({} busy rejections, {} clean shutdowns), driver {:?}",
                        stats.frames_sent, stats.busy_rejections, stats.shutdowns_completed, state
                    );
                    last_logged = stats.frames_sent;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let (_, stats) = handle.status().await?;
    handle.stop().await?;
    info!(
        "Total frames sent: {} (module power {})",
        stats.frames_sent,
        if power.is_on() { "on" } else { "off" }
    );

    drop(handle);
    drop(irq);
    service_task.await?;

    Ok(())
}

/// Install the tracing subscriber
///
/// The returned guard flushes the file writer on drop and must live until
/// exit.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let Some(file) = &config.logging.file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("Log file {} has no file name", file))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}

/// Play the hardware side of one transfer
///
/// Completes the DMA transfer after `transfer_time`, raises transfer-complete,
/// then raises the update event once the driver has enabled its interrupt.
fn simulate_transfer(timer: SimPulseTimer, irq: IrqLine, transfer_time: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(transfer_time).await;
        if !timer.finish_transfer() {
            return;
        }
        if irq.raise(IrqEvent::DmaTransferComplete).await.is_err() {
            return;
        }

        for _ in 0..UPDATE_EVENT_RETRIES {
            sleep(UPDATE_EVENT_DELAY).await;
            if timer.raise_update() {
                let _ = irq.raise(IrqEvent::TimerUpdate).await;
                return;
            }
        }
        debug!("Update interrupt never enabled for this transfer");
    })
}
