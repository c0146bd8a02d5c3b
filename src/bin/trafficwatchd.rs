//! trafficwatchd - traffic enforcement daemon
//!
//! This daemon:
//! 1. Acquires a video source through the capture manager's fallback ladder
//! 2. Runs the frame-differencing / speed-tracking pipeline on every frame
//! 3. Writes emitted violations to stdout as JSON lines
//! 4. Steps the road-network telemetry simulator on the update interval
//! 5. Shuts down cleanly on SIGINT, releasing the source

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use trafficwatch::motion::{DifferConfig, TrackerConfig};
use trafficwatch::{
    Monitor, MonitorConfig, SharedSettings, SyntheticProvider, TrafficSimulator, ViolationFeed,
};

/// Tick cadence of the main loop. The source gates frame delivery to its own
/// fps; polling faster only costs a no-op tick.
const TICK_INTERVAL: Duration = Duration::from_millis(15);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "trafficwatchd", version, about = "Traffic enforcement daemon")]
struct Args {
    /// Config file path (TOML). Overrides TRAFFICWATCH_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exit after this many seconds instead of running until SIGINT.
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("TRAFFICWATCH_CONFIG", path);
    }
    let cfg = MonitorConfig::load()?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let settings = SharedSettings::new(cfg.detection);
    let provider = SyntheticProvider::new(cfg.scene.to_scene());
    let tracker = TrackerConfig {
        location: cfg.location.clone(),
        ..TrackerConfig::default()
    };
    let mut monitor = Monitor::with_configs(
        provider,
        settings.clone(),
        ViolationFeed::with_capacity(cfg.feed_capacity),
        DifferConfig::default(),
        tracker,
    );
    let mut simulator = TrafficSimulator::new();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    log::info!(
        "trafficwatchd v{} monitoring {} (threshold {} km/h)",
        env!("CARGO_PKG_VERSION"),
        cfg.location,
        settings.speed_threshold_kmh()
    );

    if let Err(err) = runtime.block_on(monitor.start()) {
        log::error!("capture start failed: {err}");
        log::error!("{}", err.kind.remedy());
        return Err(err.into());
    }

    let started = Instant::now();
    let mut last_telemetry = Instant::now();
    let mut last_health_log = Instant::now();
    let mut tick_count = 0u64;

    while running.load(Ordering::SeqCst) {
        if let Some(limit) = args.duration_secs {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        if let Some(report) = monitor.tick()? {
            tick_count += 1;
            if let Some(violation) = &report.violation {
                simulator.record_incident();
                println!("{}", serde_json::to_string(violation)?);
            }
        }

        if last_telemetry.elapsed() >= settings.update_interval() {
            simulator.step();
            let stats = simulator.stats();
            log::info!(
                "telemetry: avg {:.1} km/h, {} vehicles, congestion {:.2}, incidents {}",
                stats.average_speed_kmh,
                stats.active_vehicles,
                stats.congestion_index,
                stats.incidents_reported
            );
            last_telemetry = Instant::now();
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::debug!(
                "pipeline: status={:?} ticks={} detections={}",
                monitor.status(),
                tick_count,
                monitor.detections()
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(TICK_INTERVAL);
    }

    let detections = monitor.detections();
    monitor.stop();
    log::info!("trafficwatchd stopped after {tick_count} frames, {detections} detections");
    Ok(())
}
