//! Thermolink - temperature monitoring daemon
//!
//! Connects to an Arduino-class DS18B20 controller over serial, keeps a
//! live table of sensor readings, and logs threshold breaches. One
//! background reader thread owns the serial line; the main thread issues
//! the initial status exchange and then reports link statistics.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thermolink::protocol::ThresholdBreach;
use thermolink::{AppConfig, Error, Result, SerialLink};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `thermolink <path>` (positional)
/// - `thermolink --config <path>` (flag-based)
/// - `thermolink -c <path>` (short flag)
///
/// Defaults to `/etc/thermolink.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/thermolink.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = match AppConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config {} not usable ({}), using defaults", config_path, e);
            AppConfig::default()
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.logging.level),
    )
    .init();

    log::info!("Thermolink v0.3.0 starting...");
    log::info!("Using config: {}", config_path);

    // Pick a port: configured, or the first scanned candidate
    let port = if config.serial.port.is_empty() {
        let candidates = SerialLink::scan_ports();
        log::info!("Scanned ports: {:?}", candidates);
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::Config("no serial ports found and none configured".into()))?
    } else {
        config.serial.port.clone()
    };

    let link = SerialLink::new(config);

    if !link.connect(&port) {
        let state = link.connection_state();
        return Err(Error::Config(format!(
            "failed to open {}: {}",
            port,
            state.last_error.unwrap_or_else(|| "unknown error".into())
        )));
    }

    link.on_sensor_data(|data| {
        match data.threshold_breach() {
            Some(ThresholdBreach::High) => log::warn!(
                "HIGH ALARM {}: {:?} above TH",
                data.display_name(),
                data.reading()
            ),
            Some(ThresholdBreach::Low) => log::warn!(
                "LOW ALARM {}: {:?} below TL",
                data.display_name(),
                data.reading()
            ),
            None => log::debug!("{}: {:?}", data.display_name(), data.reading()),
        }
    });
    link.on_error(|e| log::error!("Link error: {}", e));

    if !link.start_reading() {
        link.disconnect();
        return Err(Error::Other("failed to start reader thread".into()));
    }

    // Freshly-reset boards take a moment before answering; retries cover it
    match link.get_status() {
        Ok(status) => log::info!(
            "Device status: selected sensor {:?} @ {:?}, interval {:?} ms",
            status.selected_sensor_id,
            status.selected_sensor_addr,
            status.measurement_interval
        ),
        Err(e) => log::warn!("Initial status query failed: {}", e),
    }

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("Thermolink running on {}. Press Ctrl-C to stop.", port);

    let mut since_report = Duration::ZERO;
    const TICK: Duration = Duration::from_millis(500);
    const REPORT_EVERY: Duration = Duration::from_secs(10);

    while running.load(Ordering::Relaxed) {
        thread::sleep(TICK);
        since_report += TICK;
        if since_report < REPORT_EVERY {
            continue;
        }
        since_report = Duration::ZERO;

        let stats = link.get_connection_stats();
        let summary = link.table_summary();
        log::info!(
            "{} sensors ({} configured, {} alarms), {} lines received, healthy: {}",
            summary.total,
            summary.configured,
            summary.alarms,
            stats.total_received,
            stats.is_healthy
        );
        if !stats.is_healthy {
            log::warn!(
                "No data for {:?} (last error: {:?})",
                stats.last_data_age,
                stats.last_error
            );
        }
    }

    // Shutdown
    log::info!("Shutting down...");
    link.disconnect();
    log::info!("Thermolink stopped");
    Ok(())
}
