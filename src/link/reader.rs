//! Background reader loop
//!
//! The single owner of all transport reads for a connection's lifetime.
//! Continuously drains available bytes, assembles lines, classifies them,
//! and routes each message: to the in-flight responder waiter, the sensor
//! table, the bounded telemetry queue, and registered callbacks.

use super::LinkShared;
use crate::port::{ConnectionState, SharedTransport};
use crate::protocol::{classify, LineFramer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Idle sleep between poll iterations
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often the staleness sweep runs
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub(super) fn reader_loop(
    transport: SharedTransport,
    state: Arc<Mutex<ConnectionState>>,
    shared: Arc<LinkShared>,
    shutdown: Arc<AtomicBool>,
    stale_after: Duration,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 512];
    let mut last_sweep = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        let read_result = {
            let mut guard = transport.lock();
            let Some(port) = guard.as_mut() else {
                log::info!("Reader: transport closed, exiting");
                break;
            };
            match port.available() {
                Ok(0) => Ok(0),
                Ok(_) => port.read(&mut buf),
                Err(e) => Err(e),
            }
        };

        match read_result {
            Ok(0) => {}
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    if line.trim().is_empty() {
                        continue;
                    }
                    state.lock().last_data_time = Some(Instant::now());
                    match classify(&line) {
                        Ok(msg) => shared.dispatch(msg),
                        // A broken line must never stop the reader; the
                        // device prints plenty of out-of-protocol output.
                        Err(reason) => log::debug!("Dropping line ({}): {}", reason, line),
                    }
                }
            }
            Err(e) => {
                log::error!("Reader: transport error: {}", e);
                {
                    let mut st = state.lock();
                    st.is_connected = false;
                    st.last_error = Some(e.to_string());
                }
                shared.fire_error(&e);
                // Do not spin on a dead connection.
                break;
            }
        }

        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            let removed = shared.table.lock().evict_stale(stale_after);
            if removed > 0 {
                log::debug!("Evicted {} stale sensor(s)", removed);
            }
            last_sweep = Instant::now();
        }

        thread::sleep(POLL_INTERVAL);
    }

    log::info!("Reader thread exiting");
}
