//! Serial link engine: connection lifecycle, background reading, and
//! request/response correlation
//!
//! # Thread model
//!
//! 1. **Reader thread** (continuous): sole reader of the transport. Parses
//!    every inbound line and fans it out to the sensor table, callbacks,
//!    the bounded telemetry queue, and - when an exchange is in flight -
//!    the responder's one-shot waiter.
//!
//! 2. **Caller threads**: issue blocking [`SerialLink::send_and_wait`]
//!    calls. They never read the transport themselves; they observe the
//!    classified-line stream through the waiter hand-off. This keeps a
//!    single owner on the raw byte stream, so a blocking request cannot
//!    steal telemetry bytes from the reader (or vice versa).
//!
//! There are no request IDs on the wire; correlation is temporal ("next
//! line of the right kind and shape"). A gate mutex keeps exchanges
//! serialized so two callers cannot race for the same line.

mod reader;
mod table;

pub use table::{SensorTable, TableSummary};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::port::{ConnectionState, PortManager};
use crate::protocol::{
    encode, Command, ConfigType, Inbound, MessageKind, Response, SensorData, SensorIdent,
    SystemStatus,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type DataCallback = Box<dyn Fn(&SensorData) + Send>;
type ResponseCallback = Box<dyn Fn(&Response) + Send>;
type StatusCallback = Box<dyn Fn(&SystemStatus) + Send>;
type ErrorCallback = Box<dyn Fn(&Error) + Send>;

#[derive(Default)]
struct Callbacks {
    data: Option<DataCallback>,
    response: Option<ResponseCallback>,
    status: Option<StatusCallback>,
    error: Option<ErrorCallback>,
}

/// One-shot filter registered by a blocked `send_and_wait` caller
struct Waiter {
    kind: MessageKind,
    required_fields: Vec<String>,
    tx: Sender<Inbound>,
}

impl Waiter {
    fn matches(&self, msg: &Inbound) -> bool {
        msg.kind() == self.kind && self.required_fields.iter().all(|f| msg.has_field(f))
    }
}

/// State shared between the reader thread and the link facade
pub(crate) struct LinkShared {
    pub(crate) table: Mutex<SensorTable>,
    callbacks: Mutex<Callbacks>,
    waiter: Mutex<Option<Waiter>>,
    data_tx: Sender<SensorData>,
    data_rx: Receiver<SensorData>,
    last_status: Mutex<Option<SystemStatus>>,
    total_received: AtomicU64,
}

impl LinkShared {
    fn new(queue_capacity: usize, history_cap: usize) -> Self {
        let (data_tx, data_rx) = bounded(queue_capacity);
        Self {
            table: Mutex::new(SensorTable::new(history_cap)),
            callbacks: Mutex::new(Callbacks::default()),
            waiter: Mutex::new(None),
            data_tx,
            data_rx,
            last_status: Mutex::new(None),
            total_received: AtomicU64::new(0),
        }
    }

    /// Route one classified message
    pub(crate) fn dispatch(&self, msg: Inbound) {
        self.total_received.fetch_add(1, Ordering::Relaxed);

        // Cache the latest status before any hand-off so it stays fresh
        // even when an exchange consumes the line.
        if let Inbound::SystemStatus(status) = &msg {
            *self.last_status.lock() = Some(status.clone());
        }

        // An in-flight exchange gets first claim; its matching line is
        // consumed exactly once. Everything else flows through normally.
        let msg = match self.offer_to_waiter(msg) {
            None => return,
            Some(msg) => msg,
        };

        match msg {
            Inbound::SensorData(data) => {
                self.table.lock().upsert(data.clone());
                if let Some(cb) = &self.callbacks.lock().data {
                    cb(&data);
                }
                // Bounded queue: a slow consumer loses the oldest reading,
                // never unbounded memory.
                while self.data_tx.try_send(data.clone()).is_err() {
                    if self.data_rx.try_recv().is_err() {
                        break;
                    }
                }
            }
            Inbound::Response(response) => {
                if let Some(cb) = &self.callbacks.lock().response {
                    cb(&response);
                }
            }
            Inbound::SystemStatus(status) => {
                if let Some(cb) = &self.callbacks.lock().status {
                    cb(&status);
                }
            }
        }
    }

    fn offer_to_waiter(&self, msg: Inbound) -> Option<Inbound> {
        let mut slot = self.waiter.lock();
        if slot.as_ref().is_some_and(|w| w.matches(&msg)) {
            let waiter = slot.take().expect("waiter checked above");
            // Send while still holding the slot lock. The channel has
            // capacity and at most one send per registration, so this never
            // blocks; it guarantees that an empty slot implies the matched
            // line is already in the channel, which the timeout path in
            // `send_and_wait` relies on.
            match waiter.tx.send(msg) {
                Ok(()) => None,
                // Caller already gone; let the line take the normal path.
                Err(err) => Some(err.into_inner()),
            }
        } else {
            Some(msg)
        }
    }

    pub(crate) fn fire_error(&self, error: &Error) {
        if let Some(cb) = &self.callbacks.lock().error {
            cb(error);
        }
    }
}

/// Connection statistics snapshot for UIs
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub is_connected: bool,
    pub is_healthy: bool,
    pub port: Option<String>,
    pub baudrate: u32,
    pub last_error: Option<String>,
    pub total_received: u64,
    pub sensor_count: usize,
    pub queue_depth: usize,
    pub uptime: Option<Duration>,
    pub last_data_age: Option<Duration>,
}

/// The serial JSON command/response engine
///
/// Owns the port manager, the background reader, the sensor table, and the
/// request/response correlation machinery. Construct one per device link
/// and pass it by reference to whatever layer needs it.
pub struct SerialLink {
    config: AppConfig,
    ports: PortManager,
    shared: Arc<LinkShared>,
    shutdown: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    exchange_gate: Mutex<()>,
}

impl SerialLink {
    pub fn new(config: AppConfig) -> Self {
        let shared = Arc::new(LinkShared::new(
            config.telemetry.queue_capacity,
            config.telemetry.history_capacity,
        ));
        let ports = PortManager::new(Duration::from_millis(config.serial.settle_delay_ms));
        Self {
            config,
            ports,
            shared,
            shutdown: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
            exchange_gate: Mutex::new(()),
        }
    }

    // === Connection lifecycle ===

    /// List candidate serial ports
    pub fn scan_ports() -> Vec<String> {
        PortManager::scan_ports()
    }

    /// Open `port` with the configured baudrate; idempotent
    pub fn connect(&self, port: &str) -> bool {
        self.ports.connect(
            port,
            self.config.serial.baudrate,
            Duration::from_millis(self.config.serial.read_timeout_ms),
        )
    }

    /// Attach an already-open transport (tests, simulated devices)
    pub fn connect_transport(&self, transport: Box<dyn crate::transport::Transport>, label: &str) {
        self.ports.attach(transport, label);
    }

    /// Stop reading and close the port; never raises
    pub fn disconnect(&self) {
        self.stop_reading();
        self.ports.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.ports.is_connected()
    }

    /// Connected and recently heard from (UIs fall back to demo mode on false)
    pub fn is_healthy(&self) -> bool {
        self.ports
            .is_healthy(Duration::from_millis(self.config.telemetry.health_window_ms))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ports.state()
    }

    // === Reader lifecycle ===

    /// Spawn the background reader; false if already running or not connected
    pub fn start_reading(&self) -> bool {
        let mut slot = self.reader.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            log::warn!("Reader already running");
            return false;
        }
        if !self.ports.is_connected() {
            log::error!("Cannot start reader: not connected");
            return false;
        }

        self.shutdown.store(false, Ordering::Relaxed);
        let transport = self.ports.shared_transport();
        let state = self.ports.shared_state();
        let shared = Arc::clone(&self.shared);
        let shutdown = Arc::clone(&self.shutdown);
        let stale_after = Duration::from_millis(self.config.telemetry.stale_after_ms);

        let handle = thread::Builder::new()
            .name("thermolink-reader".to_string())
            .spawn(move || {
                reader::reader_loop(transport, state, shared, shutdown, stale_after);
            });

        match handle {
            Ok(handle) => {
                *slot = Some(handle);
                log::info!("Reader thread started");
                true
            }
            Err(e) => {
                log::error!("Failed to spawn reader thread: {}", e);
                false
            }
        }
    }

    /// Request shutdown and join the reader with a bounded wait
    pub fn stop_reading(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            // The loop polls every ~10ms; give it ample slack but never
            // block indefinitely on an unresponsive device.
            let deadline = Instant::now() + Duration::from_secs(2);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::error!("Reader thread panicked");
                }
            } else {
                log::warn!("Reader thread did not stop in time, detaching");
            }
        }
    }

    // === Callbacks ===

    pub fn on_sensor_data(&self, cb: impl Fn(&SensorData) + Send + 'static) {
        self.shared.callbacks.lock().data = Some(Box::new(cb));
    }

    pub fn on_response(&self, cb: impl Fn(&Response) + Send + 'static) {
        self.shared.callbacks.lock().response = Some(Box::new(cb));
    }

    pub fn on_status(&self, cb: impl Fn(&SystemStatus) + Send + 'static) {
        self.shared.callbacks.lock().status = Some(Box::new(cb));
    }

    pub fn on_error(&self, cb: impl Fn(&Error) + Send + 'static) {
        self.shared.callbacks.lock().error = Some(Box::new(cb));
    }

    // === Request/response correlation ===

    /// Send a command and block for the next matching line
    ///
    /// Matching means: kind equals `required_kind` and every name in
    /// `required_fields` is present. Non-matching lines received during the
    /// wait still take the normal reader dispatch path, so concurrent
    /// telemetry is never lost to a blocking call.
    pub fn send_and_wait(
        &self,
        command: &Command,
        timeout: Duration,
        required_kind: MessageKind,
        required_fields: &[&str],
    ) -> Result<Inbound> {
        if !self.ports.is_connected() {
            return Err(Error::NotConnected);
        }
        let _gate = self.exchange_gate.lock();

        // Let the reader digest anything already buffered so a stale line
        // cannot be matched as this exchange's answer. The reader stays the
        // sole reader of the transport; this only watches `available()`.
        if self.config.protocol.drain_before_send {
            self.ports
                .await_quiescent(Duration::from_millis(self.config.protocol.drain_budget_ms));
        }

        // Register the waiter before writing so the answer cannot slip past
        // between write and wait.
        let (tx, rx) = bounded(1);
        *self.shared.waiter.lock() = Some(Waiter {
            kind: required_kind,
            required_fields: required_fields.iter().map(|s| s.to_string()).collect(),
            tx,
        });

        let frame = encode(command)?;
        log::debug!("Sending {} ({} bytes)", command.name(), frame.len());
        if let Err(e) = self.ports.write_all(&frame) {
            self.shared.waiter.lock().take();
            return Err(e);
        }

        match rx.recv_timeout(timeout) {
            Ok(msg) => Ok(msg),
            Err(_) => {
                let reclaimed = self.shared.waiter.lock().take();
                if reclaimed.is_none() {
                    // The reader matched a line in the instant the wait
                    // expired; it is sitting in the channel, not lost.
                    if let Ok(msg) = rx.try_recv() {
                        return Ok(msg);
                    }
                }
                log::debug!("{}: no matching line within {:?}", command.name(), timeout);
                Err(Error::Timeout)
            }
        }
    }

    /// `send_and_wait` with a bounded retry loop
    ///
    /// Absorbs device boot latency: a board that just reset may need 1-2
    /// seconds before it answers anything. Only timeouts are retried;
    /// every other outcome is returned immediately.
    pub fn send_and_wait_with_retries(
        &self,
        command: &Command,
        attempts: u32,
        per_attempt_timeout: Duration,
        backoff: Duration,
        required_kind: MessageKind,
        required_fields: &[&str],
    ) -> Result<Inbound> {
        for attempt in 1..=attempts.max(1) {
            match self.send_and_wait(command, per_attempt_timeout, required_kind, required_fields)
            {
                Err(Error::Timeout) if attempt < attempts => {
                    log::debug!(
                        "{}: attempt {}/{} timed out, retrying",
                        command.name(),
                        attempt,
                        attempts
                    );
                    thread::sleep(backoff);
                }
                other => return other,
            }
        }
        Err(Error::Timeout)
    }

    fn exchange(
        &self,
        command: &Command,
        required_kind: MessageKind,
        required_fields: &[&str],
    ) -> Result<Inbound> {
        self.send_and_wait_with_retries(
            command,
            self.config.protocol.retry_attempts,
            Duration::from_millis(self.config.protocol.response_timeout_ms),
            Duration::from_millis(self.config.protocol.retry_backoff_ms),
            required_kind,
            required_fields,
        )
    }

    // === Command helpers ===
    //
    // These forward exactly the fields given; TH>TL ordering and value
    // ranges are the caller's boundary to validate.

    /// Liveness probe; true if the device answered the ping
    pub fn ping(&self, timeout: Duration) -> bool {
        self.send_and_wait(&Command::ping(), timeout, MessageKind::Response, &[])
            .is_ok()
    }

    /// Query the device-global status
    pub fn get_status(&self) -> Result<SystemStatus> {
        match self.exchange(&Command::get_status(), MessageKind::SystemStatus, &[])? {
            Inbound::SystemStatus(status) => Ok(status),
            other => Err(Error::Other(format!("unexpected message: {:?}", other))),
        }
    }

    /// Query the device-global status, gated to one sensor's identity
    ///
    /// Returns `Ok(None)` when the device's status does not provably
    /// pertain to `ident` - the values must not be displayed for that
    /// sensor in that case.
    pub fn get_status_for(&self, ident: &SensorIdent) -> Result<Option<SystemStatus>> {
        let status = self.get_status()?;
        Ok(if status.concerns(ident) {
            Some(status)
        } else {
            None
        })
    }

    /// Fetch the stored TH/TL for one sensor
    pub fn query_thresholds(&self, ident: &SensorIdent) -> Result<(f64, f64)> {
        let msg = self.exchange(
            &Command::get_sensor_config(ident),
            MessageKind::Response,
            &["th_value", "tl_value"],
        )?;
        match msg {
            Inbound::Response(r) if r.is_success() => {
                // Field presence was part of the match filter.
                Ok((r.th_value.unwrap_or_default(), r.tl_value.unwrap_or_default()))
            }
            Inbound::Response(r) => Err(Error::Device(r.message)),
            other => Err(Error::Other(format!("unexpected message: {:?}", other))),
        }
    }

    /// Set TH and/or TL for one sensor
    pub fn set_threshold(
        &self,
        ident: &SensorIdent,
        th: Option<f64>,
        tl: Option<f64>,
    ) -> Result<Response> {
        if th.is_none() && tl.is_none() {
            return Err(Error::InvalidParameter(
                "at least one of TH/TL required".to_string(),
            ));
        }
        if let (Some(th), Some(tl)) = (th, tl) {
            if !crate::protocol::validate::thresholds_ordered(th, tl) {
                return Err(Error::InvalidParameter(format!(
                    "TH ({}) must be greater than TL ({})",
                    th, tl
                )));
            }
        }
        self.expect_success(&Command::set_threshold(ident, th, tl))
    }

    /// Change one configuration field for one sensor
    pub fn set_config(
        &self,
        ident: &SensorIdent,
        config_type: ConfigType,
        new_value: serde_json::Value,
    ) -> Result<Response> {
        self.expect_success(&Command::set_config(ident, config_type, new_value))
    }

    /// Bind a hardware address to a user-assigned ID (1-8)
    pub fn assign_id(&self, addr: &str, id: u8) -> Result<Response> {
        self.expect_success(&Command::assign_id(addr, id))
    }

    fn expect_success(&self, command: &Command) -> Result<Response> {
        match self.exchange(command, MessageKind::Response, &[])? {
            Inbound::Response(r) if r.is_success() => Ok(r),
            Inbound::Response(r) => Err(Error::Device(r.message)),
            other => Err(Error::Other(format!("unexpected message: {:?}", other))),
        }
    }

    /// Send a raw text command line (firmware also accepts a small text
    /// protocol, e.g. `SET_SENSOR_ID:<addr>:<id>`)
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut bytes = line.trim().as_bytes().to_vec();
        bytes.push(b'\n');
        self.ports.write_all(&bytes)
    }

    // === Snapshots ===

    /// Pop one queued telemetry reading, if any
    pub fn try_recv_data(&self) -> Option<SensorData> {
        self.shared.data_rx.try_recv().ok()
    }

    /// Latest valid reading per sensor address
    pub fn get_current_temperatures(&self) -> std::collections::HashMap<String, f64> {
        self.shared.table.lock().current_temperatures()
    }

    /// Most recent `count` readings, oldest first
    pub fn get_latest_sensor_data(&self, count: usize) -> Vec<SensorData> {
        self.shared.table.lock().latest(count)
    }

    /// Current sensors in display order
    pub fn sensors_snapshot(&self) -> Vec<SensorData> {
        self.shared.table.lock().snapshot_sorted()
    }

    /// Cached last system_status line, if any was seen
    pub fn last_status(&self) -> Option<SystemStatus> {
        self.shared.last_status.lock().clone()
    }

    pub fn table_summary(&self) -> TableSummary {
        self.shared.table.lock().summary()
    }

    pub fn get_connection_stats(&self) -> ConnectionStats {
        let state = self.ports.state();
        ConnectionStats {
            is_connected: self.is_connected(),
            is_healthy: self.is_healthy(),
            port: state.port,
            baudrate: state.baudrate,
            last_error: state.last_error,
            total_received: self.shared.total_received.load(Ordering::Relaxed),
            sensor_count: self.shared.table.lock().len(),
            queue_depth: self.shared.data_rx.len(),
            uptime: state.connected_since.map(|t| t.elapsed()),
            last_data_age: state.last_data_time.map(|t| t.elapsed()),
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.disconnect();
    }
}
