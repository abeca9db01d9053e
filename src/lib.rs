//! Thermolink - serial JSON link to a DS18B20 temperature controller
//!
//! Speaks the newline-delimited JSON protocol of an Arduino-class
//! temperature monitoring board: unsolicited sensor telemetry in,
//! configuration commands out, with temporal request/response
//! correlation on a single shared serial line.
//!
//! The crate is built around [`link::SerialLink`]: one background reader
//! thread owns the byte stream, and blocking command calls observe the
//! classified-line stream through a one-shot hand-off rather than reading
//! the port themselves.

pub mod config;
pub mod error;
pub mod link;
pub mod port;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use link::{ConnectionStats, SerialLink, TableSummary};
pub use protocol::{
    Command, ConfigType, Inbound, MessageKind, Response, SensorData, SensorIdent, SystemStatus,
    ThresholdBreach,
};
