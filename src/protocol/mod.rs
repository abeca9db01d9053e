//! Wire protocol: newline-delimited JSON messages
//!
//! The device speaks line-oriented JSON over a serial byte stream. Each
//! message is one compact JSON object terminated by `\n`, discriminated by
//! its `type` field. Outbound commands are built with [`Command`]; inbound
//! lines are assembled by [`LineFramer`] and decoded by [`classify`] into
//! the [`Inbound`] sum type.

mod framer;
mod message;
pub mod validate;

pub use framer::{encode, LineFramer};
pub use message::{
    classify, Command, ConfigType, Inbound, InvalidLine, MessageKind, Response, ResponseStatus,
    SensorData, SensorIdent, SystemStatus, ThresholdBreach, Timestamp,
};
