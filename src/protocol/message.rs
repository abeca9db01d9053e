//! Message types and the inbound line classifier

use super::validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound command frame
///
/// Built through the constructors; fields the caller did not supply are
/// omitted from the JSON entirely. The responder forwards exactly what was
/// given; range and ordering checks belong to the caller's boundary.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_type: Option<ConfigType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    th_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tl_value: Option<f64>,
}

/// Target of `set_config` commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Id,
    Th,
    Tl,
    Interval,
}

/// Sensor identity as supplied by a caller
///
/// Identity is over-determined on this wire: a sensor can be addressed by
/// its user-assigned ID (1-8) or by its 16-hex-digit hardware address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorIdent {
    Id(u8),
    Addr(String),
}

impl Command {
    fn new(kind: &'static str, command: Option<&'static str>) -> Self {
        Self {
            kind,
            command,
            sensor_id: None,
            sensor_addr: None,
            config_type: None,
            new_value: None,
            th_value: None,
            tl_value: None,
        }
    }

    fn with_ident(mut self, ident: &SensorIdent) -> Self {
        match ident {
            SensorIdent::Id(id) => self.sensor_id = Some(*id),
            SensorIdent::Addr(addr) => self.sensor_addr = Some(addr.clone()),
        }
        self
    }

    /// `{"type":"ping"}` - liveness probe, answered with a `pong` response
    pub fn ping() -> Self {
        Self::new("ping", None)
    }

    /// Request the device-global system status
    pub fn get_status() -> Self {
        Self::new("command", Some("get_status"))
    }

    /// Request the stored configuration for one sensor
    pub fn get_sensor_config(ident: &SensorIdent) -> Self {
        Self::new("command", Some("get_sensor_config")).with_ident(ident)
    }

    /// Change one configuration field for one sensor
    pub fn set_config(ident: &SensorIdent, config_type: ConfigType, new_value: Value) -> Self {
        let mut cmd = Self::new("command", Some("set_config")).with_ident(ident);
        cmd.config_type = Some(config_type);
        cmd.new_value = Some(new_value);
        cmd
    }

    /// Set TH and/or TL thresholds for one sensor
    pub fn set_threshold(ident: &SensorIdent, th: Option<f64>, tl: Option<f64>) -> Self {
        let mut cmd = Self::new("command", Some("set_threshold")).with_ident(ident);
        cmd.th_value = th;
        cmd.tl_value = tl;
        cmd
    }

    /// Bind a hardware address to a user-assigned ID
    pub fn assign_id(addr: &str, id: u8) -> Self {
        let mut cmd = Self::new("command", Some("set_sensor_data"));
        cmd.sensor_addr = Some(addr.to_string());
        cmd.sensor_id = Some(id);
        cmd
    }

    /// Action name for logging
    pub fn name(&self) -> &'static str {
        self.command.unwrap_or(self.kind)
    }
}

/// Device timestamps come in two shapes: `millis()` counters from the
/// firmware and ISO-8601 strings from newer builds. Accept both.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(u64),
    Text(String),
}

/// Periodic unsolicited telemetry for one sensor
#[derive(Debug, Clone, Deserialize)]
pub struct SensorData {
    pub sensor_addr: String,
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub temperature: f64,
    #[serde(default)]
    pub th_value: Option<f64>,
    #[serde(default)]
    pub tl_value: Option<f64>,
    #[serde(default)]
    pub measurement_interval: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl SensorData {
    /// The temperature, unless it is one of the bus-error sentinels
    pub fn reading(&self) -> Option<f64> {
        if validate::is_valid_reading(self.temperature) {
            Some(self.temperature)
        } else {
            None
        }
    }

    /// True once the sensor has a user-assigned label (not "00")
    pub fn is_configured(&self) -> bool {
        matches!(self.sensor_id.as_deref(), Some(id) if id != "00")
    }

    /// Label for logs and UIs: the user-assigned ID when configured,
    /// otherwise the hardware address
    pub fn display_name(&self) -> &str {
        match self.sensor_id.as_deref() {
            Some(id) if id != "00" => id,
            _ => &self.sensor_addr,
        }
    }

    /// A valid reading outside the TH/TL band, if thresholds are known
    pub fn threshold_breach(&self) -> Option<ThresholdBreach> {
        let temp = self.reading()?;
        if let Some(th) = self.th_value {
            if validate::round1(temp) > validate::round1(th) {
                return Some(ThresholdBreach::High);
            }
        }
        if let Some(tl) = self.tl_value {
            if validate::round1(temp) < validate::round1(tl) {
                return Some(ThresholdBreach::Low);
            }
        }
        None
    }
}

/// Which bound a reading crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdBreach {
    High,
    Low,
}

/// Reply to a command
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default)]
    pub sensor_id: Option<Value>,
    #[serde(default)]
    pub sensor_addr: Option<String>,
    #[serde(default)]
    pub th_value: Option<f64>,
    #[serde(default)]
    pub tl_value: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Device-global status snapshot
///
/// Identity fields reflect whichever sensor was last selected on the device,
/// not necessarily the one a caller is working with. Gate on
/// [`SystemStatus::concerns`] before trusting TH/TL values for a sensor.
#[derive(Debug, Clone, Default)]
pub struct SystemStatus {
    pub selected_sensor_id: Option<u8>,
    pub selected_sensor_addr: Option<String>,
    pub th_value: Option<f64>,
    pub tl_value: Option<f64>,
    pub measurement_interval: Option<u64>,
}

impl SystemStatus {
    /// Build from a raw JSON object, tolerating the firmware's field-name
    /// drift (`user_sensor_id`/`sensor_id`, `sensor_addr`).
    fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let mut status = SystemStatus::default();

        for key in ["selected_sensor_id", "user_sensor_id", "sensor_id"] {
            if let Some(id) = map.get(key).and_then(Value::as_u64) {
                if validate::is_valid_sensor_id(id as u8) {
                    status.selected_sensor_id = Some(id as u8);
                    break;
                }
            }
        }
        for key in ["selected_sensor_addr", "sensor_addr"] {
            if let Some(addr) = map.get(key).and_then(Value::as_str) {
                if validate::is_valid_address(addr) {
                    status.selected_sensor_addr = Some(addr.to_string());
                    break;
                }
            }
        }
        status.th_value = map.get("th_value").and_then(Value::as_f64);
        status.tl_value = map.get("tl_value").and_then(Value::as_f64);
        status.measurement_interval = map.get("measurement_interval").and_then(Value::as_u64);
        status
    }

    /// Does this status snapshot provably pertain to `ident`?
    ///
    /// ID match is authoritative; address match is the fallback. When the
    /// status carries neither matching field this returns false - callers
    /// must not guess.
    pub fn concerns(&self, ident: &SensorIdent) -> bool {
        match ident {
            SensorIdent::Id(id) => self.selected_sensor_id == Some(*id),
            SensorIdent::Addr(addr) => self
                .selected_sensor_addr
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(addr)),
        }
    }
}

/// Message kind used for response filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SensorData,
    Response,
    SystemStatus,
}

/// A classified inbound line
#[derive(Debug, Clone)]
pub enum Inbound {
    SensorData(SensorData),
    Response(Response),
    SystemStatus(SystemStatus),
}

impl Inbound {
    pub fn kind(&self) -> MessageKind {
        match self {
            Inbound::SensorData(_) => MessageKind::SensorData,
            Inbound::Response(_) => MessageKind::Response,
            Inbound::SystemStatus(_) => MessageKind::SystemStatus,
        }
    }

    /// Is a (known) field present on this message?
    ///
    /// Used by the responder's required-field filter; unknown names are
    /// treated as absent.
    pub fn has_field(&self, field: &str) -> bool {
        match self {
            Inbound::SensorData(d) => match field {
                "sensor_addr" | "temperature" => true,
                "sensor_id" => d.sensor_id.is_some(),
                "th_value" => d.th_value.is_some(),
                "tl_value" => d.tl_value.is_some(),
                "measurement_interval" => d.measurement_interval.is_some(),
                "timestamp" => d.timestamp.is_some(),
                _ => false,
            },
            Inbound::Response(r) => match field {
                "status" | "message" => true,
                "sensor_id" => r.sensor_id.is_some(),
                "sensor_addr" => r.sensor_addr.is_some(),
                "th_value" => r.th_value.is_some(),
                "tl_value" => r.tl_value.is_some(),
                "timestamp" => r.timestamp.is_some(),
                _ => false,
            },
            Inbound::SystemStatus(s) => match field {
                "selected_sensor_id" => s.selected_sensor_id.is_some(),
                "selected_sensor_addr" => s.selected_sensor_addr.is_some(),
                "th_value" => s.th_value.is_some(),
                "tl_value" => s.tl_value.is_some(),
                "measurement_interval" => s.measurement_interval.is_some(),
                _ => false,
            },
        }
    }
}

/// Why a line was rejected
///
/// Rejected lines are dropped by the reader loop with a debug log; the
/// device prints plenty of out-of-protocol debug output, so none of these
/// are hard errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidLine {
    #[error("not a JSON object")]
    NotJson,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{kind} missing fields: {fields:?}")]
    MissingFields {
        kind: &'static str,
        fields: Vec<&'static str>,
    },
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

fn missing(map: &serde_json::Map<String, Value>, required: &[&'static str]) -> Vec<&'static str> {
    required
        .iter()
        .filter(|k| !map.contains_key(**k))
        .copied()
        .collect()
}

/// Classify one complete line into a typed inbound message
pub fn classify(line: &str) -> std::result::Result<Inbound, InvalidLine> {
    let line = line.trim();
    if !(line.starts_with('{') && line.ends_with('}')) {
        return Err(InvalidLine::NotJson);
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| InvalidLine::Parse(e.to_string()))?;
    let Some(map) = value.as_object() else {
        return Err(InvalidLine::NotJson);
    };

    let kind = map.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "sensor_data" => {
            let absent = missing(map, &["sensor_addr", "temperature"]);
            if !absent.is_empty() {
                return Err(InvalidLine::MissingFields {
                    kind: "sensor_data",
                    fields: absent,
                });
            }
            let data: SensorData = serde_json::from_value(value.clone())
                .map_err(|e| InvalidLine::Parse(e.to_string()))?;
            if !validate::is_valid_address(&data.sensor_addr) {
                return Err(InvalidLine::InvalidField {
                    field: "sensor_addr",
                    value: data.sensor_addr,
                });
            }
            if let Some(id) = data.sensor_id.as_deref() {
                if !validate::is_valid_sensor_label(id) {
                    return Err(InvalidLine::InvalidField {
                        field: "sensor_id",
                        value: id.to_string(),
                    });
                }
            }
            if let Some(interval) = data.measurement_interval {
                if !validate::is_valid_interval(interval) {
                    return Err(InvalidLine::InvalidField {
                        field: "measurement_interval",
                        value: interval.to_string(),
                    });
                }
            }
            Ok(Inbound::SensorData(data))
        }
        "response" => {
            let absent = missing(map, &["status", "message"]);
            if !absent.is_empty() {
                return Err(InvalidLine::MissingFields {
                    kind: "response",
                    fields: absent,
                });
            }
            let response: Response =
                serde_json::from_value(value).map_err(|e| InvalidLine::Parse(e.to_string()))?;
            Ok(Inbound::Response(response))
        }
        "system_status" => Ok(Inbound::SystemStatus(SystemStatus::from_map(map))),
        other => Err(InvalidLine::UnsupportedType(other.to_string())),
    }
}
