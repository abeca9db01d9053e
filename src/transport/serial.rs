//! Serial transport implementation

use super::Transport;
use crate::error::Result;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Serial transport for UART communication
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0", "COM4")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    /// * `timeout` - Per-read timeout; keep this short, the reader loop
    ///   polls `available()` before reading
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport { port })
    }

    /// List serial device names on this machine
    ///
    /// Reserved system names (`COM0`, `COM1`) are excluded and the result
    /// is sorted with a numeric-aware order so `COM10` follows `COM9`.
    pub fn scan_ports() -> Vec<String> {
        let names = match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                log::warn!("Port scan failed: {}", e);
                Vec::new()
            }
        };
        sort_port_names(names)
    }
}

/// Filter reserved names and sort port names numeric-aware
pub fn sort_port_names(names: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = names
        .into_iter()
        .filter(|n| n != "COM0" && n != "COM1")
        .collect();
    names.sort_by_key(|n| {
        let digits: String = n.chars().filter(|c| c.is_ascii_digit()).collect();
        let prefix: String = n.chars().filter(|c| !c.is_ascii_digit()).collect();
        (prefix, digits.parse::<u64>().unwrap_or(0))
    });
    names
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.port.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn is_open(&mut self) -> bool {
        // An unplugged adapter keeps its handle but fails this probe.
        self.port.bytes_to_read().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_excludes_reserved_names() {
        let sorted = sort_port_names(vec![
            "COM4".to_string(),
            "COM0".to_string(),
            "COM1".to_string(),
            "COM3".to_string(),
        ]);
        assert_eq!(sorted, vec!["COM3", "COM4"]);
    }

    #[test]
    fn test_sort_is_numeric_aware() {
        let sorted = sort_port_names(vec![
            "COM10".to_string(),
            "COM2".to_string(),
            "COM9".to_string(),
        ]);
        assert_eq!(sorted, vec!["COM2", "COM9", "COM10"]);
    }

    #[test]
    fn test_sort_handles_tty_names() {
        let sorted = sort_port_names(vec![
            "/dev/ttyUSB1".to_string(),
            "/dev/ttyUSB0".to_string(),
        ]);
        assert_eq!(sorted, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }
}
