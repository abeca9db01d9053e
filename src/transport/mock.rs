//! Mock transport for testing

use super::Transport;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock transport for unit and integration testing
///
/// Cloning yields a handle to the same buffers, so a test "device" thread
/// can inject reads and observe writes while the link under test holds the
/// transport.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    broken: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject data to be read by the transport owner
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.inner.lock();
        inner.read_buffer.extend(data);
    }

    /// Inject one newline-terminated line
    pub fn inject_line(&self, line: &str) {
        self.inject_read(line.as_bytes());
        self.inject_read(b"\n");
    }

    /// Take all data written so far
    pub fn take_written(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.write_buffer)
    }

    /// Simulate an unplugged device: subsequent reads and writes fail
    pub fn break_connection(&self) {
        self.inner.lock().broken = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.broken {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock transport broken",
            )
            .into());
        }
        let available = inner.read_buffer.len().min(buffer.len());
        for slot in buffer.iter_mut().take(available) {
            *slot = inner.read_buffer.pop_front().unwrap();
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.broken {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock transport broken",
            )
            .into());
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        let inner = self.inner.lock();
        if inner.broken {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock transport broken",
            )
            .into());
        }
        Ok(inner.read_buffer.len())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.inner.lock().read_buffer.clear();
        Ok(())
    }

    fn is_open(&mut self) -> bool {
        !self.inner.lock().broken
    }
}
