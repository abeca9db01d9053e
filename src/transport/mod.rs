//! Transport layer for I/O abstraction

use crate::error::Result;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::{sort_port_names, SerialTransport};

/// Transport trait for device communication
///
/// Implementations are byte-oriented duplex connections. Reads are expected
/// to be non-blocking or near-non-blocking: a read with nothing pending
/// returns `Ok(0)` rather than an error.
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check how many bytes are available to read
    fn available(&mut self) -> Result<usize>;

    /// Discard any unread input
    fn clear_input(&mut self) -> Result<()>;

    /// Probe whether the underlying connection is still usable
    ///
    /// A handle whose device went away must not report itself open.
    fn is_open(&mut self) -> bool {
        true
    }

    /// Write an entire buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            written += self.write(&data[written..])?;
        }
        Ok(())
    }
}
