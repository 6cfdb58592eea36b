use crate::base::error::Result;
use std::time::Duration;

/// Raw byte I/O to the device.
///
/// Implementations block for at most the given timeout on reads and never
/// interpret the bytes they move. Exactly one owner drives a transport at a time.
pub trait Transport {
    /// Opens the named port at the given baud rate (8 data bits, no parity, one stop bit).
    fn open(&mut self, name: &str, baud_rate: u32) -> Result<()>;

    /// Closes the port. Closing a closed port is not an error.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` while the port is open.
    fn is_open(&self) -> bool;

    /// Reads up to `buf.len()` bytes, waiting at most `timeout` for the first one.
    ///
    /// Returns `Ok(0)` when nothing arrived before the timeout.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Writes all of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Drops everything in the receive buffer.
    fn discard_input(&mut self) -> Result<()>;

    /// Drives the auxiliary control line (DTR) that powers the motor.
    fn set_control_line(&mut self, on: bool) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, name: &str, baud_rate: u32) -> Result<()> {
        (**self).open(name, baud_rate)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }

    fn set_control_line(&mut self, on: bool) -> Result<()> {
        (**self).set_control_line(on)
    }
}
