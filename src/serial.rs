use crate::base::{Error, Result, Transport};
use log::{debug, trace};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// `Transport` over a serial port, 8N1. DTR drives the motor.
#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new() -> SerialTransport {
        SerialTransport::default()
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::invalid_state("serial port is not open"))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, name: &str, baud_rate: u32) -> Result<()> {
        if self.port.is_some() {
            return Err(Error::invalid_state("serial port is already open"));
        }

        let port = serialport::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(10))
            .open()?;
        debug!("Opened serial port {} at {} baud", name, baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(port) = self.port.take() {
            debug!("Closing serial port {:?}", port.name());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port()?;
        port.set_timeout(timeout)?;
        match port.read(buf) {
            Ok(count) => Ok(count),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                trace!("Serial read timed out after {:?}", timeout);
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn set_control_line(&mut self, on: bool) -> Result<()> {
        self.port()?.write_data_terminal_ready(on)?;
        Ok(())
    }
}
