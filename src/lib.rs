//! # RPLIDAR serial driver
//!
//! `rplidar_serial` drives Slamtec RPLIDAR A-series sensors over a serial link.
//! [`Lidar`] issues device commands and turns the legacy and express legacy
//! measurement streams into [`Measurement`]s and whole-rotation [`Scan`]s.
//! [`DeviceSession`] runs a lidar on a worker thread, recovering from
//! failures by resetting the device, and publishes scans through a channel.

extern crate byteorder;
extern crate crossbeam_channel;
extern crate log;
extern crate serialport;

mod answers;
pub mod assembler;
pub mod base;
mod checksum;
mod cmds;
pub mod configuration;
mod internals;
pub mod parsers;
mod protocol;
pub mod serial;
pub mod session;
pub mod types;
pub mod utils;

pub use crate::answers::Descriptor;
pub use crate::assembler::{Discipline, ScanAssembler};
pub use crate::base::{
    CommandChannel, Error, LogForwarder, LogSink, Message, Result, Severity, Transport,
};
pub use crate::parsers::{DecodeOutcome, ScanDecoder};
pub use crate::serial::SerialTransport;
pub use crate::session::{DeviceSession, OutputKind, ScanEvent, SessionConfig, SessionState};
pub use crate::types::{
    AngleTransform, Configuration, HealthInfo, HealthStatus, LidarInfo, Measurement, Scan,
    ScanMode, ScanModeConfiguration, ScanOptions,
};

use crate::answers::*;
use crate::cmds::*;
use crate::internals::*;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, trace, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Connection to and control interface for an RPLIDAR device.
///
/// All operations run on the calling thread and block for at most their timeout.
/// Measurements are retrieved in exactly one of three ways per scan run:
/// [`get_scan`](Lidar::get_scan), [`grab_scan_with_timeout`](Lidar::grab_scan_with_timeout)
/// or [`get_measurements`](Lidar::get_measurements).
///
/// # Example
/// ```ignore
/// let mut lidar = Lidar::with_transport(SerialTransport::new());
/// lidar.open("/dev/ttyUSB0", 115200)?;
/// lidar.start_scan(ScanMode::Legacy, ScanOptions::default())?;
/// lidar.control_motor(true)?;
/// loop {
///     if let Some(scan) = lidar.get_scan()? {
///         println!("{} points in {:?}", scan.measurements.len(), scan.duration);
///     }
/// }
/// ```
pub struct Lidar<T: Transport> {
    channel: CommandChannel<T>,
    decoder: Option<ScanDecoder>,
    assembler: ScanAssembler,
    /// Scan bytes received ahead of a whole packet.
    partial: Vec<u8>,
    options: ScanOptions,
    read_buffer_size: usize,
}

impl<T: Transport> Lidar<T> {
    /// Creates a lidar reporting log events to `sink`.
    pub fn new(transport: T, sink: Arc<dyn LogSink>) -> Lidar<T> {
        trace!("Creating new Lidar");
        Lidar {
            channel: CommandChannel::new(transport, sink),
            decoder: None,
            assembler: ScanAssembler::new(),
            partial: Vec::new(),
            options: ScanOptions::default(),
            read_buffer_size: RPLIDAR_DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Creates a lidar whose log events go to the `log` facade.
    pub fn with_transport(transport: T) -> Lidar<T> {
        Lidar::new(transport, Arc::new(LogForwarder))
    }

    /// Sets the receive buffer capacity that buffer usage is measured against.
    pub fn set_read_buffer_size(&mut self, read_buffer_size: usize) {
        self.read_buffer_size = read_buffer_size.max(1);
    }

    pub fn channel(&self) -> &CommandChannel<T> {
        &self.channel
    }

    pub fn into_transport(self) -> T {
        self.channel.into_transport()
    }

    fn log(&self, severity: Severity, message: &str) {
        self.channel.emit(severity, message);
    }

    pub fn open(&mut self, port_name: &str, baud_rate: u32) -> Result<()> {
        if self.channel.is_open() {
            return Ok(());
        }
        self.channel.open(port_name, baud_rate).map_err(|e| {
            self.log(Severity::Error, &format!("Error at opening port: {}", e));
            e
        })
    }

    /// Closes the port. Any running scan is forgotten.
    pub fn close(&mut self) -> Result<()> {
        self.clear_scan_state();
        self.channel.close().map_err(|e| {
            self.log(Severity::Error, &format!("Error at closing port: {}", e));
            e
        })
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Gets model, firmware, hardware and serial number.
    pub fn get_info(&mut self) -> Result<LidarInfo> {
        self.get_info_with_timeout(self.options.timeout)
    }

    pub fn get_info_with_timeout(&mut self, timeout: Duration) -> Result<LidarInfo> {
        trace!("Getting device info with timeout {:?}", timeout);
        self.channel
            .send_command(&Message::new(RPLIDAR_CMD_GET_DEVICE_INFO))?;
        self.channel.wait_for_descriptor(&INFO_DESCRIPTOR, timeout)?;
        let data = self
            .channel
            .read_exact(INFO_DESCRIPTOR.payload_len(), timeout)?;

        let info = LidarInfo {
            model: data[0],
            firmware: format!("{}.{}", data[2], data[1]),
            hardware: data[3].to_string(),
            serial_number: data[4..].iter().map(|b| format!("{:02X}", b)).collect(),
        };
        trace!("Device info: {}", info);
        Ok(info)
    }

    pub fn get_health(&mut self) -> Result<HealthInfo> {
        self.get_health_with_timeout(self.options.timeout)
    }

    pub fn get_health_with_timeout(&mut self, timeout: Duration) -> Result<HealthInfo> {
        trace!("Getting device health with timeout {:?}", timeout);
        self.channel
            .send_command(&Message::new(RPLIDAR_CMD_GET_DEVICE_HEALTH))?;
        self.channel
            .wait_for_descriptor(&HEALTH_DESCRIPTOR, timeout)?;
        let data = self
            .channel
            .read_exact(HEALTH_DESCRIPTOR.payload_len(), timeout)?;

        let health = HealthInfo {
            status: data[0].into(),
            error_code: LittleEndian::read_u16(&data[1..3]),
        };
        trace!("Device health: {}", health);
        Ok(health)
    }

    /// Gets the typical mode and the parameters of every scan mode.
    pub fn get_configuration(&mut self) -> Result<Configuration> {
        self.get_configuration_with_timeout(self.options.timeout)
    }

    pub fn get_configuration_with_timeout(&mut self, timeout: Duration) -> Result<Configuration> {
        configuration::read_configuration(&mut self.channel, timeout)
    }

    /// Starts streaming measurements in `mode`.
    ///
    /// Express extended scans are refused before anything is sent.
    pub fn start_scan(&mut self, mode: ScanMode, options: ScanOptions) -> Result<()> {
        let decoder = match ScanDecoder::new(mode, options.transform()) {
            Ok(decoder) => decoder,
            Err(e) => {
                self.log(Severity::Error, &format!("Cannot start {} scan: {}", mode, e));
                return Err(e);
            }
        };

        let (msg, descriptor) = match mode {
            ScanMode::Legacy => (Message::new(RPLIDAR_CMD_SCAN), LEGACY_SCAN_DESCRIPTOR),
            ScanMode::ExpressLegacy => (
                Message::with_data(RPLIDAR_CMD_EXPRESS_SCAN, &RPLIDAR_EXPRESS_LEGACY_PAYLOAD),
                EXPRESS_LEGACY_SCAN_DESCRIPTOR,
            ),
            ScanMode::ExpressExtended | ScanMode::None => {
                return Err(Error::invalid_state(format!("no decoder for {}", mode)))
            }
        };

        debug!("Starting {} scan", mode);
        self.clear_scan_state();
        self.channel.send_command(&msg)?;
        self.channel.wait_for_descriptor(&descriptor, options.timeout)?;

        self.options = options;
        self.decoder = Some(decoder);
        Ok(())
    }

    /// Stops scanning with the default settle time.
    pub fn stop_scan(&mut self) -> Result<()> {
        self.stop_scan_with_settle(RPLIDAR_STOP_SETTLE)
    }

    /// Sends stop, waits `settle`, then drops everything received and all scan state.
    pub fn stop_scan_with_settle(&mut self, settle: Duration) -> Result<()> {
        debug!("Stopping scan");
        self.channel.send_command(&Message::new(RPLIDAR_CMD_STOP))?;
        thread::sleep(settle);
        self.channel.discard_input()?;
        self.clear_scan_state();
        Ok(())
    }

    /// Resets the core and returns the boot banner it printed during `settle`.
    pub fn reset(&mut self, settle: Duration) -> Result<String> {
        debug!("Resetting device");
        self.channel.send_command(&Message::new(RPLIDAR_CMD_RESET))?;
        thread::sleep(settle);
        self.clear_scan_state();

        let banner = self.channel.drain(RPLIDAR_STOP_SETTLE)?;
        let banner = String::from_utf8_lossy(&banner);
        for line in banner.lines().map(str::trim).filter(|line| !line.is_empty()) {
            self.log(Severity::Info, line);
        }
        Ok(banner.into_owned())
    }

    /// Switches the motor on or off through the control line.
    pub fn control_motor(&mut self, on: bool) -> Result<()> {
        self.channel.set_motor(on)
    }

    /// Fill level of the receive buffer, in percent.
    pub fn buffer_usage(&mut self) -> Result<usize> {
        let available = self.channel.bytes_available()?;
        Ok(100 * available / self.read_buffer_size)
    }

    pub fn active_mode(&self) -> ScanMode {
        self.decoder
            .as_ref()
            .map_or(ScanMode::None, ScanDecoder::mode)
    }

    /// Measurements as they are decoded, without rotation buffering.
    pub fn get_measurements(&mut self) -> Result<Vec<Measurement>> {
        self.assembler.claim(Discipline::Raw)?;
        let mut measurements = Vec::new();
        self.read_measurements(self.options.timeout, Target::Output(&mut measurements))?;
        Ok(measurements)
    }

    /// Returns the next completed rotation, or `None` while it is still being received.
    pub fn get_scan(&mut self) -> Result<Option<Scan>> {
        self.assembler.claim(Discipline::Scans)?;
        if let Some(scan) = self.assembler.take_scan() {
            return Ok(Some(scan));
        }
        self.read_measurements(self.options.timeout, Target::Assembler)?;
        Ok(self.assembler.take_scan())
    }

    /// Blocks until a rotation boundary is seen or `timeout` expires.
    ///
    /// On expiry the measurements received so far are returned; if there are
    /// none, the read error is.
    pub fn grab_scan_with_timeout(&mut self, timeout: Duration) -> Result<Vec<Measurement>> {
        self.assembler.claim(Discipline::Chunks)?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(chunk) = self.assembler.take_chunk() {
                trace!("Grabbed {} measurements", chunk.len());
                return Ok(chunk);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let read_timeout = remaining.min(self.options.timeout);
            let result = if read_timeout.is_zero() {
                Err(Error::FramingTimeout {
                    expected: self.decoder.as_ref().map_or(0, ScanDecoder::packet_size),
                    received: 0,
                })
            } else {
                self.read_measurements(read_timeout, Target::Assembler)
            };

            if let Err(e) = result {
                let timed_out = matches!(e, Error::FramingTimeout { .. });
                if timed_out && Instant::now() >= deadline && self.assembler.buffered_len() > 0 {
                    warn!("Timeout grabbing scan, returning partial rotation");
                    return Ok(self.assembler.take_all());
                }
                if !timed_out || Instant::now() >= deadline {
                    return Err(e);
                }
            }
        }
    }

    fn clear_scan_state(&mut self) {
        self.decoder = None;
        self.assembler.clear();
        self.partial.clear();
    }

    /// Reads every whole packet available, or blocks for one, and decodes it.
    ///
    /// Bytes of a packet cut short by the timeout are held for the next call.
    /// On a corrupt packet the rest of the batch is dropped; measurements decoded
    /// before it stay in the assembler, but are lost for `Target::Output`.
    fn read_measurements(&mut self, timeout: Duration, target: Target<'_>) -> Result<()> {
        let Lidar {
            channel,
            decoder,
            assembler,
            partial,
            read_buffer_size,
            ..
        } = self;

        let decoder = match decoder.as_mut() {
            Some(decoder) => decoder,
            None => {
                channel.emit(Severity::Error, "No scan mode active");
                return Err(Error::invalid_state("no scan mode active"));
            }
        };

        let available = channel.bytes_available()?;
        let usage = 100 * available / *read_buffer_size;
        if usage > RPLIDAR_BUFFER_USAGE_WARNING {
            channel.emit(
                Severity::Warning,
                &format!(
                    "Receive buffer is {}% full, should read measurements faster",
                    usage
                ),
            );
        }

        let packet_size = decoder.packet_size();
        let packets = ((partial.len() + available) / packet_size).max(1);
        channel.read_to_len(partial, packets * packet_size, timeout)?;
        let bytes = std::mem::take(partial);

        let out = match target {
            Target::Output(out) => out,
            Target::Assembler => assembler.buffer_mut(),
        };
        for packet in bytes.chunks_exact(packet_size) {
            match decoder.decode(packet) {
                Ok(DecodeOutcome::Resolved(measurements)) => out.extend(measurements),
                Ok(DecodeOutcome::NeedMoreData) => {}
                Err(e) => {
                    error!("Dropping scan data after decode failure: {}", e);
                    channel.emit(
                        Severity::Error,
                        &format!("Received invalid scan data: {}", e),
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Where `read_measurements` puts what it decodes.
enum Target<'a> {
    Output(&'a mut Vec<Measurement>),
    Assembler,
}
