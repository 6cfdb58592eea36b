use crate::answers::{Descriptor, RPLIDAR_ANS_DESCRIPTOR_SIZE, RPLIDAR_ANS_SYNC_BYTES};
use crate::base::error::{Error, Result};
use crate::base::log_sink::{LogSink, Severity};
use crate::base::message::Message;
use crate::base::transport::Transport;
use crate::protocol::{descriptor_mismatch, encode_command, parse_descriptor};
use log::{error, trace};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request/response framing over a byte transport.
///
/// The transport delivers an unframed byte stream; the channel finds
/// descriptors in it and reads exact payload lengths, each logical read
/// bounded by a single deadline.
///
/// # Examples
/// ```ignore
/// let mut channel = CommandChannel::new(transport, Arc::new(LogForwarder));
///
/// channel.send_command(&Message::new(RPLIDAR_CMD_GET_DEVICE_HEALTH))?;
/// channel.wait_for_descriptor(&HEALTH_DESCRIPTOR, timeout)?;
/// let payload = channel.read_exact(3, timeout)?;
/// ```
pub struct CommandChannel<T: Transport> {
    transport: T,
    sink: Arc<dyn LogSink>,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(transport: T, sink: Arc<dyn LogSink>) -> CommandChannel<T> {
        CommandChannel { transport, sink }
    }

    /// The log sink this channel reports to.
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn emit(&self, severity: Severity, message: &str) {
        self.sink.emit(severity, message);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn open(&mut self, name: &str, baud_rate: u32) -> Result<()> {
        trace!("Opening {} at {} baud", name, baud_rate);
        self.transport.open(name, baud_rate)
    }

    pub fn close(&mut self) -> Result<()> {
        trace!("Closing transport");
        self.transport.close()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Encodes and writes a command frame.
    pub fn send_command(&mut self, msg: &Message) -> Result<()> {
        let frame = encode_command(msg)?;
        trace!("Sending command {:02X}: {:02X?}", msg.cmd, frame);
        if let Err(err) = self.transport.write(&frame) {
            error!("Failed to write command {:02X}: {}", msg.cmd, err);
            return Err(err);
        }
        Ok(())
    }

    /// Reads the next response descriptor.
    ///
    /// Bytes preceding the sync pair are discarded. Reading stops at the
    /// seventh aligned byte, so the payload stays in the transport.
    pub fn read_descriptor(&mut self, timeout: Duration) -> Result<Descriptor> {
        let deadline = Instant::now() + timeout;
        let mut window: VecDeque<u8> = VecDeque::with_capacity(RPLIDAR_ANS_DESCRIPTOR_SIZE);
        let mut buf = [0u8; RPLIDAR_ANS_DESCRIPTOR_SIZE];
        let mut skipped = 0usize;

        loop {
            let missing = RPLIDAR_ANS_DESCRIPTOR_SIZE - window.len();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                trace!(
                    "Descriptor deadline passed with {} aligned bytes, {} skipped",
                    window.len(),
                    skipped
                );
                return Err(Error::FramingTimeout {
                    expected: RPLIDAR_ANS_DESCRIPTOR_SIZE,
                    received: window.len(),
                });
            }

            let count = self.transport.read(&mut buf[..missing], remaining)?;
            window.extend(&buf[..count]);

            // align the window start on the sync pair
            while let Some(&first) = window.front() {
                let misaligned = first != RPLIDAR_ANS_SYNC_BYTES[0]
                    || window.get(1).map_or(false, |&b| b != RPLIDAR_ANS_SYNC_BYTES[1]);
                if !misaligned {
                    break;
                }
                window.pop_front();
                skipped += 1;
            }

            if window.len() == RPLIDAR_ANS_DESCRIPTOR_SIZE {
                if skipped > 0 {
                    trace!("Skipped {} bytes before descriptor", skipped);
                }
                let bytes: Vec<u8> = window.into_iter().collect();
                return parse_descriptor(&bytes);
            }
        }
    }

    /// Returns `true` if `actual` satisfies `expected`; reports the first mismatching field otherwise.
    pub fn check_descriptor(&self, expected: &Descriptor, actual: &Descriptor) -> bool {
        match descriptor_mismatch(expected, actual) {
            Some(mismatch) => {
                self.sink.emit(Severity::Error, &mismatch);
                false
            }
            None => true,
        }
    }

    /// Reads a descriptor and fails unless it satisfies `expected`.
    pub fn wait_for_descriptor(
        &mut self,
        expected: &Descriptor,
        timeout: Duration,
    ) -> Result<Descriptor> {
        let actual = self.read_descriptor(timeout)?;
        if !self.check_descriptor(expected, &actual) {
            return Err(Error::protocol(format!(
                "unexpected descriptor ({}), expected ({})",
                actual, expected
            )));
        }
        Ok(actual)
    }

    /// Reads exactly `length` bytes before the deadline set at entry.
    pub fn read_exact(&mut self, length: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(length);
        self.read_to_len(&mut bytes, length, timeout)?;
        Ok(bytes)
    }

    /// Tops `bytes` up to `length` before the deadline set at entry.
    ///
    /// Whatever was received stays in `bytes` when the read fails, so a later
    /// call resumes where this one stopped.
    pub fn read_to_len(
        &mut self,
        bytes: &mut Vec<u8>,
        length: usize,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut received = bytes.len();
        if received >= length {
            return Ok(());
        }
        bytes.resize(length, 0);

        while received < length {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bytes.truncate(received);
                return Err(Error::FramingTimeout {
                    expected: length,
                    received,
                });
            }
            match self.transport.read(&mut bytes[received..], remaining) {
                Ok(count) => received += count,
                Err(e) => {
                    bytes.truncate(received);
                    return Err(e);
                }
            }
        }

        trace!("Read {} bytes", length);
        Ok(())
    }

    /// Reads whatever arrives until the line stays quiet for `quiet`.
    pub fn drain(&mut self, quiet: Duration) -> Result<Vec<u8>> {
        let mut drained = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let count = self.transport.read(&mut buf, quiet)?;
            if count == 0 {
                return Ok(drained);
            }
            drained.extend_from_slice(&buf[..count]);
        }
    }

    pub fn bytes_available(&mut self) -> Result<usize> {
        self.transport.bytes_available()
    }

    pub fn discard_input(&mut self) -> Result<()> {
        trace!("Discarding receive buffer");
        self.transport.discard_input()
    }

    /// Powers the motor through the control line.
    pub fn set_motor(&mut self, on: bool) -> Result<()> {
        trace!("Setting motor control line {}", if on { "on" } else { "off" });
        self.transport.set_control_line(on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::*;
    use crate::base::log_sink::LogForwarder;
    use crate::base::mock_transport::{response, MockTransport};
    use std::sync::Mutex;

    fn channel(transport: &MockTransport) -> CommandChannel<MockTransport> {
        CommandChannel::new(transport.clone(), Arc::new(LogForwarder))
    }

    #[test]
    fn send_command_frames_payload() {
        let transport = MockTransport::new();
        let mut channel = channel(&transport);

        channel.send_command(&Message::new(0x25)).unwrap();
        channel
            .send_command(&Message::with_data(0x82, &[0; 5]))
            .unwrap();

        assert_eq!(
            transport.written(),
            [0xA5, 0x25, 0xA5, 0x82, 0x05, 0, 0, 0, 0, 0, 0x22]
        );
    }

    #[test]
    fn descriptor_found_after_garbage() {
        let transport = MockTransport::new();
        transport.set_chunk_size(2);
        transport.feed(&[0x00, 0xA5, 0xA5, 0x17, 0x5A]);
        transport.feed(&response(3, true, 0x06, &[0, 0, 0]));
        let mut channel = channel(&transport);

        let descriptor = channel
            .read_descriptor(Duration::from_millis(200))
            .unwrap();

        assert_eq!(descriptor, HEALTH_DESCRIPTOR);
        // the payload is left for the caller
        assert_eq!(transport.pending(), 3);
    }

    #[test]
    fn descriptor_times_out_with_partial_window() {
        let transport = MockTransport::new();
        transport.feed(&[0xA5, 0x5A, 0x03]);
        let mut channel = channel(&transport);

        match channel.read_descriptor(Duration::from_millis(20)) {
            Err(Error::FramingTimeout { expected, received }) => {
                assert_eq!(expected, 7);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn descriptor_mismatch_is_reported_to_sink() {
        let transport = MockTransport::new();
        transport.feed(&response(20, true, 0x04, &[]));
        let reports = Arc::new(Mutex::new(Vec::new()));
        let reports_by_sink = reports.clone();
        let mut channel = CommandChannel::new(
            transport,
            Arc::new(move |severity: Severity, message: &str| {
                reports_by_sink
                    .lock()
                    .unwrap()
                    .push((severity, message.to_owned()));
            }),
        );

        let result = channel.wait_for_descriptor(&HEALTH_DESCRIPTOR, Duration::from_millis(50));

        assert!(matches!(result, Err(Error::ProtocolError { .. })));
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, Severity::Error);
        assert!(reports[0].1.contains("length"));
    }

    #[test]
    fn read_exact_accumulates_partial_reads() {
        let transport = MockTransport::new();
        transport.set_chunk_size(3);
        transport.feed(&(0u8..20).collect::<Vec<_>>());
        let mut channel = channel(&transport);

        let bytes = channel.read_exact(20, Duration::from_millis(100)).unwrap();

        assert_eq!(bytes, (0u8..20).collect::<Vec<_>>());
    }

    #[test]
    fn read_exact_reports_received_count_on_timeout() {
        let transport = MockTransport::new();
        transport.feed(&[1, 2, 3, 4]);
        let mut channel = channel(&transport);

        match channel.read_exact(84, Duration::from_millis(20)) {
            Err(Error::FramingTimeout { expected, received }) => {
                assert_eq!(expected, 84);
                assert_eq!(received, 4);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn read_to_len_resumes_after_timeout() {
        let transport = MockTransport::new();
        transport.feed(&[1, 2, 3]);
        let mut channel = channel(&transport);
        let mut bytes = Vec::new();

        assert!(matches!(
            channel.read_to_len(&mut bytes, 5, Duration::from_millis(10)),
            Err(Error::FramingTimeout { received: 3, .. })
        ));
        assert_eq!(bytes, [1, 2, 3]);

        transport.feed(&[4, 5, 6]);
        channel
            .read_to_len(&mut bytes, 5, Duration::from_millis(10))
            .unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 5]);
        assert_eq!(transport.pending(), 1);
    }

    #[test]
    fn drain_collects_until_quiet() {
        let transport = MockTransport::new();
        transport.feed(b"RP LIDAR System.\r\nFirmware Ver 1.29\r\n");
        let mut channel = channel(&transport);

        let banner = channel.drain(Duration::from_millis(5)).unwrap();

        assert!(String::from_utf8_lossy(&banner).starts_with("RP LIDAR"));
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn motor_drives_control_line() {
        let transport = MockTransport::new();
        let mut channel = channel(&transport);

        channel.set_motor(true).unwrap();
        assert!(transport.control_line());
        channel.set_motor(false).unwrap();
        assert!(!transport.control_line());
    }
}
