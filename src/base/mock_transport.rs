//! Scripted in-memory transport for tests.

use crate::base::error::{Error, Result};
use crate::base::transport::Transport;
use crate::protocol::decode_command;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct MockState {
    open: bool,
    fail_open: bool,
    rx: VecDeque<u8>,
    written: Vec<u8>,
    control_line: bool,
    chunk_size: Option<usize>,
    discards: usize,
    responder: Option<Responder>,
}

/// A transport whose receive side is fed by the test (or by a responder that
/// answers every written frame). Clones share the same state.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> MockTransport {
        MockTransport::default()
    }

    pub(crate) fn with_responder(responder: Responder) -> MockTransport {
        let transport = MockTransport::new();
        transport.lock().responder = Some(responder);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn feed(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    pub(crate) fn set_chunk_size(&self, chunk_size: usize) {
        self.lock().chunk_size = Some(chunk_size);
    }

    pub(crate) fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub(crate) fn control_line(&self) -> bool {
        self.lock().control_line
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().rx.len()
    }

    pub(crate) fn discards(&self) -> usize {
        self.lock().discards
    }
}

impl Transport for MockTransport {
    fn open(&mut self, _name: &str, _baud_rate: u32) -> Result<()> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(Error::TransportError {
                description: "no such port".to_owned(),
            });
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut state = self.lock();
            if !state.rx.is_empty() {
                let limit = state.chunk_size.unwrap_or(usize::MAX);
                let count = buf.len().min(limit).min(state.rx.len());
                for slot in buf.iter_mut().take(count) {
                    *slot = state.rx.pop_front().unwrap();
                }
                return Ok(count);
            }
        }
        std::thread::sleep(timeout.min(Duration::from_millis(2)));
        Ok(0)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state.written.extend_from_slice(bytes);
        if let Some(responder) = state.responder.as_mut() {
            let answer = responder(bytes);
            state.rx.extend(answer);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.lock().rx.len())
    }

    fn discard_input(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.rx.clear();
        state.discards += 1;
        Ok(())
    }

    fn set_control_line(&mut self, on: bool) -> Result<()> {
        self.lock().control_line = on;
        Ok(())
    }
}

/// Builds a response descriptor followed by `payload`.
pub(crate) fn response(length: u32, is_single: bool, data_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xA5, 0x5A, 0, 0, 0, 0, data_type];
    let mode = if is_single { 0u32 } else { 1u32 << 30 };
    LittleEndian::write_u32(&mut bytes[2..6], length | mode);
    bytes.extend_from_slice(payload);
    bytes
}

/// Encodes one legacy scan node.
pub(crate) fn legacy_node(new_scan: bool, quality: u8, angle_deg: f32, distance_mm: f32) -> [u8; 5] {
    let angle_q6 = (angle_deg * 64.0) as u16;
    let dist_q2 = (distance_mm * 4.0) as u16;
    let flags = if new_scan { 0b01 } else { 0b10 };
    [
        (quality << 2) | flags,
        ((angle_q6 << 1) as u8) | 1,
        (angle_q6 >> 7) as u8,
        dist_q2 as u8,
        (dist_q2 >> 8) as u8,
    ]
}

/// Bytes of one full legacy rotation of `count` nodes.
pub(crate) fn legacy_rotation(count: usize) -> Vec<u8> {
    let step = 360.0 / count as f32;
    (0..count)
        .flat_map(|i| legacy_node(i == 0, 15, i as f32 * step, 1000.0 + i as f32))
        .collect()
}

/// Encodes one express legacy capsule. `samples` holds (distance mm, compensation Q3) pairs.
pub(crate) fn capsule(start_angle_q6: u16, stable_start: bool, samples: &[(u16, u8); 32]) -> Vec<u8> {
    let mut bytes = vec![0u8; 84];
    bytes[2] = start_angle_q6 as u8;
    let flag = if stable_start { 0x80 } else { 0 };
    bytes[3] = ((start_angle_q6 >> 8) as u8 & 0x7F) | flag;
    for (cabin, pair) in bytes[4..].chunks_exact_mut(5).zip(samples.chunks_exact(2)) {
        let (dist1, comp1) = pair[0];
        let (dist2, comp2) = pair[1];
        cabin[0] = ((dist1 as u8 & 0x3F) << 2) | ((comp1 >> 4) & 0x3);
        cabin[1] = (dist1 >> 6) as u8;
        cabin[2] = ((dist2 as u8 & 0x3F) << 2) | ((comp2 >> 4) & 0x3);
        cabin[3] = (dist2 >> 6) as u8;
        cabin[4] = (comp1 & 0xF) | ((comp2 & 0xF) << 4);
    }
    let checksum = bytes[2..].iter().fold(0u8, |acc, b| acc ^ b);
    bytes[0] = 0xA0 | (checksum & 0xF);
    bytes[1] = 0x50 | (checksum >> 4);
    bytes
}

/// Capsule at `start_angle` degrees with 1 m samples and no compensation.
pub(crate) fn plain_capsule(start_angle: f32) -> Vec<u8> {
    capsule((start_angle * 64.0) as u16, false, &[(1000, 0); 32])
}

/// A simulated device answering the commands the driver sends.
pub(crate) struct FakeDevice {
    /// Number of health queries answered with the error status before turning good.
    pub(crate) unhealthy_reports: usize,
    /// Mode names, index = mode id. Answer types follow the id: 0x81, 0x82, 0x84.
    pub(crate) modes: Vec<&'static str>,
}

impl Default for FakeDevice {
    fn default() -> FakeDevice {
        FakeDevice {
            unhealthy_reports: 0,
            modes: vec!["Legacy", "Express", "Boost"],
        }
    }
}

impl FakeDevice {
    pub(crate) fn into_responder(mut self) -> Responder {
        Box::new(move |frame: &[u8]| {
            let msg = match decode_command(frame) {
                Ok(msg) => msg,
                Err(_) => return Vec::new(),
            };
            match msg.cmd {
                0x50 => {
                    let mut payload = vec![0x18, 0x1D, 0x01, 0x07];
                    payload.extend((0u8..16).map(|i| i * 0x11));
                    response(20, true, 0x04, &payload)
                }
                0x52 => {
                    let status = if self.unhealthy_reports > 0 {
                        self.unhealthy_reports -= 1;
                        2
                    } else {
                        0
                    };
                    response(3, true, 0x06, &[status, 0x01, 0x80])
                }
                0x84 => self.answer_config(&msg.data),
                0x20 => response(5, false, 0x81, &[]),
                0x82 => response(84, false, 0x82, &[]),
                _ => Vec::new(),
            }
        })
    }

    fn answer_config(&self, data: &[u8]) -> Vec<u8> {
        if data.len() < 4 {
            return Vec::new();
        }
        let config_type = LittleEndian::read_u32(&data[..4]);
        let mode = if data.len() >= 6 {
            LittleEndian::read_u16(&data[4..6]) as usize
        } else {
            0
        };
        let mut payload = config_type.to_le_bytes().to_vec();
        match config_type {
            0x7C => payload.extend_from_slice(&1u16.to_le_bytes()),
            0x70 => payload.extend_from_slice(&(self.modes.len() as u16).to_le_bytes()),
            0x7F => {
                payload.extend_from_slice(self.modes[mode].as_bytes());
                payload.extend_from_slice(&[0, 0]);
            }
            0x71 => payload.extend_from_slice(&((508u32 >> mode) << 8).to_le_bytes()),
            0x74 => payload.extend_from_slice(&((12u32 + 4 * mode as u32) << 8).to_le_bytes()),
            0x75 => payload.push([0x81u8, 0x82, 0x84][mode.min(2)]),
            _ => return Vec::new(),
        }
        response(payload.len() as u32, true, 0x20, &payload)
    }
}
