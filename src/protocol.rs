use crate::answers::{Descriptor, RPLIDAR_ANS_DESCRIPTOR_SIZE, RPLIDAR_ANS_SYNC_BYTES};
use crate::base::{Error, Message, Result};
use crate::checksum::Checksum;
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace};

pub const RPLIDAR_CMD_SYNC_BYTE: u8 = 0xA5;

const RPLIDAR_ANS_HEADER_SIZE_MASK: u32 = 0x3FFFFFFF;
const RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT: u32 = 30;

const RPLIDAR_MAX_PAYLOAD: usize = 255;

/// Size of the encoded frame for `msg`.
pub fn estimate_encoded_size(msg: &Message) -> Result<usize> {
    if msg.data.len() > RPLIDAR_MAX_PAYLOAD {
        error!(
            "Command {:02X} payload of {} bytes exceeds {}",
            msg.cmd,
            msg.data.len(),
            RPLIDAR_MAX_PAYLOAD
        );
        return Err(Error::protocol(format!(
            "payload of {} bytes is too big",
            msg.data.len()
        )));
    }

    if msg.has_payload() {
        Ok(4 + msg.data.len()) // Sync + Cmd + Len + Data + Checksum
    } else {
        Ok(2) // Sync + Cmd
    }
}

/// Encodes a command into its request frame.
///
/// Payload frames carry a length byte and close with the XOR of every preceding byte.
pub fn encode_command(msg: &Message) -> Result<Vec<u8>> {
    let size = estimate_encoded_size(msg)?;
    trace!(
        "Encoding command {:02X} with {} payload bytes into {} bytes",
        msg.cmd,
        msg.data.len(),
        size
    );

    let mut bytes = Vec::with_capacity(size);
    bytes.push(RPLIDAR_CMD_SYNC_BYTE);
    bytes.push(msg.cmd);

    if msg.has_payload() {
        bytes.push(msg.data.len() as u8);
        bytes.extend_from_slice(&msg.data);
        let checksum = Checksum::of(&bytes);
        trace!("Calculated checksum: {:02X}", checksum);
        bytes.push(checksum);
    }

    Ok(bytes)
}

/// Decodes a request frame back into a command, validating length and checksum.
#[cfg(test)]
pub fn decode_command(frame: &[u8]) -> Result<Message> {
    if frame.len() < 2 || frame[0] != RPLIDAR_CMD_SYNC_BYTE {
        return Err(Error::protocol("request frame does not start with sync byte"));
    }

    if frame.len() == 2 {
        return Ok(Message::new(frame[1]));
    }

    let payload_len = frame[2] as usize;
    if frame.len() != payload_len + 4 {
        error!(
            "Request frame length {} does not match payload length {}",
            frame.len(),
            payload_len
        );
        return Err(Error::protocol(format!(
            "request frame of {} bytes cannot carry {} payload bytes",
            frame.len(),
            payload_len
        )));
    }

    let (body, checksum) = frame.split_at(frame.len() - 1);
    let calculated = Checksum::of(body);
    if calculated != checksum[0] {
        error!(
            "Request checksum mismatch: received {:02X}, calculated {:02X}",
            checksum[0], calculated
        );
        return Err(Error::protocol("request checksum mismatch"));
    }

    Ok(Message::with_data(frame[1], &body[3..]))
}

/// Parses the seven bytes of a response descriptor, sync bytes included.
pub fn parse_descriptor(bytes: &[u8]) -> Result<Descriptor> {
    if bytes.len() != RPLIDAR_ANS_DESCRIPTOR_SIZE || bytes[0..2] != RPLIDAR_ANS_SYNC_BYTES {
        return Err(Error::protocol("descriptor is not aligned on sync bytes"));
    }

    let size_q30_subtype = LittleEndian::read_u32(&bytes[2..6]);
    let send_mode = size_q30_subtype >> RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT;
    let descriptor = Descriptor::new(
        size_q30_subtype & RPLIDAR_ANS_HEADER_SIZE_MASK,
        send_mode == 0,
        bytes[6],
    );
    trace!("Parsed descriptor: {}", descriptor);
    Ok(descriptor)
}

/// Names the first field in which `actual` differs from `expected`.
pub fn descriptor_mismatch(expected: &Descriptor, actual: &Descriptor) -> Option<String> {
    if let Some(length) = expected.length {
        if actual.length != Some(length) {
            return Some(format!(
                "Expected descriptor length {}, got {}",
                length,
                actual.payload_len()
            ));
        }
    }

    if expected.is_single != actual.is_single {
        return Some(format!(
            "Expected descriptor single to be {}, got {}",
            expected.is_single, actual.is_single
        ));
    }

    if expected.data_type != actual.data_type {
        return Some(format!(
            "Expected descriptor data type 0x{:02X}, got 0x{:02X}",
            expected.data_type, actual.data_type
        ));
    }

    None
}
