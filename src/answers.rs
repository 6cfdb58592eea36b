use std::fmt;

/// Header preceding every response: payload length, single/multiple response flag and data type.
///
/// `length == None` is the wildcard used in expected descriptors whose payload
/// length is not known up front. Descriptors read from the wire always carry a length.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub length: Option<u32>,
    pub is_single: bool,
    pub data_type: u8,
}

impl Descriptor {
    pub const fn new(length: u32, is_single: bool, data_type: u8) -> Descriptor {
        Descriptor {
            length: Some(length),
            is_single,
            data_type,
        }
    }

    /// Expected descriptor whose length is not checked.
    pub const fn any_length(is_single: bool, data_type: u8) -> Descriptor {
        Descriptor {
            length: None,
            is_single,
            data_type,
        }
    }

    /// Payload length, zero for a wildcard descriptor.
    pub fn payload_len(&self) -> usize {
        self.length.unwrap_or(0) as usize
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(length) => write!(f, "length {}", length)?,
            None => write!(f, "any length")?,
        }
        write!(
            f,
            ", {}, data type 0x{:02X}",
            if self.is_single { "single" } else { "multiple" },
            self.data_type
        )
    }
}

/// The two sync bytes opening every response descriptor.
pub const RPLIDAR_ANS_SYNC_BYTES: [u8; 2] = [0xA5, 0x5A];

/// Size of a response descriptor including its sync bytes.
pub const RPLIDAR_ANS_DESCRIPTOR_SIZE: usize = 7;

/// Response type identifier for device information.
pub const RPLIDAR_ANS_TYPE_DEVINFO: u8 = 0x4;

/// Payload length of the device information response.
pub const RPLIDAR_ANS_LENGTH_DEVINFO: u32 = 20;

/// Response type identifier for device health status.
pub const RPLIDAR_ANS_TYPE_DEVHEALTH: u8 = 0x6;

/// Payload length of the device health response: status byte and u16 error code.
pub const RPLIDAR_ANS_LENGTH_DEVHEALTH: u32 = 3;

// health status

/// Health status code indicating the LIDAR is operating correctly.
pub const RPLIDAR_HEALTH_STATUS_OK: u8 = 0;

/// Health status code indicating a non-critical warning. The LIDAR might still function.
pub const RPLIDAR_HEALTH_STATUS_WARNING: u8 = 1;

/// Health status code indicating a critical error. The LIDAR is likely non-operational.
pub const RPLIDAR_HEALTH_STATUS_ERROR: u8 = 2;

// Measurement answers

/// Response type identifier for legacy measurement data (single point per node).
pub const RPLIDAR_ANS_TYPE_MEASUREMENT: u8 = 0x81;

/// Size of one legacy measurement node.
pub const RPLIDAR_LEGACY_NODE_SIZE: usize = 5;

/// Mask for extracting the sync bit from the first byte of a legacy node.
pub const RPLIDAR_RESP_MEASUREMENT_SYNCBIT: u8 = 1;
/// Mask for the inverted sync bit of a legacy node.
pub const RPLIDAR_RESP_MEASUREMENT_SYNCBIT_INVERSE: u8 = 2;
/// Bit shift for extracting the quality value from the first byte of a legacy node.
pub const RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT: usize = 2;
/// Mask of the check bit in the second byte of a legacy node.
pub const RPLIDAR_RESP_MEASUREMENT_CHECKBIT: u8 = 1;

/// Response type identifier for capsuled (express legacy) measurement data.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED: u8 = 0x82;

/// Size of a capsuled measurement packet: 4 header bytes and 16 cabins.
pub const RPLIDAR_CAPSULE_SIZE: usize = 84;

/// Number of cabins in a capsule.
pub const RPLIDAR_CAPSULE_CABINS: usize = 16;

/// Size of one cabin.
pub const RPLIDAR_CABIN_SIZE: usize = 5;

/// Measurements carried by a capsule, two per cabin.
pub const RPLIDAR_CAPSULE_MEASUREMENTS: usize = RPLIDAR_CAPSULE_CABINS * 2;

/// Expected value of the upper nibble of the first sync/checksum byte in capsuled responses.
pub const RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_1: u8 = 0xA;
/// Expected value of the upper nibble of the second sync/checksum byte in capsuled responses.
pub const RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_2: u8 = 0x5;

/// Bit of the capsule's fourth byte flagging the first packet after a stable start.
pub const RPLIDAR_RESP_MEASUREMENT_EXP_SYNCBIT: u8 = 0x80;

/// Response type identifier for high-quality measurement data.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_HQ: u8 = 0x83;

/// Response type identifier for ultra-capsuled measurement data.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA: u8 = 0x84;

/// Response type identifier for dense capsuled measurement data.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_DENSE_CAPSULED: u8 = 0x85;

/// Response type identifier for getting LIDAR configuration parameters.
pub const RPLIDAR_ANS_TYPE_GET_LIDAR_CONF: u8 = 0x20;

/// Length of the configuration type word echoed at the start of every configuration response.
pub const RPLIDAR_CONF_TYPE_ECHO_SIZE: usize = 4;

/// Longest value accepted for a variable-length configuration entry such as a mode name.
pub const RPLIDAR_CONF_MAX_VALUE_SIZE: usize = 64;

pub const INFO_DESCRIPTOR: Descriptor =
    Descriptor::new(RPLIDAR_ANS_LENGTH_DEVINFO, true, RPLIDAR_ANS_TYPE_DEVINFO);

pub const HEALTH_DESCRIPTOR: Descriptor =
    Descriptor::new(RPLIDAR_ANS_LENGTH_DEVHEALTH, true, RPLIDAR_ANS_TYPE_DEVHEALTH);

pub const LEGACY_SCAN_DESCRIPTOR: Descriptor = Descriptor::new(
    RPLIDAR_LEGACY_NODE_SIZE as u32,
    false,
    RPLIDAR_ANS_TYPE_MEASUREMENT,
);

pub const EXPRESS_LEGACY_SCAN_DESCRIPTOR: Descriptor = Descriptor::new(
    RPLIDAR_CAPSULE_SIZE as u32,
    false,
    RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED,
);
