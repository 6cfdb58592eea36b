pub mod express_parser;
pub mod legacy_parser;

use crate::answers::{RPLIDAR_CAPSULE_SIZE, RPLIDAR_LEGACY_NODE_SIZE};
use crate::base::{Error, Result};
use crate::types::{AngleTransform, Measurement, ScanMode};

pub use self::express_parser::ExpressLegacyDecoder;
pub use self::legacy_parser::LegacyDecoder;

/// Result of feeding bytes to a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Measurements whose angles are final.
    Resolved(Vec<Measurement>),
    /// The bytes were consumed but nothing can be emitted yet.
    NeedMoreData,
}

/// Decoder for the packet format of the active scan mode.
#[derive(Debug, Clone)]
pub enum ScanDecoder {
    Legacy(LegacyDecoder),
    ExpressLegacy(ExpressLegacyDecoder),
}

impl ScanDecoder {
    pub fn new(mode: ScanMode, transform: AngleTransform) -> Result<ScanDecoder> {
        match mode {
            ScanMode::Legacy => Ok(ScanDecoder::Legacy(LegacyDecoder::new(transform))),
            ScanMode::ExpressLegacy => Ok(ScanDecoder::ExpressLegacy(ExpressLegacyDecoder::new(
                transform,
            ))),
            ScanMode::ExpressExtended => Err(Error::NotSupported {
                description: "express extended scan is not supported".to_owned(),
            }),
            ScanMode::None => Err(Error::invalid_state("no scan mode selected")),
        }
    }

    pub fn mode(&self) -> ScanMode {
        match self {
            ScanDecoder::Legacy(_) => ScanMode::Legacy,
            ScanDecoder::ExpressLegacy(_) => ScanMode::ExpressLegacy,
        }
    }

    /// Size of the smallest unit `decode` consumes.
    pub fn packet_size(&self) -> usize {
        match self {
            ScanDecoder::Legacy(_) => RPLIDAR_LEGACY_NODE_SIZE,
            ScanDecoder::ExpressLegacy(_) => RPLIDAR_CAPSULE_SIZE,
        }
    }

    /// Decodes whole packets. Trailing partial bytes are ignored.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<DecodeOutcome> {
        match self {
            ScanDecoder::Legacy(decoder) => decoder.decode(bytes),
            ScanDecoder::ExpressLegacy(decoder) => decoder.decode(bytes),
        }
    }

    /// Drops any state carried between packets.
    pub fn reset(&mut self) {
        match self {
            ScanDecoder::Legacy(_) => {}
            ScanDecoder::ExpressLegacy(decoder) => decoder.reset(),
        }
    }
}
