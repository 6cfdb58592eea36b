use crate::answers::{
    RPLIDAR_LEGACY_NODE_SIZE, RPLIDAR_RESP_MEASUREMENT_CHECKBIT,
    RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT, RPLIDAR_RESP_MEASUREMENT_SYNCBIT,
    RPLIDAR_RESP_MEASUREMENT_SYNCBIT_INVERSE,
};
use crate::base::{Error, Result};
use crate::parsers::DecodeOutcome;
use crate::types::{AngleTransform, Measurement};
use log::error;

/// Decoder for the 5-byte node stream of a legacy scan.
#[derive(Debug, Clone, Default)]
pub struct LegacyDecoder {
    transform: AngleTransform,
}

impl LegacyDecoder {
    pub fn new(transform: AngleTransform) -> LegacyDecoder {
        LegacyDecoder { transform }
    }

    /// Decodes whole nodes; trailing partial bytes are ignored.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<DecodeOutcome> {
        let measurements = parse_legacy_nodes(bytes, &self.transform)?;
        if measurements.is_empty() {
            Ok(DecodeOutcome::NeedMoreData)
        } else {
            Ok(DecodeOutcome::Resolved(measurements))
        }
    }
}

/// Decodes one 5-byte legacy node.
///
/// The distance is reported in millimeters (Q2) and returned in meters.
pub fn parse_legacy_node(node: &[u8], transform: &AngleTransform) -> Result<Measurement> {
    debug_assert_eq!(node.len(), RPLIDAR_LEGACY_NODE_SIZE);

    let sync = (node[0] & RPLIDAR_RESP_MEASUREMENT_SYNCBIT) != 0;
    let sync_inverse = (node[0] & RPLIDAR_RESP_MEASUREMENT_SYNCBIT_INVERSE) != 0;
    if sync == sync_inverse {
        error!("Invalid scan node, start flags not inverted: {:02X?}", node);
        return Err(Error::protocol("scan node start flags not inverted"));
    }

    if (node[1] & RPLIDAR_RESP_MEASUREMENT_CHECKBIT) != RPLIDAR_RESP_MEASUREMENT_CHECKBIT {
        error!("Invalid scan node, check bit not set: {:02X?}", node);
        return Err(Error::protocol("scan node check bit not set"));
    }

    let angle_q6 = ((node[2] as u16) << 7) | ((node[1] as u16) >> 1);
    let distance_q2 = ((node[4] as u16) << 8) | node[3] as u16;

    Ok(Measurement {
        is_new_scan: sync,
        angle: transform.apply(angle_q6 as f32 / 64.0),
        distance: (distance_q2 as f32 / 4.0) / 1000.0,
        quality: Some(node[0] >> RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT),
    })
}

/// Decodes back-to-back legacy nodes. Any corrupt node fails the whole batch.
pub fn parse_legacy_nodes(bytes: &[u8], transform: &AngleTransform) -> Result<Vec<Measurement>> {
    bytes
        .chunks_exact(RPLIDAR_LEGACY_NODE_SIZE)
        .map(|node| parse_legacy_node(node, transform))
        .collect()
}
