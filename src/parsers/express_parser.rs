use crate::answers::*;
use crate::base::{Error, Result};
use crate::checksum::Checksum;
use crate::parsers::DecodeOutcome;
use crate::types::{AngleTransform, Measurement};
use log::{debug, error, trace};

const ANGLE_360: f32 = 360.0;

/// One sample of a capsule, before its absolute angle is known.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CabinSample {
    /// Meters.
    pub distance: f32,
    /// Degrees to subtract from the interpolated angle.
    pub compensation: f32,
}

/// A validated express legacy capsule.
#[derive(Debug, Clone, PartialEq)]
pub struct Capsule {
    /// Degrees.
    pub start_angle: f32,
    /// Set on the first capsule after the motor became stable.
    pub stable_start: bool,
    pub samples: Vec<CabinSample>,
}

#[inline]
fn parse_cabin(cabin: &[u8]) -> [CabinSample; 2] {
    let dist1 = ((cabin[0] as u16) >> 2) | ((cabin[1] as u16) << 6);
    let dist2 = ((cabin[2] as u16) >> 2) | ((cabin[3] as u16) << 6);
    let comp1_q3 = (cabin[4] & 0xF) | ((cabin[0] & 0x3) << 4);
    let comp2_q3 = (cabin[4] >> 4) | ((cabin[2] & 0x3) << 4);

    [
        CabinSample {
            distance: dist1 as f32 / 1000.0,
            compensation: comp1_q3 as f32 / 8.0,
        },
        CabinSample {
            distance: dist2 as f32 / 1000.0,
            compensation: comp2_q3 as f32 / 8.0,
        },
    ]
}

/// Validates sync nibbles and checksum, then splits the capsule into its samples.
pub fn parse_capsule(packet: &[u8]) -> Result<Capsule> {
    if packet.len() != RPLIDAR_CAPSULE_SIZE {
        return Err(Error::protocol(format!(
            "capsule of {} bytes, expected {}",
            packet.len(),
            RPLIDAR_CAPSULE_SIZE
        )));
    }

    if (packet[0] >> 4) != RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_1
        || (packet[1] >> 4) != RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_2
    {
        error!("Invalid capsule sync: {:02X} {:02X}", packet[0], packet[1]);
        return Err(Error::protocol("invalid capsule sync"));
    }

    let recv_checksum = (packet[0] & 0xF) | ((packet[1] & 0xF) << 4);
    let checksum = Checksum::of(&packet[2..]);
    if checksum != recv_checksum {
        error!(
            "Capsule checksum mismatch: received {:02X}, calculated {:02X}",
            recv_checksum, checksum
        );
        return Err(Error::protocol("capsule checksum mismatch"));
    }

    let start_angle_q6 = (packet[2] as u16) | (((packet[3] & 0x7F) as u16) << 8);
    let samples = packet[4..]
        .chunks_exact(RPLIDAR_CABIN_SIZE)
        .flat_map(parse_cabin)
        .collect();

    Ok(Capsule {
        start_angle: start_angle_q6 as f32 / 64.0,
        stable_start: (packet[3] & RPLIDAR_RESP_MEASUREMENT_EXP_SYNCBIT) != 0,
        samples,
    })
}

/// Angle swept between two capsule start angles, across the zero crossing if needed.
#[inline]
pub fn angle_diff(prev: f32, cur: f32) -> f32 {
    (cur - prev + ANGLE_360) % ANGLE_360
}

/// Resolves the samples of `prev` using the start angle of the capsule that follows it.
pub fn resolve_capsule(
    prev: &Capsule,
    next_start_angle: f32,
    transform: &AngleTransform,
) -> Vec<Measurement> {
    let fraction =
        angle_diff(prev.start_angle, next_start_angle) / RPLIDAR_CAPSULE_MEASUREMENTS as f32;
    let wrapped = next_start_angle < prev.start_angle;
    trace!(
        "Resolving capsule at {} with next at {}, step {}",
        prev.start_angle,
        next_start_angle,
        fraction
    );

    prev.samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let angle = prev.start_angle + fraction * i as f32 - sample.compensation;
            Measurement {
                is_new_scan: i == 0 && wrapped,
                angle: transform.apply(angle),
                distance: sample.distance,
                quality: None,
            }
        })
        .collect()
}

/// Decoder for express legacy capsules.
///
/// Sample angles of a capsule depend on the start angle of the next one, so
/// each capsule is held until its successor arrives and output lags one capsule.
#[derive(Debug, Clone, Default)]
pub struct ExpressLegacyDecoder {
    transform: AngleTransform,
    held: Option<Capsule>,
}

impl ExpressLegacyDecoder {
    pub fn new(transform: AngleTransform) -> ExpressLegacyDecoder {
        ExpressLegacyDecoder {
            transform,
            held: None,
        }
    }

    /// Start angle of the capsule waiting for its successor.
    pub fn held_start_angle(&self) -> Option<f32> {
        self.held.as_ref().map(|capsule| capsule.start_angle)
    }

    /// Feeds one capsule. A rejected capsule leaves the held one in place.
    pub fn push_capsule(&mut self, packet: &[u8]) -> Result<DecodeOutcome> {
        let capsule = parse_capsule(packet)?;
        if capsule.stable_start {
            debug!("Capsule at {} flags a stable start", capsule.start_angle);
        }

        let outcome = match self.held.take() {
            Some(prev) => DecodeOutcome::Resolved(resolve_capsule(
                &prev,
                capsule.start_angle,
                &self.transform,
            )),
            None => DecodeOutcome::NeedMoreData,
        };
        self.held = Some(capsule);
        Ok(outcome)
    }

    /// Feeds whole capsules in order.
    ///
    /// On a rejected capsule, the error is returned and measurements resolved
    /// earlier in the same call are dropped.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<DecodeOutcome> {
        let mut resolved = Vec::new();
        for packet in bytes.chunks_exact(RPLIDAR_CAPSULE_SIZE) {
            if let DecodeOutcome::Resolved(measurements) = self.push_capsule(packet)? {
                resolved.extend(measurements);
            }
        }

        if resolved.is_empty() {
            Ok(DecodeOutcome::NeedMoreData)
        } else {
            Ok(DecodeOutcome::Resolved(resolved))
        }
    }

    /// Drops the held capsule.
    pub fn reset(&mut self) {
        self.held = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::mock_transport::{capsule, plain_capsule};

    fn resolved(outcome: DecodeOutcome) -> Vec<Measurement> {
        match outcome {
            DecodeOutcome::Resolved(measurements) => measurements,
            DecodeOutcome::NeedMoreData => panic!("nothing resolved"),
        }
    }

    #[test]
    fn capsule_fields() {
        let mut samples = [(0u16, 0u8); 32];
        samples[0] = (1234, 0x2B);
        samples[1] = (16383, 0x15);
        let parsed = parse_capsule(&capsule(90 * 64, true, &samples)).unwrap();

        assert_eq!(parsed.start_angle, 90.0);
        assert!(parsed.stable_start);
        assert_eq!(parsed.samples.len(), 32);
        assert!((parsed.samples[0].distance - 1.234).abs() < 1e-6);
        assert_eq!(parsed.samples[0].compensation, 0x2B as f32 / 8.0);
        assert!((parsed.samples[1].distance - 16.383).abs() < 1e-6);
        assert_eq!(parsed.samples[1].compensation, 0x15 as f32 / 8.0);
    }

    #[test]
    fn bad_sync_and_checksum_are_rejected() {
        let mut packet = plain_capsule(10.0);
        packet[1] = (packet[1] & 0x0F) | 0x60;
        assert!(parse_capsule(&packet).is_err());

        let mut packet = plain_capsule(10.0);
        packet[40] ^= 0x01;
        assert!(parse_capsule(&packet).is_err());
    }

    #[test]
    fn first_capsule_is_held() {
        let mut decoder = ExpressLegacyDecoder::default();
        assert_eq!(
            decoder.push_capsule(&plain_capsule(10.0)).unwrap(),
            DecodeOutcome::NeedMoreData
        );
        assert_eq!(decoder.held_start_angle(), Some(10.0));
    }

    #[test]
    fn angles_interpolate_between_start_angles() {
        let mut decoder = ExpressLegacyDecoder::default();
        decoder.push_capsule(&plain_capsule(10.0)).unwrap();
        let measurements = resolved(decoder.push_capsule(&plain_capsule(20.0)).unwrap());

        assert_eq!(measurements.len(), 32);
        for (i, m) in measurements.iter().enumerate() {
            let expected = 10.0 + i as f32 * 10.0 / 32.0;
            assert!((m.angle - expected).abs() < 1e-4, "{}: {}", i, m.angle);
            assert_eq!(m.distance, 1.0);
            assert_eq!(m.quality, None);
            assert!(!m.is_new_scan);
        }
        assert_eq!(decoder.held_start_angle(), Some(20.0));
    }

    #[test]
    fn wrap_marks_new_scan() {
        let mut decoder = ExpressLegacyDecoder::default();
        decoder.push_capsule(&plain_capsule(350.0)).unwrap();
        let measurements = resolved(decoder.push_capsule(&plain_capsule(5.0)).unwrap());

        assert!(measurements[0].is_new_scan);
        assert!(measurements[1..].iter().all(|m| !m.is_new_scan));
        // 15 degrees swept across zero
        assert!((measurements[16].angle - 357.5).abs() < 1e-3);
        assert!(measurements[31].angle < 5.0);
    }

    #[test]
    fn compensation_is_subtracted() {
        let mut samples = [(500u16, 0u8); 32];
        samples[0] = (500, 16); // 2 degrees
        let mut decoder = ExpressLegacyDecoder::default();
        decoder.push_capsule(&capsule(64, false, &samples)).unwrap();
        let measurements = resolved(decoder.push_capsule(&plain_capsule(33.0)).unwrap());

        assert_eq!(measurements[0].angle, 359.0);
        assert_eq!(measurements[1].angle, 2.0);
    }

    #[test]
    fn rejected_capsule_keeps_held_one() {
        let mut decoder = ExpressLegacyDecoder::default();
        decoder.push_capsule(&plain_capsule(10.0)).unwrap();

        let mut corrupt = plain_capsule(200.0);
        corrupt[10] ^= 0x40;
        assert!(decoder.push_capsule(&corrupt).is_err());
        assert_eq!(decoder.held_start_angle(), Some(10.0));

        let measurements = resolved(decoder.push_capsule(&plain_capsule(20.0)).unwrap());
        assert!((measurements[31].angle - (10.0 + 31.0 * 10.0 / 32.0)).abs() < 1e-4);
    }

    #[test]
    fn decode_batches_capsules() {
        let mut bytes = plain_capsule(0.0);
        bytes.extend(plain_capsule(11.25));
        bytes.extend(plain_capsule(22.5));
        let mut decoder = ExpressLegacyDecoder::new(AngleTransform::default());

        let measurements = resolved(decoder.decode(&bytes).unwrap());

        assert_eq!(measurements.len(), 64);
        assert_eq!(measurements[32].angle, 11.25);
        decoder.reset();
        assert_eq!(decoder.held_start_angle(), None);
    }

    /// Reference resolution in Q16 fixed point, in degrees.
    fn resolve_q16(prev_q6: u32, next_q6: u32, comp_q3: u32, i: u32) -> f64 {
        const ANGLE_360_Q6: u32 = 360 << 6;
        let diff_q6 = (next_q6 + ANGLE_360_Q6 - prev_q6) % ANGLE_360_Q6;
        let inc_q16 = (diff_q6 << 10) / 32;
        let angle_q16 = ((prev_q6 << 10) + inc_q16 * i) as i64 - ((comp_q3 as i64) << 13);
        (angle_q16 as f64 / 65536.0).rem_euclid(360.0)
    }

    #[test]
    fn float_accumulation_tracks_fixed_point() {
        let mut decoder = ExpressLegacyDecoder::default();
        let mut samples = [(1000u16, 0u8); 32];
        for (i, sample) in samples.iter_mut().enumerate() {
            sample.1 = (i * 7 % 64) as u8;
        }

        // uneven steps so start angles wander over every Q6 residue
        let mut start_q6: u32 = 0;
        let mut prev_q6: Option<u32> = None;
        let mut worst = 0.0f64;
        for n in 0..20_000u32 {
            let packet = capsule(start_q6 as u16, false, &samples);
            if let DecodeOutcome::Resolved(measurements) = decoder.push_capsule(&packet).unwrap() {
                let prev = prev_q6.unwrap();
                for (i, m) in measurements.iter().enumerate() {
                    let reference = resolve_q16(prev, start_q6, samples[i].1 as u32, i as u32);
                    let delta = (m.angle as f64 - reference).abs();
                    worst = worst.max(delta.min(360.0 - delta));
                }
            }
            prev_q6 = Some(start_q6);
            start_q6 = (start_q6 + 1800 + (n * 37) % 200) % (360 << 6);
        }

        assert!(worst < 1e-3, "worst drift {} degrees", worst);
    }
}
