use crate::answers::{
    RPLIDAR_ANS_TYPE_MEASUREMENT, RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED,
    RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA, RPLIDAR_ANS_TYPE_MEASUREMENT_DENSE_CAPSULED,
    RPLIDAR_ANS_TYPE_MEASUREMENT_HQ, RPLIDAR_HEALTH_STATUS_ERROR, RPLIDAR_HEALTH_STATUS_OK,
    RPLIDAR_HEALTH_STATUS_WARNING,
};
use crate::internals::RPLIDAR_DEFAULT_TIMEOUT;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A single decoded sample.
///
/// Angles are in degrees within `[0, 360)`, distances in meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Measurement {
    /// First sample of a new rotation.
    pub is_new_scan: bool,
    pub angle: f32,
    pub distance: f32,
    /// Signal quality, only reported by legacy scans.
    pub quality: Option<u8>,
}

impl Measurement {
    /// Returns `false` for failed samples, which report no distance.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.distance > f32::EPSILON
    }
}

/// All measurements of one rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub measurements: Vec<Measurement>,
    /// Time since the previous scan boundary. Zero for the first scan of a run.
    pub duration: Duration,
    /// Rotations per second derived from `duration`, zero when unknown.
    pub rate: f32,
}

impl Scan {
    pub fn new(measurements: Vec<Measurement>, duration: Duration) -> Scan {
        let millis = duration.as_secs_f32() * 1000.0;
        let rate = if millis > 0.0 { 1000.0 / millis } else { 0.0 };
        Scan {
            measurements,
            duration,
            rate,
        }
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Measurement packet format the device streams.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ScanMode {
    None,
    /// 5-byte nodes, one sample each.
    Legacy,
    /// 84-byte capsules of 32 samples with cross-packet angle interpolation.
    ExpressLegacy,
    /// Extended express formats (HQ, ultra and dense capsules). Not decoded.
    ExpressExtended,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanMode::None => "None",
            ScanMode::Legacy => "Legacy",
            ScanMode::ExpressLegacy => "ExpressLegacy",
            ScanMode::ExpressExtended => "ExpressExtended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Good,
    Warning,
    Error,
    Unknown,
}

impl From<u8> for HealthStatus {
    fn from(status: u8) -> HealthStatus {
        match status {
            RPLIDAR_HEALTH_STATUS_OK => HealthStatus::Good,
            RPLIDAR_HEALTH_STATUS_WARNING => HealthStatus::Warning,
            RPLIDAR_HEALTH_STATUS_ERROR => HealthStatus::Error,
            _ => HealthStatus::Unknown,
        }
    }
}

impl From<HealthStatus> for u8 {
    fn from(status: HealthStatus) -> u8 {
        match status {
            HealthStatus::Good => RPLIDAR_HEALTH_STATUS_OK,
            HealthStatus::Warning => RPLIDAR_HEALTH_STATUS_WARNING,
            HealthStatus::Error => RPLIDAR_HEALTH_STATUS_ERROR,
            HealthStatus::Unknown => 0xFF,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Health report of the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub error_code: u16,
}

impl HealthInfo {
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status == HealthStatus::Good
    }
}

impl fmt::Display for HealthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Health: {}, Error code: {}", self.status, self.error_code)
    }
}

/// Identification of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LidarInfo {
    pub model: u8,
    /// `major.minor`
    pub firmware: String,
    pub hardware: String,
    /// Upper-case hex of the 16 serial number bytes.
    pub serial_number: String,
}

impl fmt::Display for LidarInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model number: {}, Firmware version: {}, Hardware version: {}, Serial number: {}",
            self.model, self.firmware, self.hardware, self.serial_number
        )
    }
}

/// Parameters of one scan mode, as reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanModeConfiguration {
    pub name: String,
    /// Sample duration in microseconds.
    pub us_per_sample: f32,
    /// Maximum distance in meters.
    pub max_distance: f32,
    /// Data type of the measurement responses in this mode.
    pub answer_type: u8,
}

impl ScanModeConfiguration {
    /// Packet format this mode streams, `ScanMode::None` for unknown answer types.
    pub fn scan_mode(&self) -> ScanMode {
        match self.answer_type {
            RPLIDAR_ANS_TYPE_MEASUREMENT => ScanMode::Legacy,
            RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED => ScanMode::ExpressLegacy,
            RPLIDAR_ANS_TYPE_MEASUREMENT_HQ
            | RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA
            | RPLIDAR_ANS_TYPE_MEASUREMENT_DENSE_CAPSULED => ScanMode::ExpressExtended,
            _ => ScanMode::None,
        }
    }
}

impl fmt::Display for ScanModeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name: {}, Ts: {:.2} us, Max distance: {:.2} m, Answer type: 0x{:02X}",
            self.name, self.us_per_sample, self.max_distance, self.answer_type
        )
    }
}

/// Scan modes supported by the device, keyed by mode id.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub typical_mode: u16,
    pub modes: BTreeMap<u16, ScanModeConfiguration>,
}

impl Configuration {
    pub fn typical(&self) -> Option<&ScanModeConfiguration> {
        self.modes.get(&self.typical_mode)
    }

    /// Looks a mode up by its reported name.
    pub fn find_mode(&self, name: &str) -> Option<(u16, &ScanModeConfiguration)> {
        self.modes
            .iter()
            .find(|(_, mode)| mode.name == name)
            .map(|(&id, mode)| (id, mode))
    }
}

/// Options applied while a scan runs.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScanOptions {
    /// Mirror angles, for sensors mounted upside down.
    pub flip: bool,
    /// Degrees added to every angle after flipping.
    pub angle_offset: f32,
    /// Deadline for each response and each scan data read.
    pub timeout: Duration,
}

impl ScanOptions {
    pub fn with_flip(mut self, flip: bool) -> ScanOptions {
        self.flip = flip;
        self
    }

    pub fn with_angle_offset(mut self, angle_offset: f32) -> ScanOptions {
        self.angle_offset = angle_offset;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> ScanOptions {
        self.timeout = timeout;
        self
    }

    pub fn transform(&self) -> AngleTransform {
        AngleTransform {
            flip: self.flip,
            offset: self.angle_offset,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> ScanOptions {
        ScanOptions {
            flip: false,
            angle_offset: 0.0,
            timeout: RPLIDAR_DEFAULT_TIMEOUT,
        }
    }
}

/// Mount flip and user offset, applied to every decoded angle.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct AngleTransform {
    pub flip: bool,
    pub offset: f32,
}

impl AngleTransform {
    /// Maps a raw device angle into `[0, 360)`.
    #[inline]
    pub fn apply(&self, raw: f32) -> f32 {
        let angle = if self.flip { -raw } else { raw };
        let angle = (angle + self.offset).rem_euclid(360.0);
        // rem_euclid rounds tiny negative values up to 360.0
        if angle >= 360.0 {
            0.0
        } else {
            angle
        }
    }
}
