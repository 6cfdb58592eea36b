// Commands without payload and response

/// Command code to stop the measurement process of the LIDAR.
pub const RPLIDAR_CMD_STOP: u8 = 0x25;

/// Command code to start a legacy scan.
pub const RPLIDAR_CMD_SCAN: u8 = 0x20;

/// Command code to reset the LIDAR core. The core prints a boot banner afterwards.
pub const RPLIDAR_CMD_RESET: u8 = 0x40;

// Commands without payload but have response

/// Command code to request device information (model, firmware, hardware, serial number).
pub const RPLIDAR_CMD_GET_DEVICE_INFO: u8 = 0x50;

/// Command code to request the device's health status.
pub const RPLIDAR_CMD_GET_DEVICE_HEALTH: u8 = 0x52;

// Commands with payload and have response

/// Command code to start an express scan.
/// Requires a 5-byte payload whose first byte selects the working mode.
pub const RPLIDAR_CMD_EXPRESS_SCAN: u8 = 0x82;

/// Express scan payload selecting the legacy express packet format.
pub const RPLIDAR_EXPRESS_LEGACY_PAYLOAD: [u8; 5] = [0, 0, 0, 0, 0];

/// Command code to retrieve LIDAR configuration parameters.
/// Requires a payload carrying the configuration type word (u32 little-endian),
/// followed by a u16 scan mode id for per-mode entries.
pub const RPLIDAR_CMD_GET_LIDAR_CONF: u8 = 0x84;

// LIDAR configurations (Used as payload data for RPLIDAR_CMD_GET_LIDAR_CONF)

/// Total number of supported scan modes. Response is u16.
pub const RPLIDAR_CONF_SCAN_MODE_COUNT: u32 = 0x00000070;

/// Sample duration in microseconds (Q8) for a scan mode. Response is u32.
pub const RPLIDAR_CONF_SCAN_MODE_US_PER_SAMPLE: u32 = 0x00000071;

/// Maximum measurable distance in meters (Q8) for a scan mode. Response is u32.
pub const RPLIDAR_CONF_SCAN_MODE_MAX_DISTANCE: u32 = 0x00000074;

/// Answer type (measurement response data type) of a scan mode. Response is u8.
pub const RPLIDAR_CONF_SCAN_MODE_ANS_TYPE: u32 = 0x00000075;

/// ID of the device's typical scan mode. Response is u16.
pub const RPLIDAR_CONF_SCAN_MODE_TYPICAL: u32 = 0x0000007C;

/// Name of a scan mode, a NUL-padded ASCII string.
pub const RPLIDAR_CONF_SCAN_MODE_NAME: u32 = 0x0000007F;
