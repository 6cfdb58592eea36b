use std::time::Duration;

/// Default timeout for a request/response round trip and for each scan data read.
pub const RPLIDAR_DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default serial baud rate of the A-series.
pub const RPLIDAR_DEFAULT_BAUD_RATE: u32 = 115200;

/// Nominal receive buffer capacity used to compute buffer usage.
pub const RPLIDAR_DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Buffer usage, in percent, above which the driver warns that data is read too slowly.
pub const RPLIDAR_BUFFER_USAGE_WARNING: usize = 50;

/// Time the core needs after a reset before it answers again.
/// The datasheet says 2ms; real units print their banner for several hundred.
pub const RPLIDAR_RESET_SETTLE: Duration = Duration::from_millis(700);

/// Pause after the stop command before the input is flushed.
pub const RPLIDAR_STOP_SETTLE: Duration = Duration::from_millis(10);

/// Pause between failed session attempts.
pub const RPLIDAR_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Depth of the queue handing scan events to the caller.
pub const RPLIDAR_EVENT_QUEUE_DEPTH: usize = 64;

/// Initial capacity for buffered measurements.
pub const RPLIDAR_DEFAULT_CACHE_DEPTH: usize = 8192;
