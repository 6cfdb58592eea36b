use std::error;
use std::fmt;
use std::io;

/// Represents errors that can occur while talking to an RPLIDAR over a serial link.
#[derive(Debug)]
pub enum Error {
    /// Opening, closing or otherwise driving the transport failed.
    TransportError { description: String },

    /// An I/O error occurred while communicating with the underlying stream (e.g., serial port).
    IoError(io::Error),

    /// The received bytes are invalid according to the protocol. Contains a description of the protocol error.
    ProtocolError { description: String },

    /// The deadline ran out while assembling a descriptor or a payload.
    FramingTimeout { expected: usize, received: usize },

    /// The device reported a health status other than good.
    DeviceUnhealthy { status: u8, error_code: u16 },

    /// The driver was used in a way its current state does not allow.
    InvalidState { description: String },

    /// The requested operation is permanently unsupported.
    NotSupported { description: String },
}

impl Error {
    /// Returns `false` for errors that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::NotSupported { .. } | Error::InvalidState { .. }
        )
    }

    /// Returns `true` if the error came from the transport rather than the protocol.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::TransportError { .. } | Error::IoError(_))
    }

    pub(crate) fn protocol(description: impl Into<String>) -> Error {
        Error::ProtocolError {
            description: description.into(),
        }
    }

    pub(crate) fn invalid_state(description: impl Into<String>) -> Error {
        Error::InvalidState {
            description: description.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TransportError { description } => write!(f, "transport error: {}", description),
            Error::IoError(err) => write!(f, "io error: {}", err),
            Error::ProtocolError { description } => write!(f, "protocol error: {}", description),
            Error::FramingTimeout { expected, received } => write!(
                f,
                "timed out after receiving {} of {} bytes",
                received, expected
            ),
            Error::DeviceUnhealthy { status, error_code } => write!(
                f,
                "device unhealthy: status {}, error code {:04X}",
                status, error_code
            ),
            Error::InvalidState { description } => write!(f, "invalid state: {}", description),
            Error::NotSupported { description } => write!(f, "not supported: {}", description),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Error::TransportError {
            description: err.to_string(),
        }
    }
}

/// A specialized `Result` type for RPLIDAR operations.
pub type Result<T> = std::result::Result<T, Error>;
