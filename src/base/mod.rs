mod channel;
mod error;
mod log_sink;
mod message;
#[cfg(test)]
pub(crate) mod mock_transport;
mod transport;

pub use self::channel::CommandChannel;
pub use self::error::{Error, Result};
pub use self::log_sink::{LogForwarder, LogSink, Severity};
pub use self::message::Message;
pub use self::transport::Transport;
