use std::fmt;

/// Severity of a caller-facing log event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "Debug",
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        f.write_str(name)
    }
}

impl From<Severity> for log::Level {
    fn from(severity: Severity) -> log::Level {
        match severity {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

/// Receives log events raised by the driver.
///
/// `emit` is called synchronously on whichever thread raised the event,
/// including the session worker.
pub trait LogSink: Send + Sync {
    fn emit(&self, severity: Severity, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(Severity, &str) + Send + Sync,
{
    fn emit(&self, severity: Severity, message: &str) {
        self(severity, message)
    }
}

/// Default sink: forwards every event to the `log` facade.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogForwarder;

impl LogSink for LogForwarder {
    fn emit(&self, severity: Severity, message: &str) {
        log::log!(target: "rplidar_serial", log::Level::from(severity), "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_sink = seen.clone();
        let sink = move |severity: Severity, message: &str| {
            seen_by_sink
                .lock()
                .unwrap()
                .push(format!("[{}] {}", severity, message));
        };

        sink.emit(Severity::Warning, "receive buffer is 75% full");
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["[Warning] receive buffer is 75% full"]
        );
    }

    #[test]
    fn severities_map_onto_log_levels() {
        assert_eq!(log::Level::from(Severity::Warning), log::Level::Warn);
        assert_eq!(log::Level::from(Severity::Error), log::Level::Error);
        assert!(Severity::Error > Severity::Info);
    }
}
