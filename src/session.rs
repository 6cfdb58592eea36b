//! Device session: runs a [`Lidar`] on a worker thread.
//!
//! The worker opens the port, checks health, reads the configuration, starts
//! the scan and publishes results until cancelled. Any retryable failure resets
//! the device and starts over after a back-off.

use crate::base::{Error, LogForwarder, LogSink, Result, Severity, Transport};
use crate::internals::*;
use crate::types::{Measurement, Scan, ScanMode, ScanOptions};
use crate::Lidar;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the session publishes while scanning.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// One event per completed rotation.
    Scans,
    /// One event per decoded batch.
    Measurements,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Scan(Scan),
    Measurements(Vec<Measurement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// Receive buffer capacity that buffer usage is measured against.
    pub read_buffer_size: usize,
    /// Wait after a reset before the boot banner is drained.
    pub reset_settle: Duration,
    /// Wait after the stop command before the input is flushed.
    pub stop_settle: Duration,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
    pub output: OutputKind,
    /// Events held for the caller before new ones are dropped.
    pub event_queue_depth: usize,
}

impl SessionConfig {
    pub fn new(port_name: impl Into<String>) -> SessionConfig {
        SessionConfig {
            port_name: port_name.into(),
            ..SessionConfig::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            port_name: String::new(),
            baud_rate: RPLIDAR_DEFAULT_BAUD_RATE,
            read_buffer_size: RPLIDAR_DEFAULT_READ_BUFFER_SIZE,
            reset_settle: RPLIDAR_RESET_SETTLE,
            stop_settle: RPLIDAR_STOP_SETTLE,
            retry_backoff: RPLIDAR_RETRY_BACKOFF,
            output: OutputKind::Scans,
            event_queue_depth: RPLIDAR_EVENT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Opening = 1,
    HealthCheck = 2,
    Configuring = 3,
    Scanning = 4,
    Stopping = 5,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> SessionState {
        match value {
            1 => SessionState::Opening,
            2 => SessionState::HealthCheck,
            3 => SessionState::Configuring,
            4 => SessionState::Scanning,
            5 => SessionState::Stopping,
            _ => SessionState::Idle,
        }
    }
}

struct Worker<T: Transport> {
    handle: JoinHandle<Lidar<T>>,
    cancel_tx: Sender<()>,
}

/// Owns a lidar and runs it on a worker thread between `start` and `stop`.
///
/// Dropping a running session stops it.
pub struct DeviceSession<T: Transport + Send + 'static> {
    config: SessionConfig,
    state: Arc<AtomicU8>,
    /// Present while no worker runs.
    lidar: Option<Lidar<T>>,
    worker: Option<Worker<T>>,
}

impl<T: Transport + Send + 'static> DeviceSession<T> {
    pub fn new(transport: T, config: SessionConfig, sink: Arc<dyn LogSink>) -> DeviceSession<T> {
        let mut lidar = Lidar::new(transport, sink);
        lidar.set_read_buffer_size(config.read_buffer_size);
        DeviceSession {
            config,
            state: Arc::new(AtomicU8::new(SessionState::Idle as u8)),
            lidar: Some(lidar),
            worker: None,
        }
    }

    /// Creates a session whose log events go to the `log` facade.
    pub fn with_transport(transport: T, config: SessionConfig) -> DeviceSession<T> {
        DeviceSession::new(transport, config, Arc::new(LogForwarder))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawns the worker and returns the receiving end of its events.
    ///
    /// Modes without a decoder are refused here, before anything is sent.
    pub fn start(&mut self, mode: ScanMode, options: ScanOptions) -> Result<Receiver<ScanEvent>> {
        match mode {
            ScanMode::Legacy | ScanMode::ExpressLegacy => {}
            ScanMode::ExpressExtended => {
                return Err(Error::NotSupported {
                    description: "express extended scans cannot be decoded".to_owned(),
                })
            }
            ScanMode::None => return Err(Error::invalid_state("no scan mode given")),
        }
        if self.worker.is_some() {
            return Err(Error::invalid_state("session is already running"));
        }
        let lidar = self
            .lidar
            .take()
            .ok_or_else(|| Error::invalid_state("session lost its lidar"))?;

        let (cancel_tx, cancel_rx) = bounded(1);
        let (events_tx, events_rx) = bounded(self.config.event_queue_depth.max(1));
        let runner = SessionWorker {
            lidar,
            config: self.config.clone(),
            mode,
            options,
            state: self.state.clone(),
            cancel_rx,
            events: events_tx,
            cancelled: false,
        };

        info!("Starting {} session on {}", mode, self.config.port_name);
        let handle = thread::Builder::new()
            .name("rplidar-session".to_owned())
            .spawn(move || runner.run())?;
        self.worker = Some(Worker { handle, cancel_tx });
        Ok(events_rx)
    }

    /// Asks the worker to stop without waiting for it.
    pub fn cancel(&self) {
        if let Some(worker) = self.worker.as_ref() {
            // a full slot means a cancel is already pending
            let _ = worker.cancel_tx.try_send(());
        }
    }

    /// Cancels the worker, waits for it and closes the transport.
    pub fn stop(&mut self) -> Result<()> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        let _ = worker.cancel_tx.try_send(());

        let mut lidar = worker
            .handle
            .join()
            .map_err(|_| Error::invalid_state("session worker panicked"))?;
        self.state
            .store(SessionState::Idle as u8, Ordering::SeqCst);
        let result = lidar.close();
        self.lidar = Some(lidar);
        debug!("Session stopped");
        result
    }
}

impl<T: Transport + Send + 'static> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop session: {}", e);
        }
    }
}

/// State moved onto the worker thread.
struct SessionWorker<T: Transport> {
    lidar: Lidar<T>,
    config: SessionConfig,
    mode: ScanMode,
    options: ScanOptions,
    state: Arc<AtomicU8>,
    cancel_rx: Receiver<()>,
    events: Sender<ScanEvent>,
    cancelled: bool,
}

impl<T: Transport> SessionWorker<T> {
    fn run(mut self) -> Lidar<T> {
        while !self.is_cancelled() {
            let e = match self.attempt() {
                Ok(()) => break,
                Err(e) => e,
            };
            if self.is_cancelled() {
                break;
            }
            if !e.is_retryable() {
                self.report(Severity::Error, &format!("Session aborted: {}", e));
                break;
            }

            self.report(Severity::Warning, &format!("Session failed: {}", e));
            self.recover();
            self.set_state(SessionState::Idle);
            if self.wait_backoff() {
                break;
            }
        }
        self.set_state(SessionState::Idle);
        self.lidar
    }

    /// One pass from opening the port to stopping the scan.
    /// Returns `Ok` only when cancelled.
    fn attempt(&mut self) -> Result<()> {
        let timeout = self.options.timeout;

        self.set_state(SessionState::Opening);
        self.lidar.open(&self.config.port_name, self.config.baud_rate)?;

        self.set_state(SessionState::HealthCheck);
        let health = self.lidar.get_health_with_timeout(timeout)?;
        self.report(Severity::Info, &health.to_string());
        if !health.is_good() {
            return Err(Error::DeviceUnhealthy {
                status: health.status.into(),
                error_code: health.error_code,
            });
        }

        self.set_state(SessionState::Configuring);
        let configuration = self.lidar.get_configuration_with_timeout(timeout)?;
        for (id, mode) in &configuration.modes {
            self.report(Severity::Info, &format!("Mode {}: {}", id, mode));
        }
        if let Some(typical) = configuration.typical() {
            self.report(Severity::Info, &format!("Typical mode: {}", typical.name));
        }

        if self.is_cancelled() {
            return Ok(());
        }
        self.set_state(SessionState::Scanning);
        self.lidar.start_scan(self.mode, self.options)?;
        let result = self
            .lidar
            .control_motor(true)
            .and_then(|_| self.scan_loop());

        self.set_state(SessionState::Stopping);
        self.shutdown_scan();
        result
    }

    fn scan_loop(&mut self) -> Result<()> {
        while !self.is_cancelled() {
            let event = match self.config.output {
                OutputKind::Scans => self.lidar.get_scan()?.map(ScanEvent::Scan),
                OutputKind::Measurements => {
                    let measurements = self.lidar.get_measurements()?;
                    if measurements.is_empty() {
                        None
                    } else {
                        Some(ScanEvent::Measurements(measurements))
                    }
                }
            };
            if let Some(event) = event {
                self.publish(event);
            }
        }
        Ok(())
    }

    fn publish(&mut self, event: ScanEvent) {
        if let ScanEvent::Scan(scan) = &event {
            debug!(
                "Scan of {} measurements, {} ms, {:.2} Hz",
                scan.measurements.len(),
                scan.duration_ms(),
                scan.rate
            );
        }
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.report(Severity::Warning, "Event queue is full, dropping event")
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Event receiver dropped, cancelling session");
                self.cancelled = true;
            }
        }
    }

    fn shutdown_scan(&mut self) {
        if let Err(e) = self.lidar.stop_scan_with_settle(self.config.stop_settle) {
            warn!("Failed to stop scan: {}", e);
        }
        if let Err(e) = self.lidar.control_motor(false) {
            warn!("Failed to release motor: {}", e);
        }
    }

    /// Resets the device if the port could be opened at all.
    fn recover(&mut self) {
        if !self.lidar.is_open() {
            return;
        }
        if let Err(e) = self.lidar.reset(self.config.reset_settle) {
            self.report(Severity::Warning, &format!("Reset failed: {}", e));
        }
    }

    /// Sleeps for the back-off. Returns `true` if cancelled meanwhile.
    fn wait_backoff(&mut self) -> bool {
        match self.cancel_rx.recv_timeout(self.config.retry_backoff) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.cancelled = true;
                true
            }
        }
    }

    fn is_cancelled(&mut self) -> bool {
        if !self.cancelled {
            self.cancelled = match self.cancel_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => true,
                Err(TryRecvError::Empty) => false,
            };
        }
        self.cancelled
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn report(&self, severity: Severity, message: &str) {
        self.lidar.channel().emit(severity, message);
    }
}
