use crate::base::{Error, Result};
use crate::internals::RPLIDAR_DEFAULT_CACHE_DEPTH;
use crate::types::{Measurement, Scan};
use log::trace;
use std::time::{Duration, Instant};

/// How measurements are retrieved during a scan run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Discipline {
    /// Whole rotations with timing.
    Scans,
    /// Measurement vectors cut at rotation boundaries, without timing.
    Chunks,
    /// Measurements as decoded, never buffered.
    Raw,
}

/// Cuts the measurement stream into rotations.
///
/// A rotation ends right before the next measurement flagged as a new scan
/// that is not at the start of the buffer. Only one discipline can be used
/// until `clear` is called.
#[derive(Debug)]
pub struct ScanAssembler {
    buffered: Vec<Measurement>,
    /// Index of the first measurement not yet checked for a boundary.
    examined: usize,
    last_boundary: Option<Instant>,
    discipline: Option<Discipline>,
}

impl Default for ScanAssembler {
    fn default() -> ScanAssembler {
        ScanAssembler::new()
    }
}

impl ScanAssembler {
    pub fn new() -> ScanAssembler {
        ScanAssembler {
            buffered: Vec::with_capacity(RPLIDAR_DEFAULT_CACHE_DEPTH),
            examined: 0,
            last_boundary: None,
            discipline: None,
        }
    }

    pub fn discipline(&self) -> Option<Discipline> {
        self.discipline
    }

    /// Claims `discipline` for this run. Fails if another one was claimed first.
    pub fn claim(&mut self, discipline: Discipline) -> Result<()> {
        match self.discipline {
            None => {
                trace!("Assembler claimed for {:?}", discipline);
                self.discipline = Some(discipline);
                Ok(())
            }
            Some(claimed) if claimed == discipline => Ok(()),
            Some(claimed) => Err(Error::invalid_state(format!(
                "measurements are retrieved as {:?}, not {:?}",
                claimed, discipline
            ))),
        }
    }

    pub fn push(&mut self, measurements: impl IntoIterator<Item = Measurement>) {
        self.buffered.extend(measurements);
    }

    /// Buffer that decoded measurements are appended to.
    pub fn buffer_mut(&mut self) -> &mut Vec<Measurement> {
        &mut self.buffered
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    fn find_boundary(&mut self) -> Option<usize> {
        let start = self.examined.max(1);
        match self.buffered[start.min(self.buffered.len())..]
            .iter()
            .position(|m| m.is_new_scan)
        {
            Some(offset) => Some(start + offset),
            None => {
                self.examined = self.buffered.len();
                None
            }
        }
    }

    /// Cuts everything before `boundary`, which becomes the start of the next rotation.
    fn split_at_boundary(&mut self, boundary: usize) -> Vec<Measurement> {
        let rest = self.buffered.split_off(boundary);
        self.examined = 0;
        std::mem::replace(&mut self.buffered, rest)
    }

    /// Completed rotation, timed against the previous boundary seen at `now`.
    pub fn take_scan_at(&mut self, now: Instant) -> Option<Scan> {
        let boundary = self.find_boundary()?;
        let duration = match self.last_boundary {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last_boundary = Some(now);

        let measurements = self.split_at_boundary(boundary);
        trace!(
            "Scan of {} measurements completed in {:?}",
            measurements.len(),
            duration
        );
        Some(Scan::new(measurements, duration))
    }

    pub fn take_scan(&mut self) -> Option<Scan> {
        self.take_scan_at(Instant::now())
    }

    /// Measurements up to the next boundary, without timing.
    pub fn take_chunk(&mut self) -> Option<Vec<Measurement>> {
        let boundary = self.find_boundary()?;
        Some(self.split_at_boundary(boundary))
    }

    /// Everything buffered, boundary or not.
    pub fn take_all(&mut self) -> Vec<Measurement> {
        self.examined = 0;
        std::mem::take(&mut self.buffered)
    }

    /// Drops buffered measurements and timing, and releases the discipline.
    pub fn clear(&mut self) {
        self.buffered.clear();
        self.examined = 0;
        self.last_boundary = None;
        self.discipline = None;
    }
}
