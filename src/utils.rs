use crate::types::Measurement;
use log::trace;

/// Orders measurements by angle, dropping failed samples first if `valid_only`.
pub fn sort_scan(scan: &mut Vec<Measurement>, valid_only: bool) {
    trace!("sort_scan called with {} points", scan.len());

    if valid_only {
        scan.retain(Measurement::is_valid);
    }
    scan.sort_by(|a, b| a.angle.total_cmp(&b.angle));
}

/// Exponential smoothing, each sample weighted equally with the history.
///
/// Used to steady scan duration and rate for display.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Smoother {
    value: Option<f32>,
}

impl Smoother {
    pub fn new() -> Smoother {
        Smoother::default()
    }

    /// Folds in a sample and returns the smoothed value. The first sample is taken as is.
    pub fn update(&mut self, sample: f32) -> f32 {
        let value = match self.value {
            Some(old) => (old + sample) / 2.0,
            None => sample,
        };
        self.value = Some(value);
        value
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}
