//! Vector sums of wind samples

use crate::types::Timestamp;

/// Running vector sum of (speed, compass direction) samples.
///
/// Directions are compass degrees (0 = from north, clockwise). Samples with
/// either half missing are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSum {
    east: f64,
    north: f64,
    count: usize,
    peak: Option<(f64, Option<f64>, Timestamp)>,
}

impl VectorSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ts: Timestamp, speed: Option<f64>, direction: Option<f64>) {
        if let Some(s) = speed {
            if self.peak.map_or(true, |(max, _, _)| s > max) {
                self.peak = Some((s, direction, ts));
            }
        }
        if let (Some(s), Some(d)) = (speed, direction) {
            let theta = d.to_radians();
            self.east += s * theta.sin();
            self.north += s * theta.cos();
            self.count += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn magnitude(&self) -> f64 {
        self.east.hypot(self.north)
    }

    /// Magnitude of the summed vector divided by the sample count
    pub fn average_speed(&self) -> Option<f64> {
        (self.count > 0).then(|| self.magnitude() / self.count as f64)
    }

    /// Direction of the summed vector in `[0, 360)`; undefined for a zero vector
    pub fn direction(&self) -> Option<f64> {
        if self.count == 0 || self.magnitude() == 0.0 {
            return None;
        }
        let degrees = self.east.atan2(self.north).to_degrees();
        Some(degrees.rem_euclid(360.0))
    }

    /// Highest speed seen, with the direction reported alongside it
    pub fn peak(&self) -> Option<(f64, Option<f64>, Timestamp)> {
        self.peak
    }
}
