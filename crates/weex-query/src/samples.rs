//! Verbs evaluated over individual archive records

use weex_core::{ArchiveRecord, Timestamp, VectorSum};

/// Direction type paired with a speed type for vector verbs
pub fn direction_partner(obs_type: &str) -> Option<&'static str> {
    match obs_type {
        "windSpeed" => Some("windDir"),
        "windGust" => Some("windGustDir"),
        _ => None,
    }
}

/// Present values of `obs_type` in time order
pub fn values(records: &[ArchiveRecord], obs_type: &str) -> Vec<(Timestamp, f64)> {
    records
        .iter()
        .filter_map(|r| r.get(obs_type).map(|v| (r.date_time, v)))
        .collect()
}

pub fn has_data(records: &[ArchiveRecord], obs_type: &str) -> bool {
    records.iter().any(|r| r.get(obs_type).is_some())
}

/// Last value minus first value
pub fn diff(samples: &[(Timestamp, f64)]) -> Option<f64> {
    match (samples.first(), samples.last()) {
        (Some(&(t0, first)), Some(&(t1, last))) if t1 > t0 => Some(last - first),
        _ => None,
    }
}

/// Change per second between the first and last value
pub fn tderiv(samples: &[(Timestamp, f64)]) -> Option<f64> {
    match (samples.first(), samples.last()) {
        (Some(&(t0, first)), Some(&(t1, last))) if t1 > t0 => Some((last - first) / (t1 - t0) as f64),
        _ => None,
    }
}

/// Root mean square
pub fn rms(samples: &[(Timestamp, f64)]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum_sq: f64 = samples.iter().map(|(_, v)| v * v).sum();
    Some((sum_sq / samples.len() as f64).sqrt())
}

pub fn vector(records: &[ArchiveRecord], speed: &str, direction: &str) -> VectorSum {
    let mut sum = VectorSum::new();
    for record in records {
        sum.add(record.date_time, record.get(speed), record.get(direction));
    }
    sum
}
