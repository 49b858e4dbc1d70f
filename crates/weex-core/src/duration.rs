//! Duration notation used by configuration options
//!
//! Accepts a bare number of seconds (`"3600"`), a number with a unit letter
//! (`"2w"`, `"1d"`), or one of the words `hour`, `day`, `week`, `month`,
//! `year`. Months and years are fixed-length approximations.

use thiserror::Error;

pub const HOUR: i64 = 3_600;
pub const DAY: i64 = 86_400;
pub const WEEK: i64 = 7 * DAY;
/// 365.25 / 12 days
pub const MONTH: i64 = 2_629_800;
/// 365.25 days
pub const YEAR: i64 = 31_557_600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("Empty duration")]
    Empty,

    #[error("Invalid duration: {0}")]
    Invalid(String),

    #[error("Duration out of range: {0}")]
    Overflow(String),
}

/// Parse a duration string into seconds
pub fn parse_duration(text: &str) -> Result<i64, DurationError> {
    let s = text.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    match s {
        "hour" => return Ok(HOUR),
        "day" => return Ok(DAY),
        "week" => return Ok(WEEK),
        "month" => return Ok(MONTH),
        "year" => return Ok(YEAR),
        _ => {}
    }

    let (digits, multiplier) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => {
            let multiplier = match c {
                's' => 1,
                'h' => HOUR,
                'd' => DAY,
                'w' => WEEK,
                'm' => MONTH,
                'y' => YEAR,
                _ => return Err(DurationError::Invalid(text.to_string())),
            };
            (&s[..idx], multiplier)
        }
        _ => (s, 1),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DurationError::Invalid(text.to_string()));
    }
    let count: i64 = digits
        .parse()
        .map_err(|_| DurationError::Overflow(text.to_string()))?;
    count
        .checked_mul(multiplier)
        .ok_or_else(|| DurationError::Overflow(text.to_string()))
}
