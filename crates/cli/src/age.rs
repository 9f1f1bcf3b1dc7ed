//! Age-specification parsing for `query --age`, e.g. `30d`, `6m`, `1y`.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

const SECONDS_PER_DAY: u64 = 86_400;

/// Errors parsing an age specification.
#[derive(Debug, Error)]
pub enum AgeError {
    /// The string was not a number followed by one of `d`, `w`, `m`, `y`.
    #[error("age specification {0:?} should be a number followed by one of d, w, m, y")]
    Malformed(String),
}

/// Current Unix time, in seconds.
#[must_use]
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compute the Unix-time cutoff `now - age` for an age spec like `30d`.
///
/// Months and years are approximated as 30 and 365 days respectively; there
/// is no calendar-aware date library in this dependency stack, and an exact
/// cutoff is not load-bearing for a size-by-age report.
///
/// # Errors
///
/// Returns [`AgeError::Malformed`] if `spec` is not a decimal number
/// immediately followed by a single `d`/`w`/`m`/`y` unit letter.
pub fn parse_age(now: u64, spec: &str) -> Result<u64, AgeError> {
    let unit = spec
        .chars()
        .last()
        .ok_or_else(|| AgeError::Malformed(spec.to_owned()))?;
    let digits = &spec[..spec.len() - unit.len_utf8()];
    let count: u64 = digits
        .parse()
        .map_err(|_| AgeError::Malformed(spec.to_owned()))?;

    let seconds = match unit.to_ascii_lowercase() {
        'd' => count * SECONDS_PER_DAY,
        'w' => count * 7 * SECONDS_PER_DAY,
        'm' => count * 30 * SECONDS_PER_DAY,
        'y' => count * 365 * SECONDS_PER_DAY,
        _ => return Err(AgeError::Malformed(spec.to_owned())),
    };

    Ok(now.saturating_sub(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_and_weeks_agree() {
        let now = 1_000_000_000;
        assert_eq!(parse_age(now, "7d").unwrap(), parse_age(now, "1w").unwrap());
    }

    #[test]
    fn zero_age_is_now() {
        let now = 1_000_000_000;
        assert_eq!(parse_age(now, "0d").unwrap(), now);
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!(parse_age(0, "abc").is_err());
        assert!(parse_age(0, "10x").is_err());
        assert!(parse_age(0, "").is_err());
    }

    #[test]
    fn far_future_age_saturates_to_zero() {
        assert_eq!(parse_age(100, "999999999999y").unwrap(), 0);
    }
}
