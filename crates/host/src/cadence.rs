//! `@every <n><unit>` schedule descriptors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

const PREFIX: &str = "@every";

/// Fixed interval between two triggers of a recurring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cadence(Duration);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CadenceError {
    #[error("unsupported schedule {0:?}; expected \"@every <n><s|m|h|d>\"")]
    Unsupported(String),
    #[error("invalid interval {0:?}")]
    InvalidInterval(String),
    #[error("interval must be greater than zero")]
    Zero,
}

impl Cadence {
    pub fn every(interval: Duration) -> Result<Self, CadenceError> {
        if interval.is_zero() {
            return Err(CadenceError::Zero);
        }
        Ok(Self(interval))
    }

    pub fn interval(&self) -> Duration {
        self.0
    }

    /// First instant after `last` at which the job is due again.
    pub fn next_after(&self, last: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.0)
            .ok()
            .and_then(|d| last.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl FromStr for Cadence {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = s
            .trim()
            .strip_prefix(PREFIX)
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(str::trim)
            .ok_or_else(|| CadenceError::Unsupported(s.to_string()))?;

        let invalid = || CadenceError::InvalidInterval(interval.to_string());
        let unit = interval.chars().last().ok_or_else(invalid)?;
        let amount: u64 = interval[..interval.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;

        let secs = match unit {
            's' => Some(amount),
            'm' => amount.checked_mul(60),
            'h' => amount.checked_mul(60 * 60),
            'd' => amount.checked_mul(24 * 60 * 60),
            _ => None,
        }
        .ok_or_else(invalid)?;

        Self::every(Duration::from_secs(secs))
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        match secs {
            s if s % 86_400 == 0 => write!(f, "{PREFIX} {}d", s / 86_400),
            s if s % 3_600 == 0 => write!(f, "{PREFIX} {}h", s / 3_600),
            s if s % 60 == 0 => write!(f, "{PREFIX} {}m", s / 60),
            s => write!(f, "{PREFIX} {s}s"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!("@every 30s".parse::<Cadence>().unwrap().interval(), Duration::from_secs(30));
        assert_eq!("@every 5m".parse::<Cadence>().unwrap().interval(), Duration::from_secs(300));
        assert_eq!(" @every  2h ".parse::<Cadence>().unwrap().interval(), Duration::from_secs(7_200));
        assert_eq!("@every 1d".parse::<Cadence>().unwrap().interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_other_descriptors() {
        assert!(matches!("0 3 * * *".parse::<Cadence>(), Err(CadenceError::Unsupported(_))));
        assert!(matches!("@everyday".parse::<Cadence>(), Err(CadenceError::Unsupported(_))));
        assert!(matches!("@every 10w".parse::<Cadence>(), Err(CadenceError::InvalidInterval(_))));
        assert!(matches!("@every s".parse::<Cadence>(), Err(CadenceError::InvalidInterval(_))));
        assert!(matches!("@every ".parse::<Cadence>(), Err(CadenceError::Unsupported(_))));
        assert_eq!("@every 0m".parse::<Cadence>(), Err(CadenceError::Zero));
    }

    #[test]
    fn display_uses_the_largest_whole_unit() {
        for raw in ["@every 45s", "@every 90m", "@every 3h", "@every 2d"] {
            assert_eq!(raw.parse::<Cadence>().unwrap().to_string(), raw);
        }
        assert_eq!("@every 120s".parse::<Cadence>().unwrap().to_string(), "@every 2m");
    }

    #[test]
    fn next_after_adds_the_interval() {
        let cadence = "@every 5m".parse::<Cadence>().unwrap();
        let last = Utc::now();
        assert_eq!(cadence.next_after(last), last + TimeDelta::minutes(5));
    }
}
