use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl DurationUnit {
    fn suffix(&self) -> char {
        match self {
            DurationUnit::Days => 'd',
            DurationUnit::Hours => 'h',
            DurationUnit::Minutes => 'm',
            DurationUnit::Seconds => 's',
        }
    }
}

/// How long an item is kept before it becomes eligible for deletion.
///
/// Written as `<integer><unit>` with unit `d`, `h`, `m` or `s`, or the word
/// `never`. A zero amount (`0d`) means "due as soon as the reference time is
/// reached", which is not the same thing as an absent retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Retention {
    Never,
    Immediate,
    After { amount: i64, unit: DurationUnit, duration: Duration },
}

impl Retention {
    pub fn days(amount: i64) -> Self {
        Self::After {
            amount,
            unit: DurationUnit::Days,
            duration: Duration::days(amount),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Retention::Never)
    }

    /// Deletion date for an item whose clock started at `reference`.
    pub fn deletion_date(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Retention::Never => None,
            Retention::Immediate => Some(reference),
            Retention::After { duration, .. } => reference.checked_add_signed(*duration),
        }
    }
}

impl FromStr for Retention {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidRetention {
            value: s.to_string(),
            reason,
        };

        let value = s.trim().to_ascii_lowercase();
        if value == "never" {
            return Ok(Retention::Never);
        }
        if value.is_empty() {
            return Err(invalid("empty value"));
        }

        let mut chars = value.chars();
        let unit = match chars.next_back() {
            Some('d') => DurationUnit::Days,
            Some('h') => DurationUnit::Hours,
            Some('m') => DurationUnit::Minutes,
            Some('s') => DurationUnit::Seconds,
            _ => return Err(invalid("expected a unit of d, h, m or s")),
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a non-negative integer before the unit"));
        }
        let amount: i64 = digits.parse().map_err(|_| invalid("amount is too large"))?;
        if amount == 0 {
            return Ok(Retention::Immediate);
        }

        let duration = match unit {
            DurationUnit::Days => Duration::try_days(amount),
            DurationUnit::Hours => Duration::try_hours(amount),
            DurationUnit::Minutes => Duration::try_minutes(amount),
            DurationUnit::Seconds => Duration::try_seconds(amount),
        }
        .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Retention::After { amount, unit, duration })
    }
}

impl TryFrom<String> for Retention {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Retention> for String {
    fn from(value: Retention) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Never => f.write_str("never"),
            Retention::Immediate => f.write_str("0d"),
            Retention::After { amount, unit, .. } => write!(f, "{}{}", amount, unit.suffix()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("7d".parse::<Retention>().unwrap(), Retention::days(7));
        let hours: Retention = "36h".parse().unwrap();
        let now = Utc::now();
        assert_eq!(hours.deletion_date(now), Some(now + Duration::hours(36)));
        assert_eq!("90m".parse::<Retention>().unwrap().to_string(), "90m");
        assert_eq!(" 45S ".parse::<Retention>().unwrap().to_string(), "45s");
    }

    #[test]
    fn test_sentinels() {
        let now = Utc::now();
        assert_eq!("never".parse::<Retention>().unwrap(), Retention::Never);
        assert_eq!("NEVER".parse::<Retention>().unwrap().deletion_date(now), None);

        let zero: Retention = "0d".parse().unwrap();
        assert_eq!(zero, Retention::Immediate);
        assert_eq!(zero.deletion_date(now), Some(now));
        assert_eq!("0h".parse::<Retention>().unwrap(), Retention::Immediate);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for bad in ["", "d", "7", "7w", "-1d", "1.5d", "seven days", "99999999999999999999d", "7é", "30日", "é7d"] {
            assert!(bad.parse::<Retention>().is_err(), "expected '{}' to be rejected", bad);
        }
    }

    #[test]
    fn test_round_trips_through_string() {
        let value: Retention = String::from("30d").try_into().unwrap();
        assert_eq!(String::from(value), "30d");
    }
}
