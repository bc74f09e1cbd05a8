//! Recurrence cadence and local time-of-day helpers.

use chrono::{DateTime, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrideError};

/// How often a recurring trigger fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// The next fire time one interval after `from`.
    ///
    /// Monthly steps follow the calendar and clamp to the last day of
    /// shorter months (Jan 31 -> Feb 28/29).
    pub fn advance(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let next = match self {
            Frequency::Daily => from.checked_add_signed(chrono::Duration::days(1)),
            Frequency::Weekly => from.checked_add_signed(chrono::Duration::days(7)),
            Frequency::Monthly => from.checked_add_months(Months::new(1)),
        };
        next.ok_or_else(|| StrideError::schedule(format!("{self} step from {from} is out of range")))
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = StrideError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(StrideError::InvalidFrequency(s.to_string())),
        }
    }
}

/// Parse a local wall-clock time written as `HH:MM`.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| StrideError::config(format!("Invalid time '{s}' (expected HH:MM): {e}")))
}

/// Serde adapter storing a [`NaiveTime`] as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}
