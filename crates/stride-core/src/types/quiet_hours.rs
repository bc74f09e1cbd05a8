//! Quiet hours: a local-time window during which channel delivery is held back.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::schedule::hhmm;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    #[serde(with = "hhmm", default = "default_start")]
    pub start: NaiveTime,
    #[serde(with = "hhmm", default = "default_end")]
    pub end: NaiveTime,
}

fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default()
}

fn default_end() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_start(),
            end: default_end(),
        }
    }
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { enabled: true, start, end }
    }

    /// Whether `now` falls inside `[start, end)`.
    ///
    /// `start > end` wraps past midnight. `start == end` is an empty window.
    pub fn is_quiet(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start <= self.end {
            now >= self.start && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_wraps_midnight() {
        let quiet = QuietHours::new(t(22, 0), t(8, 0));
        assert!(quiet.is_quiet(t(23, 30)));
        assert!(quiet.is_quiet(t(0, 0)));
        assert!(quiet.is_quiet(t(7, 59)));
        assert!(!quiet.is_quiet(t(8, 0)));
        assert!(!quiet.is_quiet(t(9, 0)));
        assert!(!quiet.is_quiet(t(21, 59)));
        assert!(quiet.is_quiet(t(22, 0)));
    }

    #[test]
    fn test_same_day_window() {
        let quiet = QuietHours::new(t(13, 0), t(14, 0));
        assert!(quiet.is_quiet(t(13, 0)));
        assert!(quiet.is_quiet(t(13, 59)));
        assert!(!quiet.is_quiet(t(14, 0)));
        assert!(!quiet.is_quiet(t(12, 59)));
    }

    #[test]
    fn test_disabled_and_empty() {
        let mut quiet = QuietHours::new(t(22, 0), t(8, 0));
        quiet.enabled = false;
        assert!(!quiet.is_quiet(t(23, 30)));

        let empty = QuietHours::new(t(10, 0), t(10, 0));
        assert!(!empty.is_quiet(t(10, 0)));
    }

    #[test]
    fn test_toml_shape() {
        let quiet: QuietHours = toml::from_str("enabled = true\nstart = \"22:30\"\nend = \"06:15\"").unwrap();
        assert!(quiet.enabled);
        assert_eq!(quiet.start, t(22, 30));
        assert_eq!(quiet.end, t(6, 15));
    }
}
