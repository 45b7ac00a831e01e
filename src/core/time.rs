//! Simulated time arithmetic
//!
//! Simulated time is an absolute counter of milliseconds since the Unix
//! epoch. Day-of-week and time-of-day are derived arithmetically from that
//! counter, so the engine carries no timezone or calendar state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const MILLIS_PER_DAY: u64 = 86_400_000;
pub const MILLIS_PER_HOUR: u64 = 3_600_000;

/// An instant of simulated time (milliseconds since the Unix epoch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimTime(pub u64);

impl SimTime {
    pub fn from_unix_seconds(secs: u64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole days elapsed since the epoch
    pub fn day_number(&self) -> u64 {
        self.0 / MILLIS_PER_DAY
    }

    pub fn millis_into_day(&self) -> u64 {
        self.0 % MILLIS_PER_DAY
    }

    /// Fractional hour of day, e.g. 13.5 for 13:30
    pub fn hour_of_day(&self) -> f64 {
        self.millis_into_day() as f64 / MILLIS_PER_HOUR as f64
    }

    pub fn weekday(&self) -> Weekday {
        Weekday::from_day_number(self.day_number())
    }

    /// Elapsed simulated time since `earlier`, zero if `earlier` is later
    pub fn since(&self, earlier: SimTime) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let into_day = self.millis_into_day();
        let h = into_day / MILLIS_PER_HOUR;
        let m = (into_day % MILLIS_PER_HOUR) / 60_000;
        let s = (into_day % 60_000) / 1000;
        write!(f, "day {} {:02}:{:02}:{:02}", self.day_number(), h, m, s)
    }
}

/// Day of week, Monday-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// The Unix epoch (day 0) was a Thursday
    pub fn from_day_number(day: u64) -> Self {
        match (day + 3) % 7 {
            0 => Weekday::Monday,
            1 => Weekday::Tuesday,
            2 => Weekday::Wednesday,
            3 => Weekday::Thursday,
            4 => Weekday::Friday,
            5 => Weekday::Saturday,
            _ => Weekday::Sunday,
        }
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self, Weekday::Saturday | Weekday::Sunday)
    }
}

/// A wall-clock time of day with second resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    secs: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: u32) -> Option<Self> {
        if hour < 24 && minute < 60 && second < 60 {
            Some(Self {
                secs: hour * 3600 + minute * 60 + second,
            })
        } else {
            None
        }
    }

    pub fn as_millis_into_day(&self) -> u64 {
        self.secs as u64 * 1000
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    /// Parses "HH:MM" or "HH:MM:SS"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(format!("invalid time of day: {s}"));
        }
        let mut nums = [0u32; 3];
        for (i, p) in parts.iter().enumerate() {
            nums[i] = p
                .parse()
                .map_err(|_| format!("invalid time of day: {s}"))?;
        }
        TimeOfDay::new(nums[0], nums[1], nums[2]).ok_or_else(|| format!("time of day out of range: {s}"))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.secs / 3600,
            (self.secs % 3600) / 60,
            self.secs % 60
        )
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A calendar date, used for schedule entries pinned to one specific day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl SimDate {
    /// Days since the Unix epoch for this civil date (proleptic Gregorian)
    pub fn day_number(&self) -> i64 {
        let y = if self.month <= 2 {
            self.year as i64 - 1
        } else {
            self.year as i64
        };
        let era = if y >= 0 { y } else { y - 399 } / 400;
        let yoe = (y - era * 400) as i64;
        let mp = if self.month > 2 {
            self.month - 3
        } else {
            self.month + 9
        } as i64;
        let doy = (153 * mp + 2) / 5 + self.day as i64 - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        era * 146_097 + doe - 719_468
    }
}

impl FromStr for SimDate {
    type Err = String;

    /// Parses "YYYY-MM-DD"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 {
            return Err(format!("invalid date: {s}"));
        }
        let year = parts[0].parse().map_err(|_| format!("invalid date: {s}"))?;
        let month: u32 = parts[1].parse().map_err(|_| format!("invalid date: {s}"))?;
        let day: u32 = parts[2].parse().map_err(|_| format!("invalid date: {s}"))?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(format!("date out of range: {s}"));
        }
        Ok(SimDate { year, month, day })
    }
}

impl fmt::Display for SimDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Serialize for SimDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SimDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
