//! Unix timestamps in seconds

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds in one day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Unix timestamp with second precision
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Construct from seconds since the Unix epoch
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time.
    ///
    /// A clock set before 1970 yields `0` rather than failing.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self(secs)
    }

    /// Seconds since the Unix epoch
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Add seconds, saturating at `u64::MAX`
    pub const fn add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Subtract seconds, saturating at zero
    pub const fn sub_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Add whole days, saturating
    pub const fn add_days(self, days: u64) -> Self {
        self.add_secs(days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Subtract whole days, saturating at zero
    pub const fn sub_days(self, days: u64) -> Self {
        self.sub_secs(days.saturating_mul(SECONDS_PER_DAY))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
