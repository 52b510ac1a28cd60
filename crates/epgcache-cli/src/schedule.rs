//! Hourly wall-clock refresh schedule.

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, TimeDelta, Timelike, Utc};

/// Fires once per hour at a fixed UTC minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    utc_minute: u32,
}

impl RefreshSchedule {
    /// Builds a schedule from a minute of the local hour.
    ///
    /// `local_minus_utc_secs` is the local UTC offset (as reported by
    /// `chrono::Local`). Offsets that are not whole hours (e.g. +05:30) shift
    /// the minute accordingly.
    ///
    /// # Errors
    ///
    /// Returns an error if `minute` is not in `0..60`.
    pub fn from_local_minute(minute: u32, local_minus_utc_secs: i32) -> Result<Self> {
        ensure!(
            minute < 60,
            "refresh offset must be between 0 and 59 minutes, got {minute}"
        );
        let offset_minutes = i64::from(local_minus_utc_secs).div_euclid(60);
        let utc = i64::from(minute)
            .saturating_sub(offset_minutes)
            .rem_euclid(60);
        let utc_minute = u32::try_from(utc).context("UTC minute out of range")?;
        Ok(Self { utc_minute })
    }

    /// Minute of the UTC hour at which the schedule fires.
    #[must_use]
    pub const fn utc_minute(&self) -> u32 {
        self.utc_minute
    }

    /// First firing time strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let hour_start = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let candidate = hour_start
            .checked_add_signed(TimeDelta::minutes(i64::from(self.utc_minute)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if candidate > now {
            candidate
        } else {
            candidate
                .checked_add_signed(TimeDelta::hours(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        }
    }
}
