//! Date source for snapshot names.

use chrono::{Local, NaiveDate};

/// Supplies the calendar date stamped into snapshot file names.
pub trait Clock: Send + Sync {
    /// Returns today's date.
    fn today(&self) -> NaiveDate;

    /// Returns today's date formatted as `YYYY-MM-DD`.
    fn date_stamp(&self) -> String {
        self.today().format("%Y-%m-%d").to_string()
    }
}

/// The local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock stuck on one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
