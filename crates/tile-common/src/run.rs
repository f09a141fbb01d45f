//! Model run identity.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one model run: the UTC date plus the cycle hour.
///
/// Field order gives chronological ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunId {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub model_cycle: u32,
}

impl RunId {
    pub fn new(year: i32, month: u32, day: u32, model_cycle: u32) -> Self {
        Self {
            year,
            month,
            day,
            model_cycle,
        }
    }

    /// Run whose cycle is the hour containing `time`.
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self::new(time.year(), time.month(), time.day(), time.hour())
    }

    /// Nominal start time of the run, if the fields form a valid date.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| date.and_hms_opt(self.model_cycle, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Valid time of a forecast hour of this run.
    pub fn valid_time(&self, forecast_hour: u32) -> Option<DateTime<Utc>> {
        self.to_datetime()
            .map(|t| t + Duration::hours(forecast_hour as i64))
    }

    /// `YYYYMMDD`, as used in upstream directory names.
    pub fn date_compact(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    /// Stable 64-bit mix of the fields, used to derive per-run seeds.
    pub fn hash64(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for part in [
            self.year as u64,
            self.month as u64,
            self.day as u64,
            self.model_cycle as u64,
        ] {
            h ^= part;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        h
    }
}

impl fmt::Display for RunId {
    /// `year-month-day-cycle`, the form embedded in cache keys and file names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.year, self.month, self.day, self.model_cycle
        )
    }
}
