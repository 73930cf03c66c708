//! Digest windows for users who get notifications by email.

use crate::store::EventFilter;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailFrequency {
    Never,
    Daily,
    Weekly,
    Monthly,
}

/// Half-open window `[start, end)` of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPeriod {
    pub start: DateTime<Utc>,
    pub end:   DateTime<Utc>,
}

impl NotificationPeriod {
    /// Events triggered inside this window, visible to `user`.
    pub fn event_filter(&self, user: Option<&str>) -> EventFilter {
        EventFilter {
            triggered_at_from:  Some(self.start),
            triggered_at_until: Some(self.end),
            visible_to:         user.map(str::to_string),
            ..EventFilter::default()
        }
    }
}

impl EmailFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never   => "never",
            Self::Daily   => "daily",
            Self::Weekly  => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// The previous whole day, Monday-to-Sunday week or calendar month
    /// before `today`. `Never` has no window.
    pub fn period(&self, today: NaiveDate) -> Option<NotificationPeriod> {
        let (start, end) = match self {
            Self::Never => return None,
            Self::Daily => (today - Duration::days(1), today),
            Self::Weekly => {
                let this_week = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                (this_week - Duration::days(7), this_week)
            }
            Self::Monthly => {
                let this_month = today.with_day(1)?;
                let last_month = (this_month - Duration::days(1)).with_day(1)?;
                (last_month, this_month)
            }
        };
        Some(NotificationPeriod { start: midnight(start), end: midnight(end) })
    }
}

impl FromStr for EmailFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never"   => Ok(Self::Never),
            "daily"   => Ok(Self::Daily),
            "weekly"  => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown email frequency \"{other}\"")),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}
