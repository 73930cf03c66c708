//! Shared primitive types used across the security pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Money in pence.
pub type Amount = i64;

/// Database row identifier.
pub type RowId = i64;

/// An opaque username of a security staff member.
pub type UserId = String;

/// Identifies one invocation of the pipeline in the audit log.
pub type RunId = String;

/// Look-back window used by the frequency and counterparty rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimePeriod {
    #[serde(rename = "all_time")]
    AllTime,
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "last_6_months")]
    Last6Months,
}

impl TimePeriod {
    /// Window length; `None` is unbounded.
    pub fn length(&self) -> Option<Duration> {
        match self {
            Self::AllTime     => None,
            Self::Last7Days   => Some(Duration::days(7)),
            Self::Last30Days  => Some(Duration::days(30)),
            Self::Last6Months => Some(Duration::days(180)),
        }
    }

    /// Earliest timestamp inside the window ending at `at`.
    pub fn start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.length()
            .and_then(|length| at.checked_sub_signed(length))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Latest timestamp whose window still covers `at`.
    pub fn reach(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.length()
            .and_then(|length| at.checked_add_signed(length))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AllTime     => "all time",
            Self::Last7Days   => "last 7 days",
            Self::Last30Days  => "last 30 days",
            Self::Last6Months => "last 6 months",
        }
    }
}

/// Render pence as pounds, e.g. `12000 -> "£120.00"`.
/// With `trim_empty_pence`, whole-pound amounts drop the `.00`.
pub fn format_amount(amount: Amount, trim_empty_pence: bool) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let pence = amount.unsigned_abs();
    let pounds = group_thousands(pence / 100);
    let rem = pence % 100;
    if trim_empty_pence && rem == 0 {
        format!("{sign}£{pounds}")
    } else {
        format!("{sign}£{pounds}.{rem:02}")
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_amounts_in_pounds() {
        assert_eq!(format_amount(12000, true), "£120");
        assert_eq!(format_amount(12000, false), "£120.00");
        assert_eq!(format_amount(1234567, true), "£12,345.67");
        assert_eq!(format_amount(5, false), "£0.05");
        assert_eq!(format_amount(-250, false), "-£2.50");
    }

    #[test]
    fn time_period_windows() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            TimePeriod::Last7Days.start(at),
            Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap()
        );
        assert_eq!(
            TimePeriod::Last7Days.reach(at),
            Utc.with_ymd_and_hms(2024, 3, 17, 12, 0, 0).unwrap()
        );
        assert_eq!(TimePeriod::AllTime.start(at), DateTime::<Utc>::MIN_UTC);
        assert_eq!(TimePeriod::AllTime.reach(at), DateTime::<Utc>::MAX_UTC);
        assert_eq!(TimePeriod::Last6Months.label(), "last 6 months");
    }

    #[test]
    fn all_time_covers_records_before_1970() {
        let at = Utc.with_ymd_and_hms(1965, 7, 1, 9, 30, 0).unwrap();
        assert!(TimePeriod::AllTime.start(at) <= at);
        assert!(TimePeriod::AllTime.reach(at) >= at);
    }

    #[test]
    fn time_periods_use_config_names() {
        let period: TimePeriod = serde_json::from_str("\"last_30_days\"").unwrap();
        assert_eq!(period, TimePeriod::Last30Days);
        assert_eq!(serde_json::to_string(&TimePeriod::Last7Days).unwrap(), "\"last_7_days\"");
    }
}
