//! Subscription expiry arithmetic.
//!
//! Week terms are a fixed number of milliseconds. Month and year terms are
//! calendar increments on the local wall-clock date: the day-of-month is kept
//! and, when the target month is shorter, the surplus days roll into the next
//! month (Jan 31 + 1 month lands on Mar 2 or Mar 3, Feb 29 + 1 year on Mar 1).
//! Results are never clamped to the end of the month.

use chrono::{
    DateTime, Datelike, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::model::SubscriptionDuration;
use crate::time::{to_date, MS_PER_DAY};

pub const WEEK_MS: i64 = 7 * MS_PER_DAY;

/// Expiry facts for one subscription, all derived from the same `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expiry {
    pub expires_at: i64,
    pub days_left: i64,
    pub expired: bool,
}

/// Calendar-aware expiry calculator bound to a time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCalculator {
    tz: Tz,
}

impl Default for ExpiryCalculator {
    fn default() -> Self {
        Self::utc()
    }
}

impl ExpiryCalculator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Instant at which a term that began at `start_ms` ends.
    ///
    /// Unknown durations and start instants outside the calendar range yield
    /// `start_ms` unchanged.
    pub fn expiry_ms(&self, start_ms: i64, duration: &SubscriptionDuration) -> i64 {
        match duration {
            SubscriptionDuration::OneWeek => start_ms.saturating_add(WEEK_MS),
            SubscriptionDuration::OneMonth => self.add_months(start_ms, 1).unwrap_or(start_ms),
            SubscriptionDuration::OneYear => self.add_months(start_ms, 12).unwrap_or(start_ms),
            SubscriptionDuration::Unknown(_) => start_ms,
        }
    }

    pub fn days_until_expiry(
        &self,
        start_ms: i64,
        duration: &SubscriptionDuration,
        now_ms: i64,
    ) -> i64 {
        ceil_days(self.expiry_ms(start_ms, duration).saturating_sub(now_ms))
    }

    /// The expiry instant itself is still inside the term.
    pub fn is_expired(&self, start_ms: i64, duration: &SubscriptionDuration, now_ms: i64) -> bool {
        now_ms > self.expiry_ms(start_ms, duration)
    }

    pub fn evaluate(&self, start_ms: i64, duration: &SubscriptionDuration, now_ms: i64) -> Expiry {
        let expires_at = self.expiry_ms(start_ms, duration);
        Expiry {
            expires_at,
            days_left: ceil_days(expires_at.saturating_sub(now_ms)),
            expired: now_ms > expires_at,
        }
    }

    fn add_months(&self, start_ms: i64, months: u32) -> Option<i64> {
        let start = to_date(start_ms)?.with_timezone(&self.tz);
        let local = start.naive_local();
        let date = add_months_rolling(local.date(), months)?;
        let target = NaiveDateTime::new(date, local.time());
        resolve_local(&self.tz, target).map(|dt| dt.timestamp_millis())
    }
}

/// Same day-of-month `months` later; surplus days spill into the following month.
fn add_months_rolling(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let month0 = date.month0().checked_add(months)?;
    let year = date.year().checked_add(i32::try_from(month0 / 12).ok()?)?;
    let first = NaiveDate::from_ymd_opt(year, month0 % 12 + 1, 1)?;
    first.checked_add_days(Days::new(u64::from(date.day0())))
}

/// Ambiguous wall-clock times take the earlier instant. A time inside a
/// transition gap is read with the UTC offset in force the day before, so it
/// lands past the gap by however far it sat into it, whatever the gap length.
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earlier, _) => Some(earlier),
        LocalResult::None => {
            let before = local.checked_sub_days(Days::new(1))?;
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc = local
                .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

/// Integer ceiling of `diff_ms / MS_PER_DAY`.
fn ceil_days(diff_ms: i64) -> i64 {
    let days = diff_ms / MS_PER_DAY;
    if diff_ms % MS_PER_DAY > 0 {
        days + 1
    } else {
        days
    }
}

pub fn compute_expiry(start_ms: i64, duration: &SubscriptionDuration) -> i64 {
    ExpiryCalculator::utc().expiry_ms(start_ms, duration)
}

pub fn days_until_expiry(start_ms: i64, duration: &SubscriptionDuration, now_ms: i64) -> i64 {
    ExpiryCalculator::utc().days_until_expiry(start_ms, duration, now_ms)
}

pub fn is_expired(start_ms: i64, duration: &SubscriptionDuration, now_ms: i64) -> bool {
    ExpiryCalculator::utc().is_expired(start_ms, duration, now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc_ms(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("valid utc instant")
            .timestamp_millis()
    }

    #[test]
    fn week_is_exact_milliseconds() {
        let start = utc_ms(2024, 3, 9, 12, 0);
        assert_eq!(
            compute_expiry(start, &SubscriptionDuration::OneWeek) - start,
            604_800_000
        );
    }

    #[test]
    fn month_end_rolls_over_in_leap_year() {
        let start = utc_ms(2024, 1, 31, 0, 0);
        let expiry = compute_expiry(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2024, 3, 2, 0, 0));
    }

    #[test]
    fn month_end_rolls_over_in_common_year() {
        let start = utc_ms(2023, 1, 31, 8, 30);
        let expiry = compute_expiry(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2023, 3, 3, 8, 30));
    }

    #[test]
    fn month_increment_crosses_year_boundary() {
        let start = utc_ms(2024, 12, 15, 9, 0);
        let expiry = compute_expiry(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2025, 1, 15, 9, 0));
    }

    #[test]
    fn leap_day_plus_year_rolls_to_march_first() {
        let start = utc_ms(2024, 2, 29, 0, 0);
        let expiry = compute_expiry(start, &SubscriptionDuration::OneYear);
        assert_eq!(expiry, utc_ms(2025, 3, 1, 0, 0));
    }

    #[test]
    fn unknown_duration_returns_start() {
        let start = utc_ms(2024, 5, 1, 0, 0);
        let duration = SubscriptionDuration::Unknown("FOREVER".into());
        assert_eq!(compute_expiry(start, &duration), start);
    }

    #[test]
    fn out_of_range_start_returns_start() {
        assert_eq!(compute_expiry(i64::MAX, &SubscriptionDuration::OneMonth), i64::MAX);
    }

    #[test]
    fn month_keeps_local_wall_clock_across_dst() {
        let tz: Tz = "America/New_York".parse().expect("known zone");
        let calc = ExpiryCalculator::new(tz);
        // 12:00 EST on Feb 10 becomes 12:00 EDT on Mar 10.
        let start = utc_ms(2024, 2, 10, 17, 0);
        let expiry = calc.expiry_ms(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2024, 3, 10, 16, 0));
    }

    #[test]
    fn month_landing_in_dst_gap_moves_forward() {
        let tz: Tz = "America/New_York".parse().expect("known zone");
        let calc = ExpiryCalculator::new(tz);
        // 02:30 local on Mar 10 2024 does not exist; 03:30 EDT is 07:30 UTC.
        let start = utc_ms(2024, 2, 10, 7, 30);
        let expiry = calc.expiry_ms(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2024, 3, 10, 7, 30));
    }

    #[test]
    fn month_landing_in_skipped_day_uses_prior_offset() {
        let tz: Tz = "Pacific/Apia".parse().expect("known zone");
        let calc = ExpiryCalculator::new(tz);
        // Dec 30 2011 never happened in Samoa; 12:00 at the old UTC-10 is 22:00 UTC.
        let start = tz
            .with_ymd_and_hms(2011, 11, 30, 12, 0, 0)
            .single()
            .expect("valid local time")
            .timestamp_millis();
        let expiry = calc.expiry_ms(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2011, 12, 30, 22, 0));
        assert!(!calc.is_expired(start, &SubscriptionDuration::OneMonth, start + 1));
        assert_eq!(
            calc.days_until_expiry(start, &SubscriptionDuration::OneMonth, start),
            30
        );
    }

    #[test]
    fn half_hour_gap_keeps_distance_into_gap() {
        let tz: Tz = "Australia/Lord_Howe".parse().expect("known zone");
        let calc = ExpiryCalculator::new(tz);
        // 02:15 on Oct 6 2024 falls in the 02:00-02:30 gap; +10:30 gives 15:45 UTC (02:45 local).
        let start = tz
            .with_ymd_and_hms(2024, 9, 6, 2, 15, 0)
            .single()
            .expect("valid local time")
            .timestamp_millis();
        let expiry = calc.expiry_ms(start, &SubscriptionDuration::OneMonth);
        assert_eq!(expiry, utc_ms(2024, 10, 5, 15, 45));
    }

    #[test]
    fn days_until_expiry_uses_ceiling() {
        let start = utc_ms(2024, 6, 1, 0, 0);
        let week = SubscriptionDuration::OneWeek;
        assert_eq!(days_until_expiry(start, &week, start), 7);
        assert_eq!(days_until_expiry(start, &week, start + 1), 7);
        assert_eq!(days_until_expiry(start, &week, start + MS_PER_DAY), 6);
        assert_eq!(days_until_expiry(start, &week, start + WEEK_MS - 1), 1);
        assert_eq!(days_until_expiry(start, &week, start + WEEK_MS), 0);
        assert_eq!(days_until_expiry(start, &week, start + WEEK_MS + 1), 0);
        assert_eq!(
            days_until_expiry(start, &week, start + WEEK_MS + MS_PER_DAY + 1),
            -1
        );
    }

    #[test]
    fn expiry_instant_is_not_yet_expired() {
        let start = utc_ms(2024, 1, 31, 0, 0);
        let month = SubscriptionDuration::OneMonth;
        let expiry = compute_expiry(start, &month);
        assert!(!is_expired(start, &month, expiry));
        assert!(is_expired(start, &month, expiry + 1));
    }

    #[test]
    fn evaluate_agrees_with_individual_predicates() {
        let calc = ExpiryCalculator::utc();
        let start = utc_ms(2024, 1, 1, 0, 0);
        let year = SubscriptionDuration::OneYear;
        let now = utc_ms(2024, 12, 31, 12, 0);
        let expiry = calc.evaluate(start, &year, now);
        assert_eq!(expiry.expires_at, calc.expiry_ms(start, &year));
        assert_eq!(expiry.days_left, calc.days_until_expiry(start, &year, now));
        assert_eq!(expiry.expired, calc.is_expired(start, &year, now));
        assert_eq!(expiry.days_left, 1);
    }
}
