//! Wall-clock recurrence arithmetic.
//!
//! All functions here are pure: they take the reference time explicitly and
//! work in whatever UTC offset that time carries.

use time::util::days_in_year_month;
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};
use tokio::time::Instant;

/// Local offset of the host, or UTC if it cannot be determined.
pub fn local_offset_or_utc() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Current wall-clock time in `offset`.
pub fn now_in(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

/// First occurrence of `at` strictly after `after`.
pub fn next_daily(after: OffsetDateTime, at: Time) -> OffsetDateTime {
    let today = after.replace_time(at);
    if today > after {
        return today;
    }
    match after.date().next_day() {
        Some(tomorrow) => tomorrow.with_time(at).assume_offset(after.offset()),
        None => today,
    }
}

/// `day` of the given month, or the month's last day if it is shorter.
fn clamped_date(year: i32, month: Month, day: u8) -> Option<Date> {
    let day = day.min(days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).ok()
}

/// First occurrence of `day` at `at` strictly after `after`.
///
/// A month with fewer than `day` days fires on its last day; the following
/// month targets `day` again.
pub fn next_monthly(after: OffsetDateTime, day: u8, at: Time) -> OffsetDateTime {
    let offset = after.offset();
    let (mut year, mut month) = (after.year(), after.month());

    for _ in 0..2 {
        if let Some(date) = clamped_date(year, month, day) {
            let candidate = date.with_time(at).assume_offset(offset);
            if candidate > after {
                return candidate;
            }
        }
        if month == Month::December {
            year += 1;
        }
        month = month.next();
    }
    // Unreachable for dates inside the supported range.
    after
}

/// Converts a wall-clock occurrence into a monotonic deadline, using the
/// pair `(now_wall, now)` as the reference. Past occurrences map to `now`.
///
/// Returns `None` when the deadline cannot be represented as an [`Instant`].
pub fn to_instant(wall: OffsetDateTime, now_wall: OffsetDateTime, now: Instant) -> Option<Instant> {
    let delta = wall - now_wall;
    if !delta.is_positive() {
        return Some(now);
    }
    now.checked_add(std::time::Duration::try_from(delta).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::{datetime, time};

    #[test]
    fn test_next_daily_later_today() {
        let after = datetime!(2024-03-10 08:00 UTC);
        assert_eq!(next_daily(after, time!(09:30)), datetime!(2024-03-10 09:30 UTC));
    }

    #[test]
    fn test_next_daily_rolls_to_tomorrow() {
        let after = datetime!(2024-12-31 09:30 +02:00);
        assert_eq!(
            next_daily(after, time!(09:30)),
            datetime!(2025-01-01 09:30 +02:00)
        );
    }

    #[test]
    fn test_monthly_falls_back_to_last_day() {
        let at = time!(12:00);
        let jan = datetime!(2023-01-31 12:00 UTC);

        let feb = next_monthly(jan, 31, at);
        assert_eq!(feb, datetime!(2023-02-28 12:00 UTC));

        let mar = next_monthly(feb, 31, at);
        assert_eq!(mar, datetime!(2023-03-31 12:00 UTC));

        let apr = next_monthly(mar, 31, at);
        assert_eq!(apr, datetime!(2023-04-30 12:00 UTC));
    }

    #[test]
    fn test_monthly_leap_year_and_year_wrap() {
        let at = time!(00:00);
        assert_eq!(
            next_monthly(datetime!(2024-02-01 00:00 UTC), 30, at),
            datetime!(2024-02-29 00:00 UTC)
        );
        assert_eq!(
            next_monthly(datetime!(2024-12-15 00:00 UTC), 1, at),
            datetime!(2025-01-01 00:00 UTC)
        );
    }

    #[test]
    fn test_monthly_same_month_when_still_ahead() {
        assert_eq!(
            next_monthly(datetime!(2024-05-02 10:00 UTC), 20, time!(08:00)),
            datetime!(2024-05-20 08:00 UTC)
        );
    }

    #[test]
    fn test_to_instant() {
        let now = Instant::now();
        let now_wall = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(
            to_instant(datetime!(2024-01-01 00:01 UTC), now_wall, now),
            Some(now + Duration::from_secs(60))
        );
        assert_eq!(
            to_instant(datetime!(2023-12-31 23:00 UTC), now_wall, now),
            Some(now)
        );
    }
}
