//! Conversions between `time` instants and calendar dates in the service
//! reference timezone. Quota windows roll over at local midnight, not UTC.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use time::{Date, Month, OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let nanos: u32 = utc.nanosecond();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, nanos).unwrap_or_else(|| {
        DateTime::<Utc>::from_timestamp(seconds, 0).expect("valid UTC timestamp")
    });
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

pub fn localized_date(time: OffsetDateTime, tz: Tz) -> Date {
    let localized = localized_datetime(time, tz);
    let month = Month::try_from(localized.month() as u8)
        .expect("valid month value from chrono to time conversion");
    let day =
        u8::try_from(localized.day()).expect("valid day value from chrono to time conversion");
    Date::from_calendar_date(localized.year(), month, day).expect("valid calendar date")
}

/// The current day in the given timezone.
pub fn today_in(tz: Tz) -> Date {
    localized_date(OffsetDateTime::now_utc(), tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn local_date_crosses_utc_midnight() {
        // 20:00 UTC on the 1st is already the 2nd in Kolkata (UTC+5:30).
        let instant = datetime!(2026-03-01 20:00 UTC);
        let date = localized_date(instant, chrono_tz::Asia::Kolkata);
        assert_eq!(date, time::macros::date!(2026 - 03 - 02));
    }

    #[test]
    fn local_date_matches_utc_when_no_offset() {
        let instant = datetime!(2026-03-01 12:00 UTC);
        let date = localized_date(instant, chrono_tz::UTC);
        assert_eq!(date, time::macros::date!(2026 - 03 - 01));
    }
}
