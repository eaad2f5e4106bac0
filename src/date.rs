//! Local-day arithmetic for due dates.
//!
//! Due dates are stored as epoch milliseconds truncated to the start of a
//! calendar day in the local time zone. The `_in` variants take an explicit
//! zone so the arithmetic can be checked independently of the host's zone.

use std::fmt::Display;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Length of a day without DST transitions.
pub const DAY_MILLIS: i64 = 86_400_000;

/// Display format for due dates (`dd/MM/yyyy`).
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Input format accepted by [`parse_day`].
pub const INPUT_FORMAT: &str = "%Y-%m-%d";

/// Label shown for tasks without a due date.
pub const NO_DATE_LABEL: &str = "No Date";

/// Quarter hours in a day: the furthest a DST gap is searched.
const GAP_SCAN_STEPS: i32 = 96;

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of the local day containing `ms`.
pub fn start_of_day(ms: i64) -> i64 {
    start_of_day_in(ms, &Local)
}

/// `[start of day, start of next day)` for the local day containing `ms`.
pub fn day_range(ms: i64) -> (i64, i64) {
    day_range_in(ms, &Local)
}

/// Start of the day containing `ms` in `tz`.
pub fn start_of_day_in<Tz: TimeZone>(ms: i64, tz: &Tz) -> i64 {
    match day_of(ms, tz) {
        Some(day) => midnight_of(day, tz),
        None => ms,
    }
}

/// `[start of day, start of next day)` for the day containing `ms` in `tz`.
pub fn day_range_in<Tz: TimeZone>(ms: i64, tz: &Tz) -> (i64, i64) {
    let Some(day) = day_of(ms, tz) else {
        return (ms, ms.saturating_add(DAY_MILLIS));
    };
    let start = midnight_of(day, tz);
    // Not always DAY_MILLIS later: DST days are 23 or 25 hours long.
    let end = match day.succ_opt() {
        Some(next) => midnight_of(next, tz),
        None => start.saturating_add(DAY_MILLIS),
    };
    (start, end)
}

/// Format `ms` as `dd/MM/yyyy` in local time.
pub fn format_day(ms: i64) -> String {
    format_day_in(ms, &Local)
}

/// Format `ms` as `dd/MM/yyyy` in `tz`.
pub fn format_day_in<Tz: TimeZone>(ms: i64, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    match tz.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format(DISPLAY_FORMAT).to_string(),
        None => NO_DATE_LABEL.to_string(),
    }
}

/// Format an optional due date, treating absent or non-positive values as
/// "No Date".
pub fn format_day_or_none(ms: Option<i64>) -> String {
    match ms {
        Some(ms) if ms > 0 => format_day(ms),
        _ => NO_DATE_LABEL.to_string(),
    }
}

/// Parse `YYYY-MM-DD` into the local midnight of that day.
pub fn parse_day(input: &str) -> Result<i64, chrono::ParseError> {
    let day = NaiveDate::parse_from_str(input.trim(), INPUT_FORMAT)?;
    Ok(midnight_of(day, &Local))
}

fn day_of<Tz: TimeZone>(ms: i64, tz: &Tz) -> Option<NaiveDate> {
    tz.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.date_naive())
}

fn midnight_of<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> i64 {
    let Some(midnight) = day.and_hms_opt(0, 0, 0) else {
        return 0;
    };
    first_instant_at_or_after(midnight, tz)
}

/// Resolve a local wall-clock time. Inside a DST gap (some zones have no
/// 00:00 on the day clocks spring forward) the first quarter hour that
/// exists is used, however long the gap.
fn first_instant_at_or_after<Tz: TimeZone>(local: NaiveDateTime, tz: &Tz) -> i64 {
    let mut candidate = local;
    for _ in 0..=GAP_SCAN_STEPS {
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.timestamp_millis();
        }
        candidate = match candidate.checked_add_signed(Duration::minutes(15)) {
            Some(next) => next,
            None => break,
        };
    }
    Utc.from_utc_datetime(&local).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult};

    /// Zone that jumps from UTC-5 to UTC-3 at local midnight on
    /// 2024-03-10, so that day has no 00:00 or 01:00.
    #[derive(Debug, Clone, Copy)]
    struct TwoHourGap;

    impl TwoHourGap {
        fn switch() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 3, 10)
                .unwrap()
                .and_hms_opt(5, 0, 0)
                .unwrap()
        }

        fn before() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn after() -> FixedOffset {
            FixedOffset::west_opt(3 * 3600).unwrap()
        }
    }

    impl TimeZone for TwoHourGap {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            TwoHourGap
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let valid: Vec<FixedOffset> = [Self::before(), Self::after()]
                .into_iter()
                .filter(|offset| {
                    let utc = *local - Duration::seconds(offset.local_minus_utc() as i64);
                    (utc < Self::switch()) == (*offset == Self::before())
                })
                .collect();
            match valid.as_slice() {
                [] => LocalResult::None,
                [one] => LocalResult::Single(*one),
                [a, b] => LocalResult::Ambiguous(*a, *b),
                _ => unreachable!(),
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch() {
                Self::before()
            } else {
                Self::after()
            }
        }
    }

    // 2024-06-01T00:00:00Z
    const JUNE_FIRST_UTC: i64 = 1_717_200_000_000;

    #[test]
    fn test_start_of_day_utc() {
        let afternoon = JUNE_FIRST_UTC + 13 * 3_600_000 + 1_234;
        assert_eq!(start_of_day_in(afternoon, &Utc), JUNE_FIRST_UTC);
        assert_eq!(start_of_day_in(JUNE_FIRST_UTC, &Utc), JUNE_FIRST_UTC);
        assert_eq!(
            start_of_day_in(JUNE_FIRST_UTC - 1, &Utc),
            JUNE_FIRST_UTC - DAY_MILLIS
        );
    }

    #[test]
    fn test_start_of_day_respects_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        // 2024-06-01T00:30+02:00 is still 31 May in UTC.
        let ms = JUNE_FIRST_UTC - 90 * 60_000;
        assert_eq!(
            start_of_day_in(ms, &plus_two),
            JUNE_FIRST_UTC - 2 * 3_600_000
        );
        assert_eq!(start_of_day_in(ms, &Utc), JUNE_FIRST_UTC - DAY_MILLIS);
    }

    #[test]
    fn test_day_range_utc() {
        let (start, end) = day_range_in(JUNE_FIRST_UTC + 5, &Utc);
        assert_eq!(start, JUNE_FIRST_UTC);
        assert_eq!(end, JUNE_FIRST_UTC + DAY_MILLIS);
    }

    #[test]
    fn test_local_normalization_is_idempotent() {
        let now = now_millis();
        let start = start_of_day(now);
        assert!(start <= now);
        assert_eq!(start_of_day(start), start);

        let (range_start, range_end) = day_range(now);
        assert_eq!(range_start, start);
        assert!(range_end > now);
        assert_eq!(start_of_day(range_end), range_end);
    }

    #[test]
    fn test_midnight_in_long_dst_gap() {
        // 2024-03-10T05:00Z is 02:00 local, the first time that exists.
        let first = Utc
            .from_utc_datetime(&TwoHourGap::switch())
            .timestamp_millis();
        let noon = first + 10 * 3_600_000;
        assert_eq!(start_of_day_in(noon, &TwoHourGap), first);

        let (start, end) = day_range_in(noon, &TwoHourGap);
        assert_eq!(start, first);
        assert_eq!(end - start, 22 * 3_600_000);

        // The day before runs up to the switch.
        let (_, end) = day_range_in(first - 3_600_000, &TwoHourGap);
        assert_eq!(end, first);
    }

    #[test]
    fn test_format_day() {
        assert_eq!(format_day_in(JUNE_FIRST_UTC, &Utc), "01/06/2024");
        assert_eq!(format_day_or_none(None), NO_DATE_LABEL);
        assert_eq!(format_day_or_none(Some(0)), NO_DATE_LABEL);
        assert_eq!(format_day_or_none(Some(-1)), NO_DATE_LABEL);
    }

    #[test]
    fn test_parse_day() {
        let expected = Local
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(parse_day("2024-06-01").unwrap(), expected);
        assert_eq!(parse_day("  2024-06-01 ").unwrap(), expected);
        assert_eq!(format_day(expected), "01/06/2024");

        assert!(parse_day("01/06/2024").is_err());
        assert!(parse_day("2024-13-01").is_err());
    }
}
