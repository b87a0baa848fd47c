//! Peak window overlap in garage-local time

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, Utc};

use crate::domain::rate_schedule::PeakWindow;

/// Windows that overlap the stay `[start, end)`, evaluated per local day.
/// A window whose end is not after its start runs into the next day.
pub fn overlapping_windows<'a>(
    windows: &'a [PeakWindow],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<&'a PeakWindow> {
    let start = start.with_timezone(&offset).naive_local();
    let end = end.with_timezone(&offset).naive_local();
    windows
        .iter()
        .filter(|window| overlaps(window, start, end))
        .collect()
}

fn overlaps(window: &PeakWindow, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    // A wrapping window that opened the day before can still be running.
    let mut day = start.date() - Duration::days(1);
    let last = end.date();
    while day <= last {
        if window.days.is_empty() || window.days.contains(&day.weekday()) {
            let opens = day.and_time(window.start);
            let mut closes = day.and_time(window.end);
            if window.end <= window.start {
                closes += Duration::days(1);
            }
            if opens < end && closes > start {
                return true;
            }
        }
        day += Duration::days(1);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Weekday};
    use rust_decimal::Decimal;

    fn sample_window(start: (u32, u32), end: (u32, u32), days: Vec<Weekday>) -> PeakWindow {
        PeakWindow {
            days,
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            multiplier: Decimal::new(15, 1),
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        // March 2024: the 4th is a Monday
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn stay_inside_window_overlaps() {
        let windows = vec![sample_window((8, 0), (10, 0), vec![])];
        assert_eq!(overlapping_windows(&windows, at(4, 8, 30), at(4, 9, 0), utc()).len(), 1);
    }

    #[test]
    fn touching_boundary_does_not_overlap() {
        let windows = vec![sample_window((8, 0), (10, 0), vec![])];
        assert!(overlapping_windows(&windows, at(4, 10, 0), at(4, 11, 0), utc()).is_empty());
        assert!(overlapping_windows(&windows, at(4, 7, 0), at(4, 8, 0), utc()).is_empty());
    }

    #[test]
    fn wrapping_window_from_previous_day() {
        let windows = vec![sample_window((22, 0), (2, 0), vec![Weekday::Mon])];
        // Tuesday 01:00 is inside Monday's window
        assert_eq!(overlapping_windows(&windows, at(5, 1, 0), at(5, 1, 30), utc()).len(), 1);
        // Wednesday 01:00 follows Tuesday, which has no window
        assert!(overlapping_windows(&windows, at(6, 1, 0), at(6, 1, 30), utc()).is_empty());
    }

    #[test]
    fn weekday_filter_uses_local_time() {
        let windows = vec![sample_window((8, 0), (10, 0), vec![Weekday::Tue])];
        let plus_ten = FixedOffset::east_opt(10 * 3600).unwrap();
        // Monday 23:00 UTC is Tuesday 09:00 at +10:00
        assert_eq!(overlapping_windows(&windows, at(4, 23, 0), at(4, 23, 30), plus_ten).len(), 1);
        assert!(overlapping_windows(&windows, at(4, 23, 0), at(4, 23, 30), utc()).is_empty());
    }

    #[test]
    fn multi_day_stay_sees_later_window() {
        let windows = vec![sample_window((17, 0), (19, 0), vec![Weekday::Fri])];
        assert_eq!(overlapping_windows(&windows, at(4, 9, 0), at(8, 18, 0), utc()).len(), 1);
        assert!(overlapping_windows(&windows, at(4, 9, 0), at(7, 18, 0), utc()).is_empty());
    }
}
