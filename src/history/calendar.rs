//! Listening calendar: one day per date between the first and last listen.

use super::coverage::CoverageSet;
use super::models::{CalendarDay, CanonicalListenRecord, CoverageWindow};
use crate::error::{TimelineError, TimelineResult};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, info};

/// A complete, corrected calendar.
///
/// Only [`Calendar::build`] creates one, so every value holds:
/// days are contiguous and ascending, and no day with a listen is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calendar {
    days: Vec<CalendarDay>,
    anomalies_corrected: usize,
}

impl Calendar {
    pub fn build(
        listens: &[CanonicalListenRecord],
        windows: &[CoverageWindow],
    ) -> TimelineResult<Self> {
        let listen_dates: HashSet<NaiveDate> = listens.iter().map(|l| l.date()).collect();
        let (Some(first), Some(last)) = (
            listen_dates.iter().min().copied(),
            listen_dates.iter().max().copied(),
        ) else {
            debug!("No listens, calendar is empty");
            return Ok(Self::default());
        };

        let coverage = CoverageSet::from_windows(windows);
        let mut days: Vec<CalendarDay> = first
            .iter_days()
            .take_while(|date| *date <= last)
            .map(|date| CalendarDay {
                date,
                has_listen: listen_dates.contains(&date),
                is_missing: !coverage.contains(date),
            })
            .collect();

        let anomalies_corrected = correct_anomalies(&mut days);
        if anomalies_corrected > 0 {
            info!(
                "Cleared the missing flag on {} days that have listens",
                anomalies_corrected
            );
        }
        verify(&days)?;

        Ok(Self {
            days,
            anomalies_corrected,
        })
    }

    pub fn days(&self) -> &[CalendarDay] {
        &self.days
    }

    pub fn into_days(self) -> Vec<CalendarDay> {
        self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Days that were outside every coverage window yet had listens.
    pub fn anomalies_corrected(&self) -> usize {
        self.anomalies_corrected
    }

    pub fn listen_days(&self) -> usize {
        self.days.iter().filter(|d| d.has_listen).count()
    }

    pub fn missing_days(&self) -> usize {
        self.days.iter().filter(|d| d.is_missing).count()
    }
}

/// Clears `is_missing` on every day that has a listen. Returns how many days
/// changed; a second call on the same days returns 0.
pub fn correct_anomalies(days: &mut [CalendarDay]) -> usize {
    let mut corrected = 0;
    for day in days.iter_mut().filter(|d| d.has_listen && d.is_missing) {
        day.is_missing = false;
        corrected += 1;
    }
    corrected
}

fn verify(days: &[CalendarDay]) -> TimelineResult<()> {
    match days.iter().find(|d| d.has_listen && d.is_missing) {
        Some(day) => Err(TimelineError::InvariantViolation { date: day.date }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn listen(position: i64, y: i32, m: u32, d: u32) -> CanonicalListenRecord {
        CanonicalListenRecord {
            position,
            end_time: Utc.with_ymd_and_hms(y, m, d, 18, 30, 0).unwrap(),
            artist_name: "X".to_string(),
            track_name: "Y".to_string(),
            ms_played: 1000,
        }
    }

    fn window(batch_id: i64, start: NaiveDate, end: NaiveDate) -> CoverageWindow {
        CoverageWindow {
            batch_id,
            start,
            end,
        }
    }

    #[test]
    fn test_gap_between_windows_is_missing() {
        // The first and last listens stretch the range over January to March
        let listens = vec![
            listen(0, 2021, 1, 1),
            listen(1, 2021, 1, 15),
            listen(2, 2021, 3, 31),
        ];
        let windows = vec![
            window(1, date(2021, 1, 1), date(2021, 1, 31)),
            window(2, date(2021, 3, 1), date(2021, 3, 31)),
        ];

        let calendar = Calendar::build(&listens, &windows).unwrap();

        assert_eq!(calendar.len(), 90);
        for day in calendar.days() {
            if day.date.month() == 2 {
                assert!(day.is_missing, "{} should be missing", day.date);
                assert!(!day.has_listen);
            } else {
                assert!(!day.is_missing, "{} should not be missing", day.date);
            }
        }
        let jan_15 = calendar
            .days()
            .iter()
            .find(|d| d.date == date(2021, 1, 15))
            .unwrap();
        assert!(jan_15.has_listen);
        assert!(!jan_15.is_missing);
        let jan_16 = calendar
            .days()
            .iter()
            .find(|d| d.date == date(2021, 1, 16))
            .unwrap();
        assert!(!jan_16.has_listen);
        assert_eq!(calendar.missing_days(), 28);
        assert_eq!(calendar.anomalies_corrected(), 0);
    }

    #[test]
    fn test_single_listen_day_spans_one_row() {
        let listens = vec![listen(0, 2021, 1, 15)];
        let windows = vec![
            window(1, date(2021, 1, 1), date(2021, 1, 31)),
            window(2, date(2021, 3, 1), date(2021, 3, 31)),
        ];

        let calendar = Calendar::build(&listens, &windows).unwrap();

        assert_eq!(
            calendar.days(),
            &[CalendarDay {
                date: date(2021, 1, 15),
                has_listen: true,
                is_missing: false,
            }]
        );
    }

    #[test]
    fn test_days_are_contiguous_including_silent_days() {
        let listens = vec![listen(0, 2020, 2, 27), listen(1, 2020, 3, 2)];
        let windows = vec![window(1, date(2020, 1, 1), date(2020, 12, 31))];

        let calendar = Calendar::build(&listens, &windows).unwrap();

        let dates: Vec<NaiveDate> = calendar.days().iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2020, 2, 27),
                date(2020, 2, 28),
                date(2020, 2, 29),
                date(2020, 3, 1),
                date(2020, 3, 2),
            ]
        );
        assert_eq!(calendar.listen_days(), 2);
        assert_eq!(calendar.missing_days(), 0);
    }

    #[test]
    fn test_listen_outside_coverage_is_corrected() {
        let listens = vec![listen(0, 2021, 1, 1), listen(1, 2021, 1, 3)];
        let windows = vec![window(1, date(2021, 1, 3), date(2021, 1, 31))];

        let calendar = Calendar::build(&listens, &windows).unwrap();

        let flags: Vec<(bool, bool)> = calendar
            .days()
            .iter()
            .map(|d| (d.has_listen, d.is_missing))
            .collect();
        assert_eq!(flags, vec![(true, false), (false, true), (true, false)]);
        assert_eq!(calendar.anomalies_corrected(), 1);
    }

    #[test]
    fn test_no_windows_marks_every_silent_day_missing() {
        let listens = vec![listen(0, 2021, 1, 1), listen(1, 2021, 1, 3)];

        let calendar = Calendar::build(&listens, &[]).unwrap();

        assert_eq!(calendar.missing_days(), 1);
        assert_eq!(calendar.anomalies_corrected(), 2);
        assert!(calendar.days().iter().all(|d| !(d.has_listen && d.is_missing)));
    }

    #[test]
    fn test_empty_timeline_gives_empty_calendar() {
        let windows = vec![window(1, date(2021, 1, 1), date(2021, 1, 31))];
        let calendar = Calendar::build(&[], &windows).unwrap();
        assert!(calendar.is_empty());
    }

    #[test]
    fn test_correct_anomalies_is_idempotent() {
        let mut days = vec![
            CalendarDay {
                date: date(2021, 1, 1),
                has_listen: true,
                is_missing: true,
            },
            CalendarDay {
                date: date(2021, 1, 2),
                has_listen: false,
                is_missing: true,
            },
            CalendarDay {
                date: date(2021, 1, 3),
                has_listen: true,
                is_missing: false,
            },
        ];

        assert_eq!(correct_anomalies(&mut days), 1);
        let after_first = days.clone();
        assert_eq!(correct_anomalies(&mut days), 0);
        assert_eq!(days, after_first);
        assert!(!days[0].is_missing);
        assert!(days[1].is_missing);
    }

    #[test]
    fn test_verify_reports_offending_date() {
        let days = vec![CalendarDay {
            date: date(2021, 5, 5),
            has_listen: true,
            is_missing: true,
        }];

        match verify(&days) {
            Err(TimelineError::InvariantViolation { date: d }) => assert_eq!(d, date(2021, 5, 5)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
