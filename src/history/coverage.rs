//! Coverage windows: the date ranges each batch is asserted to represent.
//!
//! The calendar only needs the union of the windows ([`CoverageSet`]). Where
//! the windows come from is a policy decision kept apart in
//! [`CoveragePolicy`]: an export covers a fixed number of years back from the
//! day it was downloaded.

use super::models::{Batch, CoverageWindow, RawListenRow, SourceFile};
use chrono::{Months, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Union of coverage windows as sorted, disjoint, non-adjacent date ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageSet {
    ranges: Vec<(NaiveDate, NaiveDate)>,
}

impl CoverageSet {
    pub fn from_windows(windows: &[CoverageWindow]) -> Self {
        let mut sorted: Vec<(NaiveDate, NaiveDate)> = windows
            .iter()
            .filter(|w| {
                if w.start > w.end {
                    warn!(
                        "Ignoring inverted coverage window {}..{} of batch {}",
                        w.start, w.end, w.batch_id
                    );
                    return false;
                }
                true
            })
            .map(|w| (w.start, w.end))
            .collect();
        sorted.sort();

        let mut ranges: Vec<(NaiveDate, NaiveDate)> = Vec::with_capacity(sorted.len());
        for (start, end) in sorted {
            match ranges.last_mut() {
                Some((_, last_end)) if last_end.succ_opt().map_or(true, |next| start <= next) => {
                    *last_end = (*last_end).max(end);
                }
                _ => ranges.push((start, end)),
            }
        }
        Self { ranges }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let idx = self.ranges.partition_point(|(start, _)| *start <= date);
        idx > 0 && date <= self.ranges[idx - 1].1
    }

    pub fn ranges(&self) -> &[(NaiveDate, NaiveDate)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoveragePolicy {
    pub years: u32,
}

impl Default for CoveragePolicy {
    fn default() -> Self {
        Self { years: 1 }
    }
}

impl CoveragePolicy {
    pub fn new(years: u32) -> Self {
        Self { years }
    }

    /// Window ending on `download_date` and reaching back `years` calendar
    /// years. Feb 29 maps to Feb 28 in a non-leap start year.
    pub fn window_for(&self, batch_id: i64, download_date: NaiveDate) -> CoverageWindow {
        let start = download_date
            .checked_sub_months(Months::new(self.years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);
        CoverageWindow {
            batch_id,
            start,
            end: download_date,
        }
    }

    /// Derives one window per batch that has a resolvable download date.
    ///
    /// Rows without an end time are ignored here; validation rejects them
    /// later in the run.
    pub fn derive_windows(
        &self,
        batches: &[Batch],
        files: &[SourceFile],
        rows: &[RawListenRow],
    ) -> Vec<CoverageWindow> {
        let batch_of_file: HashMap<i64, i64> = files.iter().map(|f| (f.id, f.batch_id)).collect();

        let mut last_listen: HashMap<i64, NaiveDate> = HashMap::new();
        for row in rows {
            let (Some(batch_id), Some(end_time)) =
                (batch_of_file.get(&row.source_file_id), row.entry.end_time)
            else {
                continue;
            };
            let date = end_time.date_naive();
            last_listen
                .entry(*batch_id)
                .and_modify(|last| *last = (*last).max(date))
                .or_insert(date);
        }

        let mut windows = Vec::with_capacity(batches.len());
        for batch in batches {
            match resolve_download_date(batch, last_listen.get(&batch.id).copied()) {
                Some(download_date) => windows.push(self.window_for(batch.id, download_date)),
                None => debug!(
                    "Batch {} ({}) has no listens and no download date, no coverage",
                    batch.id, batch.name
                ),
            }
        }
        windows
    }
}

/// Download date actually used for coverage.
///
/// An export cannot contain listens from after it was downloaded, so a
/// declared date earlier than the last listen is replaced by the last listen
/// date. Without a declared date the last listen date is used.
pub fn resolve_download_date(batch: &Batch, last_listen: Option<NaiveDate>) -> Option<NaiveDate> {
    match (batch.download_date, last_listen) {
        (Some(declared), Some(last)) if declared < last => {
            warn!(
                "Batch {} ({}) declares download date {} but has listens up to {}, using {}",
                batch.id, batch.name, declared, last, last
            );
            Some(last)
        }
        (Some(declared), _) => Some(declared),
        (None, last) => last,
    }
}
