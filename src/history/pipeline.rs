//! Raw inputs to a complete timeline snapshot, with no I/O.

use super::calendar::Calendar;
use super::merge::{merge_and_dedup, validate_rows};
use super::models::{Batch, CanonicalListenRecord, CoverageWindow, RawListenRow, SourceFile};
use super::ranker::rank_source_files;
use crate::error::TimelineResult;
use tracing::debug;

/// Everything the pipeline reads.
#[derive(Debug, Clone, Default)]
pub struct TimelineInputs {
    pub batches: Vec<Batch>,
    pub files: Vec<SourceFile>,
    pub rows: Vec<RawListenRow>,
}

/// A fully computed timeline, ready to replace the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineSnapshot {
    pub listens: Vec<CanonicalListenRecord>,
    pub calendar: Calendar,
    pub raw_records: usize,
    pub placeholders_skipped: usize,
    pub duplicates_collapsed: usize,
}

pub fn build_timeline(
    inputs: TimelineInputs,
    windows: &[CoverageWindow],
) -> TimelineResult<TimelineSnapshot> {
    let TimelineInputs {
        batches,
        files,
        rows,
    } = inputs;
    let raw_records = rows.len();

    let validated = validate_rows(rows)?;
    debug!(
        "Validated {} raw listens ({} placeholders)",
        validated.records.len(),
        validated.placeholders.len()
    );

    let ranking = rank_source_files(&batches, &files);
    let merged = merge_and_dedup(&validated.records, &ranking)?;
    let calendar = Calendar::build(&merged.listens, windows)?;

    Ok(TimelineSnapshot {
        listens: merged.listens,
        calendar,
        raw_records,
        placeholders_skipped: validated.placeholders.len(),
        duplicates_collapsed: merged.duplicates_collapsed,
    })
}
