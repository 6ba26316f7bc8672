mod calendar;
mod coverage;
mod merge;
mod models;
mod pipeline;
mod ranker;

pub use calendar::{correct_anomalies, Calendar};
pub use coverage::{resolve_download_date, CoveragePolicy, CoverageSet};
pub use merge::{merge_and_dedup, validate_rows, MergeOutcome, ValidatedListens};
pub use models::{
    Batch, CalendarDay, CanonicalListenRecord, CoverageWindow, ListenContent, NewBatch,
    RawListenEntry, RawListenRecord, RawListenRow, SourceFile,
};
pub use pipeline::{build_timeline, TimelineInputs, TimelineSnapshot};
pub use ranker::{rank_source_files, SourceRanking};
