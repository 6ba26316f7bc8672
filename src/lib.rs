//! Listening Timeline Library
//!
//! Merges overlapping listening-history exports into one canonical,
//! deduplicated timeline and a day-by-day calendar of listened and missing days.

pub mod config;
pub mod error;
pub mod history;
pub mod rebuild;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{PipelineStage, TimelineError, TimelineResult};
pub use rebuild::{RebuildReport, TimelineRebuilder};
pub use store::{CalendarQuery, SqliteTimelineStore, TimelineStore};
