mod schema;
mod sqlite_store;

pub use schema::VERSIONED_SCHEMAS;
pub use sqlite_store::SqliteTimelineStore;

use crate::history::{
    Batch, CalendarDay, CanonicalListenRecord, NewBatch, RawListenEntry, SourceFile,
    TimelineInputs,
};
use anyhow::Result;
use chrono::NaiveDate;

/// Filter for calendar rows. `None` matches either value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarQuery {
    pub has_listen: Option<bool>,
    pub is_missing: Option<bool>,
}

impl CalendarQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn missing() -> Self {
        Self {
            has_listen: None,
            is_missing: Some(true),
        }
    }

    pub fn listened() -> Self {
        Self {
            has_listen: Some(true),
            is_missing: None,
        }
    }
}

pub trait TimelineStore: Send + Sync {
    // Ingestion

    /// Registers a new batch, assigning it the next intake order.
    fn register_batch(&self, batch: &NewBatch) -> Result<Batch>;

    /// Stores one source file and its entries, positions being indices into
    /// `entries`.
    fn add_source_file(
        &self,
        batch_id: i64,
        file_name: &str,
        entries: &[RawListenEntry],
    ) -> Result<SourceFile>;

    fn list_batches(&self) -> Result<Vec<Batch>>;
    fn list_source_files(&self) -> Result<Vec<SourceFile>>;

    /// Reads every pipeline input from one consistent snapshot.
    fn load_inputs(&self) -> Result<TimelineInputs>;

    // Outputs

    /// Replaces the canonical timeline and calendar in one transaction.
    fn replace_timeline(
        &self,
        listens: &[CanonicalListenRecord],
        calendar: &[CalendarDay],
    ) -> Result<()>;

    fn count_listens(&self) -> Result<usize>;
    fn get_listens(&self, offset: usize, limit: usize) -> Result<Vec<CanonicalListenRecord>>;
    /// Listens whose UTC date is within `from..=to`.
    fn get_listens_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CanonicalListenRecord>>;
    fn get_listens_by_artist(&self, artist_name: &str) -> Result<Vec<CanonicalListenRecord>>;
    fn get_listens_by_track(
        &self,
        artist_name: &str,
        track_name: &str,
    ) -> Result<Vec<CanonicalListenRecord>>;
    fn get_calendar(&self, query: &CalendarQuery) -> Result<Vec<CalendarDay>>;
}
