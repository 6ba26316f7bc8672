//! Listening history models.

use crate::error::RecordRef;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One import of listening data, from a single export download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub id: i64,
    pub path: String,
    pub name: String,
    /// Declared start, or the earliest start of the batch's source files when
    /// nothing was declared at registration.
    pub start_time: Option<DateTime<Utc>>,
    /// Date the export was requested from the service, if the importer knew it.
    pub download_date: Option<NaiveDate>,
    /// Registration order, used only as the last ranking tiebreaker.
    pub intake_order: i64,
}

/// A batch about to be registered.
#[derive(Debug, Clone, Default)]
pub struct NewBatch {
    pub path: String,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub download_date: Option<NaiveDate>,
}

impl NewBatch {
    pub fn new<P: Into<String>, N: Into<String>>(path: P, name: N) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_download_date(mut self, download_date: NaiveDate) -> Self {
        self.download_date = Some(download_date);
        self
    }
}

/// One file of a batch, holding raw listens in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub id: i64,
    pub batch_id: i64,
    pub file_name: String,
    /// End time of the earliest listen in the file; `None` for an empty file.
    pub start_time: Option<DateTime<Utc>>,
}

/// A listen as handed over by an export parser.
///
/// Every field is optional because exports are not trusted; the pipeline
/// decides what a missing field means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListenEntry {
    pub end_time: Option<DateTime<Utc>>,
    pub artist_name: Option<String>,
    pub track_name: Option<String>,
    pub ms_played: Option<i64>,
}

impl RawListenEntry {
    pub fn new<A: Into<String>, T: Into<String>>(
        end_time: DateTime<Utc>,
        artist_name: A,
        track_name: T,
        ms_played: i64,
    ) -> Self {
        Self {
            end_time: Some(end_time),
            artist_name: Some(artist_name.into()),
            track_name: Some(track_name.into()),
            ms_played: Some(ms_played),
        }
    }
}

/// A raw listen as stored, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListenRow {
    pub source_file_id: i64,
    /// 0-based order of appearance within the source file.
    pub position: i64,
    pub entry: RawListenEntry,
}

/// A raw listen that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListenRecord {
    pub source_file_id: i64,
    pub position: i64,
    pub end_time: DateTime<Utc>,
    pub artist_name: String,
    pub track_name: String,
    pub ms_played: i64,
}

/// The four fields that make two listens the same listen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenContent<'a> {
    pub end_time: DateTime<Utc>,
    pub artist_name: &'a str,
    pub track_name: &'a str,
    pub ms_played: i64,
}

impl RawListenRecord {
    pub fn content(&self) -> ListenContent<'_> {
        ListenContent {
            end_time: self.end_time,
            artist_name: &self.artist_name,
            track_name: &self.track_name,
            ms_played: self.ms_played,
        }
    }

    pub fn record_ref(&self) -> RecordRef {
        RecordRef {
            source_file_id: self.source_file_id,
            position: self.position,
            end_time: self.end_time,
        }
    }
}

/// A deduplicated listen with its place in the resolved timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalListenRecord {
    /// Dense, 0-based, strictly increasing with the resolved order.
    pub position: i64,
    pub end_time: DateTime<Utc>,
    pub artist_name: String,
    pub track_name: String,
    pub ms_played: i64,
}

impl CanonicalListenRecord {
    /// Calendar day the listen belongs to (UTC).
    pub fn date(&self) -> NaiveDate {
        self.end_time.date_naive()
    }
}

/// One row of the listening calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub has_listen: bool,
    pub is_missing: bool,
}

/// Inclusive date range a batch is asserted to represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageWindow {
    pub batch_id: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CoverageWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
