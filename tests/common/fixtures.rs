//! Test timeline databases on disk

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use listening_timeline::history::{Batch, CoveragePolicy, NewBatch, RawListenEntry};
use listening_timeline::{SqliteTimelineStore, TimelineRebuilder, TimelineStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn listen(
    end_time: DateTime<Utc>,
    artist: &str,
    track: &str,
    ms_played: i64,
) -> RawListenEntry {
    RawListenEntry::new(end_time, artist, track, ms_played)
}

/// A timeline database in a temporary directory, removed on drop.
pub struct TestTimeline {
    _dir: TempDir,
    pub db_path: PathBuf,
    pub store: Arc<SqliteTimelineStore>,
}

impl TestTimeline {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("timeline.db");
        let store = Arc::new(SqliteTimelineStore::new(&db_path).unwrap());
        Self {
            _dir: dir,
            db_path,
            store,
        }
    }

    /// A second, independent connection to the same database file.
    pub fn open_reader(&self) -> SqliteTimelineStore {
        SqliteTimelineStore::new(&self.db_path).unwrap()
    }

    pub fn rebuilder(&self) -> TimelineRebuilder {
        self.rebuilder_with(CoveragePolicy::default())
    }

    pub fn rebuilder_with(&self, coverage: CoveragePolicy) -> TimelineRebuilder {
        TimelineRebuilder::new(self.store.clone(), coverage)
    }

    /// Registers a batch and stores each `(file name, entries)` pair as one of
    /// its source files.
    pub fn import(
        &self,
        name: &str,
        download_date: Option<NaiveDate>,
        files: &[(&str, Vec<RawListenEntry>)],
    ) -> Batch {
        let mut new_batch = NewBatch::new(format!("/exports/{}", name), name);
        if let Some(download_date) = download_date {
            new_batch = new_batch.with_download_date(download_date);
        }
        let batch = self.store.register_batch(&new_batch).unwrap();
        for (file_name, entries) in files {
            self.store
                .add_source_file(batch.id, file_name, entries)
                .unwrap();
        }
        batch
    }
}
