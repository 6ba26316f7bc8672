//! Merge and deduplication of raw listens into the canonical timeline.
//!
//! Raw listens from every source file are sorted by
//! (end time, source rank, position in file). Listens whose end time, artist,
//! track and ms played all match are the same listen exported more than once;
//! the first one in sort order represents the group. Representatives are then
//! numbered densely from 0.

use super::models::{
    CanonicalListenRecord, ListenContent, RawListenEntry, RawListenRecord, RawListenRow,
};
use super::ranker::SourceRanking;
use crate::error::{PipelineStage, TimelineError, TimelineResult};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Raw listens that passed validation.
#[derive(Debug, Clone, Default)]
pub struct ValidatedListens {
    pub records: Vec<RawListenRecord>,
    /// Rows without an artist or track name. They are placeholders for
    /// unresolved content and take no canonical position.
    pub placeholders: Vec<RawListenRow>,
}

/// Turns stored rows into records, failing on the first row that lacks a
/// required field.
pub fn validate_rows(rows: Vec<RawListenRow>) -> TimelineResult<ValidatedListens> {
    let mut validated = ValidatedListens {
        records: Vec::with_capacity(rows.len()),
        placeholders: Vec::new(),
    };

    for row in rows {
        let RawListenRow {
            source_file_id,
            position,
            entry,
        } = row;
        let end_time = entry.end_time.ok_or_else(|| {
            TimelineError::malformed(source_file_id, position, "missing end time")
        })?;
        let ms_played = entry.ms_played.ok_or_else(|| {
            TimelineError::malformed(source_file_id, position, "missing ms played")
        })?;
        if ms_played < 0 {
            return Err(TimelineError::malformed(
                source_file_id,
                position,
                format!("negative ms played ({})", ms_played),
            ));
        }

        match (entry.artist_name, entry.track_name) {
            (Some(artist_name), Some(track_name)) => validated.records.push(RawListenRecord {
                source_file_id,
                position,
                end_time,
                artist_name,
                track_name,
                ms_played,
            }),
            (artist_name, track_name) => validated.placeholders.push(RawListenRow {
                source_file_id,
                position,
                entry: RawListenEntry {
                    artist_name,
                    track_name,
                    ..entry
                },
            }),
        }
    }

    if !validated.placeholders.is_empty() {
        warn!(
            "{} raw listens have no artist or track name and are left out of the timeline",
            validated.placeholders.len()
        );
    }
    Ok(validated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    end_time: DateTime<Utc>,
    rank: i64,
    position: i64,
}

/// Result of merging every raw listen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub listens: Vec<CanonicalListenRecord>,
    pub duplicates_collapsed: usize,
}

pub fn merge_and_dedup(
    records: &[RawListenRecord],
    ranking: &SourceRanking,
) -> TimelineResult<MergeOutcome> {
    let mut keyed = Vec::with_capacity(records.len());
    for record in records {
        let rank = ranking
            .rank_of(record.source_file_id)
            .ok_or(TimelineError::UnknownSourceFile {
                source_file_id: record.source_file_id,
                position: record.position,
            })?;
        let key = SortKey {
            end_time: record.end_time,
            rank,
            position: record.position,
        };
        keyed.push((key, record));
    }
    keyed.sort_by_key(|(key, _)| *key);

    // Equal keys mean two rows claim the same slot of the same file.
    if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(TimelineError::OrderingConflict {
            stage: PipelineStage::MergeDedup,
            first: pair[0].1.record_ref(),
            second: pair[1].1.record_ref(),
        });
    }

    // Identical content implies an identical end time, so groups never span
    // end times and the seen-set only has to cover the current one.
    let mut representatives: Vec<&RawListenRecord> = Vec::with_capacity(keyed.len());
    let mut seen: HashSet<ListenContent<'_>> = HashSet::new();
    let mut current_end_time = None;
    for (key, record) in &keyed {
        if current_end_time != Some(key.end_time) {
            seen.clear();
            current_end_time = Some(key.end_time);
        }
        if seen.insert(record.content()) {
            representatives.push(record);
        }
    }

    // Representatives are a subsequence of the sorted rows, each being the
    // lowest key of its group, so they are already ordered by
    // (end time, representative key).
    let listens: Vec<CanonicalListenRecord> = representatives
        .into_iter()
        .enumerate()
        .map(|(position, record)| CanonicalListenRecord {
            position: position as i64,
            end_time: record.end_time,
            artist_name: record.artist_name.clone(),
            track_name: record.track_name.clone(),
            ms_played: record.ms_played,
        })
        .collect();

    let duplicates_collapsed = keyed.len() - listens.len();
    debug!(
        "Merged {} raw listens into {} canonical listens ({} duplicates)",
        keyed.len(),
        listens.len(),
        duplicates_collapsed
    );
    Ok(MergeOutcome {
        listens,
        duplicates_collapsed,
    })
}
