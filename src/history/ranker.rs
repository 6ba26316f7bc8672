//! Total order over the source files of every batch.
//!
//! Files are ranked by, in priority order:
//! 1. the file's start time,
//! 2. the owning batch's start time,
//! 3. the owning batch's intake order, so the batch registered first wins ties,
//! 4. the file name, unique within a batch.
//!
//! Missing start times sort after present ones. The order is total, so every
//! file gets a rank and ranking never fails.

use super::models::{Batch, SourceFile};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Dense 0-based rank for each source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRanking {
    ranks: HashMap<i64, i64>,
    ordered_ids: Vec<i64>,
}

impl SourceRanking {
    pub fn rank_of(&self, source_file_id: i64) -> Option<i64> {
        self.ranks.get(&source_file_id).copied()
    }

    /// Source file ids, best rank first.
    pub fn ordered_ids(&self) -> &[i64] {
        &self.ordered_ids
    }

    pub fn len(&self) -> usize {
        self.ordered_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_ids.is_empty()
    }
}

fn cmp_start(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

struct RankKey<'a> {
    file: &'a SourceFile,
    batch: Option<&'a Batch>,
}

impl RankKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_start(self.file.start_time, other.file.start_time)
            .then_with(|| {
                cmp_start(
                    self.batch.and_then(|b| b.start_time),
                    other.batch.and_then(|b| b.start_time),
                )
            })
            .then_with(|| {
                let intake = |k: &Self| k.batch.map(|b| b.intake_order).unwrap_or(i64::MAX);
                intake(self).cmp(&intake(other))
            })
            .then_with(|| self.file.batch_id.cmp(&other.file.batch_id))
            .then_with(|| self.file.file_name.cmp(&other.file.file_name))
            .then_with(|| self.file.id.cmp(&other.file.id))
    }
}

pub fn rank_source_files(batches: &[Batch], files: &[SourceFile]) -> SourceRanking {
    let batches_by_id: HashMap<i64, &Batch> = batches.iter().map(|b| (b.id, b)).collect();

    let mut keys: Vec<RankKey<'_>> = files
        .iter()
        .map(|file| {
            let batch = batches_by_id.get(&file.batch_id).copied();
            if batch.is_none() {
                warn!(
                    "Source file {} ({}) belongs to unknown batch {}, ranking it last",
                    file.id, file.file_name, file.batch_id
                );
            }
            RankKey { file, batch }
        })
        .collect();
    keys.sort_by(|a, b| a.cmp(b));

    let ordered_ids: Vec<i64> = keys.iter().map(|k| k.file.id).collect();
    let ranks = ordered_ids
        .iter()
        .enumerate()
        .map(|(rank, id)| (*id, rank as i64))
        .collect();

    debug!(
        "Ranked {} source files across {} batches",
        ordered_ids.len(),
        batches.len()
    );
    SourceRanking { ranks, ordered_ids }
}
