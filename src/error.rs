use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

pub type TimelineResult<T> = Result<T, TimelineError>;

/// Stages of a timeline rebuild, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Load,
    Validation,
    SourceRanking,
    MergeDedup,
    CalendarBuild,
    Commit,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Load => "load",
            PipelineStage::Validation => "validation",
            PipelineStage::SourceRanking => "source ranking",
            PipelineStage::MergeDedup => "merge/dedup",
            PipelineStage::CalendarBuild => "calendar build",
            PipelineStage::Commit => "commit",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one raw record in error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub source_file_id: i64,
    pub position: i64,
    pub end_time: DateTime<Utc>,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source file {} position {} (ended {})",
            self.source_file_id,
            self.position,
            self.end_time.to_rfc3339()
        )
    }
}

/// Errors that abort a timeline rebuild. None of them leave a partial commit behind.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("{stage}: cannot order {first} against {second}")]
    OrderingConflict {
        stage: PipelineStage,
        first: RecordRef,
        second: RecordRef,
    },

    #[error("validation: malformed record at source file {source_file_id} position {position}: {reason}")]
    MalformedRecord {
        source_file_id: i64,
        position: i64,
        reason: String,
    },

    #[error("validation: record at position {position} references unknown source file {source_file_id}")]
    UnknownSourceFile { source_file_id: i64, position: i64 },

    #[error("calendar build: {date} is flagged missing but has listens")]
    InvariantViolation { date: NaiveDate },

    #[error("load: {0}")]
    Load(#[source] anyhow::Error),

    #[error("commit: {0}")]
    Commit(#[source] anyhow::Error),
}

impl TimelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            TimelineError::OrderingConflict { stage, .. } => *stage,
            TimelineError::MalformedRecord { .. } | TimelineError::UnknownSourceFile { .. } => {
                PipelineStage::Validation
            }
            TimelineError::InvariantViolation { .. } => PipelineStage::CalendarBuild,
            TimelineError::Load(_) => PipelineStage::Load,
            TimelineError::Commit(_) => PipelineStage::Commit,
        }
    }

    pub(crate) fn malformed(source_file_id: i64, position: i64, reason: impl Into<String>) -> Self {
        TimelineError::MalformedRecord {
            source_file_id,
            position,
            reason: reason.into(),
        }
    }
}
