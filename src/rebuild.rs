//! Rebuilds the stored timeline from the stored inputs.

use crate::error::{TimelineError, TimelineResult};
use crate::history::{
    build_timeline, CoveragePolicy, CoverageWindow, TimelineInputs, TimelineSnapshot,
};
use crate::store::TimelineStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Counts describing one successful rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub raw_records: usize,
    pub canonical_records: usize,
    pub duplicates_collapsed: usize,
    pub placeholders_skipped: usize,
    pub calendar_days: usize,
    pub listen_days: usize,
    pub missing_days: usize,
    pub anomalies_corrected: usize,
}

impl From<&TimelineSnapshot> for RebuildReport {
    fn from(snapshot: &TimelineSnapshot) -> Self {
        Self {
            raw_records: snapshot.raw_records,
            canonical_records: snapshot.listens.len(),
            duplicates_collapsed: snapshot.duplicates_collapsed,
            placeholders_skipped: snapshot.placeholders_skipped,
            calendar_days: snapshot.calendar.len(),
            listen_days: snapshot.calendar.listen_days(),
            missing_days: snapshot.calendar.missing_days(),
            anomalies_corrected: snapshot.calendar.anomalies_corrected(),
        }
    }
}

impl fmt::Display for RebuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "raw records:          {}", self.raw_records)?;
        writeln!(f, "canonical records:    {}", self.canonical_records)?;
        writeln!(f, "duplicates collapsed: {}", self.duplicates_collapsed)?;
        writeln!(f, "placeholders skipped: {}", self.placeholders_skipped)?;
        writeln!(f, "calendar days:        {}", self.calendar_days)?;
        writeln!(f, "days with listens:    {}", self.listen_days)?;
        writeln!(f, "missing days:         {}", self.missing_days)?;
        write!(f, "anomalies corrected:  {}", self.anomalies_corrected)
    }
}

/// Handle on one timeline database. Every rebuild computes the complete new
/// timeline in memory and commits it in a single swap, so a failed rebuild
/// leaves the previous timeline in place.
pub struct TimelineRebuilder {
    store: Arc<dyn TimelineStore>,
    coverage: CoveragePolicy,
}

impl TimelineRebuilder {
    pub fn new(store: Arc<dyn TimelineStore>, coverage: CoveragePolicy) -> Self {
        Self { store, coverage }
    }

    pub fn store(&self) -> &Arc<dyn TimelineStore> {
        &self.store
    }

    /// Windows the coverage policy derives from the stored batches.
    pub fn coverage_windows(&self) -> TimelineResult<Vec<CoverageWindow>> {
        let inputs = self.load()?;
        Ok(self.derive_windows(&inputs))
    }

    pub fn rebuild(&self) -> TimelineResult<RebuildReport> {
        let inputs = self.load()?;
        let windows = self.derive_windows(&inputs);
        self.run(inputs, &windows)
    }

    /// Rebuilds with coverage windows supplied by the caller instead of the
    /// policy.
    pub fn rebuild_with_windows(
        &self,
        windows: &[CoverageWindow],
    ) -> TimelineResult<RebuildReport> {
        let inputs = self.load()?;
        self.run(inputs, windows)
    }

    fn load(&self) -> TimelineResult<TimelineInputs> {
        self.store.load_inputs().map_err(|e| {
            error!("Failed to load timeline inputs: {:#}", e);
            TimelineError::Load(e)
        })
    }

    fn derive_windows(&self, inputs: &TimelineInputs) -> Vec<CoverageWindow> {
        self.coverage
            .derive_windows(&inputs.batches, &inputs.files, &inputs.rows)
    }

    fn run(
        &self,
        inputs: TimelineInputs,
        windows: &[CoverageWindow],
    ) -> TimelineResult<RebuildReport> {
        info!(
            "Rebuilding timeline from {} batches, {} source files, {} raw listens, {} coverage windows",
            inputs.batches.len(),
            inputs.files.len(),
            inputs.rows.len(),
            windows.len()
        );

        let snapshot = build_timeline(inputs, windows).map_err(|e| {
            error!("Timeline rebuild failed during {}: {}", e.stage(), e);
            e
        })?;

        self.store
            .replace_timeline(&snapshot.listens, snapshot.calendar.days())
            .map_err(|e| {
                error!("Failed to commit rebuilt timeline: {:#}", e);
                TimelineError::Commit(e)
            })?;

        let report = RebuildReport::from(&snapshot);
        info!(
            "Timeline rebuilt: {} canonical listens ({} duplicates, {} placeholders) over {} days, {} missing",
            report.canonical_records,
            report.duplicates_collapsed,
            report.placeholders_skipped,
            report.calendar_days,
            report.missing_days
        );
        Ok(report)
    }
}
