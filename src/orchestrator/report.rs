//! Final run report

use serde::{Deserialize, Serialize};
use std::fmt;

use super::phase::{PhaseKind, PhaseResult, PhaseStatus};
use crate::engine::Mode;
use crate::probe::{BundleMetrics, SizeDelta};

/// What a run achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Components removed and the tree validates
    Optimized,
    /// The tree validates but a phase stopped short
    Partial,
    /// Nothing removed
    Unchanged,
    /// Stopped between phases; every backup restored
    Cancelled,
    /// Baseline failed, or the tree does not validate at the end
    Failed,
}

impl RunOutcome {
    /// Decide the outcome from the phase records
    pub fn decide(phases: &[PhaseResult], cancelled: bool, removed: usize) -> Self {
        if cancelled {
            return RunOutcome::Cancelled;
        }
        let ran: Vec<&PhaseResult> = phases
            .iter()
            .filter(|p| p.status != PhaseStatus::Skipped)
            .collect();
        match ran.first() {
            Some(baseline) if baseline.phase == PhaseKind::Baseline && baseline.success => {}
            _ => return RunOutcome::Failed,
        }
        if ran.last().is_some_and(|p| !p.success) {
            return RunOutcome::Failed;
        }
        if ran.iter().any(|p| p.status == PhaseStatus::Partial) {
            return RunOutcome::Partial;
        }
        if removed == 0 {
            RunOutcome::Unchanged
        } else {
            RunOutcome::Optimized
        }
    }

    /// Whether the tree validates at the end
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Optimized | RunOutcome::Partial | RunOutcome::Unchanged)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Optimized => "optimized",
            RunOutcome::Partial => "partial",
            RunOutcome::Unchanged => "unchanged",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Aggregate of a whole run, written as `report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id
    pub run_id: String,
    /// Mode the run used
    pub mode: Mode,
    /// Outcome
    pub outcome: RunOutcome,
    /// Every phase record, in order
    pub phases: Vec<PhaseResult>,
    /// Components stubbed at the end
    pub removed: Vec<String>,
    /// Components stubbed at some point and brought back
    pub restored: Vec<String>,
    /// Declared packages only removed components imported
    pub droppable_packages: Vec<String>,
    /// Metrics of the untouched tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BundleMetrics>,
    /// Metrics of the final tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_metrics: Option<BundleMetrics>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Size change from baseline to final, when both builds were measured
    pub fn size_delta(&self) -> Option<SizeDelta> {
        match (&self.baseline, &self.final_metrics) {
            (Some(before), Some(after)) => Some(SizeDelta::between(before, after)),
            _ => None,
        }
    }

    /// Record for `phase`, if it appears in the run
    pub fn phase(&self, phase: PhaseKind) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Errors from every phase, prefixed with the phase name
    pub fn errors(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|p| p.errors.iter().map(move |e| format!("{}: {}", p.phase, e)))
            .collect()
    }
}
