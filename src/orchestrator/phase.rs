//! Phase kinds and their per-phase records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::engine::RecoveryStep;
use crate::error::BundleSlimError;
use crate::probe::BundleMetrics;
use crate::store::format_timestamp;

/// One step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    /// Validate and measure the untouched tree
    Baseline,
    /// Stub components per the mode
    Eliminate,
    /// Cascade elimination on a validated tree
    Refine,
    /// Bisect back to a working tree
    Recover,
}

impl PhaseKind {
    /// All phases, in run order
    pub const ALL: [PhaseKind; 4] = [
        PhaseKind::Baseline,
        PhaseKind::Eliminate,
        PhaseKind::Refine,
        PhaseKind::Recover,
    ];

    /// Phase name as written in config and file names
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Baseline => "baseline",
            PhaseKind::Eliminate => "eliminate",
            PhaseKind::Refine => "refine",
            PhaseKind::Recover => "recover",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseKind {
    type Err = BundleSlimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseKind::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BundleSlimError::InvalidPhase {
                phase: s.to_string(),
                valid_phases: PhaseKind::ALL.iter().map(|p| p.to_string()).collect(),
            })
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Tree validates
    Succeeded,
    /// Tree does not validate
    Failed,
    /// Tree validates but the phase stopped short (bound reached, fallback)
    Partial,
    /// Phase not run
    Skipped,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Partial => "partial",
            PhaseStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Immutable record of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Phase
    pub phase: PhaseKind,
    /// Outcome
    pub status: PhaseStatus,
    /// Tree validated at the end of the phase
    pub success: bool,
    /// Bundle metrics of the last passing build, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BundleMetrics>,
    /// Live components after the phase
    pub component_count: usize,
    /// Packages still imported by live code after the phase
    pub dependency_count: usize,
    /// Components stubbed by this phase
    #[serde(default)]
    pub removed: Vec<String>,
    /// Components brought back by this phase
    #[serde(default)]
    pub restored: Vec<String>,
    /// Probe, mutation and skip reasons
    #[serde(default)]
    pub errors: Vec<String>,
    /// Recovery log (Recover only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_steps: Vec<RecoveryStep>,
    /// Local start time, `YYYYMMDD_HHMMSS`
    pub started_at: String,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl PhaseResult {
    /// Record for a phase that did not run
    pub fn skipped(phase: PhaseKind, reason: impl Into<String>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            success: false,
            metrics: None,
            component_count: 0,
            dependency_count: 0,
            removed: Vec::new(),
            restored: Vec::new(),
            errors: vec![reason.into()],
            recovery_steps: Vec::new(),
            started_at: format_timestamp().unwrap_or_default(),
            duration_ms: 0,
        }
    }
}

/// Start of a phase; turns into a [`PhaseResult`] when the phase ends
#[derive(Debug)]
pub struct PhaseClock {
    phase: PhaseKind,
    started_at: String,
    started: Instant,
}

impl PhaseClock {
    /// Start timing `phase`
    pub fn start(phase: PhaseKind) -> Self {
        Self {
            phase,
            started_at: format_timestamp().unwrap_or_default(),
            started: Instant::now(),
        }
    }

    /// Phase being timed
    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    /// Finish with `status`; everything else starts empty
    pub fn finish(self, status: PhaseStatus) -> PhaseResult {
        PhaseResult {
            phase: self.phase,
            status,
            success: matches!(status, PhaseStatus::Succeeded | PhaseStatus::Partial),
            metrics: None,
            component_count: 0,
            dependency_count: 0,
            removed: Vec::new(),
            restored: Vec::new(),
            errors: Vec::new(),
            recovery_steps: Vec::new(),
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
