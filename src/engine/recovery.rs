//! Binary-search recovery
//!
//! Given the components left stubbed by a failed elimination, find a small
//! set whose restoration makes the tree validate again.
//!
//! The search runs over prefixes of the elimination order. Prefix `lo` is
//! known to fail (the zero state does), prefix `hi` passes once verified.
//! Every bisection probe moves the tree from whichever bound it sits on to
//! the midpoint with one batch: restoring `candidates[lo..mid]` or removing
//! `candidates[mid..hi]`. Once the window is a single member, minimization
//! removes prefix members one at a time and keeps the ones the tree cannot
//! do without. A final replay confirms the result.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::EngineContext;
use crate::infra::FileSystem;
use crate::probe::ProbeVerdict;

/// Default bound on bisection probes
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Which part of the search produced a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStage {
    /// Narrowing the sufficient prefix
    Bisect,
    /// Dropping unnecessary prefix members
    Minimize,
    /// Confirming the restored set
    Replay,
    /// Restoring every candidate after a failed search
    Fallback,
}

/// What a step did to the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Originals written back
    Restore,
    /// Stubs written
    Remove,
    /// Probe run
    Test,
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    /// Mutation applied to every unit
    Applied,
    /// Probe passed
    Passed,
    /// Probe failed
    Failed,
    /// At least one unit could not be restored
    RestoreFailed,
    /// At least one unit could not be stubbed
    RemoveFailed,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepOutcome::Applied => "applied",
            StepOutcome::Passed => "passed",
            StepOutcome::Failed => "failed",
            StepOutcome::RestoreFailed => "restore-failed",
            StepOutcome::RemoveFailed => "remove-failed",
        };
        f.write_str(s)
    }
}

/// One entry of the append-only recovery log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStep {
    /// Position in the log
    pub index: usize,
    /// Search stage
    pub stage: StepStage,
    /// What was done
    pub action: StepAction,
    /// Units mutated, or for tests the restored set under test
    pub subset: Vec<String>,
    /// Result
    pub outcome: StepOutcome,
    /// Probe or mutation errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Result of one recovery run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Candidates holding their original content at the end, in elimination order
    pub restored: Vec<String>,
    /// Candidates still stubbed at the end, in elimination order
    pub removed: Vec<String>,
    /// Every step taken
    pub steps: Vec<RecoveryStep>,
    /// Bisection probes issued
    pub iterations: usize,
    /// The window resolved and the minimized set replayed successfully
    pub converged: bool,
    /// The run was cancelled and every candidate restored
    pub cancelled: bool,
    /// The replay probe passed
    pub replay_passed: bool,
    /// Units that could not be restored; they stay stubbed
    pub restore_errors: Vec<String>,
    /// Verdict of the last probe
    pub final_verdict: Option<ProbeVerdict>,
}

impl RecoveryReport {
    /// The tree validates at the end of recovery
    pub fn passed(&self) -> bool {
        self.final_verdict.as_ref().is_some_and(ProbeVerdict::passed)
    }

    /// The tree validates but the search did not converge
    pub fn is_partial(&self) -> bool {
        self.passed() && !self.converged
    }

    /// Probes issued, all stages
    pub fn probes(&self) -> usize {
        self.steps.iter().filter(|s| s.action == StepAction::Test).count()
    }
}

/// How the bisection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bisection {
    Converged,
    Exhausted,
    Bounded,
    Cancelled,
}

/// Bookkeeping shared by the search stages
struct Search<'r, 'a, FS: FileSystem> {
    ctx: &'r mut EngineContext<'a, FS>,
    all: Vec<String>,
    steps: Vec<RecoveryStep>,
    restore_errors: Vec<String>,
    last: Option<ProbeVerdict>,
}

impl<'r, 'a, FS: FileSystem> Search<'r, 'a, FS> {
    fn record(
        &mut self,
        stage: StepStage,
        action: StepAction,
        subset: Vec<String>,
        outcome: StepOutcome,
        errors: Vec<String>,
    ) {
        log::debug!(
            "Recovery step {}: {:?} {:?} {} unit(s): {}",
            self.steps.len(),
            stage,
            action,
            subset.len(),
            outcome
        );
        self.steps.push(RecoveryStep {
            index: self.steps.len(),
            stage,
            action,
            subset,
            outcome,
            errors,
        });
    }

    /// Candidates currently holding original content
    fn restored(&self) -> Vec<String> {
        self.all
            .iter()
            .filter(|name| !self.ctx.tree.is_stubbed(name))
            .cloned()
            .collect()
    }

    /// Restore `units`; returns the ones that failed
    fn restore(&mut self, stage: StepStage, units: &[String]) -> Vec<String> {
        let batch = self.ctx.tree.restore_batch(units, self.ctx.backups);
        let failed = batch.failed_units();
        let errors = batch.errors();
        for error in &errors {
            log::warn!("Restore failed: {}", error);
        }
        self.restore_errors.extend(errors.iter().cloned());
        let outcome = if failed.is_empty() {
            StepOutcome::Applied
        } else {
            StepOutcome::RestoreFailed
        };
        self.record(stage, StepAction::Restore, units.to_vec(), outcome, errors);
        failed
    }

    /// Stub `units`; returns the ones that failed
    fn remove(&mut self, stage: StepStage, units: &[String]) -> Vec<String> {
        let batch = self.ctx.tree.stub_batch(units, self.ctx.backups);
        let failed = batch.failed_units();
        let outcome = if failed.is_empty() {
            StepOutcome::Applied
        } else {
            StepOutcome::RemoveFailed
        };
        self.record(stage, StepAction::Remove, units.to_vec(), outcome, batch.errors());
        failed
    }

    /// Run the full check on the current tree
    fn test(&mut self, stage: StepStage) -> bool {
        let subset = self.restored();
        let verdict = self.ctx.probe.check();
        let passed = verdict.passed();
        let (outcome, errors) = if passed {
            (StepOutcome::Passed, Vec::new())
        } else {
            (StepOutcome::Failed, verdict.errors())
        };
        self.record(stage, StepAction::Test, subset, outcome, errors);
        self.last = Some(verdict);
        passed
    }

    /// Bring back every candidate still stubbed
    fn restore_everything(&mut self, stage: StepStage) {
        let stubbed: Vec<String> = self
            .all
            .iter()
            .filter(|name| self.ctx.tree.is_stubbed(name))
            .cloned()
            .collect();
        if !stubbed.is_empty() {
            self.restore(stage, &stubbed);
        }
    }

    fn cancelled(&self) -> bool {
        self.ctx.cancel.is_cancelled()
    }

    fn finish(self, iterations: usize, converged: bool, cancelled: bool, replay_passed: bool) -> RecoveryReport {
        let (restored, removed) = self
            .all
            .iter()
            .cloned()
            .partition(|name| !self.ctx.tree.is_stubbed(name));
        RecoveryReport {
            restored,
            removed,
            steps: self.steps,
            iterations,
            converged,
            cancelled,
            replay_passed,
            restore_errors: self.restore_errors,
            final_verdict: self.last,
        }
    }
}

/// Finds a small set of eliminated components the tree cannot do without
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_iterations: usize,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl RecoveryEngine {
    /// Create an engine issuing at most `max_iterations` bisection probes
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    /// Bisection probe bound
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Recover from a failed elimination
    ///
    /// `candidates` are the stubbed identities in elimination order, and the
    /// tree is expected to fail validation as it stands.
    pub fn run<FS: FileSystem>(&self, candidates: Vec<String>, ctx: &mut EngineContext<'_, FS>) -> RecoveryReport {
        log::info!(
            "Recovering from {} eliminated components (at most {} bisection probes)",
            candidates.len(),
            self.max_iterations
        );
        let mut search = Search {
            ctx,
            all: candidates.clone(),
            steps: Vec::new(),
            restore_errors: Vec::new(),
            last: None,
        };
        let mut candidates = candidates;

        if candidates.is_empty() {
            let passed = search.test(StepStage::Replay);
            return search.finish(0, false, false, passed);
        }

        // Tree sits at prefix `at`, which is always `lo` or `hi`
        let mut lo = 0;
        let mut hi = candidates.len();
        let mut hi_verified = false;
        let mut at = 0;
        let mut iterations = 0;

        let ending = loop {
            if lo >= hi {
                break Bisection::Exhausted;
            }
            if hi_verified && hi - lo == 1 {
                break Bisection::Converged;
            }
            if search.cancelled() {
                break Bisection::Cancelled;
            }
            if iterations >= self.max_iterations {
                break Bisection::Bounded;
            }

            let mut mid = lo + (hi - lo).div_ceil(2);
            if at == lo {
                let batch = candidates[lo..mid].to_vec();
                let failed = search.restore(StepStage::Bisect, &batch);
                if !failed.is_empty() {
                    candidates.retain(|c| !failed.contains(c));
                    mid -= failed.len();
                    hi -= failed.len();
                    hi_verified = false;
                    if mid == lo {
                        continue;
                    }
                }
            } else {
                let batch = candidates[mid..hi].to_vec();
                let failed = search.remove(StepStage::Bisect, &batch);
                if !failed.is_empty() {
                    // Still restored; they ride along with every later prefix
                    candidates.retain(|c| !failed.contains(c));
                    hi -= failed.len();
                    if mid == hi {
                        at = hi;
                        continue;
                    }
                }
            }

            at = mid;
            iterations += 1;
            if search.test(StepStage::Bisect) {
                hi = mid;
                hi_verified = true;
            } else {
                lo = mid;
            }
        };

        match ending {
            Bisection::Converged => {
                log::info!("Sufficient prefix: {} of {} after {} probes", hi, candidates.len(), iterations);
                if at != hi {
                    let batch = candidates[at..hi].to_vec();
                    search.restore(StepStage::Minimize, &batch);
                }
                for member in candidates[..hi - 1].to_vec() {
                    if search.cancelled() {
                        search.restore_everything(StepStage::Fallback);
                        return search.finish(iterations, false, true, false);
                    }
                    let one = [member];
                    if !search.remove(StepStage::Minimize, &one).is_empty() {
                        continue;
                    }
                    if !search.test(StepStage::Minimize) {
                        search.restore(StepStage::Minimize, &one);
                    }
                }
                if search.test(StepStage::Replay) {
                    return search.finish(iterations, true, false, true);
                }
                log::warn!("Replay of the minimized set failed; restoring every candidate");
                search.restore_everything(StepStage::Fallback);
                search.test(StepStage::Fallback);
                search.finish(iterations, false, false, false)
            }
            Bisection::Exhausted => {
                log::warn!("Tree fails even with every candidate restored");
                if search.last.is_none() {
                    search.test(StepStage::Fallback);
                }
                search.finish(iterations, false, false, false)
            }
            Bisection::Bounded => {
                log::warn!("Recovery stopped after {} bisection probes", iterations);
                if hi_verified {
                    if at != hi {
                        let batch = candidates[at..hi].to_vec();
                        search.restore(StepStage::Replay, &batch);
                    }
                    let passed = search.test(StepStage::Replay);
                    if passed {
                        return search.finish(iterations, false, false, true);
                    }
                }
                search.restore_everything(StepStage::Fallback);
                search.test(StepStage::Fallback);
                search.finish(iterations, false, false, false)
            }
            Bisection::Cancelled => {
                log::info!("Recovery cancelled; restoring every candidate");
                search.restore_everything(StepStage::Fallback);
                search.finish(iterations, false, true, false)
            }
        }
    }
}
