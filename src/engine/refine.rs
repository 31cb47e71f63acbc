//! Cascade elimination on a validated tree
//!
//! Stubs no longer import or invoke anything, so after a successful
//! elimination some live components lose their last user. Refinement
//! re-classifies the tree and tries those one at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{EngineContext, Mode};
use crate::classifier::UsageGraph;
use crate::infra::FileSystem;
use crate::probe::ProbeVerdict;

/// Default bound on refinement probes
pub const DEFAULT_MAX_REFINE_PROBES: usize = 10;

/// What a refinement pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefineReport {
    /// Components stubbed and kept stubbed
    pub removed: Vec<String>,
    /// Components stubbed, found necessary and brought back
    pub restored: Vec<String>,
    /// Components that could not be stubbed or restored, with the reason
    pub skipped: Vec<String>,
    /// Probes issued
    pub probes: usize,
    /// Verdict of the last passing probe
    pub verdict: Option<ProbeVerdict>,
    /// Stopped by cancellation
    pub cancelled: bool,
}

/// Tries newly unused components one at a time
#[derive(Debug, Clone)]
pub struct RefineEngine {
    max_probes: usize,
    mode: Mode,
}

impl Default for RefineEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REFINE_PROBES)
    }
}

impl RefineEngine {
    /// Create an engine issuing at most `max_probes` probes
    pub fn new(max_probes: usize) -> Self {
        Self {
            max_probes,
            mode: Mode::Nuclear,
        }
    }

    /// Only try components the elimination `mode` would admit
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Refine the current tree
    ///
    /// `classify` re-scans the tree; it runs before every attempt so each
    /// removal can expose the next cascade. The tree must validate when this
    /// is called, and it validates again when this returns.
    pub fn run<FS, C>(&self, ctx: &mut EngineContext<'_, FS>, mut classify: C) -> RefineReport
    where
        FS: FileSystem,
        C: FnMut() -> UsageGraph,
    {
        let mut report = RefineReport::default();
        let mut tried: BTreeSet<String> = BTreeSet::new();

        while report.probes < self.max_probes {
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let graph = classify();
            ctx.tree.register(&graph);
            let next = graph
                .elimination_order(|unit| {
                    unit.is_eligible() && self.mode.admits(unit.class) && !tried.contains(&unit.name)
                })
                .into_iter()
                .next();
            let Some(unit) = next else {
                log::debug!("Refine: no newly eligible components");
                break;
            };
            tried.insert(unit.clone());

            let stub = ctx.tree.stub_batch([&unit], ctx.backups);
            if !stub.is_clean() {
                report.skipped.extend(stub.errors());
                continue;
            }

            let verdict = ctx.probe.check();
            report.probes += 1;
            if verdict.passed() {
                log::info!("Refine: removed {}", unit);
                report.removed.push(unit);
                report.verdict = Some(verdict);
                continue;
            }

            log::info!("Refine: {} is needed, restoring", unit);
            let restore = ctx.tree.restore_batch([&unit], ctx.backups);
            if restore.is_clean() {
                report.restored.push(unit);
            } else {
                // Left stubbed: the tree no longer validates
                for error in restore.errors() {
                    log::error!("Refine: {}", error);
                    report.skipped.push(error);
                }
                report.verdict = Some(verdict);
                break;
            }
        }

        log::info!(
            "Refine: {} removed, {} restored in {} probes",
            report.removed.len(),
            report.restored.len(),
            report.probes
        );
        report
    }
}
