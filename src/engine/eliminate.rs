//! Zero-state elimination
//!
//! Nuclear mode stubs every unprotected component at once, builds, and then
//! brings back what the classifier saw invoked. Regular modes stub only the
//! components their usage policy admits and run one full check.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{EngineContext, Mode};
use crate::classifier::UsageGraph;
use crate::infra::FileSystem;
use crate::probe::ProbeVerdict;

/// Components chosen for one elimination attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminationPlan {
    /// Mode the plan was built for
    pub mode: Mode,
    /// Identities in elimination order
    pub order: Vec<String>,
    /// Members of `order` the classifier saw invoked
    pub invoked: BTreeSet<String>,
}

impl EliminationPlan {
    /// Build the plan for `mode` from a classified graph
    ///
    /// Protected and already stubbed components are never part of a plan.
    pub fn from_graph(graph: &UsageGraph, mode: Mode) -> Self {
        let order = graph.elimination_order(|unit| mode.admits(unit.class));
        let invoked = order
            .iter()
            .filter(|name| graph.get(name).is_some_and(|u| u.class.is_invoked()))
            .cloned()
            .collect();
        Self {
            mode,
            order,
            invoked,
        }
    }

    /// Nothing to eliminate
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// What one elimination attempt did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EliminationReport {
    /// Identities still stubbed, in elimination order
    pub removed: Vec<String>,
    /// Identities stubbed and then brought back
    pub restored: Vec<String>,
    /// Last probe verdict; absent when nothing was stubbed
    pub verdict: Option<ProbeVerdict>,
    /// Stub and restore errors
    pub errors: Vec<String>,
}

impl EliminationReport {
    /// The tree validated (or was never touched)
    pub fn passed(&self) -> bool {
        self.verdict.as_ref().is_none_or(ProbeVerdict::passed)
    }
}

/// Result of the nuclear strategy
#[derive(Debug, Clone, PartialEq)]
pub enum NuclearOutcome {
    /// Every planned component was stubbed and probed; the report says
    /// whether the tree validated or needs recovery
    Success(EliminationReport),
    /// Stubbing failed part-way, was rolled back cleanly, and regular
    /// aggressive elimination ran instead
    Degraded {
        /// Why the nuclear attempt was abandoned
        reason: String,
        /// Result of the regular attempt
        report: EliminationReport,
    },
    /// Stubbing failed and the rollback failed too; the tree is inconsistent
    Fatal {
        /// What went wrong
        reason: String,
        /// Every stub and restore error
        errors: Vec<String>,
    },
}

/// Runs elimination attempts against the working tree
#[derive(Debug, Clone)]
pub struct EliminationEngine {
    restore_rendered: bool,
}

impl Default for EliminationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EliminationEngine {
    /// Create an engine that restores invoked components after a passing zero-state build
    pub fn new() -> Self {
        Self {
            restore_rendered: true,
        }
    }

    /// Whether to restore invoked components after the zero-state build
    pub fn with_restore_rendered(mut self, restore_rendered: bool) -> Self {
        self.restore_rendered = restore_rendered;
        self
    }

    /// Stub every unprotected component, build, then restore what is invoked
    pub fn run_nuclear<FS: FileSystem>(
        &self,
        graph: &UsageGraph,
        ctx: &mut EngineContext<'_, FS>,
    ) -> NuclearOutcome {
        let plan = EliminationPlan::from_graph(graph, Mode::Nuclear);
        if plan.is_empty() {
            log::info!("Nothing to eliminate: every component is protected");
            return NuclearOutcome::Success(EliminationReport::default());
        }

        log::info!("Zero state: stubbing {} components", plan.order.len());
        let batch = ctx.tree.stub_batch(&plan.order, ctx.backups);
        if !batch.is_clean() {
            let mut errors = batch.errors();
            let rollback = ctx.tree.restore_batch(&batch.applied, ctx.backups);
            if !rollback.is_clean() {
                errors.extend(rollback.errors());
                log::error!("Rollback after failed zero state left {} units stubbed", rollback.failed.len());
                return NuclearOutcome::Fatal {
                    reason: "zero-state stubbing failed and could not be rolled back".to_string(),
                    errors,
                };
            }
            let reason = format!(
                "zero-state stubbing failed for {} of {} components",
                batch.failed.len(),
                plan.order.len()
            );
            log::warn!("{}; falling back to aggressive elimination", reason);
            let mut report = self.run_regular(graph, Mode::Aggressive, ctx);
            report.errors.splice(0..0, errors);
            return NuclearOutcome::Degraded { reason, report };
        }

        let build = ctx.probe.build_check();
        if !build.passed() {
            log::warn!("Zero-state build failed");
            return NuclearOutcome::Success(EliminationReport {
                removed: plan.order,
                restored: Vec::new(),
                verdict: Some(build),
                errors: Vec::new(),
            });
        }

        let mut report = EliminationReport::default();
        let verdict = if self.restore_rendered && !plan.invoked.is_empty() {
            let invoked: Vec<&String> = plan.order.iter().filter(|n| plan.invoked.contains(*n)).collect();
            log::info!("Zero-state build passed; restoring {} invoked components", invoked.len());
            let restore = ctx.tree.restore_batch(invoked, ctx.backups);
            report.errors.extend(restore.errors());
            report.restored = restore.applied;
            ctx.probe.check()
        } else {
            ProbeVerdict {
                validation: Some(ctx.probe.validate()),
                build: build.build,
            }
        };

        report.removed = plan
            .order
            .into_iter()
            .filter(|name| ctx.tree.is_stubbed(name))
            .collect();
        report.verdict = Some(verdict);
        NuclearOutcome::Success(report)
    }

    /// Stub the components `mode` admits, then run one full check
    ///
    /// A component that cannot be stubbed keeps its original content and is
    /// reported in `errors`.
    pub fn run_regular<FS: FileSystem>(
        &self,
        graph: &UsageGraph,
        mode: Mode,
        ctx: &mut EngineContext<'_, FS>,
    ) -> EliminationReport {
        let plan = EliminationPlan::from_graph(graph, mode);
        if plan.is_empty() {
            log::info!("Nothing to eliminate in {} mode", mode);
            return EliminationReport::default();
        }

        log::info!("{} mode: stubbing {} components", mode, plan.order.len());
        let batch = ctx.tree.stub_batch(&plan.order, ctx.backups);
        let errors = batch.errors();
        let verdict = ctx.probe.check();
        EliminationReport {
            removed: batch.applied,
            restored: Vec::new(),
            verdict: Some(verdict),
            errors,
        }
    }
}
