//! Phase orchestration
//!
//! Runs `Baseline -> Eliminate -> Refine -> Recover` against one project.
//! Everything that can abort the run is checked in [`PhaseOrchestrator::preflight`]
//! before the tree is touched. After that, failures only change which
//! phases run and what the final report says.

pub mod phase;
pub mod report;
pub mod state;
pub mod telemetry;

pub use phase::{PhaseClock, PhaseKind, PhaseResult, PhaseStatus};
pub use report::{RunOutcome, RunReport};
pub use state::{RunDirectory, StateError, REPORT_FILE_NAME, STATE_DIR};
pub use telemetry::{LogCollector, MemoryCollector, MetricData, MetricsCollector, NoOpCollector, RunEvent};

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::classifier::{ClassifyContext, PatternClassifier, ProtectedSet, SourceScanner, UsageClassifier, UsageGraph};
use crate::config::{ConfigFile, CONFIG_FILE_NAME};
use crate::engine::{
    EliminationEngine, EliminationPlan, EngineContext, Mode, NuclearOutcome, RecoveryEngine, RefineEngine,
};
use crate::error::BundleSlimError;
use crate::infra::{FileSystem, RealFileSystem};
use crate::manifest::{ManifestEditor, PackageJsonManifest};
use crate::probe::{BuildOutcome, BundleMetrics, Probe, ProbeVerdict, ValidationOutcome};
use crate::store::{BackupStore, WorkingTree};

/// Everything loaded before the first mutation
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Configured names and entry points
    pub protected: ProtectedSet,
    /// Parsed package manifest
    pub manifest: PackageJsonManifest,
    /// Source files found
    pub source_count: usize,
}

/// Cross-phase state of one run
#[derive(Debug, Default)]
struct RunState {
    baseline_graph: Option<UsageGraph>,
    baseline_passed: bool,
    eliminate_succeeded: bool,
    needs_recovery: bool,
    fatal: bool,
    validated: bool,
    candidates: Vec<String>,
    restored: BTreeSet<String>,
    last_metrics: Option<BundleMetrics>,
}

impl RunState {
    /// Why `phase` must not run, if it must not
    fn skip_reason(&self, phase: PhaseKind) -> Option<&'static str> {
        if phase == PhaseKind::Baseline {
            return None;
        }
        if !self.baseline_passed {
            return Some("baseline failed");
        }
        if self.fatal {
            return Some("elimination left the tree inconsistent");
        }
        match phase {
            PhaseKind::Refine if !self.eliminate_succeeded => Some("eliminate did not succeed"),
            PhaseKind::Recover if !self.needs_recovery => Some("nothing to recover"),
            _ => None,
        }
    }

    fn passed(&mut self, metrics: Option<&BundleMetrics>) {
        self.validated = true;
        if let Some(metrics) = metrics {
            self.last_metrics = Some(metrics.clone());
        }
    }
}

/// Forwards to the real probe and reports every call to the collector
struct ObservedProbe<'p, 'c> {
    inner: &'p mut dyn Probe,
    collector: &'c dyn MetricsCollector,
}

impl Probe for ObservedProbe<'_, '_> {
    fn build(&mut self) -> BuildOutcome {
        let started = Instant::now();
        let outcome = self.inner.build();
        self.collector.record_duration("build", started.elapsed());
        if let Some(metrics) = &outcome.metrics {
            self.collector.record_size("bundle", metrics.total_bytes);
        }
        let detail = if outcome.success { "build passed" } else { "build failed" };
        self.collector.record_event(RunEvent::ProbeCompleted, detail);
        outcome
    }

    fn validate(&mut self) -> ValidationOutcome {
        let started = Instant::now();
        let outcome = self.inner.validate();
        self.collector.record_duration("validate", started.elapsed());
        let detail = if outcome.success { "validation passed" } else { "validation failed" };
        self.collector.record_event(RunEvent::ProbeCompleted, detail);
        outcome
    }
}

/// Drives one optimization run
pub struct PhaseOrchestrator<FS: FileSystem + Clone = RealFileSystem> {
    project_root: PathBuf,
    config: ConfigFile,
    fs: FS,
    classifier: Box<dyn UsageClassifier>,
    collector: Arc<dyn MetricsCollector>,
    cancel: CancellationToken,
}

impl PhaseOrchestrator<RealFileSystem> {
    /// Create an orchestrator for a project on disk
    pub fn new(project_root: &Path, config: ConfigFile) -> Self {
        Self::with_fs(project_root, config, RealFileSystem)
    }
}

impl<FS: FileSystem + Clone> PhaseOrchestrator<FS> {
    /// Create an orchestrator over a custom filesystem
    pub fn with_fs(project_root: &Path, config: ConfigFile, fs: FS) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            config,
            fs,
            classifier: Box::new(PatternClassifier::new()),
            collector: Arc::new(NoOpCollector),
            cancel: CancellationToken::new(),
        }
    }

    /// Use another usage classifier
    pub fn with_classifier(mut self, classifier: Box<dyn UsageClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Report events and durations to `collector`
    pub fn with_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run configuration
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Load and check everything a run needs, without mutating anything
    ///
    /// # Errors
    ///
    /// Any error here is a fatal configuration error.
    pub fn preflight(&self) -> Result<Preflight, BundleSlimError> {
        self.config
            .validate()
            .map_err(|e| BundleSlimError::ConfigInvalid {
                path: self.project_root.join(CONFIG_FILE_NAME),
                reason: e.to_string(),
            })?;

        let mut names = self.config.protected.clone();
        if let Some(file) = &self.config.protected_file {
            let path = self.project_root.join(file);
            let raw = self
                .fs
                .read_to_string(&path)
                .map_err(|e| BundleSlimError::ProtectedListUnreadable { path, source: e })?;
            names.extend(
                raw.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from),
            );
        }
        let protected = ProtectedSet::new(names, &self.config.entry_points);

        let manifest_path = self.project_root.join(&self.config.manifest);
        let manifest = PackageJsonManifest::load(&manifest_path, &self.fs).map_err(|e| {
            BundleSlimError::ManifestUnreadable {
                path: manifest_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let source_count = self.scanner().discover().len();
        if source_count == 0 {
            return Err(BundleSlimError::NoSources {
                dirs: self
                    .config
                    .source_dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        log::info!(
            "Preflight passed: {} source files, {} protected names, {} packages",
            source_count,
            protected.names().count(),
            manifest.packages().len()
        );
        Ok(Preflight {
            protected,
            manifest,
            source_count,
        })
    }

    fn scanner(&self) -> SourceScanner<FS> {
        SourceScanner::with_fs(&self.project_root, self.config.source_dirs.clone(), self.fs.clone())
            .with_exclude(self.config.exclude.clone())
            .with_dist_dir(self.config.build.dist_dir.clone())
    }

    /// Classify the current tree
    pub fn classify(&self, preflight: &Preflight) -> UsageGraph {
        let sources = self.scanner().read_sources();
        let context = ClassifyContext {
            packages: preflight.manifest.packages(),
            protected: preflight.protected.clone(),
            source_roots: self.config.source_dirs.clone(),
            rarely_used_threshold: self.config.rarely_used_threshold,
        };
        self.classifier.classify(&sources, &context)
    }

    /// What Eliminate would stub, without touching the tree
    pub fn plan(&self) -> Result<(UsageGraph, EliminationPlan), BundleSlimError> {
        let preflight = self.preflight()?;
        let graph = self.classify(&preflight);
        let plan = EliminationPlan::from_graph(&graph, self.config.mode);
        Ok((graph, plan))
    }

    /// Run every configured phase
    ///
    /// # Errors
    ///
    /// Only preflight failures and an uncreatable run directory are errors;
    /// both happen before the tree is touched.
    pub fn run(&self, probe: &mut dyn Probe) -> Result<RunReport, BundleSlimError> {
        let started = Instant::now();
        let preflight = self.preflight()?;

        let run_dir = RunDirectory::create_with_fs(&self.project_root, self.fs.clone()).map_err(|e| {
            BundleSlimError::Io {
                context: "the run directory".to_string(),
                source: io::Error::other(e),
            }
        })?;
        let mut backups = BackupStore::with_fs(self.fs.clone());
        if self.config.preserve_backups {
            backups = backups.with_mirror(run_dir.backups_dir());
        }
        let mut tree = WorkingTree::with_fs(&self.project_root, self.fs.clone());
        let mut probe = ObservedProbe {
            inner: probe,
            collector: self.collector.as_ref(),
        };
        self.collector.record_event(RunEvent::RunStarted, run_dir.run_id());
        log::info!("Run {} started in {} mode", run_dir.run_id(), self.config.mode);

        let mut queue: VecDeque<PhaseKind> = self.config.effective_phases().into_iter().collect();
        let mut phases: Vec<PhaseResult> = Vec::new();
        let mut state = RunState::default();
        let mut cancelled = false;

        while let Some(phase) = queue.pop_front() {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                self.collector.record_event(RunEvent::RunCancelled, phase.as_str());
                if !state.validated {
                    log::warn!("Cancelled with an unvalidated tree; restoring every backup");
                    let restore = tree.restore_all(&backups);
                    for error in restore.errors() {
                        log::error!("Restore after cancellation: {}", error);
                    }
                    state.validated = true;
                }
            }

            let result = if cancelled {
                PhaseResult::skipped(phase, "run cancelled")
            } else if let Some(reason) = state.skip_reason(phase) {
                PhaseResult::skipped(phase, reason)
            } else {
                self.collector.record_event(RunEvent::PhaseStarted(phase), "");
                log::info!("Phase {} started", phase);
                let mut ctx = EngineContext {
                    tree: &mut tree,
                    backups: &backups,
                    probe: &mut probe,
                    cancel: &self.cancel,
                };
                match phase {
                    PhaseKind::Baseline => self.baseline(&preflight, &mut state, &mut ctx),
                    PhaseKind::Eliminate => self.eliminate(&preflight, &mut state, &mut ctx),
                    PhaseKind::Refine => self.refine(&preflight, &mut state, &mut ctx),
                    PhaseKind::Recover => self.recover(&preflight, &mut state, &mut ctx),
                }
            };

            if phase == PhaseKind::Eliminate && state.needs_recovery && !queue.contains(&PhaseKind::Recover) {
                log::info!("Eliminate failed; scheduling Recover");
                queue.push_back(PhaseKind::Recover);
            }

            let event = match result.status {
                PhaseStatus::Succeeded | PhaseStatus::Partial => RunEvent::PhaseSucceeded(phase),
                PhaseStatus::Failed => RunEvent::PhaseFailed(phase),
                PhaseStatus::Skipped => RunEvent::PhaseSkipped(phase),
            };
            self.collector.record_event(event, &result.errors.join("; "));
            if result.status != PhaseStatus::Skipped {
                self.collector
                    .record_duration(phase.as_str(), std::time::Duration::from_millis(result.duration_ms));
                log::info!("Phase {} {} in {} ms", phase, result.status, result.duration_ms);
            }
            if let Err(e) = run_dir.write_phase(&result) {
                log::warn!("Could not persist {} result: {}", phase, e);
            }
            phases.push(result);
        }

        if !state.validated && !cancelled {
            log::warn!("Run ended with an unvalidated tree; restoring every backup");
            let restore = tree.restore_all(&backups);
            for error in restore.errors() {
                log::error!("Final restore: {}", error);
            }
        }

        let removed: Vec<String> = tree.stubbed().iter().cloned().collect();
        let restored: Vec<String> = state
            .restored
            .iter()
            .filter(|name| !tree.is_stubbed(name))
            .cloned()
            .collect();
        let droppable_packages = state
            .baseline_graph
            .as_ref()
            .map(|graph| preflight.manifest.droppable(graph, &removed))
            .unwrap_or_default();
        let outcome = RunOutcome::decide(&phases, cancelled, removed.len());
        let baseline = phases
            .first()
            .filter(|p| p.phase == PhaseKind::Baseline)
            .and_then(|p| p.metrics.clone());

        let report = RunReport {
            run_id: run_dir.run_id().to_string(),
            mode: self.config.mode,
            outcome,
            phases,
            removed,
            restored,
            droppable_packages,
            baseline,
            final_metrics: state.last_metrics,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if let Err(e) = run_dir.write_report(&report) {
            log::warn!("Could not write the run report: {}", e);
        }
        if let Some(final_metrics) = &report.final_metrics {
            self.collector.record_size("final", final_metrics.total_bytes);
        }
        self.collector.record_event(RunEvent::RunFinished, &outcome.to_string());
        self.collector.flush();
        log::info!("Run {} finished: {}", report.run_id, outcome);
        Ok(report)
    }

    fn count(&self, preflight: &Preflight, result: &mut PhaseResult) {
        let graph = self.classify(preflight);
        result.component_count = graph.live_component_count();
        result.dependency_count = graph.used_package_count();
    }

    fn baseline(&self, preflight: &Preflight, state: &mut RunState, ctx: &mut EngineContext<'_, FS>) -> PhaseResult {
        let clock = PhaseClock::start(PhaseKind::Baseline);
        let graph = self.classify(preflight);
        ctx.tree.register(&graph);
        let verdict = ctx.probe.check();

        let mut result = clock.finish(if verdict.passed() {
            PhaseStatus::Succeeded
        } else {
            PhaseStatus::Failed
        });
        result.metrics = verdict.metrics().cloned();
        result.component_count = graph.live_component_count();
        result.dependency_count = graph.used_package_count();
        if verdict.passed() {
            state.baseline_passed = true;
            state.passed(verdict.metrics());
        } else {
            result.errors = verdict.errors();
        }
        state.baseline_graph = Some(graph);
        result
    }

    fn eliminate(&self, preflight: &Preflight, state: &mut RunState, ctx: &mut EngineContext<'_, FS>) -> PhaseResult {
        let clock = PhaseClock::start(PhaseKind::Eliminate);
        let graph = self.classify(preflight);
        ctx.tree.register(&graph);
        let engine = EliminationEngine::new().with_restore_rendered(self.config.restore_rendered);

        let (report, degraded) = match self.config.mode {
            Mode::Nuclear => match engine.run_nuclear(&graph, ctx) {
                NuclearOutcome::Success(report) => (report, None),
                NuclearOutcome::Degraded { reason, report } => (report, Some(reason)),
                NuclearOutcome::Fatal { reason, errors } => {
                    log::error!("Eliminate: {}", reason);
                    state.fatal = true;
                    state.validated = false;
                    let mut result = clock.finish(PhaseStatus::Failed);
                    result.removed = ctx.tree.stubbed().iter().cloned().collect();
                    result.errors = std::iter::once(reason).chain(errors).collect();
                    return result;
                }
            },
            mode => (engine.run_regular(&graph, mode, ctx), None),
        };

        let passed = report.passed();
        let status = match (passed, &degraded) {
            (true, None) => PhaseStatus::Succeeded,
            (true, Some(_)) => PhaseStatus::Partial,
            (false, _) => PhaseStatus::Failed,
        };
        let mut result = clock.finish(status);
        result.removed = report.removed.clone();
        result.restored = report.restored.clone();
        result.errors = degraded.into_iter().chain(report.errors).collect();
        if let Some(verdict) = &report.verdict {
            result.metrics = verdict.metrics().cloned();
            if !passed {
                result.errors.extend(verdict.errors());
            }
        }
        self.count(preflight, &mut result);

        state.restored.extend(report.restored);
        if passed {
            state.eliminate_succeeded = true;
            state.passed(report.verdict.as_ref().and_then(ProbeVerdict::metrics));
        } else {
            state.validated = false;
            state.needs_recovery = true;
            state.candidates = report.removed;
        }
        result
    }

    fn refine(&self, preflight: &Preflight, state: &mut RunState, ctx: &mut EngineContext<'_, FS>) -> PhaseResult {
        let clock = PhaseClock::start(PhaseKind::Refine);
        let report = RefineEngine::new(self.config.max_refine_probes)
            .with_mode(self.config.mode)
            .run(ctx, || self.classify(preflight));

        let passed = report.verdict.as_ref().is_none_or(ProbeVerdict::passed);
        let mut result = clock.finish(if passed {
            PhaseStatus::Succeeded
        } else {
            PhaseStatus::Failed
        });
        result.removed = report.removed;
        result.restored = report.restored.clone();
        result.errors = report.skipped;
        if let Some(verdict) = &report.verdict {
            result.metrics = verdict.metrics().cloned();
        }
        self.count(preflight, &mut result);

        state.restored.extend(report.restored);
        if passed {
            state.passed(report.verdict.as_ref().and_then(ProbeVerdict::metrics));
        } else {
            state.validated = false;
        }
        result
    }

    fn recover(&self, preflight: &Preflight, state: &mut RunState, ctx: &mut EngineContext<'_, FS>) -> PhaseResult {
        let clock = PhaseClock::start(PhaseKind::Recover);
        let candidates = std::mem::take(&mut state.candidates);
        let engine = RecoveryEngine::new(self.config.max_recovery_iterations);
        let report = engine.run(candidates, ctx);

        let status = if report.cancelled {
            PhaseStatus::Failed
        } else if report.passed() && report.converged {
            PhaseStatus::Succeeded
        } else if report.passed() {
            PhaseStatus::Partial
        } else {
            PhaseStatus::Failed
        };
        let mut result = clock.finish(status);
        result.removed = report.removed.clone();
        result.restored = report.restored.clone();
        result.errors = report.restore_errors.clone();
        if report.cancelled {
            result.errors.push("recovery cancelled; every candidate restored".to_string());
        } else if !report.converged {
            result.errors.push(format!(
                "recovery did not converge after {} bisection probes",
                report.iterations
            ));
        }
        if let Some(verdict) = &report.final_verdict {
            result.metrics = verdict.metrics().cloned();
            if !verdict.passed() {
                result.errors.extend(verdict.errors());
            }
        }
        self.count(preflight, &mut result);

        state.needs_recovery = false;
        state.restored.extend(report.restored.iter().cloned());
        if report.passed() {
            state.passed(report.final_verdict.as_ref().and_then(ProbeVerdict::metrics));
        } else {
            // A cancelled recovery restored everything, which is the baseline tree
            state.validated = report.cancelled;
        }
        result.recovery_steps = report.steps;
        result
    }
}
