//! Optimize command implementation
//!
//! Thin presentation layer over [`PhaseOrchestrator`]: applies CLI
//! overrides, wires the command probe and a spinner, and prints the report.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::classifier::UsageGraph;
use crate::config::ConfigFile;
use crate::engine::EliminationPlan;
use crate::fmt::{format_bytes, format_delta, format_identities, CHART, CHECKMARK, CROSSMARK, SCISSORS, WARNING};
use crate::orchestrator::{
    MetricData, MetricsCollector, PhaseKind, PhaseOrchestrator, PhaseStatus, RunEvent, RunOutcome, RunReport,
};
use crate::probe::CommandProbe;

/// Command-line overrides for one optimize run
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    /// `--mode`
    pub mode: Option<String>,
    /// `--phases`, in order
    pub phases: Vec<String>,
    /// `--max-iterations`
    pub max_iterations: Option<usize>,
    /// `--protect`, added to the configured names
    pub protect: Vec<String>,
    /// `--no-backups`
    pub no_backups: bool,
    /// `--dry-run`
    pub dry_run: bool,
    /// `--json`
    pub json: bool,
}

impl OptimizeOptions {
    /// Apply the overrides on top of the file configuration
    pub fn apply(&self, config: &mut ConfigFile) -> Result<()> {
        if !self.phases.is_empty() {
            config.phases = self
                .phases
                .iter()
                .map(|p| p.parse::<PhaseKind>())
                .collect::<Result<_, _>>()?;
        }
        if let Some(max) = self.max_iterations {
            config.max_recovery_iterations = max;
        }
        config.protected.extend(self.protect.iter().cloned());
        if self.no_backups {
            config.preserve_backups = false;
        }
        Ok(())
    }
}

/// Spinner that follows run events on stderr
///
/// Hidden when output is JSON so stdout stays machine-readable.
pub struct SpinnerCollector {
    bar: ProgressBar,
    probes: AtomicUsize,
}

impl SpinnerCollector {
    /// Create a spinner; `hidden` suppresses all drawing
    pub fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        Self {
            bar,
            probes: AtomicUsize::new(0),
        }
    }

    /// Probes seen so far
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    /// Stop the spinner and clear its line
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl MetricsCollector for SpinnerCollector {
    fn name(&self) -> &str {
        "spinner"
    }

    fn record_event(&self, event: RunEvent, detail: &str) {
        match event {
            RunEvent::PhaseStarted(phase) => self.bar.set_message(format!("{}...", phase)),
            RunEvent::ProbeCompleted => {
                let n = self.probes.fetch_add(1, Ordering::Relaxed) + 1;
                self.bar.set_message(format!("probe {} ({})", n, detail));
            }
            RunEvent::PhaseSucceeded(phase) => {
                self.bar.println(format!("{} {}", CHECKMARK, phase));
            }
            RunEvent::PhaseFailed(phase) => {
                self.bar.println(format!("{} {}: {}", CROSSMARK, phase, detail));
            }
            RunEvent::PhaseSkipped(phase) => {
                self.bar
                    .println(format!("   {} {} skipped ({})", style("•").dim(), phase, detail));
            }
            RunEvent::RunCancelled => self.bar.println(format!("{} cancelled", WARNING)),
            RunEvent::RunStarted | RunEvent::RunFinished => {}
        }
    }

    fn record_metric(&self, metric: MetricData) {
        log::trace!("{} = {}", metric.name, metric.value);
    }
}

/// Run the optimizer in the current directory
///
/// # Examples
///
/// ```no_run
/// use bundle_slim::cmd::optimize::{cmd_optimize, OptimizeOptions};
///
/// let options = OptimizeOptions {
///     mode: Some("smart".to_string()),
///     dry_run: true,
///     ..Default::default()
/// };
/// cmd_optimize(&options)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn cmd_optimize(options: &OptimizeOptions) -> Result<()> {
    let project_root = env::current_dir()?;
    optimize_in(&project_root, options)
}

fn optimize_in(project_root: &Path, options: &OptimizeOptions) -> Result<()> {
    let mut config = super::load_config(project_root, options.mode.as_deref())?;
    options.apply(&mut config)?;

    if !options.json {
        println!(
            "{} {} Optimizing in {} mode",
            SCISSORS,
            style("bundle-slim").bold(),
            style(config.mode).cyan()
        );
        println!();
    }

    let orchestrator = PhaseOrchestrator::new(project_root, config.clone());
    if options.dry_run {
        let (graph, plan) = orchestrator.plan()?;
        return present_plan(&graph, &plan, options.json);
    }

    let token = CancellationToken::new();
    if let Err(e) = token.cancel_on_interrupt() {
        log::warn!("Could not install the interrupt handler: {}", e);
    }
    let mut probe = CommandProbe::new(project_root, &config).with_cancellation(token.clone());
    probe.preflight()?;

    let spinner = Arc::new(SpinnerCollector::new(options.json));
    let report = orchestrator
        .with_collector(spinner.clone())
        .with_cancellation(token)
        .run(&mut probe)?;
    spinner.finish();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        present_report(&report);
    }

    match report.outcome {
        RunOutcome::Failed => anyhow::bail!("run {} failed; see the phase errors above", report.run_id),
        RunOutcome::Cancelled => anyhow::bail!("run {} was cancelled", report.run_id),
        _ => Ok(()),
    }
}

fn present_plan(graph: &UsageGraph, plan: &EliminationPlan, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "mode": plan.mode,
            "candidates": plan.order,
            "invoked": plan.invoked,
            "components": graph.component_count(),
        });
        println!("{}", serde_json::to_string_pretty(&value).context("encoding the plan")?);
        return Ok(());
    }

    println!("[DRY RUN] Would stub {} of {} component(s):", plan.order.len(), graph.component_count());
    for name in &plan.order {
        let class = graph.get(name).map(|u| u.class.to_string()).unwrap_or_default();
        let marker = if plan.invoked.contains(name) { " (restored after zero state)" } else { "" };
        println!("   {} {} {}{}", style("→").dim(), name, style(class).dim(), marker);
    }
    Ok(())
}

fn present_report(report: &RunReport) {
    println!();
    println!("{} Run {} finished: {}", CHART, style(&report.run_id).cyan(), style(report.outcome).bold());

    for phase in &report.phases {
        let mark = match phase.status {
            PhaseStatus::Succeeded | PhaseStatus::Partial => CHECKMARK,
            PhaseStatus::Failed => CROSSMARK,
            PhaseStatus::Skipped => WARNING,
        };
        println!(
            "   {} {:<10} {:<10} {} ms",
            mark,
            phase.phase.as_str(),
            phase.status.to_string(),
            phase.duration_ms
        );
    }

    println!();
    println!("   Removed:  {}", format_identities(&report.removed, 8));
    println!("   Restored: {}", format_identities(&report.restored, 8));
    if !report.droppable_packages.is_empty() {
        println!("   Droppable packages: {}", report.droppable_packages.join(", "));
    }
    if let Some(delta) = report.size_delta() {
        println!(
            "   Bundle: {} -> {} ({}, {:.1}%)",
            format_bytes(delta.before_bytes),
            style(format_bytes(delta.after_bytes)).green().bold(),
            format_delta(-delta.reduction_bytes()),
            delta.reduction_percent()
        );
    }
    let errors = report.errors();
    if !errors.is_empty() && !report.outcome.is_success() {
        println!();
        for error in errors.iter().take(10) {
            println!("   {} {}", style("!").red(), error);
        }
    }
    println!();
}
