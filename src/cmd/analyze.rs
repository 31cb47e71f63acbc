//! Analyze command implementation
//!
//! Classifies the project without touching it and prints the usage table
//! (or JSON) together with what the configured mode would stub.

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::classifier::{UsageClass, UsageGraph};
use crate::engine::{EliminationPlan, Mode};
use crate::fmt::{format_identities, INFO, MICROSCOPE, WARNING};
use crate::orchestrator::PhaseOrchestrator;

/// One row of the component table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentRow {
    /// Identity
    pub name: String,
    /// Usage class
    pub class: UsageClass,
    /// Invocations outside the declaration
    pub usages: usize,
    /// Files invoking it
    pub using_files: usize,
    /// Never eliminated
    pub protected: bool,
    /// Currently a stub
    pub stubbed: bool,
    /// Part of the elimination plan
    pub planned: bool,
}

/// One row of the package table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRow {
    /// Package name
    pub name: String,
    /// Import sites in live code
    pub imports: usize,
    /// Never eliminated
    pub protected: bool,
}

/// Everything `analyze` reports
#[derive(Debug, Clone, Serialize)]
pub struct UsageAnalysis {
    /// Mode the plan was built for
    pub mode: Mode,
    /// Components, in identity order
    pub components: Vec<ComponentRow>,
    /// Manifest packages, in name order
    pub packages: Vec<PackageRow>,
    /// Component count per class
    pub class_counts: BTreeMap<UsageClass, usize>,
    /// Elimination order under `mode`
    pub plan: Vec<String>,
    /// Imports that resolve to nothing declared
    pub absent_references: Vec<String>,
}

impl UsageAnalysis {
    /// Build the report from a classification and a plan
    pub fn new(graph: &UsageGraph, plan: &EliminationPlan) -> Self {
        let components = graph
            .components()
            .map(|u| ComponentRow {
                name: u.name.clone(),
                class: u.class,
                usages: u.usage_count(),
                using_files: u.using_files(),
                protected: u.protected,
                stubbed: u.stubbed,
                planned: plan.order.contains(&u.name),
            })
            .collect();
        let packages = graph
            .packages()
            .map(|p| PackageRow {
                name: p.name.clone(),
                imports: p.imports.len(),
                protected: p.protected,
            })
            .collect();
        Self {
            mode: plan.mode,
            components,
            packages,
            class_counts: graph.class_counts(),
            plan: plan.order.clone(),
            absent_references: graph.absent_references().iter().cloned().collect(),
        }
    }
}

/// Print the usage analysis of `project_root`
///
/// # Examples
///
/// ```no_run
/// use bundle_slim::cmd::analyze::cmd_analyze;
///
/// cmd_analyze(&std::env::current_dir()?, Some("smart"), false)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn cmd_analyze(project_root: &Path, mode: Option<&str>, json: bool) -> Result<()> {
    let config = super::load_config(project_root, mode)?;
    let (graph, plan) = PhaseOrchestrator::new(project_root, config).plan()?;
    let analysis = UsageAnalysis::new(&graph, &plan);

    if json {
        let output = serde_json::to_string_pretty(&analysis).context("Failed to serialize usage analysis to JSON")?;
        println!("{}", output);
        return Ok(());
    }

    println!("{} {} Usage Analysis", MICROSCOPE, style("bundle-slim").bold());
    println!();
    print_table(&analysis);
    Ok(())
}

fn print_table(analysis: &UsageAnalysis) {
    println!(
        "   {:<32} {:<12} {:>6} {:>6}  {}",
        style("component").bold(),
        style("class").bold(),
        style("uses").bold(),
        style("files").bold(),
        style("flags").bold()
    );
    for row in &analysis.components {
        let mut flags = Vec::new();
        if row.protected {
            flags.push("protected");
        }
        if row.stubbed {
            flags.push("stubbed");
        }
        if row.planned {
            flags.push("planned");
        }
        println!(
            "   {:<32} {:<12} {:>6} {:>6}  {}",
            row.name,
            row.class.to_string(),
            row.usages,
            row.using_files,
            style(flags.join(",")).dim()
        );
    }

    println!();
    let counts: Vec<String> = analysis
        .class_counts
        .iter()
        .map(|(class, n)| format!("{} {}", n, class))
        .collect();
    println!("{} {}", INFO, counts.join(", "));
    let unused_packages: Vec<String> = analysis
        .packages
        .iter()
        .filter(|p| p.imports == 0 && !p.protected)
        .map(|p| p.name.clone())
        .collect();
    if !unused_packages.is_empty() {
        println!("{} Packages never imported: {}", WARNING, unused_packages.join(", "));
    }
    if !analysis.absent_references.is_empty() {
        println!(
            "{} Unresolved imports: {}",
            WARNING,
            format_identities(&analysis.absent_references, 6)
        );
    }
    println!(
        "{} {} mode would stub {} component(s)",
        INFO,
        style(analysis.mode).cyan(),
        analysis.plan.len()
    );
}
