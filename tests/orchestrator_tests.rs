//! Integration tests for full optimization runs on disk

use bundle_slim::config::ConfigFile;
use bundle_slim::engine::{Mode, StepStage};
use bundle_slim::orchestrator::{PhaseKind, PhaseOrchestrator, PhaseStatus, RunDirectory, RunOutcome};
use std::fs;

mod common;
use common::{fixtures, is_stubbed, ScriptedProbe};

fn letters() -> Vec<String> {
    ('A'..='J').map(|c| format!("Panel{}", c)).collect()
}

#[test]
fn test_nuclear_run_recovers_exactly_the_needed_components() {
    let names = letters();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let project = fixtures::create_project(&refs, &[]);
    let root = project.path();
    let mut probe = ScriptedProbe::new(root, &["PanelC", "PanelH"]);

    let report = PhaseOrchestrator::new(root, ConfigFile::default())
        .run(&mut probe)
        .expect("run should not fail");

    assert_eq!(report.outcome, RunOutcome::Optimized);
    assert_eq!(report.restored, vec!["PanelC".to_string(), "PanelH".to_string()]);
    assert_eq!(report.removed.len(), 8);
    for name in &names {
        let needed = name == "PanelC" || name == "PanelH";
        assert_eq!(is_stubbed(root, name), !needed, "{name}");
    }

    let recover = report.phase(PhaseKind::Recover).expect("recover should run");
    assert_eq!(recover.status, PhaseStatus::Succeeded);
    assert_eq!(recover.recovery_steps.last().map(|s| s.stage), Some(StepStage::Replay));
    assert_eq!(report.phase(PhaseKind::Refine).map(|p| p.status), Some(PhaseStatus::Skipped));

    let delta = report.size_delta().expect("both builds measured");
    assert!(delta.reduction_bytes() > 0);
}

#[test]
fn test_fifty_unused_components_need_no_recovery() {
    let names: Vec<String> = (0..50).map(|i| format!("Card{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let project = fixtures::create_project(&refs, &["Header"]);
    let root = project.path();
    let mut probe = ScriptedProbe::new(root, &["Header"]);

    let report = PhaseOrchestrator::new(root, ConfigFile::default())
        .run(&mut probe)
        .expect("run should not fail");

    assert_eq!(report.outcome, RunOutcome::Optimized);
    assert_eq!(report.removed.len(), 50);
    assert!(report.phase(PhaseKind::Recover).is_none());
    assert!(report.phases.iter().all(|p| p.recovery_steps.is_empty()));
    assert!(!is_stubbed(root, "Header"));
    // Baseline plus one validation after the zero-state build
    assert_eq!(probe.validations, 2);
}

#[test]
fn test_failing_baseline_leaves_tree_untouched() {
    let project = fixtures::create_project(&["Orphan"], &[]);
    let root = project.path();
    let mut probe = ScriptedProbe::new(root, &[]);
    probe.broken = true;

    let report = PhaseOrchestrator::new(root, ConfigFile::default())
        .run(&mut probe)
        .expect("a failing baseline is a report, not an error");

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(
        fs::read_to_string(fixtures::component_path(root, "Orphan")).unwrap(),
        fixtures::component_source("Orphan")
    );
}

#[test]
fn test_run_state_is_persisted_and_restorable() {
    let project = fixtures::create_project(&["Legacy", "Promo"], &["Header"]);
    let root = project.path();
    let mut probe = ScriptedProbe::new(root, &["Header"]);

    let report = PhaseOrchestrator::new(root, ConfigFile::default())
        .run(&mut probe)
        .expect("run should not fail");
    assert!(is_stubbed(root, "Legacy") && is_stubbed(root, "Promo"));

    let run = RunDirectory::open_with_fs(root, None, bundle_slim::infra::RealFileSystem).unwrap();
    assert_eq!(run.run_id(), report.run_id);
    assert_eq!(run.read_report().unwrap().removed, report.removed);
    assert!(run.path().join("baseline-result.json").is_file());
    assert!(run.path().join("eliminate-result.json").is_file());
    assert!(run.path().join("refine-result.json").is_file());

    // Header was stubbed in the zero state too, so its original is mirrored
    let written = bundle_slim::cmd::cmd_restore(root, None).unwrap();
    assert_eq!(written, 3);
    assert!(!is_stubbed(root, "Legacy") && !is_stubbed(root, "Promo"));
}

#[test]
fn test_smart_mode_keeps_rendered_components_and_reports_droppable_packages() {
    let project = fixtures::create_project(&["Orphan"], &["Header"]);
    let root = project.path();
    fs::write(
        fixtures::component_path(root, "SalesChart"),
        "import { Chart } from 'chart.js';\n\nexport default function SalesChart() {\n  return null;\n}\n",
    )
    .unwrap();
    let config = ConfigFile {
        mode: Mode::Smart,
        ..Default::default()
    };
    let mut probe = ScriptedProbe::new(root, &["Header"]);

    let report = PhaseOrchestrator::new(root, config).run(&mut probe).unwrap();

    assert_eq!(report.outcome, RunOutcome::Optimized);
    assert_eq!(report.removed, vec!["Orphan".to_string(), "SalesChart".to_string()]);
    assert_eq!(report.droppable_packages, vec!["chart.js".to_string()]);
    assert!(!is_stubbed(root, "Header"));
}
