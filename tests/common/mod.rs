//! Common test utilities and helpers
//!
//! Shared by the integration tests:
//! - `fixtures`: throwaway front-end projects on disk
//! - `ScriptedProbe`: an oracle that inspects the tree instead of building it

pub mod fixtures;

use bundle_slim::engine::stub::is_stub;
use bundle_slim::probe::{BuildOutcome, BundleMetrics, Probe, ValidationOutcome};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Builds always; validates while every required component is intact
///
/// Bundle size is the byte count of every component file, so stubbing
/// shrinks the reported bundle.
#[allow(dead_code)]
pub struct ScriptedProbe {
    root: PathBuf,
    required: BTreeSet<String>,
    pub broken: bool,
    pub validations: usize,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn new(root: &Path, required: &[&str]) -> Self {
        Self {
            root: root.to_path_buf(),
            required: required.iter().map(|s| s.to_string()).collect(),
            broken: false,
            validations: 0,
        }
    }
}

impl Probe for ScriptedProbe {
    fn build(&mut self) -> BuildOutcome {
        let dir = self.root.join(fixtures::COMPONENT_DIR);
        let total_bytes = fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);
        BuildOutcome::passed(BundleMetrics {
            total_bytes,
            js_bytes: total_bytes,
            ..Default::default()
        })
    }

    fn validate(&mut self) -> ValidationOutcome {
        self.validations += 1;
        if self.broken {
            return ValidationOutcome::failed(vec!["/: HTTP 500".to_string()]);
        }
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| is_stubbed(&self.root, name))
            .map(|name| format!("{} is not defined", name))
            .collect();
        if missing.is_empty() {
            ValidationOutcome::build_only()
        } else {
            ValidationOutcome::failed(missing)
        }
    }
}

/// Whether the component file for `name` currently holds a stub
#[allow(dead_code)]
pub fn is_stubbed(root: &Path, name: &str) -> bool {
    fs::read_to_string(fixtures::component_path(root, name)).is_ok_and(|c| is_stub(&c))
}

/// Wait up to ten seconds for a command to write a pid into `file`
#[allow(dead_code)]
pub fn read_pid(file: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(pid) = fs::read_to_string(file).ok().and_then(|s| s.trim().parse().ok()) {
            return pid;
        }
        assert!(Instant::now() < deadline, "{} never appeared", file.display());
        thread::sleep(Duration::from_millis(20));
    }
}

/// Whether `pid` exits (or is left a zombie) within five seconds
#[cfg(unix)]
#[allow(dead_code)]
pub fn eventually_dead(pid: u32) -> bool {
    let alive = |pid: u32| {
        let stat = Path::new("/proc").join(pid.to_string()).join("stat");
        if Path::new("/proc/self").exists() {
            return fs::read_to_string(stat)
                .map(|s| {
                    s.rsplit(')')
                        .next()
                        .and_then(|rest| rest.split_whitespace().next())
                        .is_some_and(|state| state != "Z")
                })
                .unwrap_or(false);
        }
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    };
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}
