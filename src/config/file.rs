//! Configuration file data structures

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::Mode;
use crate::orchestrator::PhaseKind;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = ".bundle-slim.toml";

/// File stems treated as entry points when they sit directly in a source root
pub const DEFAULT_ENTRY_STEMS: &[&str] = &["main", "index", "App"];

/// bundle-slim configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    /// Elimination mode
    #[serde(default)]
    pub mode: Mode,

    /// Phases to run, in order
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseKind>,

    /// Upper bound on outer bisection probes
    #[serde(default = "default_max_recovery_iterations")]
    pub max_recovery_iterations: usize,

    /// Component names that are never eliminated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected: Vec<String>,

    /// File with one protected component name per line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_file: Option<PathBuf>,

    /// Entry point file stems or project-relative paths
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,

    /// Directories scanned for components
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<PathBuf>,

    /// Path fragments skipped during discovery
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Invocation count at or below which a single-file user counts as rarely used
    #[serde(default = "default_rarely_used_threshold")]
    pub rarely_used_threshold: usize,

    /// Hard timeout for the whole validation step
    #[serde(default = "default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,

    /// Restore invoked components after a passing zero-state build
    #[serde(default = "default_true")]
    pub restore_rendered: bool,

    /// Upper bound on individual probes during Refine
    #[serde(default = "default_max_refine_probes")]
    pub max_refine_probes: usize,

    /// Mirror backups into the run directory
    #[serde(default = "default_true")]
    pub preserve_backups: bool,

    /// Package manifest, relative to the project root
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Build step settings
    #[serde(default)]
    pub build: BuildSettings,

    /// Serve/route-check settings; absent means validation is build-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serve: Option<ServeSettings>,
}

fn default_phases() -> Vec<PhaseKind> {
    vec![PhaseKind::Baseline, PhaseKind::Eliminate, PhaseKind::Refine]
}

fn default_max_recovery_iterations() -> usize {
    20
}

fn default_entry_points() -> Vec<String> {
    DEFAULT_ENTRY_STEMS.iter().map(|s| s.to_string()).collect()
}

fn default_source_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}

fn default_rarely_used_threshold() -> usize {
    1
}

fn default_validation_timeout_secs() -> u64 {
    120
}

fn default_max_refine_probes() -> usize {
    10
}

fn default_manifest() -> PathBuf {
    PathBuf::from("package.json")
}

fn default_true() -> bool {
    true
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            phases: default_phases(),
            max_recovery_iterations: default_max_recovery_iterations(),
            protected: Vec::new(),
            protected_file: None,
            entry_points: default_entry_points(),
            source_dirs: default_source_dirs(),
            exclude: Vec::new(),
            rarely_used_threshold: default_rarely_used_threshold(),
            validation_timeout_secs: default_validation_timeout_secs(),
            restore_rendered: true,
            max_refine_probes: default_max_refine_probes(),
            preserve_backups: true,
            manifest: default_manifest(),
            build: BuildSettings::default(),
            serve: None,
        }
    }
}

/// How the application is built
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSettings {
    /// Shell command producing the bundle
    #[serde(default = "default_build_command")]
    pub command: String,

    /// Directory the bundle is emitted to
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Hard timeout for one build
    #[serde(default = "default_build_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_build_command() -> String {
    "npm run build".to_string()
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_build_timeout_secs() -> u64 {
    300
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            dist_dir: default_dist_dir(),
            timeout_secs: default_build_timeout_secs(),
        }
    }
}

/// How the built application is served and checked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServeSettings {
    /// Shell command starting the server
    #[serde(default = "default_serve_command")]
    pub command: String,

    /// Base URL the server answers on
    #[serde(default = "default_serve_url")]
    pub url: String,

    /// Routes fetched on every validation
    #[serde(default = "default_routes")]
    pub routes: Vec<String>,

    /// How long to wait for the server to answer
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Optional command run while the server is up (e.g. an e2e smoke test)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_command: Option<String>,

    /// Response body fragments that mark a route as broken
    #[serde(default = "default_error_markers")]
    pub error_markers: Vec<String>,
}

fn default_serve_command() -> String {
    "npm run preview".to_string()
}

fn default_serve_url() -> String {
    "http://127.0.0.1:4173".to_string()
}

fn default_routes() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_error_markers() -> Vec<String> {
    vec![
        "Internal Server Error".to_string(),
        "Cannot GET".to_string(),
    ]
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            command: default_serve_command(),
            url: default_serve_url(),
            routes: default_routes(),
            startup_timeout_secs: default_startup_timeout_secs(),
            check_command: None,
            error_markers: default_error_markers(),
        }
    }
}

impl ConfigFile {
    /// Validate bounds and the phase list
    ///
    /// Ensures every bound is non-zero and each phase appears at most once.
    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            anyhow::bail!("Phase list cannot be empty");
        }

        for (i, phase) in self.phases.iter().enumerate() {
            if self.phases[..i].contains(phase) {
                anyhow::bail!("Phase '{}' is listed more than once", phase);
            }
        }

        let bounds = [
            ("max-recovery-iterations", self.max_recovery_iterations as u64),
            ("max-refine-probes", self.max_refine_probes as u64),
            ("validation-timeout-secs", self.validation_timeout_secs),
            ("build.timeout-secs", self.build.timeout_secs),
        ];
        for (key, value) in bounds {
            if value == 0 {
                anyhow::bail!("'{}' must be greater than zero", key);
            }
        }

        if self.source_dirs.is_empty() {
            anyhow::bail!("'source-dirs' cannot be empty");
        }

        if self.build.command.trim().is_empty() {
            anyhow::bail!("'build.command' cannot be empty");
        }

        if let Some(serve) = &self.serve {
            if serve.startup_timeout_secs == 0 {
                anyhow::bail!("'serve.startup-timeout-secs' must be greater than zero");
            }
            if !serve.url.starts_with("http://") && !serve.url.starts_with("https://") {
                anyhow::bail!("'serve.url' must be an http(s) URL, got '{}'", serve.url);
            }
            if let Some(route) = serve.routes.iter().find(|r| !r.starts_with('/')) {
                anyhow::bail!("Route '{}' must start with '/'", route);
            }
        }

        Ok(())
    }

    /// Phase list with Baseline guaranteed first
    ///
    /// Every run needs baseline metrics to compare against, so a phase list
    /// without Baseline gets it prepended.
    pub fn effective_phases(&self) -> Vec<PhaseKind> {
        let mut phases: Vec<PhaseKind> = self
            .phases
            .iter()
            .copied()
            .filter(|p| *p != PhaseKind::Baseline)
            .collect();
        phases.insert(0, PhaseKind::Baseline);
        phases
    }
}
