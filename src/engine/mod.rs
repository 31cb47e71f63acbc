//! Elimination, refinement and recovery engines
//!
//! Every engine works on the [`WorkingTree`](crate::store::WorkingTree)
//! and [`BackupStore`](crate::store::BackupStore) owned by the
//! orchestrator and calls the [`Probe`](crate::probe::Probe) between
//! mutations. Engines never run concurrently with a probe.

pub mod eliminate;
pub mod recovery;
pub mod refine;
pub mod stub;

pub use eliminate::{EliminationEngine, EliminationPlan, EliminationReport, NuclearOutcome};
pub use recovery::{RecoveryEngine, RecoveryReport, RecoveryStep, StepAction, StepOutcome, StepStage, DEFAULT_MAX_ITERATIONS};
pub use refine::{RefineEngine, RefineReport};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cancel::CancellationToken;
use crate::classifier::UsageClass;
use crate::error::BundleSlimError;
use crate::infra::FileSystem;
use crate::probe::Probe;
use crate::store::{BackupStore, WorkingTree};

/// What an engine mutates and consults while it runs
///
/// Borrowed from the orchestrator for the duration of one phase.
pub struct EngineContext<'a, FS: FileSystem> {
    /// Live source tree
    pub tree: &'a mut WorkingTree<FS>,
    /// Original content of every stubbed unit
    pub backups: &'a BackupStore<FS>,
    /// Build/validate oracle
    pub probe: &'a mut dyn Probe,
    /// Checked between probes
    pub cancel: &'a CancellationToken,
}

/// Elimination mode
///
/// The regular modes pick units by usage class. Nuclear stubs every
/// unprotected component and lets recovery bring back what is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Only unused components
    Safe,
    /// Unused and import-only components
    Smart,
    /// Unused, import-only and rarely-used components
    Aggressive,
    /// Every unprotected component
    #[default]
    Nuclear,
}

impl Mode {
    /// All modes, least to most aggressive
    pub const ALL: [Mode; 4] = [Mode::Safe, Mode::Smart, Mode::Aggressive, Mode::Nuclear];

    /// Mode name as written in config and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Safe => "safe",
            Mode::Smart => "smart",
            Mode::Aggressive => "aggressive",
            Mode::Nuclear => "nuclear",
        }
    }

    /// Whether a component of this class is a candidate under this mode
    pub fn admits(self, class: UsageClass) -> bool {
        match self {
            Mode::Safe => class == UsageClass::Unused,
            Mode::Smart => matches!(class, UsageClass::Unused | UsageClass::ImportOnly),
            Mode::Aggressive => class != UsageClass::Rendered,
            Mode::Nuclear => true,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = BundleSlimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BundleSlimError::InvalidMode {
                mode: s.to_string(),
                valid_modes: Mode::ALL.iter().map(|m| m.to_string()).collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_policies_widen_monotonically() {
        for class in UsageClass::ALL {
            for pair in Mode::ALL.windows(2) {
                if pair[0].admits(class) {
                    assert!(pair[1].admits(class), "{} admits {} but {} does not", pair[0], class, pair[1]);
                }
            }
        }
    }

    #[test]
    fn test_mode_admits_expected_classes() {
        assert!(Mode::Safe.admits(UsageClass::Unused));
        assert!(!Mode::Safe.admits(UsageClass::ImportOnly));
        assert!(Mode::Smart.admits(UsageClass::ImportOnly));
        assert!(!Mode::Smart.admits(UsageClass::RarelyUsed));
        assert!(Mode::Aggressive.admits(UsageClass::RarelyUsed));
        assert!(!Mode::Aggressive.admits(UsageClass::Rendered));
        assert!(Mode::Nuclear.admits(UsageClass::Rendered));
    }

    #[test]
    fn test_mode_from_str_is_case_insensitive() {
        assert_eq!("Smart".parse::<Mode>().unwrap(), Mode::Smart);
        assert_eq!(" nuclear ".parse::<Mode>().unwrap(), Mode::Nuclear);
    }

    #[test]
    fn test_mode_from_str_rejects_unknown() {
        let err = "extreme".parse::<Mode>().unwrap_err();
        assert_eq!(err.exit_code(), 64);
        assert!(err.suggestion().unwrap().contains("aggressive"));
    }

    #[test]
    fn test_mode_default_is_nuclear() {
        assert_eq!(Mode::default(), Mode::Nuclear);
    }
}
