//! Build-and-serve oracle
//!
//! The engines only see the result contracts defined here: a build either
//! produces a bundle (with metrics) or errors, and a validation either
//! passes every route check or reports what broke. [`CommandProbe`] is the
//! shipped implementation; tests plug in scripted probes.
//!
//! Probe errors never escape as `Err`: a timeout, a crash or a refused
//! connection is a failed outcome, logged and carried in `errors`.

pub mod command;
pub mod error;
pub mod metrics;
pub mod server;

pub use command::CommandProbe;
pub use error::ProbeError;
pub use metrics::{Artifact, BundleMetrics, SizeDelta};
pub use server::ServerGuard;

use serde::{Deserialize, Serialize};

/// Result of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Build command succeeded and produced a bundle
    pub success: bool,
    /// Error lines from the build output
    pub errors: Vec<String>,
    /// Bundle metrics, present on success
    pub metrics: Option<BundleMetrics>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl BuildOutcome {
    /// A successful build
    pub fn passed(metrics: BundleMetrics) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            metrics: Some(metrics),
            duration_ms: 0,
        }
    }

    /// A failed build
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            metrics: None,
            duration_ms: 0,
        }
    }
}

/// Result of fetching one route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Route path, e.g. `/settings`
    pub route: String,
    /// HTTP status, when a response arrived
    pub status: Option<u16>,
    /// 2xx and no error marker in the body
    pub success: bool,
    /// What went wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Every route and the check command passed
    pub success: bool,
    /// Per-route results, in configured order
    pub routes: Vec<RouteResult>,
    /// Errors outside route checks (server start, check command)
    pub runtime_errors: Vec<String>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl ValidationOutcome {
    /// Validation with nothing to check beyond the build
    pub fn build_only() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A validation that failed before any route was checked
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            runtime_errors: errors,
            ..Default::default()
        }
    }

    /// Error messages from failing routes and the runtime
    pub fn errors(&self) -> Vec<String> {
        self.routes
            .iter()
            .filter(|r| !r.success)
            .map(|r| match (&r.error, r.status) {
                (Some(e), _) => format!("{}: {}", r.route, e),
                (None, Some(status)) => format!("{}: HTTP {}", r.route, status),
                (None, None) => format!("{}: no response", r.route),
            })
            .chain(self.runtime_errors.iter().cloned())
            .collect()
    }
}

/// Combined result of a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeVerdict {
    /// Build result
    pub build: BuildOutcome,
    /// Validation result; absent when the build failed or only a build was requested
    pub validation: Option<ValidationOutcome>,
}

impl ProbeVerdict {
    /// Build passed, and validation passed if it ran
    pub fn passed(&self) -> bool {
        self.build.success && self.validation.as_ref().is_none_or(|v| v.success)
    }

    /// Every error from both steps
    pub fn errors(&self) -> Vec<String> {
        let mut errors = self.build.errors.clone();
        if let Some(validation) = &self.validation {
            errors.extend(validation.errors());
        }
        errors
    }

    /// Bundle metrics of the build
    pub fn metrics(&self) -> Option<&BundleMetrics> {
        self.build.metrics.as_ref()
    }
}

/// The build/validate oracle
///
/// Implementations may be slow and flaky; callers treat every call as a
/// black box and never inspect anything but the returned outcome.
pub trait Probe {
    /// Build the current tree
    fn build(&mut self) -> BuildOutcome;

    /// Serve the last build and check it
    fn validate(&mut self) -> ValidationOutcome;

    /// Build only
    fn build_check(&mut self) -> ProbeVerdict {
        ProbeVerdict {
            build: self.build(),
            validation: None,
        }
    }

    /// Build, then validate if the build passed
    fn check(&mut self) -> ProbeVerdict {
        let build = self.build();
        if !build.success {
            return ProbeVerdict {
                build,
                validation: None,
            };
        }
        let validation = self.validate();
        ProbeVerdict {
            build,
            validation: Some(validation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingProbe {
        build_ok: bool,
        builds: usize,
        validations: usize,
    }

    impl Probe for CountingProbe {
        fn build(&mut self) -> BuildOutcome {
            self.builds += 1;
            if self.build_ok {
                BuildOutcome::passed(BundleMetrics::default())
            } else {
                BuildOutcome::failed(vec!["Module not found".to_string()])
            }
        }

        fn validate(&mut self) -> ValidationOutcome {
            self.validations += 1;
            ValidationOutcome {
                success: false,
                routes: vec![RouteResult {
                    route: "/".to_string(),
                    status: Some(500),
                    success: false,
                    error: None,
                }],
                runtime_errors: vec!["check failed".to_string()],
                duration_ms: 0,
            }
        }
    }

    #[test]
    fn test_check_skips_validation_after_failed_build() {
        let mut probe = CountingProbe {
            build_ok: false,
            builds: 0,
            validations: 0,
        };
        let verdict = probe.check();
        assert!(!verdict.passed());
        assert!(verdict.validation.is_none());
        assert_eq!(probe.validations, 0);
        assert_eq!(verdict.errors(), vec!["Module not found".to_string()]);
    }

    #[test]
    fn test_check_collects_route_and_runtime_errors() {
        let mut probe = CountingProbe {
            build_ok: true,
            builds: 0,
            validations: 0,
        };
        let verdict = probe.check();
        assert!(!verdict.passed());
        assert_eq!(
            verdict.errors(),
            vec!["/: HTTP 500".to_string(), "check failed".to_string()]
        );
    }

    #[test]
    fn test_build_check_passes_without_validation() {
        let mut probe = CountingProbe {
            build_ok: true,
            builds: 0,
            validations: 0,
        };
        assert!(probe.build_check().passed());
        assert_eq!(probe.validations, 0);
    }
}
