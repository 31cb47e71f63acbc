//! Top-level error types with contextual suggestions
//!
//! Provides structured error types that include:
//! - Actionable error messages
//! - Suggested fixes and recovery actions
//! - Documentation links
//! - Proper exit codes for CI/CD
//!
//! Only configuration problems found before any file is touched abort a
//! run. Everything that goes wrong afterwards (failed probes, restore
//! errors, non-convergence) is recorded in the run report instead.
//!
//! # Examples
//!
//! ```
//! use bundle_slim::error::BundleSlimError;
//!
//! let error = BundleSlimError::ToolMissing { tool: "npm".to_string() };
//! assert!(error.is_fatal_config());
//! assert!(error.suggestion().unwrap().contains("[build] command"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::probe::ProbeError;

/// bundle-slim errors with contextual suggestions
#[derive(Error, Debug)]
pub enum BundleSlimError {
    /// Configuration file exists but cannot be read or parsed
    #[error("Invalid configuration in {path}: {reason}")]
    ConfigInvalid {
        /// Path to config file
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Configured protected-list file cannot be read
    #[error("Protected list unreadable: {path}")]
    ProtectedListUnreadable {
        /// Path to the protected list
        path: PathBuf,
        #[source]
        /// IO error source
        source: std::io::Error,
    },

    /// Manifest (package.json) cannot be read or parsed
    #[error("Manifest unreadable: {path}: {reason}")]
    ManifestUnreadable {
        /// Path to the manifest
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Unknown elimination mode
    #[error("Unknown mode: '{mode}'")]
    InvalidMode {
        /// Invalid mode name
        mode: String,
        /// List of valid modes
        valid_modes: Vec<String>,
    },

    /// Unknown phase name
    #[error("Unknown phase: '{phase}'")]
    InvalidPhase {
        /// Invalid phase name
        phase: String,
        /// List of valid phases
        valid_phases: Vec<String>,
    },

    /// Build program is not on PATH
    #[error("Build tool not installed: {tool}")]
    ToolMissing {
        /// Tool name
        tool: String,
    },

    /// No source directory produced any file to classify
    #[error("No source files found under {dirs}")]
    NoSources {
        /// Searched directories, comma separated
        dirs: String,
    },

    /// Run directory for restore does not exist
    #[error("No saved run found: {run_id}")]
    RunNotFound {
        /// Requested run id (or "latest")
        run_id: String,
    },

    /// Generic I/O error with context
    #[error("I/O error: {context}")]
    Io {
        /// Context about where the error occurred
        context: String,
        #[source]
        /// IO error source
        source: std::io::Error,
    },

    /// Probe failed in a way that stops the command (e.g. a dry run check)
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
}

impl BundleSlimError {
    /// Get actionable suggestion for resolving this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use bundle_slim::error::BundleSlimError;
    ///
    /// let error = BundleSlimError::InvalidMode {
    ///     mode: "extreme".to_string(),
    ///     valid_modes: vec!["safe".to_string(), "nuclear".to_string()],
    /// };
    ///
    /// assert!(error.suggestion().unwrap().contains("nuclear"));
    /// ```
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ConfigInvalid { .. } => Some(
                "Fix the configuration or run 'bundle-slim init --force' to regenerate it"
                    .to_string(),
            ),
            Self::ProtectedListUnreadable { path, .. } => Some(format!(
                "Create {} (one component name per line) or remove 'protected-file' from the config",
                path.display()
            )),
            Self::ManifestUnreadable { path, .. } => Some(format!(
                "Run bundle-slim from the app root or point 'manifest' at a valid file (looked for {})",
                path.display()
            )),
            Self::InvalidMode { valid_modes, .. } => {
                Some(format!("Valid modes: {}", valid_modes.join(", ")))
            }
            Self::InvalidPhase { valid_phases, .. } => {
                Some(format!("Valid phases: {}", valid_phases.join(", ")))
            }
            Self::ToolMissing { tool } => Some(format!(
                "Install {} or set [build] command in .bundle-slim.toml",
                tool
            )),
            Self::NoSources { .. } => {
                Some("Set 'source-dirs' in .bundle-slim.toml to your component directories".to_string())
            }
            Self::RunNotFound { .. } => Some(
                "List saved runs under .bundle-slim/runs/ and pass one to 'bundle-slim restore'".to_string(),
            ),
            Self::Io { context, .. } => Some(format!(
                "Check file permissions and that {} is accessible",
                context
            )),
            Self::Probe(e) => match e {
                ProbeError::ServerAlreadyRunning { .. } => Some(
                    "Stop the dev server already listening on the serve URL, or change [serve] url"
                        .to_string(),
                ),
                ProbeError::Timeout { .. } => Some(
                    "Raise [build] timeout-secs or validation-timeout-secs in .bundle-slim.toml"
                        .to_string(),
                ),
                _ => Some("Check the build output above and fix the failing step".to_string()),
            },
        }
    }

    /// Get documentation URL for this error.
    pub fn docs_url(&self) -> Option<&str> {
        match self {
            Self::ConfigInvalid { .. } | Self::InvalidMode { .. } | Self::InvalidPhase { .. } => {
                Some("https://github.com/bundle-slim/bundle-slim#configuration")
            }
            Self::ProtectedListUnreadable { .. } => {
                Some("https://github.com/bundle-slim/bundle-slim#protected-components")
            }
            Self::Probe(_) => Some("https://github.com/bundle-slim/bundle-slim#build-and-serve"),
            _ => None,
        }
    }

    /// Get appropriate exit code for this error.
    ///
    /// Returns Unix-style exit codes based on the error type, following sysexits.h conventions.
    ///
    /// # Examples
    ///
    /// ```
    /// use bundle_slim::error::BundleSlimError;
    ///
    /// let error = BundleSlimError::ToolMissing { tool: "npm".to_string() };
    /// assert_eq!(error.exit_code(), 127);
    /// ```
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigInvalid { .. } => 78,             // EX_CONFIG
            Self::ProtectedListUnreadable { .. } => 66,   // EX_NOINPUT
            Self::ManifestUnreadable { .. } => 66,        // EX_NOINPUT
            Self::InvalidMode { .. } => 64,               // EX_USAGE
            Self::InvalidPhase { .. } => 64,              // EX_USAGE
            Self::ToolMissing { .. } => 127,              // Command not found
            Self::NoSources { .. } => 66,                 // EX_NOINPUT
            Self::RunNotFound { .. } => 66,               // EX_NOINPUT
            Self::Io { .. } => 74,                        // EX_IOERR
            Self::Probe(_) => 1,
        }
    }

    /// Whether this error is raised before the working tree is touched.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ProtectedListUnreadable { .. }
                | Self::ManifestUnreadable { .. }
                | Self::InvalidMode { .. }
                | Self::InvalidPhase { .. }
                | Self::ToolMissing { .. }
                | Self::NoSources { .. }
        )
    }
}

/// Error formatter with colors and structured output
pub struct ErrorFormatter;

impl ErrorFormatter {
    /// Format error with suggestions and documentation links
    pub fn format(error: &anyhow::Error) -> String {
        use console::style;

        let mut output = String::new();

        output.push_str(&format!("{} {}\n", style("error:").red().bold(), error));

        let mut source = error.source();
        let mut indent = 1;
        while let Some(err) = source {
            output.push_str(&format!(
                "{}{} {}\n",
                "  ".repeat(indent),
                style("caused by:").yellow(),
                err
            ));
            source = err.source();
            indent += 1;
        }

        if let Some(bs_error) = Self::find(error) {
            if let Some(suggestion) = bs_error.suggestion() {
                output.push_str(&format!(
                    "\n{} {}\n",
                    style("help:").cyan().bold(),
                    suggestion
                ));
            }

            if let Some(docs) = bs_error.docs_url() {
                output.push_str(&format!("{} {}\n", style("docs:").blue(), docs));
            }
        }

        output
    }

    /// Get exit code from error
    pub fn exit_code(error: &anyhow::Error) -> i32 {
        Self::find(error).map(BundleSlimError::exit_code).unwrap_or(1)
    }

    // Context layers wrap the typed error, so search the whole chain.
    fn find(error: &anyhow::Error) -> Option<&BundleSlimError> {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<BundleSlimError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<BundleSlimError> {
        vec![
            BundleSlimError::ConfigInvalid {
                path: PathBuf::from(".bundle-slim.toml"),
                reason: "bad".to_string(),
            },
            BundleSlimError::ProtectedListUnreadable {
                path: PathBuf::from("protected.txt"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            },
            BundleSlimError::ManifestUnreadable {
                path: PathBuf::from("package.json"),
                reason: "expected value".to_string(),
            },
            BundleSlimError::InvalidMode {
                mode: "x".to_string(),
                valid_modes: vec!["safe".to_string()],
            },
            BundleSlimError::InvalidPhase {
                phase: "x".to_string(),
                valid_phases: vec!["eliminate".to_string()],
            },
            BundleSlimError::ToolMissing {
                tool: "npm".to_string(),
            },
            BundleSlimError::NoSources {
                dirs: "src".to_string(),
            },
            BundleSlimError::RunNotFound {
                run_id: "latest".to_string(),
            },
            BundleSlimError::Io {
                context: "writing stub".to_string(),
                source: std::io::Error::other("test"),
            },
            BundleSlimError::Probe(ProbeError::Timeout {
                command: "npm run build".to_string(),
                secs: 5,
            }),
        ]
    }

    #[test]
    fn test_all_error_variants_have_exit_codes() {
        for err in all_variants() {
            let exit_code = err.exit_code();
            assert!(exit_code > 0, "Error {:?} should have non-zero exit code", err);
            assert!(exit_code < 256, "Exit code should fit in a byte");
        }
    }

    #[test]
    fn test_all_error_variants_have_suggestions() {
        for err in all_variants() {
            let suggestion = err.suggestion();
            assert!(suggestion.is_some(), "Error {:?} should have a suggestion", err);
            assert!(!suggestion.unwrap().is_empty());
        }
    }

    #[test]
    fn test_protected_list_unreadable_is_fatal_config() {
        let err = BundleSlimError::ProtectedListUnreadable {
            path: PathBuf::from("keep.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.is_fatal_config());
        assert_eq!(err.exit_code(), 66);
        assert!(err.suggestion().unwrap().contains("keep.txt"));
    }

    #[test]
    fn test_probe_and_io_errors_are_not_fatal_config() {
        let err = BundleSlimError::Probe(ProbeError::Timeout {
            command: "vite build".to_string(),
            secs: 1,
        });
        assert!(!err.is_fatal_config());
        assert!(err.suggestion().unwrap().contains("timeout-secs"));
    }

    #[test]
    fn test_error_formatter_finds_typed_error_behind_context() {
        let err = anyhow::Error::new(BundleSlimError::InvalidMode {
            mode: "extreme".to_string(),
            valid_modes: vec!["safe".to_string(), "smart".to_string()],
        })
        .context("loading run configuration");

        assert_eq!(ErrorFormatter::exit_code(&err), 64);
        let formatted = ErrorFormatter::format(&err);
        assert!(formatted.contains("loading run configuration"));
        assert!(formatted.contains("Valid modes: safe, smart"));
    }

    #[test]
    fn test_error_formatter_untyped_error_exits_one() {
        let err = anyhow::anyhow!("plain failure");
        assert_eq!(ErrorFormatter::exit_code(&err), 1);
        assert!(!ErrorFormatter::format(&err).contains("help:"));
    }

    #[test]
    fn test_invalid_mode_lists_valid_modes() {
        let err = BundleSlimError::InvalidMode {
            mode: "invalid".to_string(),
            valid_modes: vec!["safe".to_string(), "nuclear".to_string()],
        };
        let suggestion = err.suggestion().expect("InvalidMode should have suggestion");
        assert!(suggestion.contains("safe"));
        assert!(suggestion.contains("nuclear"));
    }
}
