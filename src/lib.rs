#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! bundle-slim library
//!
//! Removes unused UI components from a front-end project by stubbing them,
//! proving the app still builds and serves, and bisecting back to a
//! working tree when it does not. The CLI is a thin layer over
//! [`orchestrator::PhaseOrchestrator`]; everything is usable as a library.
//!
//! # Basic Example
//!
//! Classifying sources and planning an elimination:
//!
//! ```
//! use bundle_slim::classifier::{ClassifyContext, PatternClassifier, ProtectedSet, SourceFile, UsageClass, UsageClassifier};
//! use bundle_slim::engine::{EliminationPlan, Mode};
//! use std::path::PathBuf;
//!
//! let sources = vec![
//!     SourceFile::new("src/App.jsx", "import Nav from './Nav';\nexport default function App() { return <Nav />; }\n"),
//!     SourceFile::new("src/Nav.jsx", "export default function Nav() { return null; }\n"),
//!     SourceFile::new("src/Legacy.jsx", "export default function Legacy() { return null; }\n"),
//! ];
//! let context = ClassifyContext {
//!     protected: ProtectedSet::new(Vec::<String>::new(), ["App"]),
//!     source_roots: vec![PathBuf::from("src")],
//!     rarely_used_threshold: 0,
//!     ..Default::default()
//! };
//! let graph = PatternClassifier::new().classify(&sources, &context);
//! assert_eq!(graph.get("Legacy").unwrap().class, UsageClass::Unused);
//!
//! let plan = EliminationPlan::from_graph(&graph, Mode::Safe);
//! assert_eq!(plan.order, vec!["Legacy".to_string()]);
//! ```
//!
//! # Advanced Example: Run Configuration
//!
//! ```
//! use bundle_slim::config::ConfigFile;
//! use bundle_slim::engine::Mode;
//! use bundle_slim::orchestrator::PhaseKind;
//!
//! let config = ConfigFile {
//!     mode: Mode::Smart,
//!     phases: vec![PhaseKind::Eliminate, PhaseKind::Refine],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.effective_phases()[0], PhaseKind::Baseline);
//!
//! let broken = ConfigFile { max_recovery_iterations: 0, ..Default::default() };
//! assert!(broken.validate().is_err());
//! ```

/// Cooperative cancellation
pub mod cancel;
/// Source scanning and usage classification
pub mod classifier;
/// Command handlers for CLI operations
pub mod cmd;
/// Configuration file loading and saving
pub mod config;
/// Elimination, refinement and recovery engines
pub mod engine;
/// Enhanced error types with contextual suggestions
pub mod error;
/// Shared formatting utilities
pub mod fmt;
/// Infrastructure traits for filesystem and command execution
pub mod infra;
/// Package manifest access
pub mod manifest;
/// Phase orchestration and run state
pub mod orchestrator;
/// Build-and-serve oracle
pub mod probe;
/// Backups and the live source tree
pub mod store;
