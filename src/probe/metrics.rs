//! Bundle size metrics

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One emitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path relative to the dist directory
    pub path: PathBuf,
    /// Size in bytes
    pub bytes: u64,
}

/// Sizes measured in the dist directory after a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetrics {
    /// Every emitted file
    pub total_bytes: u64,
    /// `.js` and `.mjs` files
    pub js_bytes: u64,
    /// `.css` files
    pub css_bytes: u64,
    /// Number of emitted script chunks
    pub chunk_count: usize,
    /// Emitted files, sorted by path
    pub artifacts: Vec<Artifact>,
}

impl BundleMetrics {
    /// Aggregate metrics from a list of artifacts
    pub fn from_artifacts(mut artifacts: Vec<Artifact>) -> Self {
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        let mut metrics = BundleMetrics::default();
        for artifact in &artifacts {
            metrics.total_bytes += artifact.bytes;
            match artifact.path.extension().and_then(|e| e.to_str()) {
                Some("js") | Some("mjs") => {
                    metrics.js_bytes += artifact.bytes;
                    metrics.chunk_count += 1;
                }
                Some("css") => metrics.css_bytes += artifact.bytes,
                _ => {}
            }
        }
        metrics.artifacts = artifacts;
        metrics
    }

    /// Largest artifacts first
    pub fn largest(&self, limit: usize) -> Vec<&Artifact> {
        let mut sorted: Vec<&Artifact> = self.artifacts.iter().collect();
        sorted.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.path.cmp(&b.path)));
        sorted.truncate(limit);
        sorted
    }
}

/// Size metrics for before/after comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeDelta {
    /// Bundle size before (bytes)
    pub before_bytes: u64,
    /// Bundle size after (bytes)
    pub after_bytes: u64,
}

impl SizeDelta {
    /// Compare two measurements
    pub fn between(before: &BundleMetrics, after: &BundleMetrics) -> Self {
        Self {
            before_bytes: before.total_bytes,
            after_bytes: after.total_bytes,
        }
    }

    /// Calculate size reduction in bytes
    pub fn reduction_bytes(&self) -> i64 {
        self.before_bytes as i64 - self.after_bytes as i64
    }

    /// Calculate size reduction as percentage
    pub fn reduction_percent(&self) -> f64 {
        if self.before_bytes == 0 {
            return 0.0;
        }
        (self.reduction_bytes() as f64 / self.before_bytes as f64) * 100.0
    }
}
