//! Usage Classification Benchmarks
//!
//! **Purpose:** Measure scanning and graph aggregation on synthetic trees
//!
//! **Regression Threshold:** >20% slower than the previous run
//!
//! **How to Run:**
//! ```bash
//! cargo bench --bench usage_classification
//! ```
//!
//! **What's Being Measured:**
//! 1. `scan_text` - regex extraction for one file
//! 2. `classify/<n>` - parallel scan plus aggregation for n components
//! 3. `elimination_order/<n>` - ordering candidates on a built graph

use bundle_slim::classifier::{
    ClassifyContext, PatternClassifier, ProtectedSet, SourceFile, SourceKind, UsageClassifier,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::path::{Path, PathBuf};

/// Tree where component i renders components i+1 and i+2
fn synthetic_tree(n: usize) -> Vec<SourceFile> {
    let mut files = Vec::with_capacity(n + 1);
    files.push(SourceFile::new(
        "src/App.jsx",
        "import Widget0 from './components/Widget0';\nexport default function App() { return <Widget0 />; }\n",
    ));
    for i in 0..n {
        let children: Vec<usize> = [i + 1, i + 2].into_iter().filter(|c| *c < n).collect();
        let imports: String = children
            .iter()
            .map(|c| format!("import Widget{c} from './Widget{c}';\n"))
            .collect();
        let body: String = children.iter().map(|c| format!("<Widget{c} />")).collect();
        files.push(SourceFile::new(
            format!("src/components/Widget{i}.jsx"),
            format!(
                "import React, {{ useState }} from 'react';\n{imports}\nexport default function Widget{i}() {{\n  const [open] = useState(false);\n  return <div>{{open && <span />}}{body}</div>;\n}}\n"
            ),
        ));
    }
    files
}

fn context() -> ClassifyContext {
    ClassifyContext {
        packages: ["react".to_string()].into_iter().collect(),
        protected: ProtectedSet::new(Vec::<String>::new(), ["App"]),
        source_roots: vec![PathBuf::from("src")],
        rarely_used_threshold: 1,
    }
}

fn bench_scan_text(c: &mut Criterion) {
    let classifier = PatternClassifier::new();
    let files = synthetic_tree(3);
    let content = String::from_utf8_lossy(&files[1].bytes).into_owned();

    c.bench_function("scan_text", |b| {
        b.iter(|| {
            classifier.scan_text(
                black_box(Path::new("src/components/Widget0.jsx")),
                black_box(&content),
                SourceKind::Script,
            )
        })
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = PatternClassifier::new();
    let context = context();
    let mut group = c.benchmark_group("classify");
    for n in [50, 500, 2000] {
        let files = synthetic_tree(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &files, |b, files| {
            b.iter(|| classifier.classify(black_box(files), &context))
        });
    }
    group.finish();
}

fn bench_elimination_order(c: &mut Criterion) {
    let classifier = PatternClassifier::new();
    let context = context();
    let mut group = c.benchmark_group("elimination_order");
    for n in [500, 2000] {
        let graph = classifier.classify(&synthetic_tree(n), &context);
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter(|| graph.elimination_order(|_| true))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan_text, bench_classify, bench_elimination_order);
criterion_main!(benches);
