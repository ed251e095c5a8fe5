//! Scan throughput benchmarks
//!
//! Generates a synthetic multi-language tree once and scans it with varying
//! worker counts. Set `CODECLEAN_BENCH_REPO` to scan a real checkout instead.
//!
//! Run with: cargo bench --bench scan

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use codeclean_engine::{scan, ParserConfig, ScanRequest};

const FILES_PER_LANG: usize = 150;

fn rust_file(i: usize) -> String {
    format!(
        r#"// TODO: tidy module {i}
pub fn handler_{i}(a: u32, b: u32, c: u32, d: u32, e: u32) -> u32 {{
    let mut total = 0;
    for x in [a, b, c, d, e] {{
        if x > 42 {{
            total += x * 3;
        }} else {{
            total += x;
        }}
    }}
    total
}}
"#
    )
}

fn go_file(i: usize) -> String {
    format!(
        "package gen\n\n// FIXME: {i}\nfunc Handler{i}(x int) int {{\n\tif x > 17 {{\n\t\treturn x * 3\n\t}}\n\treturn x\n}}\n"
    )
}

fn python_file(i: usize) -> String {
    format!("def handler_{i}(a, b, c, d, e):\n    if a > 99:\n        return b * 7\n    return c\n")
}

fn ts_file(i: usize) -> String {
    format!("export function handler{i}(v: number): number {{\n  return v * 37;\n}}\n")
}

fn synthetic_repo() -> (TempDir, usize) {
    let dir = TempDir::new().expect("create temp dir");
    let write = |rel: String, content: String| {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().expect("has parent")).expect("create dirs");
        fs::write(path, content).expect("write file");
    };
    for i in 0..FILES_PER_LANG {
        write(format!("rust/m{i}.rs"), rust_file(i));
        write(format!("go/h{i}.go"), go_file(i));
        write(format!("py/h{i}.py"), python_file(i));
        write(format!("ts/h{i}.ts"), ts_file(i));
    }
    (dir, FILES_PER_LANG * 4)
}

fn scan_once(root: &Path, workers: usize) -> usize {
    let result = scan(
        ScanRequest::new([root])
            .with_parsers(ParserConfig::all_native())
            .with_workers(workers),
    )
    .expect("scan succeeds");
    result.counters().total_findings
}

fn bench_workers(c: &mut Criterion) {
    let external = std::env::var("CODECLEAN_BENCH_REPO").ok().map(PathBuf::from);
    let (_guard, root, files) = match external {
        Some(path) => (None, path, 0),
        None => {
            let (dir, files) = synthetic_repo();
            let root = dir.path().to_path_buf();
            (Some(dir), root, files)
        }
    };

    let mut group = c.benchmark_group("scan");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);
    if files > 0 {
        group.throughput(Throughput::Elements(files as u64));
    }

    for workers in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| black_box(scan_once(&root, workers)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_workers);
criterion_main!(benches);
