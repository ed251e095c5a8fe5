//! TestRepo builder for integration testing

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use codeclean_engine::{scan, ParserConfig, ScanRequest, ScanResult};

/// Temporary source tree, removed on drop
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new empty test repository
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the path to the test repository root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file inside the repo
    pub fn file(&self, relative_path: &str) -> PathBuf {
        self.dir.path().join(relative_path)
    }

    /// Add a source file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Add a Rust function of exactly `lines` lines (signature and brace included)
    pub fn add_rust_fn(&self, relative_path: &str, name: &str, lines: usize) -> &Self {
        let mut src = format!("fn {name}() {{\n");
        for i in 0..lines.saturating_sub(2) {
            src.push_str(&format!("    let _v{i} = {i};\n"));
        }
        src.push_str("}\n");
        self.add_file(relative_path, &src)
    }

    /// A small mixed-language project with findings in every file
    pub fn mixed() -> Self {
        let repo = Self::new();
        repo.add_file(
            "src/lib.rs",
            r#"// TODO: split this module
pub fn Compute(a: u32, b: u32, c: u32, d: u32, e: u32) -> u32 {
    let total = a + b + c + d + e;
    if total > 42 {
        return total * 7;
    }
    total
}

fn risky(v: Option<u32>) -> u32 {
    v.unwrap()
}
"#,
        )
        .add_file(
            "cmd/main.go",
            r#"package main

// FIXME: configurable
func do_work(x int) int {
	if x > 17 {
		return x * 3
	}
	return x
}
"#,
        )
        .add_file(
            "app/service.py",
            r#"# HACK: global state
def handle(a, b, c, d, e):
    if a:
        return b * 9
    return c
"#,
        )
        .add_file(
            "web/app.js",
            r#"// TODO: debounce
function render_page(items) {
  return items.length * 13;
}
"#,
        )
        .add_file(
            "web/types.ts",
            r#"export function format_value(v: number): string {
  return (v * 37).toString();
}
"#,
        )
        .add_file(
            "java/Store.java",
            r#"public class Store {
    private int max_size = 64;

    public int Capacity() {
        return max_size * 5;
    }
}
"#,
        );
        repo
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `repo` with every language parsed natively
pub fn scan_repo(repo: &TestRepo, workers: usize) -> ScanResult {
    scan(
        ScanRequest::new([repo.path()])
            .with_parsers(ParserConfig::all_native())
            .with_workers(workers),
    )
    .expect("scan succeeds")
}
