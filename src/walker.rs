//! Source discovery
//!
//! [`SourceWalker`] turns a set of roots into a lazy stream of
//! [`FileDescriptor`]s. Excluded directories are pruned before they are
//! descended into, and each canonical directory is visited at most once per
//! walk so symlink cycles and overlapping roots terminate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{DirEntry, WalkBuilder};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::DiscoveryError;
use crate::lang::Lang;
use crate::model::FileDescriptor;

/// Default cap on the size of a file the worker will read (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Discovery options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Gitignore-style patterns; matching directories are pruned
    pub exclude: Vec<String>,
    /// When non-empty, a file must match at least one pattern
    pub include: Vec<String>,
    pub respect_gitignore: bool,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    /// Larger files are reported as skipped by the worker
    pub max_file_size: u64,
    /// Report test sources as skipped instead of analyzing them
    pub skip_test_files: bool,
    /// Gitignore-style patterns marking extra files as tests
    pub test_patterns: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            exclude: ["target/", "node_modules/", "vendor/", ".git/", "*.min.js"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include: Vec::new(),
            respect_gitignore: true,
            include_hidden: false,
            follow_symlinks: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_test_files: true,
            test_patterns: Vec::new(),
        }
    }
}

/// Lazy, restartable enumerator of source files under a set of roots
#[derive(Debug, Clone)]
pub struct SourceWalker {
    roots: Vec<PathBuf>,
    options: WalkOptions,
    languages: Vec<Lang>,
}

impl SourceWalker {
    pub fn new(roots: Vec<PathBuf>, options: WalkOptions) -> Self {
        Self {
            roots,
            options,
            languages: Vec::new(),
        }
    }

    /// Restrict discovery to these languages (empty means all)
    pub fn with_languages(mut self, languages: Vec<Lang>) -> Self {
        self.languages = languages;
        self
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Start a fresh traversal
    ///
    /// Every call gets its own visited-directory set, so two walks over the
    /// same tree yield the same sequence.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileDescriptor, DiscoveryError>> + '_ {
        let visited: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
        self.roots
            .iter()
            .flat_map(move |root| self.walk_root(root, Arc::clone(&visited)))
    }

    fn walk_root(
        &self,
        root: &Path,
        visited: Arc<Mutex<HashSet<PathBuf>>>,
    ) -> Box<dyn Iterator<Item = Result<FileDescriptor, DiscoveryError>> + '_> {
        let canonical = match root.canonicalize() {
            Ok(path) => path,
            Err(e) => {
                return Box::new(std::iter::once(Err(DiscoveryError {
                    path: root.to_path_buf(),
                    message: e.to_string(),
                })))
            }
        };
        if canonical.is_dir() && !visited.lock().insert(canonical) {
            debug!(root = %root.display(), "root already covered by an earlier root");
            return Box::new(std::iter::empty());
        }

        let base = base_of(root);
        let exclude = match build_matcher(&base, &self.options.exclude) {
            Ok(m) => m,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let include = match build_matcher(&base, &self.options.include) {
            Ok(m) => m,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        let respect = self.options.respect_gitignore;
        let mut builder = WalkBuilder::new(root);
        builder
            .git_ignore(respect)
            .git_global(respect)
            .git_exclude(respect)
            .ignore(respect)
            .parents(respect)
            .require_git(false)
            .hidden(!self.options.include_hidden)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b));

        let prune_base = base.clone();
        builder.filter_entry(move |entry| keep_entry(entry, &prune_base, &exclude, &visited));

        Box::new(
            builder
                .build()
                .filter_map(move |entry| self.describe(entry, &base, &include)),
        )
    }

    fn describe(
        &self,
        entry: Result<DirEntry, ignore::Error>,
        base: &Path,
        include: &Gitignore,
    ) -> Option<Result<FileDescriptor, DiscoveryError>> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = error_path(&err).unwrap_or_else(|| base.to_path_buf());
                warn!(path = %path.display(), error = %err, "discovery error");
                return Some(Err(DiscoveryError {
                    path,
                    message: err.to_string(),
                }));
            }
        };

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            return None;
        }
        let path = entry.path();
        let lang = Lang::from_path(path)?;
        if !self.languages.is_empty() && !self.languages.contains(&lang) {
            return None;
        }
        if !include.is_empty() && !matches(include, base, path, false) {
            return None;
        }

        match entry.metadata() {
            Ok(meta) => Some(Ok(FileDescriptor {
                path: path.to_path_buf(),
                lang,
                size: meta.len(),
                modified: meta.modified().ok(),
            })),
            Err(err) => Some(Err(DiscoveryError {
                path: path.to_path_buf(),
                message: err.to_string(),
            })),
        }
    }
}

/// Directory patterns are resolved against for `root`
fn base_of(root: &Path) -> PathBuf {
    if root.is_dir() {
        root.to_path_buf()
    } else {
        root.parent().map(Path::to_path_buf).unwrap_or_default()
    }
}

fn build_matcher(base: &Path, patterns: &[String]) -> Result<Gitignore, DiscoveryError> {
    let mut builder = GitignoreBuilder::new(base);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|e| DiscoveryError {
                path: base.to_path_buf(),
                message: format!("invalid pattern {pattern:?}: {e}"),
            })?;
    }
    builder.build().map_err(|e| DiscoveryError {
        path: base.to_path_buf(),
        message: e.to_string(),
    })
}

fn matches(matcher: &Gitignore, base: &Path, path: &Path, is_dir: bool) -> bool {
    // The matcher asserts that paths live under its root
    if !path.starts_with(base) {
        return false;
    }
    matcher
        .matched_path_or_any_parents(path, is_dir)
        .is_ignore()
}

fn keep_entry(
    entry: &DirEntry,
    base: &Path,
    exclude: &Gitignore,
    visited: &Mutex<HashSet<PathBuf>>,
) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
    if matches(exclude, base, entry.path(), is_dir) {
        debug!(path = %entry.path().display(), "excluded");
        return false;
    }
    if is_dir {
        if let Ok(canonical) = entry.path().canonicalize() {
            return visited.lock().insert(canonical);
        }
    }
    true
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}

/// User test-file patterns, compiled once per scan root
#[derive(Debug, Clone, Default)]
pub struct TestPatterns {
    matchers: Vec<(PathBuf, Gitignore)>,
}

impl TestPatterns {
    pub fn new(roots: &[PathBuf], patterns: &[String]) -> Result<Self, DiscoveryError> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let matchers = roots
            .iter()
            .map(|root| {
                let base = base_of(root);
                build_matcher(&base, patterns).map(|m| (base, m))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Built-in conventions first, then the user patterns
    pub fn is_test_file(&self, path: &Path, lang: Lang) -> bool {
        is_test_file(path, lang)
            || self
                .matchers
                .iter()
                .any(|(base, matcher)| matches(matcher, base, path, false))
    }
}

/// Conventional test-source locations per language
pub fn is_test_file(path: &Path, lang: Lang) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let in_dir = |dir: &str| path.components().any(|c| c.as_os_str() == dir);

    match lang {
        Lang::Rust => in_dir("tests") || name.ends_with("_test.rs") || name == "tests.rs",
        Lang::Go => name.ends_with("_test.go"),
        Lang::Python => {
            (name.starts_with("test_") && name.ends_with(".py"))
                || name.ends_with("_test.py")
                || name == "conftest.py"
        }
        Lang::JavaScript | Lang::TypeScript => {
            name.contains(".test.") || name.contains(".spec.") || in_dir("__tests__")
        }
        Lang::Java => {
            let stem = name.strip_suffix(".java").unwrap_or(name);
            stem.ends_with("Test") || stem.ends_with("Tests") || path.to_string_lossy().contains("src/test/")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn collect(walker: &SourceWalker) -> (Vec<PathBuf>, Vec<DiscoveryError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for item in walker.walk() {
            match item {
                Ok(fd) => files.push(fd.path),
                Err(e) => errors.push(e),
            }
        }
        files.sort();
        (files, errors)
    }

    #[test]
    fn test_excluded_directories_are_pruned() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/lib.rs", "fn a() {}");
        write(dir.path(), "target/debug/gen.rs", "fn b() {}");
        write(dir.path(), "web/app.min.js", "var a;");
        write(dir.path(), "web/app.js", "var a;");
        write(dir.path(), "README.md", "# hi");

        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], WalkOptions::default());
        let (files, errors) = collect(&walker);

        assert!(errors.is_empty());
        assert_eq!(
            files,
            vec![dir.path().join("src/lib.rs"), dir.path().join("web/app.js")]
        );
    }

    #[test]
    fn test_language_filter_and_include_patterns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/main.go", "package main");
        write(dir.path(), "a/lib.rs", "fn a() {}");
        write(dir.path(), "b/other.rs", "fn b() {}");

        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], WalkOptions::default())
            .with_languages(vec![Lang::Rust]);
        let (files, _) = collect(&walker);
        assert_eq!(files.len(), 2);

        let options = WalkOptions {
            include: vec!["a/".to_string()],
            ..WalkOptions::default()
        };
        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], options);
        let (files, _) = collect(&walker);
        assert_eq!(
            files,
            vec![dir.path().join("a/lib.rs"), dir.path().join("a/main.go")]
        );
    }

    #[test]
    fn test_gitignore_and_hidden_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "generated/out.py", "x = 1");
        write(dir.path(), ".hidden/secret.py", "x = 1");
        write(dir.path(), "keep.py", "x = 1");

        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], WalkOptions::default());
        let (files, _) = collect(&walker);
        assert_eq!(files, vec![dir.path().join("keep.py")]);

        let options = WalkOptions {
            respect_gitignore: false,
            include_hidden: true,
            ..WalkOptions::default()
        };
        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], options);
        let (files, _) = collect(&walker);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_walk_is_restartable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "x.rs", "fn x() {}");
        write(dir.path(), "y/z.rs", "fn z() {}");

        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], WalkOptions::default());
        let first = collect(&walker).0;
        let second = collect(&walker).0;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_overlapping_roots_visit_directories_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pkg/a.rs", "fn a() {}");

        let roots = vec![dir.path().to_path_buf(), dir.path().join("pkg")];
        let walker = SourceWalker::new(roots, WalkOptions::default());
        let (files, _) = collect(&walker);
        assert_eq!(files, vec![dir.path().join("pkg/a.rs")]);
    }

    #[test]
    fn test_missing_root_is_a_discovery_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let walker = SourceWalker::new(vec![missing.clone()], WalkOptions::default());
        let (files, errors) = collect(&walker);
        assert!(files.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, missing);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/one.rs", "fn one() {}");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("a/loop")).unwrap();

        let options = WalkOptions {
            follow_symlinks: true,
            ..WalkOptions::default()
        };
        let walker = SourceWalker::new(vec![dir.path().to_path_buf()], options);
        let (files, _) = collect(&walker);
        assert_eq!(files, vec![dir.path().join("a/one.rs")]);
    }

    #[test]
    fn test_custom_test_patterns_extend_conventions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/lib.rs", "fn a() {}");
        write(dir.path(), "fixtures/sample.rs", "fn b() {}");
        write(dir.path(), "web/cart.check.js", "var a;");

        let roots = vec![dir.path().to_path_buf()];
        let patterns = vec!["fixtures/".to_string(), "*.check.js".to_string()];
        let tests = TestPatterns::new(&roots, &patterns).unwrap();
        assert!(!tests.is_empty());

        let at = |rel: &str| dir.path().join(rel);
        assert!(tests.is_test_file(&at("fixtures/sample.rs"), Lang::Rust));
        assert!(tests.is_test_file(&at("web/cart.check.js"), Lang::JavaScript));
        assert!(tests.is_test_file(&at("pkg/api_test.go"), Lang::Go));
        assert!(!tests.is_test_file(&at("src/lib.rs"), Lang::Rust));
        assert!(!tests.is_test_file(Path::new("/elsewhere/fixtures/x.rs"), Lang::Rust));

        let none = TestPatterns::new(&roots, &[]).unwrap();
        assert!(none.is_empty());
        assert!(!none.is_test_file(&at("fixtures/sample.rs"), Lang::Rust));
    }

    #[test]
    fn test_invalid_test_pattern_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = TestPatterns::new(&[dir.path().to_path_buf()], &["src/[ab".to_string()])
            .unwrap_err();
        assert!(err.message.contains("invalid pattern"));
    }

    #[test]
    fn test_test_file_conventions() {
        assert!(is_test_file(Path::new("pkg/server_test.go"), Lang::Go));
        assert!(!is_test_file(Path::new("pkg/server.go"), Lang::Go));
        assert!(is_test_file(Path::new("tests/test_api.py"), Lang::Python));
        assert!(is_test_file(Path::new("src/App.test.tsx"), Lang::TypeScript));
        assert!(is_test_file(Path::new("crate/tests/it.rs"), Lang::Rust));
        assert!(is_test_file(Path::new("src/FooTest.java"), Lang::Java));
        assert!(!is_test_file(Path::new("src/main.rs"), Lang::Rust));
    }
}
