//! Duplicate code detection over normalized statement windows
//!
//! Every function's statements are hashed from their normalized tokens, so
//! renamed identifiers, changed literals, whitespace and comments do not
//! matter. A window of `min_duplicate_statements` consecutive statements
//! inside one function is the unit of comparison.
//!
//! Within a file, a window is a duplicate when an equal window appears
//! earlier and does not overlap it. Runs of consecutive duplicate windows are
//! merged, so one copied region yields one finding.
//!
//! The per-file [`WindowPrint`]s are also handed to the aggregator, which
//! runs [`cross_file`] over the whole scan once every file is in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::RandomState;
use serde::Serialize;

use crate::lang::Lang;
use crate::model::{DetectorId, Finding, Span};
use crate::parsing::StructuralTree;

use super::{DetectContext, Detector};

/// Fixed seeds keep fingerprints comparable across threads and runs
fn hasher() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

/// Fingerprint of one statement window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowPrint {
    pub hash: u64,
    /// Index of the enclosing function in the file's declarations
    pub scope: usize,
    /// Position of the window's first statement within its function
    pub index: usize,
    pub span: Span,
}

impl WindowPrint {
    fn overlaps(&self, other: &WindowPrint, window: usize) -> bool {
        self.scope == other.scope && self.index.abs_diff(other.index) < window
    }
}

/// All statement windows of length `window`, in source order
pub fn fingerprints(tree: &dyn StructuralTree, window: usize) -> Vec<WindowPrint> {
    if window == 0 {
        return Vec::new();
    }
    let state = hasher();

    let mut by_scope: BTreeMap<usize, Vec<(u64, Span)>> = BTreeMap::new();
    for stmt in tree.statements() {
        let Some(scope) = stmt.scope else { continue };
        if stmt.tokens.is_empty() {
            continue;
        }
        by_scope
            .entry(scope)
            .or_default()
            .push((state.hash_one(&stmt.tokens), stmt.span));
    }

    let mut prints = Vec::new();
    for (scope, stmts) in by_scope {
        if stmts.len() < window {
            continue;
        }
        let hashes: Vec<u64> = stmts.iter().map(|(h, _)| *h).collect();
        for index in 0..=stmts.len() - window {
            let first = stmts[index].1;
            let last = stmts[index + window - 1].1;
            prints.push(WindowPrint {
                hash: state.hash_one(&hashes[index..index + window]),
                scope,
                index,
                span: Span::new(
                    first.start_line,
                    first.start_column,
                    last.end_line,
                    last.end_column,
                ),
            });
        }
    }
    prints.sort_by_key(|p| (p.span.start_line, p.span.start_column, p.scope, p.index));
    prints
}

/// A duplicate window and where its original lives
struct Hit<'a> {
    print: &'a WindowPrint,
    original: String,
}

/// Merge consecutive duplicate windows of one function into findings
fn merge_runs(hits: Vec<Hit<'_>>, window: usize, path: &Path, lang: Lang) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut iter = hits.into_iter().peekable();

    while let Some(first) = iter.next() {
        let mut last = first.print;
        while let Some(next) = iter.peek() {
            if next.print.scope == last.scope && next.print.index == last.index + 1 {
                last = next.print;
                iter.next();
            } else {
                break;
            }
        }
        let statements = last.index - first.print.index + window;
        let span = Span::new(
            first.print.span.start_line,
            first.print.span.start_column,
            last.span.end_line,
            last.span.end_column,
        );
        findings.push(
            Finding::new(
                DetectorId::DuplicateCode,
                path,
                lang,
                span,
                format!("{statements} statements duplicate {}", first.original),
            )
            .with_metric(statements as f64, window as f64),
        );
    }

    findings
}

/// Duplicate windows inside one file
pub fn in_file(path: &Path, lang: Lang, prints: &[WindowPrint], window: usize) -> Vec<Finding> {
    let mut seen: BTreeMap<u64, Vec<&WindowPrint>> = BTreeMap::new();
    let mut hits = Vec::new();

    for print in prints {
        let earlier = seen.entry(print.hash).or_default();
        if let Some(original) = earlier.iter().find(|e| !e.overlaps(print, window)) {
            hits.push(Hit {
                print,
                original: format!("lines {}-{}", original.span.start_line, original.span.end_line),
            });
        }
        earlier.push(print);
    }

    hits.sort_by_key(|h| (h.print.scope, h.print.index));
    let mut findings = merge_runs(hits, window, path, lang);
    findings.sort_by_key(|f| (f.span.start_line, f.span.start_column));
    findings
}

/// Fingerprints of one analyzed file, kept for the cross-file pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePrints {
    pub path: PathBuf,
    pub lang: Lang,
    pub window: usize,
    pub prints: Vec<WindowPrint>,
}

/// Windows repeated across files
///
/// Files are compared within the same language and window length. The
/// earliest file by path owns a region; copies in later files are reported.
/// Only the first occurrence of a window in each file takes part, since
/// repeats inside a file are already reported by [`in_file`].
pub fn cross_file(files: &[FilePrints]) -> Vec<Finding> {
    let mut groups: BTreeMap<(Lang, usize), Vec<&FilePrints>> = BTreeMap::new();
    for file in files {
        groups.entry((file.lang, file.window)).or_default().push(file);
    }

    let mut findings = Vec::new();
    for ((lang, window), mut group) in groups {
        group.sort_by(|a, b| a.path.cmp(&b.path));
        let mut owners: BTreeMap<u64, (&Path, Span)> = BTreeMap::new();

        for file in group {
            let mut firsts: BTreeMap<u64, &WindowPrint> = BTreeMap::new();
            for print in &file.prints {
                firsts.entry(print.hash).or_insert(print);
            }

            let mut hits: Vec<Hit<'_>> = firsts
                .values()
                .copied()
                .filter_map(|print| {
                    let (owner, span) = owners.get(&print.hash)?;
                    Some(Hit {
                        print,
                        original: format!("{}:{}", owner.display(), span.start_line),
                    })
                })
                .collect();
            hits.sort_by_key(|h| (h.print.scope, h.print.index));
            findings.extend(merge_runs(hits, window, &file.path, lang));

            for print in firsts.into_values() {
                owners
                    .entry(print.hash)
                    .or_insert((file.path.as_path(), print.span));
            }
        }
    }

    findings.sort_by(|a, b| {
        (&a.path, a.span.start_line, a.span.start_column)
            .cmp(&(&b.path, b.span.start_line, b.span.start_column))
    });
    findings
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicateCode;

impl Detector for DuplicateCode {
    fn id(&self) -> DetectorId {
        DetectorId::DuplicateCode
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        let window = ctx.thresholds.min_duplicate_statements;
        let prints = fingerprints(tree, window);
        in_file(tree.path(), tree.lang(), &prints, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::detectors::test_support::native_tree;

    fn block(fn_name: &str, var: &str) -> String {
        let mut src = format!("fn {fn_name}(input: u32) -> u32 {{\n");
        for i in 0..6 {
            src.push_str(&format!("    let {var}{i} = input * {i} + {};\n", i + 3));
        }
        src.push_str("    input\n}\n\n");
        src
    }

    #[test]
    fn test_renamed_copy_is_one_finding() {
        let src = format!("{}{}", block("first", "a"), block("second", "b"));
        let tree = native_tree("dup.rs", Lang::Rust, &src);
        let config = DetectorConfig::default();

        let findings = DuplicateCode.detect(&tree, &DetectContext::new(&config, Lang::Rust));
        assert_eq!(findings.len(), 1, "{findings:?}");
        assert_eq!(findings[0].span.start_line, 12);
        assert_eq!(findings[0].metric, Some(7.0));
        assert!(findings[0].message.contains("lines 2-"));
    }

    #[test]
    fn test_short_functions_have_no_windows() {
        let tree = native_tree("s.rs", Lang::Rust, "fn a() {\n    let x = 1;\n}\n");
        assert!(fingerprints(&tree, 6).is_empty());
    }

    #[test]
    fn test_cross_file_reports_later_path() {
        let config = DetectorConfig::default();
        let window = config.thresholds(Lang::Rust).min_duplicate_statements;
        let a = native_tree("a.rs", Lang::Rust, &block("first", "a"));
        let b = native_tree("b.rs", Lang::Rust, &block("second", "b"));

        let files = vec![
            FilePrints {
                path: PathBuf::from("b.rs"),
                lang: Lang::Rust,
                window,
                prints: fingerprints(&b, window),
            },
            FilePrints {
                path: PathBuf::from("a.rs"),
                lang: Lang::Rust,
                window,
                prints: fingerprints(&a, window),
            },
        ];

        let findings = cross_file(&files);
        assert_eq!(findings.len(), 1, "{findings:?}");
        assert_eq!(findings[0].path, PathBuf::from("b.rs"));
        assert!(findings[0].message.contains("a.rs:2"));
        assert_eq!(findings[0].metric, Some(7.0));
    }
}
