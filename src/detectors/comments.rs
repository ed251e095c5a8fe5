//! Comment detectors: debt markers and commented-out code

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DetectorId, Finding, Span};
use crate::parsing::{Comment, StructuralTree};

use super::{DetectContext, Detector};

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(TODO|FIXME|HACK|XXX|BUG)\b\s*(?:\([^)]*\))?\s*:?\s*(.*)")
        .expect("marker regex is valid")
});

/// Tokens that suggest a comment holds code
static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(?:fn|func|def|let|var|const|return|if|else|for|while|match|switch|case
            |import|package|use|type|struct|impl|class)\s
        |:=|=>|->|::|[{}()\[\];]
        ",
    )
    .expect("code pattern regex is valid")
});

static CODE_LINE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:fn|func|def|let|var|const|return|if|for|while|match|import|use|class|struct|impl|pub)\b",
    )
    .expect("code line regex is valid")
});

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z]+\b").expect("word regex is valid"));

const DOC_PATTERNS: &[&str] = &[
    "todo:",
    "fixme:",
    "note:",
    "hack:",
    "xxx:",
    "bug:",
    "safety:",
    "copyright",
    "license",
    "author",
    "@param",
    "@return",
    "@throws",
    "example:",
    "usage:",
    "description:",
];

const MIN_CODE_LENGTH: usize = 20;
const MIN_CODE_MATCHES: usize = 3;

/// Comment text without its markers, one entry per line
fn strip_markers(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = line
                .strip_prefix("//")
                .or_else(|| line.strip_prefix("/*"))
                .or_else(|| line.strip_prefix('#'))
                .or_else(|| line.strip_prefix('*'))
                .unwrap_or(line);
            line.trim_end_matches("*/").trim().to_string()
        })
        .collect()
}

// ============================================================================
// Debt markers
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct TodoMarker;

impl Detector for TodoMarker {
    fn id(&self) -> DetectorId {
        DetectorId::TodoMarker
    }

    fn detect(&self, tree: &dyn StructuralTree, _ctx: &DetectContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for comment in tree.comments() {
            for (offset, line) in comment.text.lines().enumerate() {
                let Some(caps) = MARKER.captures(line) else {
                    continue;
                };
                let marker = &caps[1];
                let note = caps[2].trim().trim_end_matches("*/").trim();
                let line_no = comment.span.start_line + offset;
                let column = if offset == 0 { comment.span.start_column } else { 1 };
                let message = if note.is_empty() {
                    format!("{marker} marker")
                } else {
                    format!("{marker}: {}", truncate(note, 80))
                };
                findings.push(Finding::new(
                    DetectorId::TodoMarker,
                    tree.path(),
                    tree.lang(),
                    Span::new(line_no, column, line_no, column),
                    message,
                ));
            }
        }
        findings
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max - 3).collect();
    format!("{cut}...")
}

// ============================================================================
// Commented-out code
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct CommentedCode;

impl CommentedCode {
    /// Runs of non-doc comments on adjacent lines
    fn groups<'t>(comments: &'t [Comment]) -> Vec<Vec<&'t Comment>> {
        let mut groups: Vec<Vec<&Comment>> = Vec::new();
        for comment in comments.iter().filter(|c| !c.is_doc) {
            match groups.last_mut() {
                Some(group)
                    if group
                        .last()
                        .is_some_and(|prev| comment.span.start_line <= end_of(prev).0 + 1) =>
                {
                    group.push(comment)
                }
                _ => groups.push(vec![comment]),
            }
        }
        groups
    }

    fn is_documentation(lines: &[String]) -> bool {
        lines.iter().any(|line| {
            let lower = line.to_lowercase();
            DOC_PATTERNS.iter().any(|p| lower.contains(p)) || is_sentence(line)
        })
    }

    pub fn looks_like_code(text: &str) -> bool {
        if text.len() < MIN_CODE_LENGTH {
            return false;
        }
        if CODE_PATTERN.find_iter(text).count() < MIN_CODE_MATCHES {
            return false;
        }
        text.lines().map(str::trim).any(|line| {
            line.ends_with([';', '{', '}', ')', ','])
                || line.contains(" = ")
                || line.contains(":=")
                || CODE_LINE_START.is_match(line)
        })
    }
}

/// Last line and column holding comment text
///
/// Line comments may end at column 1 of the following line.
fn end_of(comment: &Comment) -> (usize, usize) {
    let span = comment.span;
    if span.end_column == 1 && span.end_line > span.start_line {
        let width = comment.text.lines().last().map_or(0, |l| l.chars().count());
        let column = if span.end_line - 1 == span.start_line {
            span.start_column + width
        } else {
            width + 1
        };
        (span.end_line - 1, column)
    } else {
        (span.end_line, span.end_column)
    }
}

/// Capitalized prose ending in a period
fn is_sentence(line: &str) -> bool {
    let starts_upper = line.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if !starts_upper || !line.ends_with('.') {
        return false;
    }
    let words: Vec<&str> = WORD.find_iter(line).map(|m| m.as_str()).collect();
    let letters: usize = words.iter().map(|w| w.len()).sum();
    words.len() > 3 && letters as f64 / line.len() as f64 > 0.5
}

impl Detector for CommentedCode {
    fn id(&self) -> DetectorId {
        DetectorId::CommentedCode
    }

    fn detect(&self, tree: &dyn StructuralTree, _ctx: &DetectContext<'_>) -> Vec<Finding> {
        Self::groups(tree.comments())
            .into_iter()
            .filter_map(|group| {
                let first = group.first()?;
                let last = group.last()?;
                let lines: Vec<String> = group.iter().flat_map(|c| strip_markers(&c.text)).collect();
                if Self::is_documentation(&lines) {
                    return None;
                }
                let text = lines.join("\n");
                if !Self::looks_like_code(&text) {
                    return None;
                }
                let (end_line, end_column) = end_of(last);
                let span = Span::new(
                    first.span.start_line,
                    first.span.start_column,
                    end_line,
                    end_column,
                );
                Some(Finding::new(
                    DetectorId::CommentedCode,
                    tree.path(),
                    tree.lang(),
                    span,
                    format!("commented-out code ({} lines)", span.line_count()),
                ))
            })
            .collect()
    }
}
