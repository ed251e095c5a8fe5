//! The common structural model every parser backend lowers into
//!
//! Detectors only ever see a [`StructuralTree`]: declarations, statements,
//! comments, numeric literals and a handful of notable constructs, plus line
//! and span text lookup. Backends differ in how faithfully they fill it,
//! which is reported through [`StructuralTree::confidence`].

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::lang::Lang;
use crate::model::{Confidence, Span};

use super::grammar;

/// Declaration kinds shared across languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Function,
    Method,
    Struct,
    Class,
    Enum,
    Trait,
    Interface,
    Impl,
    Constant,
    Static,
    TypeAlias,
    Module,
}

impl DeclKind {
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }

    /// Types whose size (members and fields) is measured
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Self::Struct | Self::Class | Self::Enum | Self::Trait | Self::Interface
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Struct => "struct",
            Self::Class => "class",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Interface => "interface",
            Self::Impl => "impl block",
            Self::Constant => "constant",
            Self::Static => "static",
            Self::TypeAlias => "type alias",
            Self::Module => "module",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// A named declaration with its precomputed metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub visibility: Visibility,
    pub span: Span,
    /// Attached documentation, `None` when absent
    pub doc: Option<String>,
    pub params: usize,
    /// Cyclomatic complexity: 1 + branch points
    pub complexity: usize,
    pub nesting_depth: usize,
    pub line_count: usize,
    pub member_count: usize,
    pub field_count: usize,
    /// Owning type for methods and impl members
    pub parent: Option<String>,
    /// Test function or declaration inside a test-only module
    pub in_test: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: DeclKind, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility: Visibility::Private,
            span,
            doc: None,
            params: 0,
            complexity: 1,
            nesting_depth: 0,
            line_count: span.line_count(),
            member_count: 0,
            field_count: 0,
            parent: None,
            in_test: false,
        }
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StmtKind {
    Branch,
    Loop,
    Match,
    Return,
    Binding,
    Expression,
    Other,
}

/// One statement inside a function body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub span: Span,
    pub kind: StmtKind,
    pub text: String,
    /// Identifiers become `ID`, strings `STR`, numbers `NUM`
    pub tokens: Vec<String>,
    /// Name of the enclosing function
    pub function: Option<String>,
    /// Index of the enclosing function in [`StructuralTree::declarations`]
    pub scope: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub span: Span,
    pub text: String,
    pub is_doc: bool,
}

/// A numeric literal in code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericLiteral {
    pub span: Span,
    pub raw: String,
    pub value: Option<f64>,
    /// Part of a named constant, enum discriminant or attribute
    pub in_constant: bool,
}

/// Constructs some detectors look for directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstructKind {
    UnsafeBlock,
    /// `unsafe fn`, `unsafe impl`, `unsafe trait`
    UnsafeItem,
    /// Free call; `name` is the callee path as written
    Call { name: String },
    /// `.name(...)`
    MethodCall { name: String },
    /// `name!(...)`
    Macro { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Construct {
    #[serde(flatten)]
    pub kind: ConstructKind,
    pub span: Span,
    pub scope: Option<usize>,
    pub in_test: bool,
}

/// Capability set every parser backend exposes to detectors
pub trait StructuralTree: Send {
    fn path(&self) -> &Path;
    fn lang(&self) -> Lang;
    fn line_count(&self) -> usize;
    fn confidence(&self) -> Confidence;

    fn declarations(&self) -> &[Declaration];
    fn statements(&self) -> &[Statement];
    fn comments(&self) -> &[Comment];
    fn literals(&self) -> &[NumericLiteral];
    fn constructs(&self) -> &[Construct];

    /// Text of a 1-based line, without its terminator
    fn line(&self, line: usize) -> Option<&str>;

    /// Source text covered by `span`
    fn text(&self, span: Span) -> Option<&str>;
}

/// The lowered tree all backends produce
#[derive(Debug, Clone)]
pub struct SourceTree {
    path: PathBuf,
    lang: Lang,
    confidence: Confidence,
    source: String,
    line_starts: Vec<usize>,
    pub(crate) declarations: Vec<Declaration>,
    pub(crate) statements: Vec<Statement>,
    pub(crate) comments: Vec<Comment>,
    pub(crate) literals: Vec<NumericLiteral>,
    pub(crate) constructs: Vec<Construct>,
}

impl SourceTree {
    pub fn new(path: &Path, lang: Lang, source: String, confidence: Confidence) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            path: path.to_path_buf(),
            lang,
            confidence,
            source,
            line_starts,
            declarations: Vec::new(),
            statements: Vec::new(),
            comments: Vec::new(),
            literals: Vec::new(),
            constructs: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Byte offset of a 1-based line/column pair
    fn offset(&self, line: usize, column: usize) -> Option<usize> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        Some((start + column.saturating_sub(1)).min(self.source.len()))
    }

    /// Innermost callable declaration covering `line`
    pub(crate) fn scope_at(&self, line: usize) -> Option<usize> {
        self.declarations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.kind.is_callable() && d.span.contains_line(line))
            .min_by_key(|(_, d)| d.span.line_count())
            .map(|(idx, _)| idx)
    }

    /// Sort everything into source order and settle derived fields
    ///
    /// Declarations are sorted first, so statement and construct scopes are
    /// recomputed from spans afterwards rather than trusted from the backend.
    pub(crate) fn finish(&mut self) {
        self.declarations
            .sort_by_key(|d| (d.span.start_line, d.span.start_column, d.span.end_line));
        aggregate_type_members(&mut self.declarations);

        self.statements
            .sort_by_key(|s| (s.span.start_line, s.span.start_column));
        for idx in 0..self.statements.len() {
            let scope = self.scope_at(self.statements[idx].span.start_line);
            let stmt = &mut self.statements[idx];
            stmt.scope = scope;
            stmt.function = scope.map(|i| self.declarations[i].name.clone());
        }

        for idx in 0..self.constructs.len() {
            let line = self.constructs[idx].span.start_line;
            let scope = self.scope_at(line);
            let in_test = scope.is_some_and(|i| self.declarations[i].in_test);
            let construct = &mut self.constructs[idx];
            construct.scope = scope;
            construct.in_test |= in_test;
        }

        self.constructs
            .sort_by_key(|c| (c.span.start_line, c.span.start_column));
        self.comments.sort_by_key(|c| (c.span.start_line, c.span.start_column));
        self.literals
            .sort_by_key(|l| (l.span.start_line, l.span.start_column));
    }
}

impl StructuralTree for SourceTree {
    fn path(&self) -> &Path {
        &self.path
    }

    fn lang(&self) -> Lang {
        self.lang
    }

    fn line_count(&self) -> usize {
        if self.source.is_empty() {
            0
        } else if self.source.ends_with('\n') {
            self.line_starts.len() - 1
        } else {
            self.line_starts.len()
        }
    }

    fn confidence(&self) -> Confidence {
        self.confidence
    }

    fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    fn statements(&self) -> &[Statement] {
        &self.statements
    }

    fn comments(&self) -> &[Comment] {
        &self.comments
    }

    fn literals(&self) -> &[NumericLiteral] {
        &self.literals
    }

    fn constructs(&self) -> &[Construct] {
        &self.constructs
    }

    fn line(&self, line: usize) -> Option<&str> {
        if line > self.line_count() {
            return None;
        }
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.source.len());
        self.source
            .get(start..end)
            .map(|l| l.trim_end_matches(['\n', '\r']))
    }

    fn text(&self, span: Span) -> Option<&str> {
        let start = self.offset(span.start_line, span.start_column)?;
        let end = self.offset(span.end_line, span.end_column)?;
        self.source.get(start..end.max(start))
    }
}

/// Fold methods from `impl` blocks and receiver methods into their types
fn aggregate_type_members(decls: &mut [Declaration]) {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for decl in decls.iter() {
        match (&decl.kind, &decl.parent) {
            (DeclKind::Impl, _) => bump(&mut counts, &decl.name, decl.member_count),
            // Methods declared outside their type (Go receivers)
            (DeclKind::Method, Some(parent)) => {
                let enclosed = decls.iter().any(|t| {
                    (t.kind.is_type() || t.kind == DeclKind::Impl)
                        && t.span.contains_line(decl.span.start_line)
                });
                if !enclosed {
                    bump(&mut counts, parent, 1);
                }
            }
            _ => {}
        }
    }
    for decl in decls.iter_mut().filter(|d| d.kind.is_type()) {
        if let Some((_, extra)) = counts.iter().find(|(name, _)| *name == decl.name) {
            decl.member_count += extra;
        }
    }
}

fn bump(counts: &mut Vec<(String, usize)>, name: &str, n: usize) {
    match counts.iter_mut().find(|(existing, _)| existing == name) {
        Some((_, count)) => *count += n,
        None => counts.push((name.to_string(), n)),
    }
}

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        (?P<str>"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)+'|`[^`]*`)
        |(?P<num>\b(?:0[xob][0-9a-fA-F_]+|\d[\d_]*(?:\.\d[\d_]*)?(?:[eE][+-]?\d+)?)(?:[a-zA-Z_]\w*)?\b)
        |(?P<id>[A-Za-z_][A-Za-z0-9_]*)
        |(?P<punct>::|->|=>|==|!=|<=|>=|&&|\|\||[^\sA-Za-z0-9_])
        "#,
    )
    .expect("token regex is valid")
});

/// Normalize statement text into comparable tokens
///
/// Whitespace is dropped, identifiers become `ID`, string literals `STR`
/// and numbers `NUM`. Keywords and punctuation are kept verbatim.
pub fn normalize_tokens(text: &str, lang: Lang) -> Vec<String> {
    let keywords = grammar::keywords(lang);
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            if caps.name("str").is_some() {
                Some("STR".to_string())
            } else if caps.name("num").is_some() {
                Some("NUM".to_string())
            } else if let Some(id) = caps.name("id") {
                let word = id.as_str();
                if keywords.contains(&word) {
                    Some(word.to_string())
                } else {
                    Some("ID".to_string())
                }
            } else {
                caps.name("punct").map(|p| p.as_str().to_string())
            }
        })
        .collect()
}

static TYPE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[iu](?:8|16|32|64|128|size)|f32|f64|[lLfFdDn])$")
        .expect("suffix regex is valid")
});

/// Integer suffixes only; `d` and `f` are hex digits
static RADIX_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[iu](?:8|16|32|64|128|size)|[lLn])$").expect("suffix regex is valid")
});

/// Parse a numeric literal as written in source
///
/// Underscores and type suffixes (`u64`, `f32`, `L`, `n`) are ignored.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        let decimal = TYPE_SUFFIX.replace(&lower, "");
        return decimal.parse::<f64>().ok();
    };
    let digits = RADIX_SUFFIX.replace(digits, "");
    i64::from_str_radix(&digits, radix).ok().map(|v| v as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_normalize_identifiers_and_literals() {
        let a = normalize_tokens("let total = price * 3 + \"tax\";", Lang::Rust);
        let b = normalize_tokens("let   sum = cost * 7 + \"vat\" ;", Lang::Rust);
        assert_eq!(a, b);
        assert_eq!(a[0], "let");
        assert!(a.contains(&"NUM".to_string()));
        assert!(a.contains(&"STR".to_string()));
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("1_000"), Some(1000.0));
        assert_eq!(parse_number("0xFF"), Some(255.0));
        assert_eq!(parse_number("3.5f32"), Some(3.5));
        assert_eq!(parse_number("10u8"), Some(10.0));
        assert_eq!(parse_number("3600u64"), Some(3600.0));
        assert_eq!(parse_number("42i32"), Some(42.0));
        assert_eq!(parse_number("3.75f32"), Some(3.75));
        assert_eq!(parse_number("2.5f64"), Some(2.5));
        assert_eq!(parse_number("0xFFu8"), Some(255.0));
        assert_eq!(parse_number("0xDF"), Some(223.0));
        assert_eq!(parse_number("0b1010usize"), Some(10.0));
        assert_eq!(parse_number("1.5e3"), Some(1500.0));
        assert_eq!(parse_number("10n"), Some(10.0));
        assert_eq!(parse_number("2.5e3"), Some(2500.0));
        assert_eq!(parse_number("100L"), Some(100.0));
    }

    #[test]
    fn test_line_and_span_lookup() {
        let tree = SourceTree::new(
            Path::new("a.rs"),
            Lang::Rust,
            "fn a() {\n    b();\n}\n".to_string(),
            Confidence::High,
        );
        assert_eq!(tree.line_count(), 3);
        assert_eq!(tree.line(2), Some("    b();"));
        assert_eq!(tree.line(4), None);
        assert_eq!(tree.line(0), None);
        assert_eq!(tree.text(Span::new(2, 5, 2, 9)), Some("b();"));
    }

    #[test]
    fn test_impl_methods_fold_into_struct() {
        let mut decls = vec![
            Declaration::new("Widget", DeclKind::Struct, Span::lines(1, 3)),
            Declaration {
                member_count: 4,
                ..Declaration::new("Widget", DeclKind::Impl, Span::lines(5, 30))
            },
        ];
        aggregate_type_members(&mut decls);
        assert_eq!(decls[0].member_count, 4);
    }
}
