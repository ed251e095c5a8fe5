//! Line-oriented fallback backend
//!
//! Used for languages whose grammar is unavailable or whose bridge failed to
//! start. Strings and comments are masked out first, then declarations are
//! found with per-language patterns and their bodies delimited by brace
//! matching (or indentation for Python). Everything it produces carries
//! [`Confidence::Low`].

use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::ParseError;
use crate::lang::Lang;
use crate::model::{BackendKind, Confidence, FileDescriptor, Span};

use super::native::is_doc_comment;
use super::tree::{
    normalize_tokens, parse_number, Comment, Construct, ConstructKind, DeclKind, Declaration,
    NumericLiteral, SourceTree, Statement, StmtKind, StructuralTree, Visibility,
};
use super::{decode_source, Parser};

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicParser;

impl Parser for HeuristicParser {
    fn backend(&self) -> BackendKind {
        BackendKind::Heuristic
    }

    fn parse(
        &self,
        file: &FileDescriptor,
        source: &[u8],
    ) -> Result<Box<dyn StructuralTree>, ParseError> {
        let text = decode_source(source)?;
        let tree = parse_source(&file.path, file.lang, text)?;
        Ok(Box::new(tree))
    }
}

/// Build a low-confidence tree for one file
pub fn parse_source(path: &Path, lang: Lang, text: &str) -> Result<SourceTree, ParseError> {
    let masked = mask(text, lang);
    if lang.uses_braces() {
        check_braces(&masked)?;
    }

    let scan = Scan::new(lang, text, &masked);
    let mut tree = SourceTree::new(path, lang, text.to_string(), Confidence::Low);
    tree.comments = scan.comments.clone();
    let found = scan.declarations();
    tree.statements = scan.statements(&found);
    tree.literals = scan.literals(&found);
    if lang == Lang::Rust {
        tree.constructs = scan.constructs();
    }
    tree.declarations = found.into_iter().map(|f| f.decl).collect();
    tree.finish();
    Ok(tree)
}

// ============================================================================
// Masking
// ============================================================================

/// Source text with comments and string contents blanked out
///
/// Byte offsets are preserved, so positions found in `code` are positions
/// in the original source.
pub(crate) struct Masked {
    /// Comments and string contents replaced by spaces
    pub code: String,
    /// Only comments replaced by spaces
    pub stripped: String,
    /// Byte ranges of every comment
    pub comments: Vec<(usize, usize)>,
    line_starts: Vec<usize>,
}

impl Masked {
    /// 1-based line and column of a byte offset
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line.saturating_sub(1)];
        (line.max(1), offset - start + 1)
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.line_starts.get(line).copied().unwrap_or(self.code.len())
    }
}

/// Blank comments and string contents for `lang`
pub(crate) fn mask(text: &str, lang: Lang) -> Masked {
    let bytes = text.as_bytes();
    let mut code = bytes.to_vec();
    let mut stripped = bytes.to_vec();
    let mut comments = Vec::new();

    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = comment_end(bytes, i, lang) {
            blank(&mut code, i, end);
            blank(&mut stripped, i, end);
            comments.push((i, end));
            i = end;
        } else if let Some(literal) = string_at(text, i, lang) {
            blank(&mut code, literal.content.0, literal.content.1);
            i = literal.end.max(i + 1);
        } else {
            i += 1;
        }
    }

    let line_starts = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    Masked {
        code: String::from_utf8_lossy(&code).into_owned(),
        stripped: String::from_utf8_lossy(&stripped).into_owned(),
        comments,
        line_starts,
    }
}

/// Comments of a source file, found without a grammar
pub(crate) fn scan_comments(text: &str, lang: Lang) -> Vec<Comment> {
    let masked = mask(text, lang);
    let code_lines: Vec<&str> = masked.code.split('\n').collect();
    collect_comments(text, lang, &masked, &code_lines)
}

fn blank(buf: &mut [u8], start: usize, end: usize) {
    let end = end.min(buf.len());
    for b in buf.iter_mut().take(end).skip(start) {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn comment_end(bytes: &[u8], i: usize, lang: Lang) -> Option<usize> {
    let rest = &bytes[i..];
    let line_comment = match lang {
        Lang::Python => rest.starts_with(b"#"),
        _ => rest.starts_with(b"//"),
    };
    if line_comment {
        return Some(find_from(bytes, i, b"\n").unwrap_or(bytes.len()));
    }
    if lang != Lang::Python && rest.starts_with(b"/*") {
        return Some(find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2));
    }
    None
}

struct Literal {
    content: (usize, usize),
    end: usize,
}

fn string_at(text: &str, i: usize, lang: Lang) -> Option<Literal> {
    let bytes = text.as_bytes();
    let c = bytes[i];
    let prev = i.checked_sub(1).map(|p| bytes[p]);
    match (lang, c) {
        (Lang::Python, b'"' | b'\'') | (Lang::Java, b'"') if bytes[i..].starts_with(&[c, c, c]) => {
            Some(delimited(bytes, i, 3, &[c, c, c]))
        }
        (Lang::Python, b'"' | b'\'') => Some(quoted(bytes, i, c, false)),
        (Lang::Rust, b'r') if prev.map_or(true, |p| !is_ident(p) || p == b'b') => raw_string(bytes, i),
        (Lang::Rust, b'"') => Some(quoted(bytes, i, b'"', true)),
        (_, b'"') => Some(quoted(bytes, i, b'"', false)),
        (Lang::JavaScript | Lang::TypeScript, b'\'') => Some(quoted(bytes, i, b'\'', false)),
        (Lang::JavaScript | Lang::TypeScript, b'`') => Some(quoted(bytes, i, b'`', true)),
        (Lang::Go, b'`') => Some(delimited(bytes, i, 1, b"`")),
        (Lang::Rust | Lang::Go | Lang::Java, b'\'') => char_literal(text, i),
        _ => None,
    }
}

/// Literal closed by `close` with no escapes
fn delimited(bytes: &[u8], i: usize, open_len: usize, close: &[u8]) -> Literal {
    let start = i + open_len;
    match find_from(bytes, start, close) {
        Some(p) => Literal {
            content: (start, p),
            end: p + close.len(),
        },
        None => Literal {
            content: (start, bytes.len()),
            end: bytes.len(),
        },
    }
}

fn quoted(bytes: &[u8], i: usize, quote: u8, multiline: bool) -> Literal {
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => {
                return Literal {
                    content: (i + 1, j),
                    end: j + 1,
                }
            }
            b'\n' if !multiline => {
                return Literal {
                    content: (i + 1, j),
                    end: j,
                }
            }
            _ => j += 1,
        }
    }
    Literal {
        content: (i + 1, bytes.len()),
        end: bytes.len(),
    }
}

/// `r"..."`, `r#"..."#`
fn raw_string(bytes: &[u8], i: usize) -> Option<Literal> {
    let mut j = i + 1;
    let mut hashes = 0;
    while bytes.get(j) == Some(&b'#') {
        hashes += 1;
        j += 1;
    }
    if bytes.get(j) != Some(&b'"') {
        return None;
    }
    let mut close = vec![b'"'];
    close.extend(std::iter::repeat(b'#').take(hashes));
    Some(delimited(bytes, j, 1, &close))
}

/// Character or rune literal; lifetimes (`'a`) are left alone
fn char_literal(text: &str, i: usize) -> Option<Literal> {
    let bytes = text.as_bytes();
    if bytes.get(i + 1) == Some(&b'\\') {
        let close = find_from(bytes, i + 2, b"'")?;
        return (close - i <= 12).then_some(Literal {
            content: (i + 1, close),
            end: close + 1,
        });
    }
    let ch = text.get(i + 1..)?.chars().next()?;
    let after = i + 1 + ch.len_utf8();
    (ch != '\'' && bytes.get(after) == Some(&b'\'')).then_some(Literal {
        content: (i + 1, after),
        end: after + 1,
    })
}

fn check_braces(masked: &Masked) -> Result<(), ParseError> {
    let mut open = Vec::new();
    for (i, b) in masked.code.bytes().enumerate() {
        match b {
            b'{' => open.push(i),
            b'}' if open.pop().is_none() => {
                let (line, column) = masked.position(i);
                return Err(ParseError::Syntax {
                    line,
                    column,
                    message: "unmatched `}`".to_string(),
                });
            }
            _ => {}
        }
    }
    match open.last() {
        Some(&i) => {
            let (line, column) = masked.position(i);
            Err(ParseError::Syntax {
                line,
                column,
                message: "unclosed `{`".to_string(),
            })
        }
        None => Ok(()),
    }
}

/// Index of the `}` closing the `{` at `open`
///
/// Expects masked code, so braces inside strings and comments are already gone.
fn matching_brace(code: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in code.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Declaration patterns
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Callable,
    /// Function value bound to a name; may capture its own parameters
    Arrow,
    Type,
    Constant,
    /// Only recognised directly inside a type body
    Member,
    MemberConstant,
}

struct Pattern {
    role: Role,
    re: Regex,
}

fn pattern(role: Role, re: &str) -> Pattern {
    Pattern {
        role,
        re: Regex::new(re).expect("declaration regex is valid"),
    }
}

static RUST_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            Role::Callable,
            r#"^\s*(?P<vis>pub(?:\s*\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+(?:"\s*"\s+)?)?fn\s+(?P<name>[A-Za-z_]\w*)"#,
        ),
        pattern(
            Role::Type,
            r"^\s*(?P<vis>pub(?:\s*\([^)]*\))?\s+)?(?:unsafe\s+)?(?:auto\s+)?(?P<kw>struct|union|enum|trait|type|mod)\s+(?P<name>[A-Za-z_]\w*)",
        ),
        pattern(
            Role::Type,
            r"^\s*(?:unsafe\s+)?(?P<kw>impl)\b(?:\s*<[^{]*?>)?\s+(?:(?P<trait>[^{]+?)\s+for\s+)?(?:dyn\s+)?(?:[A-Za-z_]\w*::)*(?P<name>[A-Za-z_]\w*)",
        ),
        pattern(
            Role::Constant,
            r"^\s*(?P<vis>pub(?:\s*\([^)]*\))?\s+)?(?P<kw>const|static)\s+(?:mut\s+)?(?P<name>[A-Za-z_]\w*)\s*:",
        ),
    ]
});

static GO_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            Role::Callable,
            r"^func\s*(?:\((?P<recv>[^)]*)\)\s*)?(?P<name>[A-Za-z_]\w*)",
        ),
        pattern(
            Role::Type,
            r"^\s*type\s+(?P<name>[A-Za-z_]\w*)(?:\[[^\]]*\])?\s*=?\s*(?P<kw>struct|interface)?\b",
        ),
        pattern(Role::Constant, r"^const\s+(?P<name>[A-Za-z_]\w*)"),
    ]
});

static PYTHON_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            Role::Callable,
            r"^[ \t]*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)",
        ),
        pattern(Role::Type, r"^[ \t]*(?P<kw>class)\s+(?P<name>[A-Za-z_]\w*)"),
        pattern(
            Role::Constant,
            r"^(?P<name>[A-Z][A-Z0-9_]*)\s*(?::[^=]*)?=(?:[^=]|$)",
        ),
    ]
});

static JS_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            Role::Callable,
            r"^\s*(?P<vis>export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\b\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
        ),
        pattern(
            Role::Type,
            r"^\s*(?P<vis>export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?P<kw>class|interface|enum)\s+(?P<name>[A-Za-z_$][\w$]*)",
        ),
        pattern(
            Role::Type,
            r"^\s*(?P<vis>export\s+)?(?:declare\s+)?(?P<kw>type)\s+(?P<name>[A-Za-z_$][\w$]*)(?:\s*<[^=]*>)?\s*=",
        ),
        pattern(
            Role::Arrow,
            r"^\s*(?P<vis>export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|(?:\((?P<params>[^)]*)\)|(?P<single>[A-Za-z_$][\w$]*))\s*(?::[^=]+?)?=>)",
        ),
        pattern(
            Role::Constant,
            r"^(?P<vis>export\s+)?const\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=",
        ),
        pattern(
            Role::Member,
            r"^\s*(?P<mods>(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*)\*?(?P<name>#?[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\(",
        ),
    ]
});

static JAVA_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            Role::Type,
            r"^\s*(?P<mods>(?:(?:public|private|protected|static|final|abstract|sealed|non-sealed|strictfp)\s+)*)(?P<kw>class|interface|enum|record|@interface)\s+(?P<name>[A-Za-z_$][\w$]*)",
        ),
        pattern(
            Role::MemberConstant,
            r"^\s*(?P<mods>(?:(?:public|private|protected|static|final|transient|volatile)\s+)+)[\w.$\[\]?]+(?:\s*<[^>]*>)?\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?:=|;)",
        ),
        pattern(
            Role::Member,
            r"^\s*(?P<mods>(?:(?:public|private|protected|static|final|abstract|synchronized|native|default|strictfp)\s+)*)(?:<[^>]*>\s+)?(?:[\w.$]+(?:<[^()]*?>)?(?:\[\])*\s+)?(?P<name>[A-Za-z_$][\w$]*)\s*\(",
        ),
    ]
});

fn patterns(lang: Lang) -> &'static [Pattern] {
    match lang {
        Lang::Rust => &RUST_PATTERNS,
        Lang::Go => &GO_PATTERNS,
        Lang::Python => &PYTHON_PATTERNS,
        Lang::JavaScript | Lang::TypeScript => &JS_PATTERNS,
        Lang::Java => &JAVA_PATTERNS,
    }
}

/// Words the member patterns must not mistake for method names
const NOT_A_MEMBER: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "throw", "synchronized", "super",
    "this", "function", "else", "do", "try", "typeof", "await",
];

static GO_CONST_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+(?P<name>[A-Za-z_]\w*)\b").expect("const entry regex is valid"));

static RUST_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?[A-Za-z_]\w*\s*:[^:]").expect("field regex is valid")
});

static GO_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<names>[A-Za-z_]\w*(?:\s*,\s*[A-Za-z_]\w*)*)\s+\S|^\s*\*?[A-Za-z_][\w.]*\s*$")
        .expect("field regex is valid")
});

static GO_INTERFACE_METHOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[A-Za-z_]\w*\s*\(").expect("method regex is valid"));

static JAVA_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|final|transient|volatile)\s+)*[\w.$\[\]?]+(?:\s*<[^>]*>)?\s+[A-Za-z_$][\w$]*\s*(?:=|;)",
    )
    .expect("field regex is valid")
});

static JS_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|readonly|declare|override)\s+)*#?[A-Za-z_$][\w$]*[?!]?\s*(?::[^=(]*)?(?:=|;|$)",
    )
    .expect("field regex is valid")
});

static PY_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[A-Za-z_]\w*\s*(?::[^=]*)?=(?:[^=]|$)").expect("field regex is valid")
});

// ============================================================================
// Scan
// ============================================================================

/// A declaration plus the layout facts later passes need
struct Found {
    decl: Declaration,
    /// 0-based line of the body opener and exclusive end line
    body: Option<(usize, usize)>,
    /// Brace depth (or indentation) of lines directly in the body
    member_depth: usize,
    exported: bool,
    trait_impl: bool,
    mods: String,
}

impl Found {
    fn contains(&self, line: usize) -> bool {
        self.body.is_some_and(|(open, close)| open < line && line < close)
    }
}

struct Scan<'a> {
    lang: Lang,
    masked: &'a Masked,
    code_lines: Vec<&'a str>,
    stripped_lines: Vec<&'a str>,
    /// Brace depth at the start of each line
    depth: Vec<usize>,
    comments: Vec<Comment>,
}

impl<'a> Scan<'a> {
    fn new(lang: Lang, text: &'a str, masked: &'a Masked) -> Self {
        let code_lines: Vec<&str> = masked.code.split('\n').collect();
        let stripped_lines = masked.stripped.split('\n').collect();
        let mut depth = Vec::with_capacity(code_lines.len());
        let mut current = 0usize;
        for line in &code_lines {
            depth.push(current);
            for b in line.bytes() {
                match b {
                    b'{' => current += 1,
                    b'}' => current = current.saturating_sub(1),
                    _ => {}
                }
            }
        }
        let comments = collect_comments(text, lang, masked, &code_lines);
        Self {
            lang,
            masked,
            code_lines,
            stripped_lines,
            depth,
            comments,
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declarations(&self) -> Vec<Found> {
        let mut found: Vec<Found> = Vec::new();
        let mut in_const_block = false;
        for (l, line) in self.code_lines.iter().enumerate() {
            if self.lang == Lang::Go {
                let trimmed = line.trim_start();
                if line.starts_with("const") && trimmed.trim_start_matches("const").trim_start().starts_with('(') {
                    in_const_block = true;
                    continue;
                }
                if in_const_block {
                    if line.starts_with(')') {
                        in_const_block = false;
                    } else if let Some(caps) = GO_CONST_ENTRY.captures(line) {
                        found.push(self.single_line(l, &caps, DeclKind::Constant));
                    }
                    continue;
                }
            }
            if let Some(hit) = self.match_line(l, line, &found) {
                found.push(hit);
            }
        }
        self.settle(&mut found);
        found
    }

    fn match_line(&self, l: usize, line: &str, found: &[Found]) -> Option<Found> {
        for pattern in patterns(self.lang) {
            let Some(caps) = pattern.re.captures(line) else {
                continue;
            };
            let name = caps.name("name").map_or("", |m| m.as_str());
            match pattern.role {
                Role::Member | Role::MemberConstant => {
                    if NOT_A_MEMBER.contains(&name) || !self.at_member_level(l, found) {
                        continue;
                    }
                    if pattern.role == Role::MemberConstant {
                        let mods = caps.name("mods").map_or("", |m| m.as_str());
                        if !(mods.contains("static") && mods.contains("final")) {
                            return None;
                        }
                        return Some(self.brace_decl(l, &caps, DeclKind::Constant, pattern.role));
                    }
                    return Some(self.brace_decl(l, &caps, DeclKind::Function, pattern.role));
                }
                Role::Constant if self.lang == Lang::Python => {
                    return Some(self.single_line(l, &caps, DeclKind::Constant));
                }
                Role::Constant => {
                    let kind = match caps.name("kw").map(|m| m.as_str()) {
                        Some("static") => DeclKind::Static,
                        _ => DeclKind::Constant,
                    };
                    return Some(self.brace_decl(l, &caps, kind, pattern.role));
                }
                Role::Type => {
                    let kind = type_kind(caps.name("kw").map(|m| m.as_str()));
                    return Some(self.layout_decl(l, &caps, kind, pattern.role));
                }
                Role::Callable | Role::Arrow => {
                    return Some(self.layout_decl(l, &caps, DeclKind::Function, pattern.role));
                }
            }
        }
        None
    }

    fn at_member_level(&self, l: usize, found: &[Found]) -> bool {
        innermost(found, l).is_some_and(|idx| {
            let container = &found[idx];
            container.decl.kind.is_type() && self.depth.get(l) == Some(&container.member_depth)
        })
    }

    fn layout_decl(&self, l: usize, caps: &Captures, kind: DeclKind, role: Role) -> Found {
        if self.lang == Lang::Python {
            self.indent_decl(l, caps, kind)
        } else {
            self.brace_decl(l, caps, kind, role)
        }
    }

    fn base_decl(&self, l: usize, caps: &Captures, kind: DeclKind, end: (usize, usize)) -> Found {
        let line = self.code_lines[l];
        let indent = indent_of(line);
        let name = caps.name("name").map_or("<anonymous>", |m| m.as_str());
        let span = Span::new(l + 1, indent + 1, end.0, end.1);
        let mut decl = Declaration::new(name, kind, span);
        let (attrs, doc) = self.leading_lines(l);
        decl.doc = doc;
        decl.in_test = attrs.iter().any(|a| a.contains("test") || a.contains("@Test"))
            || (kind == DeclKind::Module && name == "tests");

        let exported = match self.lang {
            Lang::Rust | Lang::JavaScript | Lang::TypeScript => caps.name("vis").is_some(),
            Lang::Go => name.chars().next().is_some_and(|c| c.is_uppercase()),
            Lang::Python => !name.starts_with('_'),
            Lang::Java => caps
                .name("mods")
                .is_some_and(|m| m.as_str().split_whitespace().any(|w| w == "public")),
        };
        if let Some(recv) = caps.name("recv") {
            decl.kind = DeclKind::Method;
            decl.parent = receiver_type(recv.as_str());
        }
        Found {
            decl,
            body: None,
            member_depth: 0,
            exported,
            trait_impl: caps.name("trait").is_some(),
            mods: caps.name("mods").map_or(String::new(), |m| m.as_str().to_string()),
        }
    }

    fn single_line(&self, l: usize, caps: &Captures, kind: DeclKind) -> Found {
        let end = (l + 1, self.code_lines[l].trim_end().len() + 1);
        self.base_decl(l, caps, kind, end)
    }

    fn brace_decl(&self, l: usize, caps: &Captures, kind: DeclKind, role: Role) -> Found {
        let line_start = self.masked.line_start(l);
        let from = line_start + caps.get(0).map_or(0, |m| m.end());
        let (end_offset, body) = self.brace_extent(from);
        let (end_line, end_col) = self.masked.position(end_offset.saturating_sub(1));
        let mut found = self.base_decl(l, caps, kind, (end_line, end_col + 1));

        if let Some((open, close)) = body {
            let open_line = self.masked.position(open).0 - 1;
            let close_line = self.masked.position(close).0 - 1;
            found.body = Some((open_line, close_line));
            found.member_depth = self.depth.get(open_line + 1).copied().unwrap_or(0);
        }
        if kind.is_callable() || role == Role::Member {
            found.decl.params = match (caps.name("params"), caps.name("single")) {
                (Some(params), _) => count_params(params.as_str(), self.lang),
                (None, Some(_)) => 1,
                _ => self.params_after(line_start + caps.name("name").map_or(0, |m| m.end())),
            };
            if let Some((open, close)) = body {
                let (complexity, nesting) = self.brace_metrics(&self.masked.code[open + 1..close]);
                found.decl.complexity = 1 + complexity;
                found.decl.nesting_depth = nesting;
            }
        }
        found
    }

    fn indent_decl(&self, l: usize, caps: &Captures, kind: DeclKind) -> Found {
        let indent = indent_of(self.code_lines[l]);
        let (header, end) = self.python_block(l, indent);
        let last = end.saturating_sub(1).max(l);
        let end_col = self.code_lines.get(last).map_or(1, |s| s.trim_end().len() + 1);
        let mut found = self.base_decl(l, caps, kind, (last + 1, end_col));
        found.body = Some((header, end));
        found.member_depth = (header + 1..end)
            .map(|k| self.code_lines[k])
            .find(|s| !s.trim().is_empty())
            .map_or(indent + 4, indent_of);
        found.decl.doc = self.python_docstring(header, end);

        if kind.is_callable() {
            let name_end = self.masked.line_start(l) + caps.name("name").map_or(0, |m| m.end());
            found.decl.params = self.params_after(name_end);
            let (complexity, nesting) = self.indent_metrics(header + 1, end, indent);
            found.decl.complexity = 1 + complexity;
            found.decl.nesting_depth = nesting;
        }
        found
    }

    /// Offset just past the declaration and its brace-delimited body
    fn brace_extent(&self, from: usize) -> (usize, Option<(usize, usize)>) {
        let code = self.masked.code.as_bytes();
        let newline_ends = matches!(self.lang, Lang::Go | Lang::JavaScript | Lang::TypeScript);
        let mut nesting = 0usize;
        let mut i = from;
        while i < code.len() {
            match code[i] {
                b'(' | b'[' => nesting += 1,
                b')' | b']' => nesting = nesting.saturating_sub(1),
                b'{' if nesting == 0 => {
                    let close = matching_brace(code, i).unwrap_or(code.len() - 1);
                    return (close + 1, Some((i, close)));
                }
                b';' if nesting == 0 => return (i + 1, None),
                b'\n' if nesting == 0 && newline_ends => return (i, None),
                _ => {}
            }
            i += 1;
        }
        (code.len(), None)
    }

    fn params_after(&self, from: usize) -> usize {
        let code = self.masked.code.as_bytes();
        let Some(open) = code
            .get(from..)
            .and_then(|rest| rest.iter().position(|&b| matches!(b, b'(' | b'{' | b';')))
            .map(|p| p + from)
            .filter(|&p| code[p] == b'(')
        else {
            return 0;
        };
        let mut depth = 0usize;
        for (offset, &b) in code[open..].iter().enumerate() {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return count_params(&self.masked.code[open + 1..open + offset], self.lang);
                    }
                }
                _ => {}
            }
        }
        0
    }

    /// Header end line and exclusive end of an indented block
    fn python_block(&self, l: usize, indent: usize) -> (usize, usize) {
        let n = self.code_lines.len();
        let header = (l..n.min(l + 20))
            .find(|&k| self.code_lines[k].trim_end().ends_with(':'))
            .unwrap_or(l);
        let mut last = header;
        for k in header + 1..n {
            let line = self.code_lines[k];
            if line.trim().is_empty() {
                continue;
            }
            if indent_of(line) <= indent {
                break;
            }
            last = k;
        }
        (header, last + 1)
    }

    fn python_docstring(&self, header: usize, end: usize) -> Option<String> {
        let first = (header + 1..end).find(|&k| !self.code_lines[k].trim().is_empty())?;
        let original = self.stripped_lines[first].trim();
        let body = original.trim_start_matches(['r', 'u', 'b', 'R', 'U', 'B']);
        if !(body.starts_with('"') || body.starts_with('\'')) {
            return None;
        }
        Some(body.trim_matches(|c| c == '"' || c == '\'').trim().to_string())
    }

    /// Attribute lines and doc comment directly above line `l`
    fn leading_lines(&self, l: usize) -> (Vec<&'a str>, Option<String>) {
        let mut attrs = Vec::new();
        let mut docs: Vec<&str> = Vec::new();
        let mut cur = l;
        while cur > 0 {
            let prev = cur - 1;
            let code = self.code_lines[prev].trim();
            let is_attr = match self.lang {
                Lang::Rust => code.starts_with("#["),
                _ => code.starts_with('@'),
            };
            if is_attr {
                attrs.push(self.stripped_lines[prev].trim());
                cur = prev;
                continue;
            }
            if !code.is_empty() {
                break;
            }
            let Some(comment) = self.comments.iter().rev().find(|c| c.span.end_line == prev + 1) else {
                break;
            };
            if !is_doc_comment(self.lang, &comment.text, true) {
                break;
            }
            docs.push(&comment.text);
            cur = comment.span.start_line - 1;
        }
        if self.lang == Lang::Python || docs.is_empty() {
            return (attrs, None);
        }
        docs.reverse();
        (attrs, Some(docs.join("\n")))
    }

    /// Methods, visibility and test scope depend on the enclosing declaration
    fn settle(&self, found: &mut [Found]) {
        for idx in 0..found.len() {
            let line = found[idx].decl.span.start_line - 1;
            let Some(parent) = innermost(&found[..idx], line) else {
                found[idx].decl.visibility = visibility(found[idx].exported);
                continue;
            };

            let container_kind = found[parent].decl.kind;
            let container_exported = found[parent].exported;
            let trait_impl = found[parent].trait_impl;
            let container_name = found[parent].decl.name.clone();
            let container_test = found[parent].decl.in_test;

            let member_of_type = container_kind.is_type() || container_kind == DeclKind::Impl;
            let this = &mut found[idx];
            this.decl.in_test |= container_test;
            if this.decl.kind.is_callable() && member_of_type {
                this.decl.kind = DeclKind::Method;
                this.decl.parent = Some(container_name);
            } else if member_of_type {
                this.decl.parent = Some(container_name);
            }

            let public = match (self.lang, member_of_type) {
                (_, false) => this.exported,
                (Lang::Rust, true) => match container_kind {
                    DeclKind::Trait => container_exported,
                    _ => this.exported && !trait_impl,
                },
                (Lang::Go, true) => this.exported,
                (Lang::Python, true) => container_exported && this.exported,
                (Lang::Java, true) => {
                    this.exported || (container_kind == DeclKind::Interface && container_exported)
                }
                (Lang::JavaScript | Lang::TypeScript, true) => {
                    let name = &this.decl.name;
                    container_exported
                        && !name.starts_with('#')
                        && !name.starts_with('_')
                        && !this.mods.contains("private")
                        && !this.mods.contains("protected")
                }
            };
            this.decl.visibility = visibility(public);

            if this.decl.kind == DeclKind::Method {
                found[parent].decl.member_count += 1;
            }
        }

        for idx in 0..found.len() {
            if found[idx].decl.kind.is_type() {
                let (fields, members) = self.count_body(&found[idx]);
                found[idx].decl.field_count = fields;
                found[idx].decl.member_count += members;
            }
        }
    }

    /// Fields and body-only members (Go interface methods) of a type
    fn count_body(&self, found: &Found) -> (usize, usize) {
        let Some((open, close)) = found.body else {
            return (0, 0);
        };
        let mut fields = 0;
        let mut members = 0;
        for l in open + 1..close {
            let line = self.code_lines[l];
            if line.trim().is_empty() {
                continue;
            }
            let at_member_level = match self.lang {
                Lang::Python => indent_of(line) == found.member_depth,
                _ => self.depth.get(l) == Some(&found.member_depth),
            };
            if !at_member_level {
                continue;
            }
            match (self.lang, found.decl.kind) {
                (Lang::Rust, DeclKind::Struct) if RUST_FIELD.is_match(line) => fields += 1,
                (Lang::Go, DeclKind::Struct) => {
                    if let Some(caps) = GO_FIELD.captures(line) {
                        fields += caps
                            .name("names")
                            .map_or(1, |names| names.as_str().split(',').count());
                    }
                }
                (Lang::Go, DeclKind::Interface) if GO_INTERFACE_METHOD.is_match(line) => members += 1,
                (Lang::Java, _) if JAVA_FIELD.is_match(line) && !line.contains('(') => fields += 1,
                (Lang::JavaScript | Lang::TypeScript, DeclKind::Class | DeclKind::Interface)
                    if JS_FIELD.is_match(line) =>
                {
                    fields += 1
                }
                (Lang::Python, DeclKind::Class) if PY_FIELD.is_match(line) => fields += 1,
                _ => {}
            }
        }
        (fields, members)
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Branch points and control nesting inside a brace body
    fn brace_metrics(&self, body: &str) -> (usize, usize) {
        let complexity = branch_re(self.lang).find_iter(body).count();

        let mut stack: Vec<bool> = Vec::new();
        let mut pending = false;
        let mut max_depth = 0;
        for m in CONTROL_SCAN.find_iter(body) {
            match m.as_str() {
                "{" => {
                    stack.push(pending);
                    pending = false;
                    let depth = stack.iter().filter(|c| **c).count();
                    max_depth = max_depth.max(depth);
                }
                "}" => {
                    stack.pop();
                }
                _ => pending = true,
            }
        }
        (complexity, max_depth)
    }

    fn indent_metrics(&self, start: usize, end: usize, base: usize) -> (usize, usize) {
        let mut complexity = 0;
        let mut stack: Vec<usize> = Vec::new();
        let mut max_depth = 0;
        for l in start..end.min(self.code_lines.len()) {
            let line = self.code_lines[l];
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            complexity += branch_re(self.lang).find_iter(line).count();

            let indent = indent_of(line);
            if indent <= base {
                break;
            }
            while stack.last().is_some_and(|&open| open >= indent) {
                stack.pop();
            }
            let word = first_word(trimmed);
            let opens = matches!(
                word,
                "if" | "for" | "while" | "try" | "with" | "match" | "async" | "elif" | "else"
                    | "except" | "finally"
            ) && trimmed.ends_with(':');
            if opens {
                stack.push(indent);
                max_depth = max_depth.max(stack.len());
            }
        }
        (complexity, max_depth)
    }

    // ------------------------------------------------------------------
    // Statements, literals, constructs
    // ------------------------------------------------------------------

    fn statements(&self, found: &[Found]) -> Vec<Statement> {
        let headers: BTreeSet<usize> = found.iter().map(|f| f.decl.span.start_line - 1).collect();
        let mut lines = BTreeSet::new();
        for f in found.iter().filter(|f| f.decl.kind.is_callable()) {
            if let Some((open, close)) = f.body {
                lines.extend((open + 1..close).filter(|l| !headers.contains(l)));
            }
        }

        lines
            .into_iter()
            .filter_map(|l| {
                let code = self.code_lines.get(l)?.trim();
                if code.chars().all(|c| "{}()[];,".contains(c) || c.is_whitespace()) {
                    return None;
                }
                let raw = self.stripped_lines[l];
                let text = raw.trim();
                let column = raw.len() - raw.trim_start().len() + 1;
                Some(Statement {
                    span: Span::new(l + 1, column, l + 1, column + text.len()),
                    kind: classify_line(code),
                    text: text.to_string(),
                    tokens: normalize_tokens(text, self.lang),
                    function: None,
                    scope: None,
                })
            })
            .collect()
    }

    fn literals(&self, found: &[Found]) -> Vec<NumericLiteral> {
        let constant_lines: Vec<(usize, usize)> = found
            .iter()
            .filter(|f| {
                matches!(
                    f.decl.kind,
                    DeclKind::Constant | DeclKind::Static | DeclKind::Enum
                )
            })
            .map(|f| (f.decl.span.start_line, f.decl.span.end_line))
            .collect();

        let mut out = Vec::new();
        for (l, line) in self.code_lines.iter().enumerate() {
            let trimmed = line.trim_start();
            let attribute_line = trimmed.starts_with("#[") || trimmed.starts_with('@');
            let in_constant = attribute_line
                || constant_lines
                    .iter()
                    .any(|&(start, end)| start <= l + 1 && l + 1 <= end);
            let bytes = line.as_bytes();
            for m in NUMBER.find_iter(line) {
                let before = &line[..m.start()];
                if before.ends_with('.') && !before.ends_with("..") {
                    continue;
                }
                let mut raw = m.as_str().to_string();
                let mut start = m.start();
                let prefix = before.trim_end();
                if prefix.ends_with('-') {
                    let lead = prefix[..prefix.len() - 1].trim_end();
                    let operand_before = lead
                        .bytes()
                        .last()
                        .is_some_and(|b| is_ident(b) || b == b')' || b == b']');
                    if !operand_before {
                        raw = format!("-{raw}");
                        start = prefix.len() - 1;
                    }
                }
                let array_len = prefix.ends_with(';')
                    && bytes.get(m.end()..).is_some_and(|rest| {
                        rest.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b']')
                    });
                let value = parse_number(raw.trim_start_matches('-'))
                    .map(|v| if raw.starts_with('-') { -v } else { v });
                out.push(NumericLiteral {
                    span: Span::new(l + 1, start + 1, l + 1, m.end() + 1),
                    raw,
                    value,
                    in_constant: in_constant || array_len,
                });
            }
        }
        out
    }

    fn constructs(&self) -> Vec<Construct> {
        let mut out = Vec::new();
        for (l, line) in self.code_lines.iter().enumerate() {
            let mut push = |column: usize, kind: ConstructKind| {
                out.push(Construct {
                    kind,
                    span: Span::new(l + 1, column + 1, l + 1, column + 1),
                    scope: None,
                    in_test: false,
                });
            };
            for m in UNSAFE_BLOCK.find_iter(line) {
                push(m.start(), ConstructKind::UnsafeBlock);
            }
            for m in UNSAFE_ITEM.find_iter(line) {
                push(m.start(), ConstructKind::UnsafeItem);
            }
            for caps in METHOD_CALL.captures_iter(line) {
                if let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) {
                    push(whole.start(), ConstructKind::MethodCall {
                        name: name.as_str().to_string(),
                    });
                }
            }
            for caps in MACRO_CALL.captures_iter(line) {
                if let Some(name) = caps.name("name") {
                    push(name.start(), ConstructKind::Macro {
                        name: name.as_str().to_string(),
                    });
                }
            }
            for caps in FREE_CALL.captures_iter(line) {
                let Some(path) = caps.name("path") else {
                    continue;
                };
                let before = line[..path.start()].trim_end();
                let is_free = !before.ends_with('.')
                    && !before.ends_with("fn")
                    && !RUST_NOT_CALLS.contains(&path.as_str());
                if is_free {
                    push(path.start(), ConstructKind::Call {
                        name: path.as_str().to_string(),
                    });
                }
            }
        }
        out
    }
}

fn innermost(found: &[Found], line: usize) -> Option<usize> {
    found
        .iter()
        .enumerate()
        .filter(|(_, f)| f.contains(line))
        .max_by_key(|(_, f)| f.decl.span.start_line)
        .map(|(idx, _)| idx)
}

fn visibility(public: bool) -> Visibility {
    if public {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn type_kind(keyword: Option<&str>) -> DeclKind {
    match keyword {
        Some("struct" | "union") => DeclKind::Struct,
        Some("enum") => DeclKind::Enum,
        Some("trait") => DeclKind::Trait,
        Some("interface" | "@interface") => DeclKind::Interface,
        Some("class" | "record") => DeclKind::Class,
        Some("impl") => DeclKind::Impl,
        Some("mod") => DeclKind::Module,
        _ => DeclKind::TypeAlias,
    }
}

fn receiver_type(recv: &str) -> Option<String> {
    let last = recv.split_whitespace().last()?;
    let ty = last
        .trim_start_matches('*')
        .split('[')
        .next()
        .unwrap_or_default();
    (!ty.is_empty()).then(|| ty.to_string())
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn first_word(line: &str) -> &str {
    line.split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("")
}

/// Split a parameter list on top-level commas and count the real parameters
fn count_params(list: &str, lang: Lang) -> usize {
    let mut params: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut prev = ' ';
    for c in list.chars() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '>' if prev != '-' && prev != '=' => depth -= 1,
            ',' if depth <= 0 => {
                params.push(std::mem::take(&mut current));
                prev = c;
                continue;
            }
            _ => {}
        }
        current.push(c);
        prev = c;
    }
    params.push(current);

    params
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .enumerate()
        .filter(|(idx, p)| match lang {
            Lang::Rust => {
                let bare = p.trim_start_matches('&').trim_start_matches("mut ").trim();
                let bare = bare.split(':').next().unwrap_or(bare).trim();
                !(bare == "self" || bare.ends_with(" self") || bare.starts_with('\'') && bare.ends_with("self"))
            }
            Lang::Python => {
                !(*idx == 0 && (*p == "self" || *p == "cls")) && *p != "*" && *p != "/"
            }
            _ => true,
        })
        .count()
}

fn classify_line(code: &str) -> StmtKind {
    let code = code.trim_start_matches(|c: char| c == '}' || c.is_whitespace());
    match first_word(code) {
        "if" | "elif" | "else" => StmtKind::Branch,
        "for" | "while" | "loop" | "do" => StmtKind::Loop,
        "match" | "switch" | "select" => StmtKind::Match,
        "return" | "yield" => StmtKind::Return,
        "let" | "const" | "var" | "val" => StmtKind::Binding,
        _ if code.contains(":=") || ASSIGNMENT.is_match(code) => StmtKind::Binding,
        _ => StmtKind::Expression,
    }
}

fn collect_comments(text: &str, lang: Lang, masked: &Masked, code_lines: &[&str]) -> Vec<Comment> {
    let mut comments: Vec<Comment> = masked
        .comments
        .iter()
        .map(|&(start, end)| {
            let (start_line, start_column) = masked.position(start);
            let body = text.get(start..end).unwrap_or("").trim_end();
            let (end_line, end_column) = masked.position(start + body.len().max(1) - 1);
            Comment {
                span: Span::new(start_line, start_column, end_line, end_column + 1),
                text: body.to_string(),
                is_doc: lang != Lang::Go && is_doc_comment(lang, body, false),
            }
        })
        .collect();

    if lang == Lang::Go {
        // A Go comment documents the declaration directly below it
        for idx in (0..comments.len()).rev() {
            let next_line = comments[idx].span.end_line;
            let below = code_lines.get(next_line).map_or("", |l| l.trim());
            let declares = ["func ", "func(", "type ", "const ", "var "]
                .iter()
                .any(|kw| below.starts_with(kw));
            let chained = below.is_empty()
                && comments
                    .get(idx + 1)
                    .is_some_and(|c| c.span.start_line == next_line + 1 && c.is_doc);
            comments[idx].is_doc = declares || chained;
        }
    }
    comments
}

static CONTROL_SCAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:if|else|for|while|loop|match|switch|select|try|catch|finally|do)\b|[{}]")
        .expect("control regex is valid")
});

static RUST_BRANCHES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:if|for|while|loop)\b|=>|&&|\|\|").expect("branch regex is valid")
});
static GO_BRANCHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:if|for|case)\b|&&|\|\|").expect("branch regex is valid"));
static PYTHON_BRANCHES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:if|elif|for|while|except|case|and|or)\b").expect("branch regex is valid")
});
static C_FAMILY_BRANCHES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:if|for|while|case|catch)\b|&&|\|\|").expect("branch regex is valid")
});

fn branch_re(lang: Lang) -> &'static Regex {
    match lang {
        Lang::Rust => &RUST_BRANCHES,
        Lang::Go => &GO_BRANCHES,
        Lang::Python => &PYTHON_BRANCHES,
        Lang::JavaScript | Lang::TypeScript | Lang::Java => &C_FAMILY_BRANCHES,
    }
}

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0[xXoObB][0-9a-fA-F_]+|\d[\d_]*(?:\.\d[\d_]*)?(?:[eE][+-]?\d+)?)(?:[a-zA-Z_][a-zA-Z0-9_]*)?\b")
        .expect("number regex is valid")
});

static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^=!<>+\-*/%&|^]=[^=>]|[+\-*/%&|^]=").expect("assignment regex is valid"));

static UNSAFE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bunsafe\s*\{").expect("unsafe regex is valid"));
static UNSAFE_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bunsafe\s+(?:extern\s+(?:"\s*"\s+)?)?(?:fn|impl|trait)\b"#).expect("unsafe regex is valid")
});
static METHOD_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.\s*(?P<name>[A-Za-z_]\w*)\s*(?:::<[^>]*>)?\s*\(").expect("call regex is valid")
});
static MACRO_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<name>[A-Za-z_]\w*)!\s*[(\[{]").expect("macro regex is valid")
});
static FREE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<path>(?:[A-Za-z_]\w*::)*[A-Za-z_]\w*)\s*(?:::<[^>]*>)?\s*\(")
        .expect("call regex is valid")
});

const RUST_NOT_CALLS: &[&str] = &["if", "while", "match", "for", "return", "in", "fn", "as", "move"];

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(lang: Lang, file: &str, src: &str) -> SourceTree {
        parse_source(Path::new(file), lang, src).expect("heuristic parse failed")
    }

    fn decl<'t>(tree: &'t SourceTree, name: &str) -> &'t Declaration {
        tree.declarations()
            .iter()
            .find(|d| d.name == name)
            .unwrap_or_else(|| panic!("no declaration {name}"))
    }

    #[test]
    fn test_mask_keeps_offsets() {
        let src = "let s = \"a { b\"; // trailing {\nlet c = '{';\n";
        let masked = mask(src, Lang::Rust);
        assert_eq!(masked.code.len(), src.len());
        assert!(!masked.code.contains('{'));
        assert_eq!(masked.comments.len(), 1);
        assert_eq!(masked.position(src.find("let c").unwrap()), (2, 1));
    }

    #[test]
    fn test_lifetimes_are_not_char_literals() {
        let src = "fn f<'a>(x: &'a str) -> &'a str { x }\n";
        let masked = mask(src, Lang::Rust);
        assert!(masked.code.contains("{ x }"));
    }

    #[test]
    fn test_unbalanced_braces_fail() {
        let err = parse_source(Path::new("x.rs"), Lang::Rust, "fn f() {\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
        let err = parse_source(Path::new("x.go"), Lang::Go, "func f() {}\n}\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_matching_brace_skips_nested_blocks() {
        let src = "func run(items []string) {\n\tfor _, it := range items {\n\t\tif it == \"}\" {\n\t\t\tcontinue\n\t\t}\n\t}\n}\nfunc next() {}\n";
        let masked = mask(src, Lang::Go);
        let code = masked.code.as_bytes();
        let open = src.find('{').unwrap();
        let close = matching_brace(code, open).unwrap();
        assert_eq!(masked.position(close), (7, 1));
        assert_eq!(matching_brace(b"{ { }", 0), None);

        let tree = scan(Lang::Go, "run.go", src);
        let run = decl(&tree, "run");
        assert_eq!((run.span.start_line, run.span.end_line), (1, 7));
        assert_eq!(run.nesting_depth, 2);
        assert_eq!(decl(&tree, "next").span.start_line, 8);
    }

    #[test]
    fn test_js_function_extent_with_nested_object() {
        let src = "function load(cfg) {\n  const opts = { retry: { max: 3 } };\n  if (cfg) {\n    return `}${cfg}`;\n  }\n  return opts;\n}\n";
        let tree = scan(Lang::JavaScript, "load.js", src);
        let load = decl(&tree, "load");
        assert_eq!(load.span.end_line, 7);
        assert_eq!(load.params, 1);
    }

    #[test]
    fn test_rust_functions_and_impls() {
        let src = r#"/// A widget.
pub struct Widget {
    pub id: u32,
    name: String,
}

impl Widget {
    pub fn rename(&mut self, name: &str, force: bool) {
        if force && !name.is_empty() {
            for c in name.chars() {
                if c == 'x' {
                    self.name.push(c);
                }
            }
        }
    }
}

impl Default for Widget {
    fn default() -> Self {
        Widget { id: 0, name: String::new() }
    }
}
"#;
        let tree = scan(Lang::Rust, "widget.rs", src);
        assert_eq!(tree.confidence(), Confidence::Low);

        let widget = tree
            .declarations()
            .iter()
            .find(|d| d.kind == DeclKind::Struct)
            .unwrap();
        assert_eq!(widget.field_count, 2);
        assert_eq!(widget.member_count, 2);
        assert_eq!(widget.doc.as_deref(), Some("/// A widget."));
        assert!(widget.is_public());

        let rename = decl(&tree, "rename");
        assert_eq!(rename.kind, DeclKind::Method);
        assert_eq!(rename.params, 2);
        assert_eq!(rename.complexity, 5);
        assert_eq!(rename.nesting_depth, 3);
        assert!(rename.is_public());
        assert!(!decl(&tree, "default").is_public());
    }

    #[test]
    fn test_python_blocks_by_indentation() {
        let src = "class Store:\n    \"\"\"Holds items.\"\"\"\n\n    def put(self, key, value):\n        if key:\n            for v in value:\n                print(v)\n        return key\n\n\ndef _helper():\n    pass\n";
        let tree = scan(Lang::Python, "store.py", src);
        let store = decl(&tree, "Store");
        assert_eq!(store.doc.as_deref(), Some("Holds items."));
        assert_eq!(store.member_count, 1);
        let put = decl(&tree, "put");
        assert_eq!(put.kind, DeclKind::Method);
        assert_eq!(put.params, 2);
        assert_eq!(put.nesting_depth, 2);
        assert_eq!(put.span.end_line, 8);
        assert!(!decl(&tree, "_helper").is_public());
    }

    #[test]
    fn test_rust_constructs_from_masked_code() {
        let src = "fn f(v: Option<u8>) {\n    let s = \"x.unwrap()\";\n    v.unwrap();\n    unsafe { g() };\n    panic!(\"no\");\n}\n";
        let tree = scan(Lang::Rust, "f.rs", src);
        let unwraps = tree
            .constructs()
            .iter()
            .filter(|c| matches!(&c.kind, ConstructKind::MethodCall { name } if name == "unwrap"))
            .count();
        assert_eq!(unwraps, 1);
        assert!(tree
            .constructs()
            .iter()
            .any(|c| c.kind == ConstructKind::UnsafeBlock));
        assert!(tree
            .constructs()
            .iter()
            .any(|c| matches!(&c.kind, ConstructKind::Macro { name } if name == "panic")));
    }

    #[test]
    fn test_literals_and_constants() {
        let src = "const LIMIT: u32 = 500;\nfn f(x: u32) -> bool {\n    let buf = [0u8; 64];\n    x > 86400 || x == -1\n}\n";
        let tree = scan(Lang::Rust, "lim.rs", src);
        let literal = |raw: &str| tree.literals().iter().find(|l| l.raw == raw).unwrap();
        assert!(literal("500").in_constant);
        assert!(literal("64").in_constant);
        assert!(!literal("86400").in_constant);
        assert_eq!(literal("-1").value, Some(-1.0));
    }

    #[test]
    fn test_go_comments_mark_docs() {
        let src = "package main\n\n// Run starts.\nfunc Run() {\n\t// x := 1\n\tstart()\n}\n";
        let tree = scan(Lang::Go, "main.go", src);
        let comments = tree.comments();
        assert_eq!(comments.len(), 2);
        assert!(comments[0].is_doc);
        assert!(!comments[1].is_doc);
        assert_eq!(decl(&tree, "Run").doc.as_deref(), Some("// Run starts."));
    }
}
