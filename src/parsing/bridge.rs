//! Out-of-process parser backend
//!
//! A bridge is any program that speaks a small JSON protocol:
//!
//! * `<command> --handshake` prints
//!   `{"protocol":1,"capabilities":["parse"],"implementation":"..."}`
//! * `<command> --parse` reads the source on stdin and prints either
//!   `{"ok":true,"line_count":n,"nodes":[...]}` or
//!   `{"ok":false,"error":{"line":l,"column":c,"message":"..."}}`
//!
//! `nodes` is an ordered list in pre-order: node 0 is the root and each node
//! refers to its children by index. Node kinds come from a language-neutral
//! vocabulary (`module`, `function`, `class`, `constant`, `if`, `elif`,
//! `for`, `while`, `try`, `with`, `match`, `case`, `except`, `boolop`,
//! `ifexp`, `return`, `assign`, `expr`, `stmt`, `number`) and are lowered
//! here into a [`SourceTree`]. Comments are recovered from the source text
//! since most language ASTs drop them.
//!
//! Python ships with a built-in helper (`python_bridge.py`) run through the
//! interpreter's `-c` flag.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::BridgeCommand;
use crate::error::{BridgeError, ParseError};
use crate::lang::Lang;
use crate::model::{BackendKind, FileDescriptor, Span};
use crate::process::{run_with_deadline, RunError};

use super::heuristic::scan_comments;
use super::tree::{
    normalize_tokens, parse_number, DeclKind, Declaration, NumericLiteral, SourceTree, Statement,
    StmtKind, StructuralTree, Visibility,
};
use super::{decode_source, Parser};

/// Protocol version this engine speaks
pub const PROTOCOL_VERSION: u32 = 1;

const PYTHON_HELPER: &str = include_str!("python_bridge.py");

/// Node kinds that add a branch point
const BRANCHING: &[&str] = &[
    "if", "elif", "for", "while", "case", "except", "boolop", "ifexp",
];

/// Node kinds that open a deeper nesting level
const NESTING: &[&str] = &["if", "for", "while", "try", "with", "match"];

/// One entry of a bridge reply's flat node list
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeNode {
    pub kind: String,
    /// `[start_line, start_column, end_line, end_column]`, 1-based
    pub span: [usize; 4],
    /// Indices of child nodes, each greater than this node's own index
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub exported: Option<bool>,
    #[serde(default)]
    pub params: Option<usize>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    nodes: Vec<BridgeNode>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    #[serde(default = "first")]
    line: usize,
    #[serde(default = "first")]
    column: usize,
    #[serde(default)]
    message: String,
}

fn first() -> usize {
    1
}

/// A connected bridge for one language
#[derive(Debug, Clone)]
pub struct BridgeParser {
    lang: Lang,
    command: BridgeCommand,
    implementation: String,
}

impl BridgeParser {
    /// Run the handshake and return a ready bridge
    ///
    /// Fails with `Unavailable` when the program cannot be started or exits
    /// unsuccessfully, and with `Incompatible` when it answers with another
    /// protocol version or without the `parse` capability.
    pub fn connect(lang: Lang, command: BridgeCommand) -> Result<Self, BridgeError> {
        let out = run_with_deadline(build_command(&command, "--handshake"), None, command.timeout)
            .map_err(|err| BridgeError::Unavailable {
                reason: match err {
                    RunError::Spawn(e) => format!("cannot start `{}`: {e}", command.program),
                    RunError::TimedOut => "handshake timed out".to_string(),
                    RunError::Io(e) => e.to_string(),
                },
            })?;

        if !out.status.success() {
            return Err(BridgeError::Unavailable {
                reason: format!("handshake exited with {}: {}", out.status, out.stderr_summary()),
            });
        }

        let implementation = check_handshake(&out.stdout)?;
        info!(lang = %lang, implementation = %implementation, "parser bridge connected");
        Ok(Self {
            lang,
            command,
            implementation,
        })
    }

    /// Implementation string reported by the handshake
    pub fn implementation(&self) -> &str {
        &self.implementation
    }
}

impl Parser for BridgeParser {
    fn backend(&self) -> BackendKind {
        BackendKind::Bridged
    }

    fn parse(
        &self,
        file: &FileDescriptor,
        source: &[u8],
    ) -> Result<Box<dyn StructuralTree>, ParseError> {
        let text = decode_source(source)?;
        let timeout = self.command.timeout;
        let out = run_with_deadline(
            build_command(&self.command, "--parse"),
            Some(text.as_bytes()),
            timeout,
        )
        .map_err(|err| match err {
            RunError::TimedOut => BridgeError::Timeout {
                millis: timeout.as_millis() as u64,
            },
            RunError::Spawn(e) | RunError::Io(e) => BridgeError::Io {
                message: e.to_string(),
            },
        })?;

        let reply: Reply = serde_json::from_slice(&out.stdout).map_err(|e| {
            let message = if out.status.success() {
                format!("malformed reply: {e}")
            } else {
                format!("bridge exited with {}: {}", out.status, out.stderr_summary())
            };
            BridgeError::Protocol { message }
        })?;

        debug!(path = %file.path.display(), nodes = reply.nodes.len(), "bridge reply");
        let tree = lower_reply(&file.path, self.lang, text, reply)?;
        Ok(Box::new(tree))
    }
}

fn build_command(command: &BridgeCommand, mode: &str) -> Command {
    let mut cmd = Command::new(&command.program);
    if command.builtin_helper {
        cmd.arg("-c").arg(PYTHON_HELPER);
    }
    cmd.args(&command.args);
    cmd.arg(mode);
    cmd
}

/// Validate a handshake line, returning the implementation string
fn check_handshake(stdout: &[u8]) -> Result<String, BridgeError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let incompatible = |found: String| BridgeError::Incompatible {
        expected: PROTOCOL_VERSION,
        found,
    };

    let value: Value = serde_json::from_str(line)
        .map_err(|_| incompatible(format!("non-JSON handshake `{}`", truncate(line, 60))))?;
    let protocol = value
        .get("protocol")
        .and_then(Value::as_u64)
        .ok_or_else(|| incompatible("no protocol version".to_string()))?;
    if protocol != u64::from(PROTOCOL_VERSION) {
        return Err(incompatible(protocol.to_string()));
    }
    let can_parse = value
        .get("capabilities")
        .and_then(Value::as_array)
        .is_some_and(|caps| caps.iter().any(|c| c.as_str() == Some("parse")));
    if !can_parse {
        return Err(incompatible(format!("protocol {protocol} without `parse`")));
    }
    Ok(value
        .get("implementation")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string())
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Turn a bridge reply into a tree
fn lower_reply(path: &Path, lang: Lang, text: &str, reply: Reply) -> Result<SourceTree, ParseError> {
    if !reply.ok {
        let error = reply.error.ok_or_else(|| BridgeError::Protocol {
            message: "failure reply without an error".to_string(),
        })?;
        return Err(ParseError::Syntax {
            line: error.line,
            column: error.column,
            message: error.message,
        });
    }
    check_indices(&reply.nodes)?;

    let mut lowering = NodeLowering {
        lang,
        nodes: &reply.nodes,
        tree: SourceTree::new(path, lang, text.to_string(), BackendKind::Bridged.confidence()),
    };
    if !reply.nodes.is_empty() {
        lowering.visit(0, &Frame::default())?;
    }
    let mut tree = lowering.tree;
    tree.comments = scan_comments(text, lang);
    tree.finish();
    Ok(tree)
}

/// Children must point forward into the list, which also rules out cycles
fn check_indices(nodes: &[BridgeNode]) -> Result<(), BridgeError> {
    for (idx, node) in nodes.iter().enumerate() {
        if let Some(bad) = node.children.iter().find(|&&c| c <= idx || c >= nodes.len()) {
            return Err(BridgeError::Protocol {
                message: format!("node {idx} has invalid child index {bad}"),
            });
        }
    }
    Ok(())
}

fn node_span(node: &BridgeNode) -> Result<Span, BridgeError> {
    let [start_line, start_column, end_line, end_column] = node.span;
    if start_line == 0 || end_line < start_line {
        return Err(BridgeError::Protocol {
            message: format!("invalid span {:?} on `{}` node", node.span, node.kind),
        });
    }
    Ok(Span::new(start_line, start_column.max(1), end_line, end_column.max(1)))
}

fn visibility(public: bool) -> Visibility {
    if public {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

#[derive(Debug, Clone, Default)]
struct Frame {
    /// Enclosing class name and whether it is exported
    container: Option<(String, bool)>,
    in_function: bool,
    in_constant: bool,
}

struct NodeLowering<'a> {
    lang: Lang,
    nodes: &'a [BridgeNode],
    tree: SourceTree,
}

impl<'a> NodeLowering<'a> {
    fn children(&self, node: &'a BridgeNode) -> impl Iterator<Item = &'a BridgeNode> + 'a {
        let nodes = self.nodes;
        node.children.iter().map(move |&c| &nodes[c])
    }

    fn visit(&mut self, idx: usize, frame: &Frame) -> Result<(), BridgeError> {
        let nodes = self.nodes;
        let node = &nodes[idx];
        match node.kind.as_str() {
            "function" => self.function(node, frame),
            "class" => self.class(node, frame),
            "constant" if !frame.in_function => self.constant(node, frame),
            "number" => self.number(node, frame),
            _ => self.descend(node, frame),
        }
    }

    fn descend(&mut self, node: &'a BridgeNode, frame: &Frame) -> Result<(), BridgeError> {
        for &child in &node.children {
            self.visit(child, frame)?;
        }
        Ok(())
    }

    fn function(&mut self, node: &'a BridgeNode, frame: &Frame) -> Result<(), BridgeError> {
        let span = node_span(node)?;
        let kind = match frame.container {
            Some(_) => DeclKind::Method,
            None => DeclKind::Function,
        };
        let name = node.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let mut decl = Declaration::new(name, kind, span);
        let own = node.exported.unwrap_or(true);
        decl.visibility = visibility(match &frame.container {
            Some((_, exported)) => own && *exported,
            None => own,
        });
        decl.doc = node.doc.clone();
        decl.params = node.params.unwrap_or(0);
        decl.parent = frame.container.as_ref().map(|(name, _)| name.clone());

        let mut metrics = (0, 0);
        measure(self.nodes, node, 0, &mut metrics);
        decl.complexity = 1 + metrics.0;
        decl.nesting_depth = metrics.1;
        self.tree.declarations.push(decl);

        self.statements(node)?;
        let inner = Frame {
            container: None,
            in_function: true,
            in_constant: false,
        };
        self.descend(node, &inner)
    }

    fn class(&mut self, node: &'a BridgeNode, frame: &Frame) -> Result<(), BridgeError> {
        let span = node_span(node)?;
        let name = node.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let exported = node.exported.unwrap_or(true);
        let mut decl = Declaration::new(name.clone(), DeclKind::Class, span);
        decl.visibility = visibility(exported);
        decl.doc = node.doc.clone();
        decl.parent = frame.container.as_ref().map(|(name, _)| name.clone());
        decl.member_count = self.children(node).filter(|c| c.kind == "function").count();
        decl.field_count = self
            .children(node)
            .filter(|c| c.kind == "assign" || c.kind == "constant")
            .count();
        self.tree.declarations.push(decl);

        let inner = Frame {
            container: Some((name, exported)),
            in_function: frame.in_function,
            in_constant: false,
        };
        self.descend(node, &inner)
    }

    fn constant(&mut self, node: &'a BridgeNode, frame: &Frame) -> Result<(), BridgeError> {
        let span = node_span(node)?;
        let name = node.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let mut decl = Declaration::new(name, DeclKind::Constant, span);
        decl.visibility = visibility(node.exported.unwrap_or(!decl.name.starts_with('_')));
        decl.parent = frame.container.as_ref().map(|(name, _)| name.clone());
        self.tree.declarations.push(decl);

        let inner = Frame {
            in_constant: true,
            ..frame.clone()
        };
        self.descend(node, &inner)
    }

    fn number(&mut self, node: &'a BridgeNode, frame: &Frame) -> Result<(), BridgeError> {
        let span = node_span(node)?;
        let raw = match &node.text {
            Some(text) => text.clone(),
            None => self.tree.text(span).unwrap_or_default().to_string(),
        };
        let digits = raw.trim_start_matches('-').trim();
        let value = parse_number(digits).map(|v| if raw.starts_with('-') { -v } else { v });
        self.tree.literals.push(NumericLiteral {
            span,
            raw,
            value,
            in_constant: frame.in_constant,
        });
        Ok(())
    }

    /// Statements of one function body, not descending into nested definitions
    fn statements(&mut self, parent: &'a BridgeNode) -> Result<(), BridgeError> {
        for child in self.children(parent) {
            let header = match child.kind.as_str() {
                "function" | "class" => continue,
                "if" | "elif" => Some(StmtKind::Branch),
                "for" | "while" => Some(StmtKind::Loop),
                "match" => Some(StmtKind::Match),
                "try" | "with" | "except" | "case" => Some(StmtKind::Other),
                _ => None,
            };
            if let Some(kind) = header {
                self.push_header(child, kind)?;
                self.statements(child)?;
                continue;
            }
            let kind = match child.kind.as_str() {
                "return" => StmtKind::Return,
                "assign" | "constant" => StmtKind::Binding,
                "expr" => StmtKind::Expression,
                "stmt" => StmtKind::Other,
                _ => continue,
            };
            let span = node_span(child)?;
            let text = match &child.text {
                Some(text) => text.clone(),
                None => self.tree.text(span).unwrap_or_default().trim().to_string(),
            };
            self.push_statement(span, kind, text);
        }
        Ok(())
    }

    fn push_header(&mut self, node: &BridgeNode, kind: StmtKind) -> Result<(), BridgeError> {
        let span = node_span(node)?;
        let text = match &node.text {
            Some(text) => text.clone(),
            None => self
                .tree
                .line(span.start_line)
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
        let header = Span::new(
            span.start_line,
            span.start_column,
            span.start_line,
            span.start_column + text.len(),
        );
        self.push_statement(header, kind, text);
        Ok(())
    }

    fn push_statement(&mut self, span: Span, kind: StmtKind, text: String) {
        let tokens = normalize_tokens(&text, self.lang);
        self.tree.statements.push(Statement {
            span,
            kind,
            text,
            tokens,
            function: None,
            scope: None,
        });
    }
}

/// Branch points and deepest nesting below a function node
fn measure(nodes: &[BridgeNode], parent: &BridgeNode, depth: usize, metrics: &mut (usize, usize)) {
    for child in parent.children.iter().map(|&c| &nodes[c]) {
        let kind = child.kind.as_str();
        if kind == "function" || kind == "class" {
            continue;
        }
        let mut child_depth = depth;
        if NESTING.contains(&kind) {
            child_depth += 1;
            metrics.1 = metrics.1.max(child_depth);
        }
        if BRANCHING.contains(&kind) {
            metrics.0 += 1;
        }
        measure(nodes, child, child_depth, metrics);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sh_bridge(script: &str, timeout: Duration) -> BridgeCommand {
        BridgeCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            builtin_helper: false,
            timeout,
        }
    }

    fn has_sh() -> bool {
        which::which("sh").is_ok()
    }

    const SAMPLE_REPLY: &str = r#"{
        "ok": true,
        "line_count": 9,
        "nodes": [
            {"kind": "module", "span": [1, 1, 9, 1], "children": [1, 3, 10]},
            {"kind": "constant", "span": [1, 1, 1, 10], "name": "LIMIT", "text": "LIMIT = 5", "children": [2]},
            {"kind": "number", "span": [1, 9, 1, 10], "text": "5"},
            {"kind": "function", "span": [3, 1, 7, 13], "name": "check", "params": 2,
             "doc": "Check it.", "exported": true, "children": [4]},
            {"kind": "if", "span": [4, 5, 7, 13], "text": "if a and b:", "children": [5, 6, 8]},
            {"kind": "boolop", "span": [4, 14, 4, 15]},
            {"kind": "for", "span": [5, 9, 6, 21], "text": "for x in a:", "children": [7]},
            {"kind": "expr", "span": [6, 13, 6, 21], "text": "print(x)"},
            {"kind": "return", "span": [7, 9, 7, 13], "text": "return -1", "children": [9]},
            {"kind": "number", "span": [7, 16, 7, 18], "text": "-1"},
            {"kind": "class", "span": [8, 1, 9, 13], "name": "_Box", "exported": false, "children": [11]},
            {"kind": "function", "span": [9, 5, 9, 13], "name": "open", "params": 0}
        ]
    }"#;

    #[test]
    fn test_lowering_generic_nodes() {
        let src = "LIMIT = 5\n\ndef check(a, b):\n    if a and b:\n        for x in a:\n            print(x)\n        return -1\nclass _Box:\n    def open(self): pass\n";
        let reply: Reply = serde_json::from_str(SAMPLE_REPLY).unwrap();
        let tree = lower_reply(Path::new("check.py"), Lang::Python, src, reply).unwrap();

        let check = tree.declarations().iter().find(|d| d.name == "check").unwrap();
        assert_eq!(check.kind, DeclKind::Function);
        assert_eq!(check.params, 2);
        assert_eq!(check.complexity, 4);
        assert_eq!(check.nesting_depth, 2);
        assert_eq!(check.doc.as_deref(), Some("Check it."));

        let open = tree.declarations().iter().find(|d| d.name == "open").unwrap();
        assert_eq!(open.kind, DeclKind::Method);
        assert_eq!(open.visibility, Visibility::Private);
        assert_eq!(open.parent.as_deref(), Some("_Box"));

        let five = tree.literals().iter().find(|l| l.raw == "5").unwrap();
        assert!(five.in_constant);
        let minus_one = tree.literals().iter().find(|l| l.raw == "-1").unwrap();
        assert_eq!(minus_one.value, Some(-1.0));
        assert!(!minus_one.in_constant);

        let kinds: Vec<StmtKind> = tree.statements().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StmtKind::Branch, StmtKind::Loop, StmtKind::Expression, StmtKind::Return]
        );
        assert!(tree.statements().iter().all(|s| s.function.as_deref() == Some("check")));
    }

    #[test]
    fn test_failure_reply_is_syntax_error() {
        let reply: Reply = serde_json::from_str(
            r#"{"ok": false, "error": {"line": 3, "column": 7, "message": "invalid syntax"}}"#,
        )
        .unwrap();
        let err = lower_reply(Path::new("bad.py"), Lang::Python, "", reply).unwrap_err();
        assert_eq!(
            err,
            ParseError::Syntax {
                line: 3,
                column: 7,
                message: "invalid syntax".to_string()
            }
        );
    }

    #[test]
    fn test_backward_child_index_is_protocol_error() {
        let reply: Reply = serde_json::from_str(
            r#"{"ok": true, "nodes": [
                {"kind": "module", "span": [1, 1, 1, 1], "children": [1]},
                {"kind": "if", "span": [1, 1, 1, 1], "children": [0]}
            ]}"#,
        )
        .unwrap();
        let err = lower_reply(Path::new("loop.py"), Lang::Python, "x\n", reply).unwrap_err();
        assert!(matches!(err, ParseError::Bridge(BridgeError::Protocol { .. })));
    }

    #[test]
    fn test_handshake_validation() {
        let ok = br#"{"protocol":1,"capabilities":["parse"],"implementation":"test 1.0"}"#;
        assert_eq!(check_handshake(ok).unwrap(), "test 1.0");

        let wrong = br#"{"protocol":2,"capabilities":["parse"]}"#;
        assert!(matches!(
            check_handshake(wrong),
            Err(BridgeError::Incompatible { found, .. }) if found == "2"
        ));
        let no_parse = br#"{"protocol":1,"capabilities":[]}"#;
        assert!(matches!(check_handshake(no_parse), Err(BridgeError::Incompatible { .. })));
        assert!(matches!(check_handshake(b"hello"), Err(BridgeError::Incompatible { .. })));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let command = BridgeCommand {
            program: "codeclean-missing-bridge".to_string(),
            args: Vec::new(),
            builtin_helper: false,
            timeout: Duration::from_secs(5),
        };
        let err = BridgeParser::connect(Lang::Python, command).unwrap_err();
        assert!(matches!(err, BridgeError::Unavailable { .. }));
        assert!(err.triggers_degradation());
    }

    #[test]
    fn test_incompatible_protocol_over_process() {
        if !has_sh() {
            return;
        }
        let command = sh_bridge(
            r#"echo '{"protocol":99,"capabilities":["parse"]}'"#,
            Duration::from_secs(5),
        );
        let err = BridgeParser::connect(Lang::Go, command).unwrap_err();
        assert_eq!(
            err,
            BridgeError::Incompatible {
                expected: 1,
                found: "99".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_reply_and_timeout() {
        if !has_sh() {
            return;
        }
        let handshake = r#"echo '{"protocol":1,"capabilities":["parse"]}'"#;
        let file = FileDescriptor::new("x.go", Lang::Go, 10);

        let garbage = format!(r#"case "$0" in --handshake) {handshake};; *) cat >/dev/null; echo nope;; esac"#);
        let bridge = BridgeParser::connect(Lang::Go, sh_bridge(&garbage, Duration::from_secs(5))).unwrap();
        let err = bridge.parse(&file, b"package x\n").err().unwrap();
        assert!(matches!(err, ParseError::Bridge(BridgeError::Protocol { .. })));

        let slow = format!(r#"case "$0" in --handshake) {handshake};; *) sleep 5;; esac"#);
        let bridge = BridgeParser::connect(Lang::Go, sh_bridge(&slow, Duration::from_millis(300))).unwrap();
        let err = bridge.parse(&file, b"package x\n").err().unwrap();
        assert_eq!(err, ParseError::Bridge(BridgeError::Timeout { millis: 300 }));
    }

    #[test]
    fn test_builtin_python_helper() {
        if which::which("python3").is_err() {
            return;
        }
        let command = BridgeCommand {
            program: "python3".to_string(),
            args: Vec::new(),
            builtin_helper: true,
            timeout: Duration::from_secs(30),
        };
        let Ok(bridge) = BridgeParser::connect(Lang::Python, command) else {
            return;
        };
        assert!(bridge.implementation().starts_with("cpython-ast"));

        let src = "LIMIT = 10\n\ndef check(value, strict=False):\n    \"\"\"Check a value.\"\"\"\n    if value > LIMIT and strict:\n        return -1\n    elif value < 0:\n        return 0\n    return value\n\n\nclass Box:\n    size = 3\n\n    def open(self):\n        pass  # nothing yet\n";
        let file = FileDescriptor::new("check.py", Lang::Python, src.len() as u64);
        let tree = bridge.parse(&file, src.as_bytes()).unwrap();

        let check = tree.declarations().iter().find(|d| d.name == "check").unwrap();
        assert_eq!(check.params, 2);
        assert_eq!(check.complexity, 4);
        assert_eq!(check.doc.as_deref(), Some("Check a value."));

        let class = tree.declarations().iter().find(|d| d.name == "Box").unwrap();
        assert_eq!(class.member_count, 1);
        assert_eq!(class.field_count, 1);
        let open = tree.declarations().iter().find(|d| d.name == "open").unwrap();
        assert_eq!(open.kind, DeclKind::Method);
        assert_eq!(open.params, 0);

        assert!(tree.literals().iter().any(|l| l.value == Some(-1.0)));
        assert_eq!(tree.comments().len(), 1);

        let err = bridge.parse(&file, b"def broken(:\n").err().unwrap();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }
}
