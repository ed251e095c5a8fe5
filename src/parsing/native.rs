//! In-process tree-sitter backend
//!
//! Parses with the grammar linked into the binary and lowers the concrete
//! syntax tree into a [`SourceTree`] using the node tables in
//! [`grammar`](super::grammar).

use std::path::Path;

use tree_sitter::Node;

use crate::error::ParseError;
use crate::lang::Lang;
use crate::model::{BackendKind, Confidence, FileDescriptor, Span};

use super::grammar::{grammar_for, LangGrammar};
use super::tree::{
    normalize_tokens, parse_number, Comment, Construct, ConstructKind, DeclKind, Declaration,
    NumericLiteral, SourceTree, Statement, StmtKind, StructuralTree, Visibility,
};
use super::{decode_source, Parser};

/// Tree-sitter parser for every supported language
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeParser;

impl Parser for NativeParser {
    fn backend(&self) -> BackendKind {
        BackendKind::Native
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

/// Parse and lower one file
pub fn parse_source(path: &Path, lang: Lang, text: &str) -> Result<SourceTree, ParseError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&lang.tree_sitter_language(path))
        .map_err(|e| ParseError::Unsupported {
            lang: format!("{lang} ({e})"),
        })?;

    let tree = parser
        .parse(text, None)
        .ok_or_else(|| ParseError::Syntax {
            line: 1,
            column: 1,
            message: "parser produced no tree".to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(first_error(root, text));
    }

    let mut lowering = Lowering {
        grammar: grammar_for(lang),
        src: text,
        out: SourceTree::new(path, lang, text.to_string(), Confidence::High),
    };
    lowering.visit(root, &Scope::default());
    lowering.out.finish();
    Ok(lowering.out)
}

fn span_of(node: &Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(start.row + 1, start.column + 1, end.row + 1, end.column + 1)
}

/// Locate the first ERROR or MISSING node, depth first
fn first_error(root: Node, src: &str) -> ParseError {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let snippet: String = node
                    .utf8_text(src.as_bytes())
                    .unwrap_or("")
                    .chars()
                    .take(20)
                    .collect();
                format!("unexpected `{}`", snippet.trim())
            };
            return ParseError::Syntax {
                line: pos.row + 1,
                column: pos.column + 1,
                message,
            };
        }
        let descend = node.has_error() && cursor.goto_first_child();
        if descend {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                let pos = root.start_position();
                return ParseError::Syntax {
                    line: pos.row + 1,
                    column: pos.column + 1,
                    message: "syntax error".to_string(),
                };
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Container {
    name: String,
    kind: DeclKind,
    exported: bool,
    trait_impl: bool,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    container: Option<Container>,
    in_function: bool,
    in_test: bool,
    in_constant: bool,
}

/// Where a function came from: a declaration node, or a function value
/// bound to a name (`const f = () => {}`)
struct FunctionSite<'t> {
    node: Node<'t>,
    name: String,
    anchor: Node<'t>,
}

#[derive(Default)]
struct Metrics {
    complexity: usize,
    max_depth: usize,
}

struct Lowering<'a> {
    grammar: &'static LangGrammar,
    src: &'a str,
    out: SourceTree,
}

impl<'a> Lowering<'a> {
    fn lang(&self) -> Lang {
        self.grammar.lang
    }

    fn text(&self, node: &Node) -> &'a str {
        node.utf8_text(self.src.as_bytes()).unwrap_or("")
    }

    fn field_text(&self, node: &Node, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(&n))
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    fn visit(&mut self, node: Node, scope: &Scope) {
        let kind = node.kind();

        if self.grammar.is_comment(kind) {
            self.push_comment(&node);
            return;
        }
        if self.grammar.number_nodes.contains(&kind) {
            self.push_literal(&node, scope);
            return;
        }
        if self.lang() == Lang::Rust {
            self.rust_construct(&node, scope);
        }

        if self.grammar.is_function(kind) {
            let name = self.field_text(&node, "name").unwrap_or("<anonymous>").to_string();
            self.lower_function(
                FunctionSite {
                    node,
                    name,
                    anchor: node,
                },
                scope,
            );
            return;
        }
        if let Some(decl_kind) = self.grammar.type_kind(kind) {
            self.lower_type(node, decl_kind, scope);
            return;
        }
        if let Some(decl_kind) = self.grammar.constant_kind(kind) {
            self.lower_constant(node, &node, decl_kind, scope);
            return;
        }
        if self.lower_language_specific(node, scope) {
            return;
        }

        let child_scope = if self.is_constant_context(&node) {
            Scope {
                in_constant: true,
                ..scope.clone()
            }
        } else {
            scope.clone()
        };
        self.visit_children(node, &child_scope);
    }

    fn visit_children(&mut self, node: Node, scope: &Scope) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.visit(child, scope);
        }
    }

    /// Literals under these nodes are not magic numbers
    fn is_constant_context(&self, node: &Node) -> bool {
        matches!(
            node.kind(),
            "attribute_item"
                | "inner_attribute_item"
                | "array_type"
                | "annotation"
                | "marker_annotation"
                | "decorator"
                | "enum_assignment"
        )
    }

    /// Constructs that only exist in some grammars
    fn lower_language_specific(&mut self, node: Node, scope: &Scope) -> bool {
        match (self.lang(), node.kind()) {
            (Lang::JavaScript | Lang::TypeScript, "variable_declarator") => {
                let Some(value) = node.child_by_field_name("value") else {
                    return false;
                };
                let name = self.field_text(&node, "name").unwrap_or("<anonymous>").to_string();
                if matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                ) {
                    let anchor = node.parent().unwrap_or(node);
                    self.lower_function(
                        FunctionSite {
                            node: value,
                            name,
                            anchor,
                        },
                        scope,
                    );
                    return true;
                }
                let is_const = node
                    .parent()
                    .is_some_and(|p| p.kind() == "lexical_declaration" && self.text(&p).starts_with("const"));
                if is_const && !scope.in_function && scope.container.is_none() {
                    let anchor = node.parent().unwrap_or(node);
                    self.lower_constant(node, &anchor, DeclKind::Constant, scope);
                    return true;
                }
                false
            }
            (Lang::Python, "expression_statement") if !scope.in_function && scope.container.is_none() => {
                let Some(assign) = node.named_child(0).filter(|n| n.kind() == "assignment") else {
                    return false;
                };
                let Some(left) = assign.child_by_field_name("left") else {
                    return false;
                };
                let name = self.text(&left);
                if left.kind() == "identifier" && is_screaming_case(name) {
                    self.lower_constant(node, &node, DeclKind::Constant, scope);
                    return true;
                }
                false
            }
            (Lang::Java, "field_declaration") => {
                let modifiers = self.java_modifiers(&node);
                if modifiers.contains(&"static") && modifiers.contains(&"final") {
                    self.lower_constant(node, &node, DeclKind::Constant, scope);
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn lower_function(&mut self, site: FunctionSite, scope: &Scope) {
        let node = site.node;
        let kind = match (&scope.container, node.kind()) {
            (Some(_), _) | (None, "method_declaration" | "method_definition") => DeclKind::Method,
            _ => DeclKind::Function,
        };
        let anchor = self.outer_anchor(site.anchor);
        let mut span = span_of(&node);
        if site.anchor != node {
            span = span_of(&site.anchor);
        }

        let mut decl = Declaration::new(site.name, kind, span);
        decl.visibility = self.function_visibility(&node, &site.anchor, scope, &decl.name);
        decl.doc = self.attached_doc(&anchor, Some(&node));
        decl.params = self.count_params(&node);
        decl.in_test = scope.in_test || self.has_test_marker(&anchor, &node);
        decl.parent = scope
            .container
            .as_ref()
            .map(|c| c.name.clone())
            .or_else(|| self.go_receiver_type(&node));

        let mut metrics = Metrics::default();
        self.measure(node, 0, &mut metrics);
        decl.complexity = 1 + metrics.complexity;
        decl.nesting_depth = metrics.max_depth;

        let in_test = decl.in_test;
        self.out.declarations.push(decl);

        if let Some(body) = node.child_by_field_name("body") {
            self.collect_statements(body);
        }

        let inner = Scope {
            container: None,
            in_function: true,
            in_test,
            in_constant: false,
        };
        self.visit_children(node, &inner);
    }

    fn lower_type(&mut self, node: Node, mut kind: DeclKind, scope: &Scope) {
        let name = match (self.lang(), kind) {
            (Lang::Rust, DeclKind::Impl) => self
                .field_text(&node, "type")
                .map(strip_generics)
                .unwrap_or("<impl>")
                .to_string(),
            _ => self.field_text(&node, "name").unwrap_or("<anonymous>").to_string(),
        };
        if self.lang() == Lang::Go && node.kind() == "type_spec" {
            kind = match node.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => DeclKind::Struct,
                Some("interface_type") => DeclKind::Interface,
                _ => DeclKind::TypeAlias,
            };
        }

        let anchor = self.outer_anchor(node);
        let mut decl = Declaration::new(name.clone(), kind, span_of(&node));
        let exported = match kind {
            DeclKind::Impl => false,
            _ => (self.grammar.is_exported)(&node, self.src)
                || (self.grammar.is_exported)(&anchor, self.src),
        };
        decl.visibility = if exported {
            Visibility::Public
        } else {
            Visibility::Private
        };
        decl.doc = self.attached_doc(&anchor, Some(&node));
        decl.in_test = scope.in_test || self.has_test_marker(&anchor, &node) || name == "tests";
        decl.parent = scope.container.as_ref().map(|c| c.name.clone());
        if let Some(body) = self.type_body(&node) {
            decl.member_count = self.count_members(&body);
            decl.field_count = self.count_fields(&body);
        }
        let in_test = decl.in_test;
        self.out.declarations.push(decl);

        let container = match kind {
            DeclKind::Module | DeclKind::TypeAlias => scope.container.clone(),
            _ => Some(Container {
                name,
                kind,
                exported,
                trait_impl: kind == DeclKind::Impl && node.child_by_field_name("trait").is_some(),
            }),
        };
        let inner = Scope {
            container,
            in_function: scope.in_function,
            in_test,
            in_constant: kind == DeclKind::Enum,
        };
        self.visit_children(node, &inner);
    }

    fn lower_constant(&mut self, node: Node, anchor: &Node, kind: DeclKind, scope: &Scope) {
        let name = self
            .constant_name(&node)
            .unwrap_or_else(|| "<anonymous>".to_string());
        let anchor = self.outer_anchor(*anchor);
        let mut decl = Declaration::new(name, kind, span_of(&node));
        let exported = (self.grammar.is_exported)(&node, self.src)
            || (self.grammar.is_exported)(&anchor, self.src);
        decl.visibility = if exported {
            Visibility::Public
        } else {
            Visibility::Private
        };
        decl.doc = self.attached_doc(&anchor, Some(&node));
        decl.parent = scope.container.as_ref().map(|c| c.name.clone());
        decl.in_test = scope.in_test;
        self.out.declarations.push(decl);

        let inner = Scope {
            in_constant: true,
            ..scope.clone()
        };
        self.visit_children(node, &inner);
    }

    fn constant_name(&self, node: &Node) -> Option<String> {
        if let Some(name) = self.field_text(node, "name") {
            return Some(name.to_string());
        }
        // Python `X = 1`, Java `static final int X = 1;`
        if let Some(assign) = node.named_child(0).filter(|n| n.kind() == "assignment") {
            return self.field_text(&assign, "left").map(str::to_string);
        }
        let declarator = node.child_by_field_name("declarator")?;
        self.field_text(&declarator, "name").map(str::to_string)
    }

    /// Outermost node that still belongs to the declaration
    fn outer_anchor<'t>(&self, node: Node<'t>) -> Node<'t> {
        let mut anchor = node;
        while let Some(parent) = anchor.parent() {
            let wraps = self.grammar.wrapper_nodes.contains(&parent.kind())
                || (self.lang() == Lang::Go
                    && matches!(parent.kind(), "type_declaration" | "const_declaration")
                    && parent.named_child_count() == 1);
            if !wraps {
                break;
            }
            anchor = parent;
        }
        anchor
    }

    fn function_visibility(
        &self,
        node: &Node,
        anchor: &Node,
        scope: &Scope,
        name: &str,
    ) -> Visibility {
        let own = (self.grammar.is_exported)(node, self.src)
            || (self.grammar.is_exported)(anchor, self.src);
        let public = match (&scope.container, self.lang()) {
            (None, _) => own,
            (Some(c), Lang::Rust) => match c.kind {
                DeclKind::Trait => c.exported,
                _ => own && !c.trait_impl,
            },
            (Some(_), Lang::Go) => own,
            (Some(c), Lang::Python) => c.exported && own,
            (Some(c), Lang::Java) => own || (c.kind == DeclKind::Interface && c.exported),
            (Some(c), Lang::JavaScript | Lang::TypeScript) => {
                let mut cursor = node.walk();
                let restricted = node.children(&mut cursor).any(|child| {
                    child.kind() == "accessibility_modifier" && self.text(&child) != "public"
                });
                c.exported && !restricted && !name.starts_with('#') && !name.starts_with('_')
            }
        };
        if public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    fn count_params(&self, node: &Node) -> usize {
        let Some(params) = node.child_by_field_name(self.grammar.params_field) else {
            // `x => x + 1`
            return usize::from(node.child_by_field_name("parameter").is_some());
        };
        let mut cursor = params.walk();
        let children: Vec<Node> = params.named_children(&mut cursor).collect();
        let mut count = 0;
        for (idx, child) in children.iter().enumerate() {
            let kind = child.kind();
            if self.grammar.is_comment(kind) || self.grammar.receiver_params.contains(&kind) {
                continue;
            }
            match self.lang() {
                Lang::Python => {
                    let text = self.text(child);
                    if idx == 0 && (text == "self" || text == "cls") {
                        continue;
                    }
                    if matches!(kind, "keyword_separator" | "positional_separator") {
                        continue;
                    }
                    count += 1;
                }
                Lang::Go => {
                    let mut names = child.walk();
                    let named = child.children_by_field_name("name", &mut names).count();
                    count += named.max(1);
                }
                _ => count += 1,
            }
        }
        count
    }

    fn go_receiver_type(&self, node: &Node) -> Option<String> {
        if self.lang() != Lang::Go {
            return None;
        }
        let receiver = self.field_text(node, "receiver")?;
        let cleaned = receiver.trim_matches(|c| c == '(' || c == ')');
        let last = cleaned.split_whitespace().last()?;
        let ty = strip_generics(last.trim_start_matches('*'));
        (!ty.is_empty()).then(|| ty.to_string())
    }

    fn java_modifiers(&self, node: &Node) -> Vec<&'a str> {
        let mut cursor = node.walk();
        let modifiers = node
            .children(&mut cursor)
            .find(|child| child.kind() == "modifiers");
        modifiers
            .map(|m| self.text(&m).split_whitespace().collect())
            .unwrap_or_default()
    }

    fn has_test_marker(&self, anchor: &Node, node: &Node) -> bool {
        match self.lang() {
            Lang::Rust => self
                .preceding_attributes(anchor)
                .iter()
                .any(|attr| attr.contains("test")),
            Lang::Java => {
                let mut cursor = node.walk();
                let annotated = node.children(&mut cursor).any(|child| {
                    child.kind() == "modifiers" && self.text(&child).contains("@Test")
                });
                annotated
            }
            _ => false,
        }
    }

    fn preceding_attributes(&self, node: &Node) -> Vec<&'a str> {
        let mut attrs = Vec::new();
        let mut prev = node.prev_sibling();
        while let Some(sibling) = prev {
            if self.grammar.attribute_nodes.contains(&sibling.kind()) {
                attrs.push(self.text(&sibling));
            } else if !self.grammar.is_comment(sibling.kind()) {
                break;
            }
            prev = sibling.prev_sibling();
        }
        attrs
    }

    fn type_body<'t>(&self, node: &Node<'t>) -> Option<Node<'t>> {
        if self.lang() == Lang::Go {
            let ty = node.child_by_field_name("type")?;
            if ty.kind() == "struct_type" {
                let mut cursor = ty.walk();
                let list = ty
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "field_declaration_list");
                return list;
            }
            return (ty.kind() == "interface_type").then_some(ty);
        }
        node.child_by_field_name("body")
    }

    fn count_members(&self, body: &Node) -> usize {
        let mut cursor = body.walk();
        let count = body
            .named_children(&mut cursor)
            .filter(|child| {
                let kind = child.kind();
                self.grammar.is_function(kind)
                    || matches!(
                        kind,
                        "method_signature"
                            | "abstract_method_signature"
                            | "method_elem"
                            | "method_spec"
                    )
                    || (kind == "decorated_definition"
                        && child
                            .child_by_field_name("definition")
                            .is_some_and(|d| self.grammar.is_function(d.kind())))
            })
            .count();
        count
    }

    fn count_fields(&self, body: &Node) -> usize {
        let mut cursor = body.walk();
        let children: Vec<Node> = body.named_children(&mut cursor).collect();
        children
            .iter()
            .map(|child| match (self.lang(), child.kind()) {
                (Lang::Go, "field_declaration") => {
                    let mut names = child.walk();
                    child.children_by_field_name("name", &mut names).count().max(1)
                }
                (Lang::Java, "field_declaration") => {
                    let mut decls = child.walk();
                    child.children_by_field_name("declarator", &mut decls).count().max(1)
                }
                (Lang::Python, "expression_statement") => usize::from(
                    child
                        .named_child(0)
                        .is_some_and(|n| n.kind() == "assignment"),
                ),
                (_, kind) if self.grammar.field_nodes.contains(&kind) => 1,
                _ => 0,
            })
            .sum()
    }

    // ------------------------------------------------------------------
    // Documentation
    // ------------------------------------------------------------------

    /// Doc comment (or Python docstring) attached to a declaration
    fn attached_doc(&self, anchor: &Node, decl: Option<&Node>) -> Option<String> {
        if self.lang() == Lang::Python {
            return decl.and_then(|d| self.python_docstring(d));
        }

        let mut lines: Vec<&str> = Vec::new();
        let mut next_row = anchor.start_position().row;
        let mut prev = anchor.prev_sibling();
        while let Some(sibling) = prev {
            let kind = sibling.kind();
            let adjacent = last_row(&sibling) + 1 >= next_row;
            if !adjacent {
                break;
            }
            if self.grammar.attribute_nodes.contains(&kind) {
                next_row = sibling.start_position().row;
            } else if self.grammar.is_comment(kind) {
                let text = self.text(&sibling).trim_end();
                if !is_doc_comment(self.lang(), text, true) {
                    break;
                }
                lines.push(text);
                next_row = sibling.start_position().row;
            } else {
                break;
            }
            prev = sibling.prev_sibling();
        }

        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join("\n"))
    }

    fn python_docstring(&self, decl: &Node) -> Option<String> {
        let body = decl.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0).filter(|n| n.kind() == "string")?;
        let text = self.text(&string);
        Some(
            text.trim_matches(|c| c == '"' || c == '\'')
                .trim()
                .to_string(),
        )
    }

    // ------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------

    fn push_comment(&mut self, node: &Node) {
        let text = self.text(node).trim_end();
        let is_doc = match self.lang() {
            // Go doc comments are ordinary comments directly above a declaration
            Lang::Go => self.precedes_declaration(node),
            lang => is_doc_comment(lang, text, false),
        };
        self.out.comments.push(Comment {
            span: span_of(node),
            text: text.to_string(),
            is_doc,
        });
    }

    fn precedes_declaration(&self, node: &Node) -> bool {
        let mut next = node.next_sibling();
        let mut row = last_row(node);
        while let Some(sibling) = next {
            if sibling.start_position().row > row + 1 {
                return false;
            }
            let kind = sibling.kind();
            if !self.grammar.is_comment(kind) {
                return self.grammar.is_function(kind)
                    || matches!(
                        kind,
                        "type_declaration" | "const_declaration" | "var_declaration"
                    );
            }
            row = last_row(&sibling);
            next = sibling.next_sibling();
        }
        false
    }

    fn push_literal(&mut self, node: &Node, scope: &Scope) {
        let mut raw = self.text(node).to_string();
        let mut span = span_of(node);
        if let Some(parent) = node.parent() {
            let negated = matches!(
                parent.kind(),
                "unary_expression" | "unary_operator" | "negative_literal"
            ) && self.text(&parent).trim_start().starts_with('-');
            if negated {
                raw = format!("-{raw}");
                span = span_of(&parent);
            }
        }
        let value = parse_number(raw.trim_start_matches('-'))
            .map(|v| if raw.starts_with('-') { -v } else { v });
        self.out.literals.push(NumericLiteral {
            span,
            raw,
            value,
            in_constant: scope.in_constant,
        });
    }

    fn rust_construct(&mut self, node: &Node, scope: &Scope) {
        let kind = match node.kind() {
            "unsafe_block" => Some(ConstructKind::UnsafeBlock),
            "function_item" => {
                let mut cursor = node.walk();
                let is_unsafe = node.children(&mut cursor).any(|child| {
                    child.kind() == "function_modifiers" && self.text(&child).contains("unsafe")
                });
                is_unsafe.then_some(ConstructKind::UnsafeItem)
            }
            "impl_item" | "trait_item" => {
                let mut cursor = node.walk();
                let is_unsafe = node.children(&mut cursor).any(|child| child.kind() == "unsafe");
                is_unsafe.then_some(ConstructKind::UnsafeItem)
            }
            "call_expression" => node.child_by_field_name("function").map(|callee| {
                if callee.kind() == "field_expression" {
                    ConstructKind::MethodCall {
                        name: self.field_text(&callee, "field").unwrap_or("").to_string(),
                    }
                } else {
                    ConstructKind::Call {
                        name: strip_turbofish(self.text(&callee)).to_string(),
                    }
                }
            }),
            "macro_invocation" => self.field_text(node, "macro").map(|name| ConstructKind::Macro {
                name: name.trim_end_matches('!').to_string(),
            }),
            _ => None,
        };
        if let Some(kind) = kind {
            let start = node.start_position();
            self.out.constructs.push(Construct {
                kind,
                span: Span::new(start.row + 1, start.column + 1, start.row + 1, start.column + 1),
                scope: None,
                in_test: scope.in_test,
            });
        }
    }

    // ------------------------------------------------------------------
    // Statements and metrics
    // ------------------------------------------------------------------

    fn is_nested_declaration(&self, kind: &str) -> bool {
        self.grammar.is_function(kind)
            || self.grammar.type_kind(kind).is_some()
            || matches!(kind, "decorated_definition" | "closure_expression" | "arrow_function" | "lambda")
    }

    fn collect_statements(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        let last = children.len().saturating_sub(1);
        for (idx, child) in children.into_iter().enumerate() {
            let kind = child.kind();
            if self.is_nested_declaration(kind) || self.grammar.is_comment(kind) {
                continue;
            }
            if let Some(stmt_kind) = self.grammar.control_flow(kind) {
                self.push_header(&child, stmt_kind);
                self.collect_statements(child);
                continue;
            }
            if let Some(stmt_kind) = self.grammar.statement(kind) {
                let inner = (child.named_child_count() == 1)
                    .then(|| child.named_child(0))
                    .flatten();
                if let Some(flow) = inner.and_then(|n| self.grammar.control_flow(n.kind()).map(|k| (n, k))) {
                    self.push_header(&flow.0, flow.1);
                    self.collect_statements(flow.0);
                    continue;
                }
                let refined = refine_statement(&child, stmt_kind);
                self.push_statement(&child, self.text(&child), refined);
                continue;
            }
            // Rust tail expression of a block
            if self.lang() == Lang::Rust && node.kind() == "block" && idx == last {
                self.push_statement(&child, self.text(&child), StmtKind::Expression);
                continue;
            }
            self.collect_statements(child);
        }
    }

    fn push_header(&mut self, node: &Node, kind: StmtKind) {
        let full = self.text(node);
        let first_line = full.lines().next().unwrap_or("");
        let header = first_line.split('{').next().unwrap_or(first_line).trim_end();
        let start = node.start_position();
        let span = Span::new(
            start.row + 1,
            start.column + 1,
            start.row + 1,
            start.column + 1 + header.len(),
        );
        self.out.statements.push(Statement {
            span,
            kind,
            text: header.to_string(),
            tokens: normalize_tokens(header, self.lang()),
            function: None,
            scope: None,
        });
    }

    fn push_statement(&mut self, node: &Node, text: &str, kind: StmtKind) {
        self.out.statements.push(Statement {
            span: span_of(node),
            kind,
            text: text.to_string(),
            tokens: normalize_tokens(text, self.lang()),
            function: None,
            scope: None,
        });
    }

    fn measure(&self, node: Node, depth: usize, metrics: &mut Metrics) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            let kind = child.kind();
            if self.grammar.is_function(kind) || self.grammar.type_kind(kind).is_some() {
                continue;
            }
            let mut child_depth = depth;
            if let Some(flow) = self.grammar.control_flow(kind) {
                if !self.is_else_if(&node, &child) {
                    child_depth += 1;
                    metrics.max_depth = metrics.max_depth.max(child_depth);
                }
                if matches!(flow, StmtKind::Branch | StmtKind::Loop) {
                    metrics.complexity += 1;
                }
            }
            if self.grammar.branch_nodes.contains(&kind) && !self.is_default_label(&child) {
                metrics.complexity += 1;
            }
            if self.grammar.boolean_nodes.contains(&kind) && self.is_short_circuit(&child) {
                metrics.complexity += 1;
            }
            self.measure(child, child_depth, metrics);
        }
    }

    fn is_else_if(&self, parent: &Node, child: &Node) -> bool {
        if self.grammar.control_flow(child.kind()) != Some(StmtKind::Branch) {
            return false;
        }
        self.grammar.else_nodes.contains(&parent.kind())
            || (parent.kind() == child.kind()
                && parent.child_by_field_name("alternative").as_ref() == Some(child))
    }

    fn is_default_label(&self, node: &Node) -> bool {
        node.kind() == "switch_label" && self.text(node).trim_start().starts_with("default")
    }

    fn is_short_circuit(&self, node: &Node) -> bool {
        match node.child_by_field_name("operator") {
            Some(op) => matches!(self.text(&op), "&&" | "||" | "and" | "or"),
            None => false,
        }
    }
}

/// Last row holding text; line comments may end at column 0 of the next row
fn last_row(node: &Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

fn refine_statement(node: &Node, kind: StmtKind) -> StmtKind {
    if kind != StmtKind::Expression {
        return kind;
    }
    match node.named_child(0).map(|n| n.kind()) {
        Some(k) if k.contains("assignment") => StmtKind::Binding,
        Some(k) if k.starts_with("return") => StmtKind::Return,
        _ => kind,
    }
}

/// Whether a comment's text marks it as documentation
///
/// `outer_only` excludes inner doc comments (`//!`) that document the
/// enclosing item rather than the next one.
pub(crate) fn is_doc_comment(lang: Lang, text: &str, outer_only: bool) -> bool {
    match lang {
        Lang::Rust => {
            let outer = (text.starts_with("///") && !text.starts_with("////"))
                || (text.starts_with("/**") && !text.starts_with("/***") && text != "/**/");
            let inner = text.starts_with("//!") || text.starts_with("/*!");
            outer || (!outer_only && inner)
        }
        Lang::Go => true,
        Lang::Python => false,
        Lang::JavaScript | Lang::TypeScript | Lang::Java => {
            text.starts_with("/**") && text != "/**/"
        }
    }
}

fn is_screaming_case(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn strip_generics(name: &str) -> &str {
    name.split(['<', '[']).next().unwrap_or(name).trim()
}

fn strip_turbofish(name: &str) -> &str {
    name.split("::<").next().unwrap_or(name)
}
