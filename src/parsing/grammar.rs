//! Language Grammar Definitions
//!
//! Maps tree-sitter node kinds onto the common structural model. The native
//! lowering in `native.rs` is written once against these tables; adding a
//! language means adding a `LangGrammar` here, not a new extractor.

use tree_sitter::Node;

use crate::lang::Lang;

use super::tree::{DeclKind, StmtKind};

/// Language-specific AST node mappings for structural lowering
#[derive(Debug)]
pub struct LangGrammar {
    pub lang: Lang,

    // =========================================================================
    // Declarations
    // =========================================================================
    /// Function/method declaration nodes
    pub function_nodes: &'static [&'static str],

    /// Type-like declarations and the kind they lower to
    pub type_nodes: &'static [(&'static str, DeclKind)],

    /// Named constant declarations (`const_item`, `const_spec`, ...)
    pub constant_nodes: &'static [(&'static str, DeclKind)],

    /// Nodes that wrap a declaration without changing it
    /// e.g., ["export_statement", "decorated_definition"]
    pub wrapper_nodes: &'static [&'static str],

    /// Attribute nodes that precede a declaration as siblings (Rust)
    pub attribute_nodes: &'static [&'static str],

    /// Field holding the parameter list
    pub params_field: &'static str,

    /// Parameter node kinds that do not count toward arity
    pub receiver_params: &'static [&'static str],

    /// Field nodes counted by `field_count`
    pub field_nodes: &'static [&'static str],

    // =========================================================================
    // Control flow
    // =========================================================================
    /// Nodes that increase nesting depth, with their statement kind
    pub control_flow_nodes: &'static [(&'static str, StmtKind)],

    /// Nodes that add one to cyclomatic complexity besides control flow
    /// e.g., match arms, case clauses, catch clauses, ternaries
    pub branch_nodes: &'static [&'static str],

    /// Binary expression nodes inspected for `&&` / `||`
    pub boolean_nodes: &'static [&'static str],

    /// Nodes that continue an `if` chain without nesting deeper
    pub else_nodes: &'static [&'static str],

    // =========================================================================
    // Statements and leaves
    // =========================================================================
    /// Simple statement nodes and their kind
    pub statement_nodes: &'static [(&'static str, StmtKind)],

    pub comment_nodes: &'static [&'static str],

    pub number_nodes: &'static [&'static str],

    /// Visibility rule for a declaration node
    pub is_exported: fn(&Node, &str) -> bool,
}

impl LangGrammar {
    pub fn is_function(&self, kind: &str) -> bool {
        self.function_nodes.contains(&kind)
    }

    pub fn type_kind(&self, kind: &str) -> Option<DeclKind> {
        self.type_nodes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, d)| *d)
    }

    pub fn constant_kind(&self, kind: &str) -> Option<DeclKind> {
        self.constant_nodes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, d)| *d)
    }

    pub fn control_flow(&self, kind: &str) -> Option<StmtKind> {
        self.control_flow_nodes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
    }

    pub fn statement(&self, kind: &str) -> Option<StmtKind> {
        self.statement_nodes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
    }

    pub fn is_comment(&self, kind: &str) -> bool {
        self.comment_nodes.contains(&kind)
    }
}

// =============================================================================
// Visibility Checker Functions
// =============================================================================

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Go: uppercase first letter = exported
pub fn go_is_exported(node: &Node, source: &str) -> bool {
    node.child_by_field_name("name")
        .map(|n| node_text(&n, source))
        .and_then(|name| name.chars().next())
        .is_some_and(|c| c.is_uppercase())
}

/// Rust: has a `pub` visibility modifier (any restriction counts)
pub fn rust_is_exported(node: &Node, source: &str) -> bool {
    let mut cursor = node.walk();
    let exported = node
        .children(&mut cursor)
        .any(|child| child.kind() == "visibility_modifier" && node_text(&child, source).starts_with("pub"));
    exported
}

/// Python: no underscore prefix = public
pub fn python_is_exported(node: &Node, source: &str) -> bool {
    node.child_by_field_name("name")
        .map(|n| !node_text(&n, source).starts_with('_'))
        .unwrap_or(true)
}

/// Java: has `public` modifier
pub fn java_is_exported(node: &Node, _source: &str) -> bool {
    let mut cursor = node.walk();
    let modifiers = node
        .children(&mut cursor)
        .find(|child| child.kind() == "modifiers");
    match modifiers {
        Some(modifiers) => {
            let mut inner = modifiers.walk();
            let public = modifiers
                .children(&mut inner)
                .any(|child| child.kind() == "public");
            public
        }
        None => false,
    }
}

/// JavaScript/TypeScript: wrapped in an `export` statement
pub fn js_is_exported(node: &Node, _source: &str) -> bool {
    node.parent()
        .is_some_and(|parent| parent.kind() == "export_statement")
}

// =============================================================================
// Language Grammar Definitions
// =============================================================================

const JS_CONTROL_FLOW: &[(&str, StmtKind)] = &[
    ("if_statement", StmtKind::Branch),
    ("for_statement", StmtKind::Loop),
    ("for_in_statement", StmtKind::Loop),
    ("for_of_statement", StmtKind::Loop),
    ("while_statement", StmtKind::Loop),
    ("do_statement", StmtKind::Loop),
    ("switch_statement", StmtKind::Match),
    ("try_statement", StmtKind::Other),
];

const JS_STATEMENTS: &[(&str, StmtKind)] = &[
    ("lexical_declaration", StmtKind::Binding),
    ("variable_declaration", StmtKind::Binding),
    ("expression_statement", StmtKind::Expression),
    ("return_statement", StmtKind::Return),
    ("throw_statement", StmtKind::Other),
    ("break_statement", StmtKind::Other),
    ("continue_statement", StmtKind::Other),
];

pub static RUST_GRAMMAR: LangGrammar = LangGrammar {
    lang: Lang::Rust,
    function_nodes: &["function_item", "function_signature_item"],
    type_nodes: &[
        ("struct_item", DeclKind::Struct),
        ("union_item", DeclKind::Struct),
        ("enum_item", DeclKind::Enum),
        ("trait_item", DeclKind::Trait),
        ("impl_item", DeclKind::Impl),
        ("type_item", DeclKind::TypeAlias),
        ("mod_item", DeclKind::Module),
    ],
    constant_nodes: &[
        ("const_item", DeclKind::Constant),
        ("static_item", DeclKind::Static),
    ],
    wrapper_nodes: &[],
    attribute_nodes: &["attribute_item"],
    params_field: "parameters",
    receiver_params: &["self_parameter"],
    field_nodes: &["field_declaration"],
    control_flow_nodes: &[
        ("if_expression", StmtKind::Branch),
        ("match_expression", StmtKind::Match),
        ("for_expression", StmtKind::Loop),
        ("while_expression", StmtKind::Loop),
        ("loop_expression", StmtKind::Loop),
    ],
    branch_nodes: &["match_arm"],
    boolean_nodes: &["binary_expression"],
    else_nodes: &["else_clause"],
    statement_nodes: &[
        ("let_declaration", StmtKind::Binding),
        ("expression_statement", StmtKind::Expression),
    ],
    comment_nodes: &["line_comment", "block_comment"],
    number_nodes: &["integer_literal", "float_literal"],
    is_exported: rust_is_exported,
};

pub static GO_GRAMMAR: LangGrammar = LangGrammar {
    lang: Lang::Go,
    function_nodes: &["function_declaration", "method_declaration"],
    // type_spec is resolved by its `type` child during lowering
    type_nodes: &[("type_spec", DeclKind::Struct), ("type_alias", DeclKind::TypeAlias)],
    constant_nodes: &[("const_spec", DeclKind::Constant)],
    wrapper_nodes: &[],
    attribute_nodes: &[],
    params_field: "parameters",
    receiver_params: &[],
    field_nodes: &["field_declaration"],
    control_flow_nodes: &[
        ("if_statement", StmtKind::Branch),
        ("for_statement", StmtKind::Loop),
        ("expression_switch_statement", StmtKind::Match),
        ("type_switch_statement", StmtKind::Match),
        ("select_statement", StmtKind::Match),
    ],
    branch_nodes: &["expression_case", "type_case", "communication_case"],
    boolean_nodes: &["binary_expression"],
    else_nodes: &[],
    statement_nodes: &[
        ("short_var_declaration", StmtKind::Binding),
        ("var_declaration", StmtKind::Binding),
        ("assignment_statement", StmtKind::Binding),
        ("inc_statement", StmtKind::Binding),
        ("dec_statement", StmtKind::Binding),
        ("return_statement", StmtKind::Return),
        ("expression_statement", StmtKind::Expression),
        ("go_statement", StmtKind::Expression),
        ("defer_statement", StmtKind::Expression),
        ("send_statement", StmtKind::Expression),
        ("break_statement", StmtKind::Other),
        ("continue_statement", StmtKind::Other),
    ],
    comment_nodes: &["comment"],
    number_nodes: &["int_literal", "float_literal", "imaginary_literal"],
    is_exported: go_is_exported,
};

pub static PYTHON_GRAMMAR: LangGrammar = LangGrammar {
    lang: Lang::Python,
    function_nodes: &["function_definition"],
    type_nodes: &[("class_definition", DeclKind::Class)],
    constant_nodes: &[],
    wrapper_nodes: &["decorated_definition"],
    attribute_nodes: &[],
    params_field: "parameters",
    receiver_params: &[],
    field_nodes: &[],
    control_flow_nodes: &[
        ("if_statement", StmtKind::Branch),
        ("for_statement", StmtKind::Loop),
        ("while_statement", StmtKind::Loop),
        ("match_statement", StmtKind::Match),
        ("try_statement", StmtKind::Other),
        ("with_statement", StmtKind::Other),
    ],
    branch_nodes: &[
        "elif_clause",
        "case_clause",
        "except_clause",
        "conditional_expression",
    ],
    boolean_nodes: &["boolean_operator"],
    else_nodes: &[],
    statement_nodes: &[
        ("expression_statement", StmtKind::Expression),
        ("return_statement", StmtKind::Return),
        ("raise_statement", StmtKind::Other),
        ("assert_statement", StmtKind::Other),
        ("pass_statement", StmtKind::Other),
        ("delete_statement", StmtKind::Other),
        ("break_statement", StmtKind::Other),
        ("continue_statement", StmtKind::Other),
        ("global_statement", StmtKind::Other),
        ("nonlocal_statement", StmtKind::Other),
    ],
    comment_nodes: &["comment"],
    number_nodes: &["integer", "float"],
    is_exported: python_is_exported,
};

pub static JAVASCRIPT_GRAMMAR: LangGrammar = LangGrammar {
    lang: Lang::JavaScript,
    function_nodes: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
    ],
    type_nodes: &[("class_declaration", DeclKind::Class)],
    constant_nodes: &[],
    wrapper_nodes: &["export_statement"],
    attribute_nodes: &[],
    params_field: "parameters",
    receiver_params: &[],
    field_nodes: &["field_definition"],
    control_flow_nodes: JS_CONTROL_FLOW,
    branch_nodes: &["switch_case", "catch_clause", "ternary_expression"],
    boolean_nodes: &["binary_expression"],
    else_nodes: &["else_clause"],
    statement_nodes: JS_STATEMENTS,
    comment_nodes: &["comment"],
    number_nodes: &["number"],
    is_exported: js_is_exported,
};

pub static TYPESCRIPT_GRAMMAR: LangGrammar = LangGrammar {
    lang: Lang::TypeScript,
    function_nodes: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
    ],
    type_nodes: &[
        ("class_declaration", DeclKind::Class),
        ("abstract_class_declaration", DeclKind::Class),
        ("interface_declaration", DeclKind::Interface),
        ("enum_declaration", DeclKind::Enum),
        ("type_alias_declaration", DeclKind::TypeAlias),
    ],
    constant_nodes: &[],
    wrapper_nodes: &["export_statement"],
    attribute_nodes: &[],
    params_field: "parameters",
    receiver_params: &[],
    field_nodes: &["public_field_definition", "property_signature"],
    control_flow_nodes: JS_CONTROL_FLOW,
    branch_nodes: &["switch_case", "catch_clause", "ternary_expression"],
    boolean_nodes: &["binary_expression"],
    else_nodes: &["else_clause"],
    statement_nodes: JS_STATEMENTS,
    comment_nodes: &["comment"],
    number_nodes: &["number"],
    is_exported: js_is_exported,
};

pub static JAVA_GRAMMAR: LangGrammar = LangGrammar {
    lang: Lang::Java,
    function_nodes: &["method_declaration", "constructor_declaration"],
    type_nodes: &[
        ("class_declaration", DeclKind::Class),
        ("record_declaration", DeclKind::Class),
        ("interface_declaration", DeclKind::Interface),
        ("annotation_type_declaration", DeclKind::Interface),
        ("enum_declaration", DeclKind::Enum),
    ],
    constant_nodes: &[],
    wrapper_nodes: &[],
    attribute_nodes: &[],
    params_field: "parameters",
    receiver_params: &["receiver_parameter"],
    field_nodes: &["field_declaration"],
    control_flow_nodes: &[
        ("if_statement", StmtKind::Branch),
        ("for_statement", StmtKind::Loop),
        ("enhanced_for_statement", StmtKind::Loop),
        ("while_statement", StmtKind::Loop),
        ("do_statement", StmtKind::Loop),
        ("switch_expression", StmtKind::Match),
        ("try_statement", StmtKind::Other),
        ("try_with_resources_statement", StmtKind::Other),
    ],
    branch_nodes: &["switch_label", "catch_clause", "ternary_expression"],
    boolean_nodes: &["binary_expression"],
    else_nodes: &[],
    statement_nodes: &[
        ("local_variable_declaration", StmtKind::Binding),
        ("expression_statement", StmtKind::Expression),
        ("return_statement", StmtKind::Return),
        ("throw_statement", StmtKind::Other),
        ("break_statement", StmtKind::Other),
        ("continue_statement", StmtKind::Other),
    ],
    comment_nodes: &["line_comment", "block_comment"],
    number_nodes: &[
        "decimal_integer_literal",
        "hex_integer_literal",
        "octal_integer_literal",
        "binary_integer_literal",
        "decimal_floating_point_literal",
    ],
    is_exported: java_is_exported,
};

// =============================================================================
// Grammar Lookup
// =============================================================================

pub fn grammar_for(lang: Lang) -> &'static LangGrammar {
    match lang {
        Lang::Rust => &RUST_GRAMMAR,
        Lang::Go => &GO_GRAMMAR,
        Lang::Python => &PYTHON_GRAMMAR,
        Lang::JavaScript => &JAVASCRIPT_GRAMMAR,
        Lang::TypeScript => &TYPESCRIPT_GRAMMAR,
        Lang::Java => &JAVA_GRAMMAR,
    }
}

/// Reserved words kept verbatim by token normalization
pub fn keywords(lang: Lang) -> &'static [&'static str] {
    match lang {
        Lang::Rust => &[
            "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
            "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod",
            "move", "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super",
            "trait", "true", "type", "unsafe", "use", "where", "while",
        ],
        Lang::Go => &[
            "break", "case", "chan", "const", "continue", "default", "defer", "else",
            "fallthrough", "for", "func", "go", "goto", "if", "import", "interface", "map",
            "package", "range", "return", "select", "struct", "switch", "type", "var", "nil",
            "true", "false",
        ],
        Lang::Python => &[
            "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del",
            "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in",
            "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
            "with", "yield", "None", "True", "False", "self",
        ],
        Lang::JavaScript | Lang::TypeScript => &[
            "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
            "delete", "do", "else", "export", "extends", "finally", "for", "function", "if",
            "import", "in", "instanceof", "interface", "let", "new", "null", "of", "return",
            "super", "switch", "this", "throw", "try", "typeof", "undefined", "var", "void",
            "while", "yield", "true", "false", "type", "enum", "implements", "private",
            "protected", "public", "readonly",
        ],
        Lang::Java => &[
            "abstract", "break", "case", "catch", "class", "continue", "default", "do", "else",
            "enum", "extends", "final", "finally", "for", "if", "implements", "import",
            "instanceof", "interface", "new", "null", "package", "private", "protected",
            "public", "return", "static", "super", "switch", "this", "throw", "throws", "try",
            "var", "void", "while", "true", "false",
        ],
    }
}
