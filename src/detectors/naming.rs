//! Naming convention detector
//!
//! | Language | Functions / methods | Types | Constants |
//! |---|---|---|---|
//! | Rust | `snake_case` (modules too) | `PascalCase` | `SCREAMING_SNAKE_CASE` |
//! | Go | no underscores | no underscores | - |
//! | Python | `snake_case` | `PascalCase` | - |
//! | JS / TS / Java | `camelCase` | `PascalCase` | Java: `SCREAMING_SNAKE_CASE` |
//!
//! Single-letter and anonymous names are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lang::Lang;
use crate::model::{DetectorId, Finding};
use crate::parsing::{DeclKind, Declaration, StructuralTree};

use super::{describe, DetectContext, Detector};

static SNAKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_*[a-z][a-z0-9_]*$").expect("snake case regex is valid"));
static SCREAMING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_*[A-Z][A-Z0-9_]*$").expect("screaming case regex is valid"));
static PASCAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_*[A-Z][A-Za-z0-9]*$").expect("pascal case regex is valid"));
static CAMEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_$]*[a-z][A-Za-z0-9$]*$").expect("camel case regex is valid"));

/// A case convention a name is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    SnakeCase,
    ScreamingSnakeCase,
    PascalCase,
    CamelCase,
    /// Go MixedCaps: anything without underscores
    MixedCaps,
}

impl Convention {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::SnakeCase => SNAKE.is_match(name),
            Self::ScreamingSnakeCase => SCREAMING.is_match(name),
            Self::PascalCase => PASCAL.is_match(name),
            Self::CamelCase => CAMEL.is_match(name),
            Self::MixedCaps => !name.contains('_'),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SnakeCase => "snake_case",
            Self::ScreamingSnakeCase => "SCREAMING_SNAKE_CASE",
            Self::PascalCase => "PascalCase",
            Self::CamelCase => "camelCase",
            Self::MixedCaps => "MixedCaps",
        }
    }
}

/// Convention expected for a declaration, if the language has one for it
pub fn expected(lang: Lang, decl: &Declaration) -> Option<Convention> {
    use DeclKind::*;

    match (lang, decl.kind) {
        (Lang::Rust, Function | Method | Module) => Some(Convention::SnakeCase),
        (Lang::Rust, Struct | Enum | Trait | TypeAlias) => Some(Convention::PascalCase),
        (Lang::Rust, Constant | Static) => Some(Convention::ScreamingSnakeCase),

        (Lang::Go, Function | Method | Struct | Interface | TypeAlias) => {
            Some(Convention::MixedCaps)
        }

        (Lang::Python, Function | Method) => Some(Convention::SnakeCase),
        (Lang::Python, Class) => Some(Convention::PascalCase),

        // Constructors carry their class's name
        (Lang::Java, Method) if decl.parent.as_deref() == Some(decl.name.as_str()) => None,
        (Lang::Java, Constant) => Some(Convention::ScreamingSnakeCase),
        (Lang::JavaScript | Lang::TypeScript | Lang::Java, Function | Method) => {
            Some(Convention::CamelCase)
        }
        (
            Lang::JavaScript | Lang::TypeScript | Lang::Java,
            Class | Interface | Enum | TypeAlias,
        ) => Some(Convention::PascalCase),

        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NamingConvention;

impl Detector for NamingConvention {
    fn id(&self) -> DetectorId {
        DetectorId::NamingConvention
    }

    fn detect(&self, tree: &dyn StructuralTree, _ctx: &DetectContext<'_>) -> Vec<Finding> {
        let lang = tree.lang();
        tree.declarations()
            .iter()
            .filter_map(|decl| {
                let name = decl.name.strip_prefix("r#").unwrap_or(&decl.name);
                if name.chars().count() <= 1 || name.starts_with('<') {
                    return None;
                }
                let convention = expected(lang, decl)?;
                if convention.matches(name) {
                    return None;
                }
                Some(Finding::new(
                    DetectorId::NamingConvention,
                    tree.path(),
                    lang,
                    decl.span,
                    format!("{} should be {}", describe(decl), convention.label()),
                ))
            })
            .collect()
    }
}
