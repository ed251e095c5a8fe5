//! Language detection and tree-sitter grammar loading

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tree_sitter::Language;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Go,
    Python,
    JavaScript,
    TypeScript,
    Java,
}

impl Lang {
    /// Every language the engine knows how to scan, in canonical order
    pub const ALL: [Lang; 6] = [
        Lang::Rust,
        Lang::Go,
        Lang::Python,
        Lang::JavaScript,
        Lang::TypeScript,
        Lang::Java,
    ];

    /// Detect language from file path extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Detect language from file extension string
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" | "tsx" => Some(Self::TypeScript),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    /// Get the canonical name of the language (the language tag)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
        }
    }

    /// Get the tree-sitter Language for parsing
    ///
    /// `.tsx` sources need the TSX dialect of the TypeScript grammar, so the
    /// path is consulted for that one case.
    pub fn tree_sitter_language(&self, path: &Path) -> Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => {
                let is_tsx = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("tsx"));
                if is_tsx {
                    tree_sitter_typescript::LANGUAGE_TSX.into()
                } else {
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
                }
            }
            Self::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }

    /// Line comment prefix used by the heuristic parser and comment detectors
    pub fn line_comment(&self) -> &'static str {
        match self {
            Self::Python => "#",
            _ => "//",
        }
    }

    /// Whether blocks are delimited by braces (everything but Python)
    pub fn uses_braces(&self) -> bool {
        !matches!(self, Self::Python)
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rust" | "rs" => Ok(Self::Rust),
            "go" => Ok(Self::Go),
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" => Ok(Self::JavaScript),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "java" => Ok(Self::Java),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_detection() {
        assert_eq!(Lang::from_extension("rs"), Some(Lang::Rust));
        assert_eq!(Lang::from_extension("go"), Some(Lang::Go));
        assert_eq!(Lang::from_extension("py"), Some(Lang::Python));
        assert_eq!(Lang::from_extension("jsx"), Some(Lang::JavaScript));
        assert_eq!(Lang::from_extension("TSX"), Some(Lang::TypeScript));
        assert_eq!(Lang::from_extension("java"), Some(Lang::Java));
    }

    #[test]
    fn test_language_from_path() {
        let path = PathBuf::from("src/components/App.tsx");
        assert_eq!(Lang::from_path(&path), Some(Lang::TypeScript));

        let path = PathBuf::from("main.rs");
        assert_eq!(Lang::from_path(&path), Some(Lang::Rust));

        assert_eq!(Lang::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(Lang::from_extension("xyz").is_none());
    }

    #[test]
    fn test_name_round_trips_through_from_str() {
        for lang in Lang::ALL {
            assert_eq!(lang.name().parse::<Lang>().unwrap(), lang);
        }
        assert!("cobol".parse::<Lang>().is_err());
    }
}
