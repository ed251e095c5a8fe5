//! Unnamed numeric literals

use crate::model::{DetectorId, Finding, Span};
use crate::parsing::StructuralTree;

use super::{DetectContext, Detector};

#[derive(Debug, Default, Clone, Copy)]
pub struct MagicNumber;

impl Detector for MagicNumber {
    fn id(&self) -> DetectorId {
        DetectorId::MagicNumber
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        let test_spans: Vec<Span> = tree
            .declarations()
            .iter()
            .filter(|d| d.in_test)
            .map(|d| d.span)
            .collect();

        tree.literals()
            .iter()
            .filter(|lit| !lit.in_constant)
            .filter(|lit| {
                lit.value
                    .is_some_and(|value| !ctx.thresholds.is_allowed_number(value))
            })
            .filter(|lit| !test_spans.iter().any(|s| s.contains_line(lit.span.start_line)))
            .map(|lit| {
                Finding::new(
                    DetectorId::MagicNumber,
                    tree.path(),
                    tree.lang(),
                    lit.span,
                    format!("magic number {}", lit.raw),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, Thresholds};
    use crate::detectors::test_support::native_tree;
    use crate::lang::Lang;

    fn run(lang: Lang, name: &str, src: &str, config: &DetectorConfig) -> Vec<String> {
        let tree = native_tree(name, lang, src);
        MagicNumber
            .detect(&tree, &DetectContext::new(config, lang))
            .into_iter()
            .map(|f| f.message)
            .collect()
    }

    #[test]
    fn test_constants_and_allowed_values_are_skipped() {
        let src = "const LIMIT: u32 = 86400;\n\nfn wait(n: u32) -> u32 {\n    n * 60 + 1 + LIMIT\n}\n";
        let config = DetectorConfig::default();
        assert_eq!(run(Lang::Rust, "m.rs", src, &config), vec!["magic number 60"]);
    }

    #[test]
    fn test_typed_literals_are_reported() {
        let src = "fn timeouts() -> (u64, f32) {\n    let t = 3600u64;\n    let r = 3.75f32;\n    (t, r)\n}\n";
        let config = DetectorConfig::default();
        assert_eq!(
            run(Lang::Rust, "t.rs", src, &config),
            vec!["magic number 3600u64", "magic number 3.75f32"]
        );
    }

    #[test]
    fn test_allowed_list_comes_from_thresholds() {
        let config = DetectorConfig::default().with_thresholds(
            Lang::Python,
            Thresholds {
                allowed_magic_numbers: vec![60.0],
                ..Thresholds::default()
            },
        );
        let src = "def wait(n):\n    return n * 60 + 7\n";
        assert_eq!(run(Lang::Python, "m.py", src, &config), vec!["magic number 7"]);
    }

    #[test]
    fn test_literals_in_tests_are_skipped() {
        let src = "fn real() -> u32 {\n    42\n}\n\n#[cfg(test)]\nmod tests {\n    #[test]\n    fn checks() {\n        assert_eq!(super::real(), 42);\n    }\n}\n";
        let config = DetectorConfig::default();
        let messages = run(Lang::Rust, "lib.rs", src, &config);
        assert_eq!(messages, vec!["magic number 42"]);
    }
}
