//! Function-quality detectors: length, complexity, parameters, nesting
//!
//! All four compare a precomputed declaration metric against the language's
//! threshold and fire only when the metric strictly exceeds it.

use crate::config::Thresholds;
use crate::model::{DetectorId, Finding};
use crate::parsing::{Declaration, StructuralTree};

use super::{describe, DetectContext, Detector};

/// Threshold check over one callable metric
#[derive(Debug, Clone, Copy)]
pub struct FunctionMetric {
    id: DetectorId,
}

impl FunctionMetric {
    /// `None` unless `id` names one of the four function metrics
    pub fn new(id: DetectorId) -> Option<Self> {
        match id {
            DetectorId::FunctionLength
            | DetectorId::CyclomaticComplexity
            | DetectorId::ParameterCount
            | DetectorId::NestingDepth => Some(Self { id }),
            _ => None,
        }
    }

    /// Measured value and the limit it is compared against
    fn measure(&self, decl: &Declaration, t: &Thresholds) -> (usize, usize) {
        match self.id {
            DetectorId::FunctionLength => (decl.line_count, t.max_function_lines),
            DetectorId::CyclomaticComplexity => (decl.complexity, t.max_complexity),
            DetectorId::ParameterCount => (decl.params, t.max_parameters),
            _ => (decl.nesting_depth, t.max_nesting_depth),
        }
    }

    fn message(&self, decl: &Declaration, value: usize, limit: usize) -> String {
        let subject = describe(decl);
        match self.id {
            DetectorId::FunctionLength => {
                format!("{subject} is {value} lines long (limit {limit})")
            }
            DetectorId::CyclomaticComplexity => {
                format!("{subject} has cyclomatic complexity {value} (limit {limit})")
            }
            DetectorId::ParameterCount => {
                format!("{subject} takes {value} parameters (limit {limit})")
            }
            _ => format!("{subject} nests control flow {value} levels deep (limit {limit})"),
        }
    }
}

impl Detector for FunctionMetric {
    fn id(&self) -> DetectorId {
        self.id
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        tree.declarations()
            .iter()
            .filter(|decl| decl.kind.is_callable())
            .filter_map(|decl| {
                let (value, limit) = self.measure(decl, ctx.thresholds);
                (value > limit).then(|| {
                    Finding::new(
                        self.id,
                        tree.path(),
                        tree.lang(),
                        decl.span,
                        self.message(decl, value, limit),
                    )
                    .with_metric(value as f64, limit as f64)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::detectors::test_support::native_tree;
    use crate::lang::Lang;

    fn body_of(lines: usize) -> String {
        // Signature and closing brace take two of the lines
        let mut src = String::from("fn measured() {\n");
        for i in 0..lines - 2 {
            src.push_str(&format!("    let _v{i} = {i};\n"));
        }
        src.push_str("}\n");
        src
    }

    fn run(id: DetectorId, src: &str, lang: Lang) -> Vec<Finding> {
        let tree = native_tree("m.src", lang, src);
        let config = DetectorConfig::default();
        let ctx = DetectContext::new(&config, lang);
        FunctionMetric::new(id).unwrap().detect(&tree, &ctx)
    }

    #[test]
    fn test_length_fires_only_above_threshold() {
        assert!(run(DetectorId::FunctionLength, &body_of(25), Lang::Rust).is_empty());

        let findings = run(DetectorId::FunctionLength, &body_of(26), Lang::Rust);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metric, Some(26.0));
        assert_eq!(findings[0].threshold, Some(25.0));
        assert!(findings[0].message.contains("`measured`"));
    }

    #[test]
    fn test_parameters_and_complexity() {
        let src = "def wide(a, b, c, d, e):\n    if a:\n        return b\n    return c\n";
        let findings = run(DetectorId::ParameterCount, src, Lang::Python);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metric, Some(5.0));
        assert!(run(DetectorId::CyclomaticComplexity, src, Lang::Python).is_empty());
    }

    #[test]
    fn test_nesting_depth() {
        let src = "func deep(x int) {\n\tfor x > 0 {\n\t\tif x > 1 {\n\t\t\tfor {\n\t\t\t\tif x > 2 {\n\t\t\t\t\tx--\n\t\t\t\t}\n\t\t\t}\n\t\t}\n\t}\n}\n";
        let src = format!("package p\n\n{src}");
        let findings = run(DetectorId::NestingDepth, &src, Lang::Go);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metric, Some(4.0));
    }

    #[test]
    fn test_only_function_ids_construct() {
        assert!(FunctionMetric::new(DetectorId::TodoMarker).is_none());
    }
}
