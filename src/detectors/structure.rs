//! Structure detectors: oversized types and oversized files

use crate::model::{DetectorId, Finding, Span};
use crate::parsing::StructuralTree;

use super::{describe, DetectContext, Detector};

/// Types that are too long, or have too many members (methods) or fields
///
/// Members include methods declared in separate `impl` blocks or through Go
/// receivers, so the count reflects the whole type. Length is measured over
/// the declaration itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeSize;

impl Detector for TypeSize {
    fn id(&self) -> DetectorId {
        DetectorId::TypeSize
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        let t = ctx.thresholds;
        let mut findings = Vec::new();

        for decl in tree.declarations().iter().filter(|d| d.kind.is_type()) {
            let measures = [
                ("lines", decl.span.line_count(), t.max_type_lines),
                ("members", decl.member_count, t.max_type_members),
                ("fields", decl.field_count, t.max_type_fields),
            ];
            for (unit, value, limit) in measures {
                if value <= limit {
                    continue;
                }
                let message = match unit {
                    "lines" => format!("{} is {value} lines long (limit {limit})", describe(decl)),
                    _ => format!("{} has {value} {unit} (limit {limit})", describe(decl)),
                };
                findings.push(
                    Finding::new(DetectorId::TypeSize, tree.path(), tree.lang(), decl.span, message)
                        .with_metric(value as f64, limit as f64),
                );
            }
        }

        findings
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileLength;

impl Detector for FileLength {
    fn id(&self) -> DetectorId {
        DetectorId::FileLength
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        let lines = tree.line_count();
        let limit = ctx.thresholds.max_file_lines;
        if lines <= limit {
            return Vec::new();
        }
        vec![Finding::new(
            DetectorId::FileLength,
            tree.path(),
            tree.lang(),
            Span::lines(1, lines),
            format!("file is {lines} lines long (limit {limit})"),
        )
        .with_metric(lines as f64, limit as f64)]
    }
}
