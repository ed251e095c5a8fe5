//! Missing documentation on public declarations

use crate::model::{DetectorId, Finding};
use crate::parsing::{DeclKind, StructuralTree};

use super::{describe, DetectContext, Detector};

#[derive(Debug, Default, Clone, Copy)]
pub struct MissingDocumentation;

impl Detector for MissingDocumentation {
    fn id(&self) -> DetectorId {
        DetectorId::MissingDocumentation
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        if !ctx.thresholds.require_public_docs {
            return Vec::new();
        }
        tree.declarations()
            .iter()
            .filter(|d| d.is_public() && !d.in_test)
            .filter(|d| !matches!(d.kind, DeclKind::Impl | DeclKind::Module))
            .filter(|d| d.doc.as_deref().map_or(true, |doc| doc.trim().is_empty()))
            .map(|decl| {
                Finding::new(
                    DetectorId::MissingDocumentation,
                    tree.path(),
                    tree.lang(),
                    decl.span,
                    format!("public {} has no documentation", describe(decl)),
                )
            })
            .collect()
    }
}
