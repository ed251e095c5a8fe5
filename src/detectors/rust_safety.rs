//! Rust-only detectors: unsafe code, panicking error handling, clone counts

use std::collections::BTreeMap;

use crate::lang::Lang;
use crate::model::{DetectorId, Finding};
use crate::parsing::{ConstructKind, StructuralTree};

use super::{describe, DetectContext, Detector, LangScope};

const RUST_ONLY: LangScope = LangScope::Only(&[Lang::Rust]);

/// How far above an unsafe construct a `SAFETY` comment may sit
const SAFETY_LOOKBACK: usize = 10;

/// Whether `line` or the comment and attribute lines directly above it
/// carry a `SAFETY` note
fn has_safety_comment(tree: &dyn StructuralTree, line: usize) -> bool {
    let mentions = |text: &str| text.to_ascii_uppercase().contains("SAFETY");
    if tree.line(line).is_some_and(mentions) {
        return true;
    }
    let floor = line.saturating_sub(SAFETY_LOOKBACK).max(1);
    for above in (floor..line).rev() {
        let Some(text) = tree.line(above) else { break };
        let text = text.trim();
        let annotation = text.starts_with("//")
            || text.starts_with("/*")
            || text.starts_with('*')
            || text.starts_with("#[");
        if !annotation {
            break;
        }
        if mentions(text) {
            return true;
        }
    }
    false
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsafeCode;

impl Detector for UnsafeCode {
    fn id(&self) -> DetectorId {
        DetectorId::UnsafeCode
    }

    fn languages(&self) -> LangScope {
        RUST_ONLY
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        let require_comments = ctx.thresholds.require_unsafe_comments;
        tree.constructs()
            .iter()
            .filter_map(|construct| {
                let message = match &construct.kind {
                    ConstructKind::UnsafeBlock | ConstructKind::UnsafeItem
                        if require_comments
                            && !has_safety_comment(tree, construct.span.start_line) =>
                    {
                        let what = if construct.kind == ConstructKind::UnsafeBlock {
                            "unsafe block"
                        } else {
                            "unsafe item"
                        };
                        format!("{what} without a SAFETY comment")
                    }
                    ConstructKind::Call { name } if name.ends_with("transmute") => {
                        format!("use of `{name}`")
                    }
                    _ => return None,
                };
                Some(Finding::new(
                    DetectorId::UnsafeCode,
                    tree.path(),
                    tree.lang(),
                    construct.span,
                    message,
                ))
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnwrapUsage;

impl Detector for UnwrapUsage {
    fn id(&self) -> DetectorId {
        DetectorId::UnwrapUsage
    }

    fn languages(&self) -> LangScope {
        RUST_ONLY
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        if ctx.thresholds.allow_unwrap {
            return Vec::new();
        }
        tree.constructs()
            .iter()
            .filter(|c| !c.in_test)
            .filter_map(|construct| {
                let call = match &construct.kind {
                    ConstructKind::MethodCall { name } if name == "unwrap" || name == "expect" => {
                        format!("`.{name}()`")
                    }
                    ConstructKind::Macro { name } if name == "panic" => "`panic!`".to_string(),
                    _ => return None,
                };
                Some(Finding::new(
                    DetectorId::UnwrapUsage,
                    tree.path(),
                    tree.lang(),
                    construct.span,
                    format!("{call} outside tests; propagate the error instead"),
                ))
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExcessiveClone;

impl Detector for ExcessiveClone {
    fn id(&self) -> DetectorId {
        DetectorId::ExcessiveClone
    }

    fn languages(&self) -> LangScope {
        RUST_ONLY
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding> {
        let limit = ctx.thresholds.max_clones_per_function;
        let mut per_scope: BTreeMap<usize, usize> = BTreeMap::new();
        for construct in tree.constructs().iter().filter(|c| !c.in_test) {
            if let (ConstructKind::MethodCall { name }, Some(scope)) =
                (&construct.kind, construct.scope)
            {
                if name == "clone" {
                    *per_scope.entry(scope).or_default() += 1;
                }
            }
        }

        per_scope
            .into_iter()
            .filter(|(_, count)| *count > limit)
            .filter_map(|(scope, count)| {
                let decl = tree.declarations().get(scope)?;
                Some(
                    Finding::new(
                        DetectorId::ExcessiveClone,
                        tree.path(),
                        tree.lang(),
                        decl.span,
                        format!("{} calls `.clone()` {count} times (limit {limit})", describe(decl)),
                    )
                    .with_metric(count as f64, limit as f64),
                )
            })
            .collect()
    }
}
