//! Detector framework
//!
//! A detector consumes one [`StructuralTree`] plus the scan's
//! [`DetectorConfig`] and returns findings. Detectors never see bytes, paths
//! on disk or other files; cross-file duplication is finished later by the
//! aggregator from per-file fingerprints.
//!
//! # Architecture
//!
//! - [`DetectorRegistry`] maps each language to its ordered detector list,
//!   built once per scan from the config's `enabled` list.
//! - [`DetectorRegistry::run_all`] runs every applicable detector on a tree.
//!   Each call is isolated with `catch_unwind`, so a panicking detector
//!   becomes a [`DetectorFailure`] and its siblings still run.
//!
//! # Detectors
//!
//! - `function`: length, complexity, parameters, nesting
//! - `naming`: per-language case conventions
//! - `structure`: type size, file length
//! - `documentation`: public declarations without docs
//! - `duplication`: repeated normalized statement windows
//! - `comments`: debt markers, commented-out code
//! - `magic_numbers`: unnamed numeric literals
//! - `rust_safety`: unsafe code, unwrap/expect/panic, clone counts (Rust only)

pub mod comments;
pub mod documentation;
pub mod duplication;
pub mod function;
pub mod magic_numbers;
pub mod naming;
pub mod rust_safety;
pub mod structure;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::config::{DetectorConfig, Thresholds};
use crate::lang::Lang;
use crate::model::{Category, DetectorFailure, DetectorId, Finding};
use crate::parsing::StructuralTree;

/// Languages a detector applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangScope {
    All,
    Only(&'static [Lang]),
}

impl LangScope {
    pub fn includes(&self, lang: Lang) -> bool {
        match self {
            Self::All => true,
            Self::Only(langs) => langs.contains(&lang),
        }
    }
}

/// Everything a detector may consult besides the tree
#[derive(Debug, Clone, Copy)]
pub struct DetectContext<'a> {
    pub config: &'a DetectorConfig,
    /// Thresholds for the tree's language
    pub thresholds: &'a Thresholds,
}

impl<'a> DetectContext<'a> {
    pub fn new(config: &'a DetectorConfig, lang: Lang) -> Self {
        Self {
            config,
            thresholds: config.thresholds(lang),
        }
    }
}

/// One rule check
pub trait Detector: Send + Sync {
    fn id(&self) -> DetectorId;

    fn category(&self) -> Category {
        self.id().category()
    }

    fn languages(&self) -> LangScope {
        LangScope::All
    }

    fn detect(&self, tree: &dyn StructuralTree, ctx: &DetectContext<'_>) -> Vec<Finding>;
}

/// Built-in detector for `id`; `None` for ids the engine does not run itself
pub fn builtin(id: DetectorId) -> Option<Arc<dyn Detector>> {
    let detector: Arc<dyn Detector> = match id {
        DetectorId::FunctionLength
        | DetectorId::CyclomaticComplexity
        | DetectorId::ParameterCount
        | DetectorId::NestingDepth => Arc::new(function::FunctionMetric::new(id)?),
        DetectorId::NamingConvention => Arc::new(naming::NamingConvention),
        DetectorId::TypeSize => Arc::new(structure::TypeSize),
        DetectorId::FileLength => Arc::new(structure::FileLength),
        DetectorId::MissingDocumentation => Arc::new(documentation::MissingDocumentation),
        DetectorId::DuplicateCode => Arc::new(duplication::DuplicateCode),
        DetectorId::TodoMarker => Arc::new(comments::TodoMarker),
        DetectorId::CommentedCode => Arc::new(comments::CommentedCode),
        DetectorId::MagicNumber => Arc::new(magic_numbers::MagicNumber),
        DetectorId::UnsafeCode => Arc::new(rust_safety::UnsafeCode),
        DetectorId::UnwrapUsage => Arc::new(rust_safety::UnwrapUsage),
        DetectorId::ExcessiveClone => Arc::new(rust_safety::ExcessiveClone),
        DetectorId::ExternalTool => return None,
    };
    Some(detector)
}

/// Language-scoped, ordered detector sets for one scan
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    by_lang: BTreeMap<Lang, Vec<Arc<dyn Detector>>>,
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: BTreeMap<Lang, Vec<DetectorId>> = self
            .by_lang
            .iter()
            .map(|(lang, detectors)| (*lang, detectors.iter().map(|d| d.id()).collect()))
            .collect();
        f.debug_struct("DetectorRegistry").field("by_lang", &ids).finish()
    }
}

impl DetectorRegistry {
    /// Built-in detectors in the config's `enabled` order
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::with_detectors(config.enabled.iter().filter_map(|id| builtin(*id)))
    }

    /// Registry over an explicit detector list, in the given order
    pub fn with_detectors(detectors: impl IntoIterator<Item = Arc<dyn Detector>>) -> Self {
        let detectors: Vec<Arc<dyn Detector>> = detectors.into_iter().collect();
        let by_lang = Lang::ALL
            .into_iter()
            .map(|lang| {
                let applicable = detectors
                    .iter()
                    .filter(|d| d.languages().includes(lang))
                    .cloned()
                    .collect();
                (lang, applicable)
            })
            .collect();
        Self { by_lang }
    }

    pub fn for_lang(&self, lang: Lang) -> &[Arc<dyn Detector>] {
        self.by_lang.get(&lang).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_registered(&self, lang: Lang, id: DetectorId) -> bool {
        self.for_lang(lang).iter().any(|d| d.id() == id)
    }

    /// Run every detector for the tree's language
    ///
    /// Findings inherit the tree's confidence. A detector that panics
    /// contributes no findings and one failure record.
    pub fn run_all(
        &self,
        tree: &dyn StructuralTree,
        config: &DetectorConfig,
    ) -> (Vec<Finding>, Vec<DetectorFailure>) {
        let ctx = DetectContext::new(config, tree.lang());
        let confidence = tree.confidence();
        let mut findings = Vec::new();
        let mut failures = Vec::new();

        for detector in self.for_lang(tree.lang()) {
            match catch_unwind(AssertUnwindSafe(|| detector.detect(tree, &ctx))) {
                Ok(found) => {
                    findings.extend(found.into_iter().map(|f| f.with_confidence(confidence)))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(
                        detector = %detector.id(),
                        path = %tree.path().display(),
                        error = %message,
                        "detector panicked"
                    );
                    failures.push(DetectorFailure {
                        detector: detector.id(),
                        message,
                    });
                }
            }
        }

        (findings, failures)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "detector panicked".to_string()
    }
}

/// Lowercase kind label with the declaration name, for messages
pub(crate) fn describe(decl: &crate::parsing::Declaration) -> String {
    format!("{} `{}`", decl.kind.label(), decl.name)
}
