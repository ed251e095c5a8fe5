//! Parser abstraction
//!
//! Every backend turns raw file bytes into a [`StructuralTree`]:
//!
//! - [`native::NativeParser`]: in-process tree-sitter parse
//! - [`bridge::BridgeParser`]: out-of-process parse over a versioned JSON protocol
//! - [`heuristic::HeuristicParser`]: regex and brace matching, low confidence
//!
//! Backends are chosen once per scan and language by [`ParserSet`]. A bridge
//! that is missing or speaks the wrong protocol at start-up degrades its
//! language to the heuristic parser instead of failing the scan.
//!
//! # Example
//!
//! ```ignore
//! use codeclean_engine::config::ParserConfig;
//! use codeclean_engine::parsing::ParserSet;
//! use codeclean_engine::Lang;
//!
//! let parsers = ParserSet::resolve(&ParserConfig::default(), &[Lang::Rust]);
//! let tree = parsers.get(Lang::Rust).unwrap().parse(&file, &bytes)?;
//! ```

pub mod bridge;
pub mod grammar;
pub mod heuristic;
pub mod native;
pub mod tree;

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::{ParserConfig, ParserSetting};
use crate::error::ParseError;
use crate::lang::Lang;
use crate::model::{BackendKind, FileDescriptor};

pub use bridge::{BridgeParser, PROTOCOL_VERSION};
pub use heuristic::HeuristicParser;
pub use native::NativeParser;
pub use tree::{
    Comment, Construct, ConstructKind, DeclKind, Declaration, NumericLiteral, SourceTree,
    Statement, StmtKind, StructuralTree, Visibility,
};

/// One parser backend
pub trait Parser: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Parse one file's bytes. The bytes are only read, never retained.
    fn parse(
        &self,
        file: &FileDescriptor,
        source: &[u8],
    ) -> Result<Box<dyn StructuralTree>, ParseError>;
}

/// Decode source bytes as UTF-8, dropping a leading byte-order mark
pub(crate) fn decode_source(source: &[u8]) -> Result<&str, ParseError> {
    let source = source.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(source);
    std::str::from_utf8(source).map_err(|_| ParseError::Encoding)
}

/// A language's backend once its first file asked for it
#[derive(Clone)]
struct Resolved {
    parser: Arc<dyn Parser>,
    degraded: bool,
}

struct Slot {
    setting: ParserSetting,
    resolved: OnceCell<Resolved>,
}

impl Slot {
    fn resolve(&self, lang: Lang) -> &Resolved {
        self.resolved.get_or_init(|| {
            let resolved = match &self.setting {
                ParserSetting::Native => Resolved {
                    parser: Arc::new(NativeParser),
                    degraded: false,
                },
                ParserSetting::Heuristic => Resolved {
                    parser: Arc::new(HeuristicParser),
                    degraded: false,
                },
                ParserSetting::Bridged(command) => {
                    match BridgeParser::connect(lang, command.clone()) {
                        Ok(bridge) => Resolved {
                            parser: Arc::new(bridge),
                            degraded: false,
                        },
                        Err(err) => {
                            warn!(
                                lang = %lang,
                                program = %command.program,
                                error = %err,
                                "parser bridge unavailable, falling back to heuristic parsing"
                            );
                            Resolved {
                                parser: Arc::new(HeuristicParser),
                                degraded: true,
                            }
                        }
                    }
                }
            };
            debug!(lang = %lang, backend = ?resolved.parser.backend(), "parser resolved");
            resolved
        })
    }
}

/// Backends for one scan
///
/// Each language is resolved at most once, on first use, so a bridge is only
/// started (and only reported as degraded) when the scan actually contains
/// files in its language. Resolution is shared by all workers.
pub struct ParserSet {
    slots: BTreeMap<Lang, Slot>,
}

impl std::fmt::Debug for ParserSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved: BTreeMap<Lang, BackendKind> = self
            .slots
            .iter()
            .filter_map(|(lang, slot)| Some((*lang, slot.resolved.get()?.parser.backend())))
            .collect();
        f.debug_struct("ParserSet")
            .field("resolved", &resolved)
            .field("degraded", &self.degraded())
            .finish()
    }
}

impl ParserSet {
    /// Pick the configured backend for each language
    ///
    /// An empty `languages` slice means every supported language. Bridges
    /// are connected lazily by [`ParserSet::get`]; one that fails its
    /// handshake is replaced by the heuristic parser, logged once, and listed
    /// by [`ParserSet::degraded`].
    pub fn resolve(config: &ParserConfig, languages: &[Lang]) -> Self {
        let languages: &[Lang] = if languages.is_empty() {
            &Lang::ALL
        } else {
            languages
        };
        let slots = languages
            .iter()
            .map(|&lang| {
                let slot = Slot {
                    setting: config.setting(lang),
                    resolved: OnceCell::new(),
                };
                (lang, slot)
            })
            .collect();
        Self { slots }
    }

    /// A set with the given in-process backend for every listed language
    pub fn uniform(backend: BackendKind, languages: &[Lang]) -> Self {
        let setting = match backend {
            BackendKind::Heuristic => ParserSetting::Heuristic,
            _ => ParserSetting::Native,
        };
        let slots = languages
            .iter()
            .map(|&lang| {
                let slot = Slot {
                    setting: setting.clone(),
                    resolved: OnceCell::new(),
                };
                (lang, slot)
            })
            .collect();
        Self { slots }
    }

    /// Backend for `lang`, connecting its bridge on first use
    pub fn get(&self, lang: Lang) -> Option<Arc<dyn Parser>> {
        let slot = self.slots.get(&lang)?;
        Some(Arc::clone(&slot.resolve(lang).parser))
    }

    pub fn backend(&self, lang: Lang) -> Option<BackendKind> {
        self.get(lang).map(|p| p.backend())
    }

    /// Languages whose bridge failed to start, in language order
    pub fn degraded(&self) -> Vec<Lang> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.resolved.get().is_some_and(|r| r.degraded))
            .map(|(lang, _)| *lang)
            .collect()
    }

    pub fn languages(&self) -> impl Iterator<Item = Lang> + '_ {
        self.slots.keys().copied()
    }
}
