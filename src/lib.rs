//! codeclean-engine: multi-language clean-code scanner
//!
//! Walks a codebase, parses each source file into a common structural
//! model, runs a registry of detectors over it, classifies every finding by
//! severity and returns one deterministic [`ScanResult`].
//!
//! # Supported Languages
//!
//! - Rust
//! - Go
//! - Python (bridged parser, heuristic fallback)
//! - JavaScript, JSX
//! - TypeScript, TSX
//! - Java
//!
//! # Example
//!
//! ```ignore
//! use codeclean_engine::{scan, ScanRequest, Severity};
//!
//! let result = scan(ScanRequest::new(["./src"]).with_workers(4))?;
//! for finding in result.findings().filter(|f| f.severity >= Severity::High) {
//!     println!("{}:{} {}", finding.finding.path.display(), finding.finding.span.start_line, finding.finding.message);
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod lang;
pub mod lint;
pub mod model;
pub mod parsing;
pub mod scheduler;
pub mod severity;
pub mod walker;

mod process;

// Re-export commonly used types
pub use config::{DetectorConfig, ParserConfig, ScanConfig, Thresholds};
pub use engine::{default_workers, scan, ScanRequest};
pub use error::{EngineError, Result};
pub use lang::Lang;
pub use model::{
    ClassifiedFinding, Confidence, DetectorId, FileDescriptor, FileOutcome, Finding, ScanCounters,
    ScanResult, Severity, SkipReason, Span, ToolLevel,
};
pub use scheduler::{CancellationToken, JobState};
pub use walker::WalkOptions;
