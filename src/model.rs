//! Core data model shared by the walker, parsers, detectors and aggregator
//!
//! Everything a reporter can see lives here: descriptors, findings,
//! severities, per-file outcomes and the frozen [`ScanResult`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, FileError, ToolError};
use crate::lang::Lang;

// ============================================================================
// Files and locations
// ============================================================================

/// A file selected for scanning. Immutable once the walker creates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub lang: Lang,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>, lang: Lang, size: u64) -> Self {
        Self {
            path: path.into(),
            lang,
            size,
            modified: None,
        }
    }
}

/// Source range, 1-based lines and columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Span covering whole lines `start..=end`
    pub fn lines(start_line: usize, end_line: usize) -> Self {
        Self::new(start_line, 1, end_line, 1)
    }

    /// Number of lines covered, inclusive
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// How much the structural tree behind a finding can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Heuristic (non-AST) parse, produced in degraded mode
    Low,
    /// Full parse by a native or bridged backend
    High,
}

/// Which parser backend produced a file's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Bridged,
    Heuristic,
}

impl BackendKind {
    pub fn confidence(&self) -> Confidence {
        match self {
            Self::Native | Self::Bridged => Confidence::High,
            Self::Heuristic => Confidence::Low,
        }
    }
}

// ============================================================================
// Detectors and severity
// ============================================================================

/// Ordered severity tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Next tier up, saturating at Critical
    pub fn raise(self) -> Self {
        match self {
            Self::Info => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Next tier down, saturating at Info
    pub fn lower(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low | Self::Info => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown severity: {s}"))
    }
}

/// Detector grouping used by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Function,
    Naming,
    Structure,
    Documentation,
    Duplication,
    Comments,
    MagicNumbers,
    Safety,
    ErrorHandling,
    Ownership,
    /// Findings merged in from an external lint tool
    External,
}

/// Stable identifier of every detector the engine ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorId {
    FunctionLength,
    CyclomaticComplexity,
    ParameterCount,
    NestingDepth,
    NamingConvention,
    TypeSize,
    FileLength,
    MissingDocumentation,
    DuplicateCode,
    TodoMarker,
    CommentedCode,
    MagicNumber,
    UnsafeCode,
    UnwrapUsage,
    ExcessiveClone,
    /// Finding imported from an external tool
    ExternalTool,
}

impl DetectorId {
    /// Detectors in default registration order
    pub const BUILTIN: [DetectorId; 15] = [
        DetectorId::FunctionLength,
        DetectorId::CyclomaticComplexity,
        DetectorId::ParameterCount,
        DetectorId::NestingDepth,
        DetectorId::NamingConvention,
        DetectorId::TypeSize,
        DetectorId::FileLength,
        DetectorId::MissingDocumentation,
        DetectorId::DuplicateCode,
        DetectorId::TodoMarker,
        DetectorId::CommentedCode,
        DetectorId::MagicNumber,
        DetectorId::UnsafeCode,
        DetectorId::UnwrapUsage,
        DetectorId::ExcessiveClone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FunctionLength => "function-length",
            Self::CyclomaticComplexity => "cyclomatic-complexity",
            Self::ParameterCount => "parameter-count",
            Self::NestingDepth => "nesting-depth",
            Self::NamingConvention => "naming-convention",
            Self::TypeSize => "type-size",
            Self::FileLength => "file-length",
            Self::MissingDocumentation => "missing-documentation",
            Self::DuplicateCode => "duplicate-code",
            Self::TodoMarker => "todo-marker",
            Self::CommentedCode => "commented-code",
            Self::MagicNumber => "magic-number",
            Self::UnsafeCode => "unsafe-code",
            Self::UnwrapUsage => "unwrap-usage",
            Self::ExcessiveClone => "excessive-clone",
            Self::ExternalTool => "external-tool",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::FunctionLength
            | Self::CyclomaticComplexity
            | Self::ParameterCount
            | Self::NestingDepth => Category::Function,
            Self::NamingConvention => Category::Naming,
            Self::TypeSize | Self::FileLength => Category::Structure,
            Self::MissingDocumentation => Category::Documentation,
            Self::DuplicateCode => Category::Duplication,
            Self::TodoMarker | Self::CommentedCode => Category::Comments,
            Self::MagicNumber => Category::MagicNumbers,
            Self::UnsafeCode => Category::Safety,
            Self::UnwrapUsage => Category::ErrorHandling,
            Self::ExcessiveClone => Category::Ownership,
            Self::ExternalTool => Category::External,
        }
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::BUILTIN
            .into_iter()
            .chain(std::iter::once(Self::ExternalTool))
            .find(|id| id.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Where a finding came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Engine,
    ExternalTool { tool: String },
}

/// Diagnostic level an external tool attached to an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolLevel {
    Error,
    Warning,
    /// Anything milder (`note`, `info`, tool-specific levels)
    Info,
}

impl ToolLevel {
    /// Map a tool's level string; unknown levels read as `Info`
    pub fn from_tool(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "error" | "fatal" | "error: internal compiler error" => Self::Error,
            "warning" | "warn" => Self::Warning,
            _ => Self::Info,
        }
    }
}

// ============================================================================
// Findings
// ============================================================================

/// A single issue reported by a detector or an external tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub detector: DetectorId,
    /// Stable rule name (detector id, or the tool's own lint code)
    pub rule: String,
    pub path: PathBuf,
    pub span: Span,
    pub message: String,
    /// Raw measured value (function length, complexity, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    /// Threshold the metric was compared against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub lang: Lang,
    pub confidence: Confidence,
    pub provenance: Provenance,
    /// Level reported by the external tool, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_level: Option<ToolLevel>,
}

impl Finding {
    /// Start a finding for an engine detector; rule defaults to the detector id
    pub fn new(
        detector: DetectorId,
        path: &Path,
        lang: Lang,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            rule: detector.as_str().to_string(),
            path: path.to_path_buf(),
            span,
            message: message.into(),
            metric: None,
            threshold: None,
            lang,
            confidence: Confidence::High,
            provenance: Provenance::Engine,
            tool_level: None,
        }
    }

    /// Attach the measured value and the threshold it exceeded
    pub fn with_metric(mut self, metric: impl Into<f64>, threshold: impl Into<f64>) -> Self {
        self.metric = Some(metric.into());
        self.threshold = Some(threshold.into());
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Ordering key used to make per-file finding lists deterministic
    pub(crate) fn sort_key(&self) -> (usize, usize, DetectorId, &str, &str) {
        (
            self.span.start_line,
            self.span.start_column,
            self.detector,
            self.rule.as_str(),
            self.message.as_str(),
        )
    }
}

/// A finding paired with the severity the classifier assigned to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub severity: Severity,
}

/// A detector that panicked or errored while analyzing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorFailure {
    pub detector: DetectorId,
    pub message: String,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a discovered file was not analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge { size: u64, limit: u64 },
    TestFile,
    Binary,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, limit } => {
                write!(f, "file is {size} bytes, limit is {limit}")
            }
            Self::TestFile => f.write_str("test file"),
            Self::Binary => f.write_str("binary content"),
            Self::Cancelled => f.write_str("scan cancelled"),
        }
    }
}

/// Result of analyzing one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub lang: Lang,
    pub backend: BackendKind,
    pub confidence: Confidence,
    pub line_count: usize,
    pub findings: Vec<ClassifiedFinding>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detector_failures: Vec<DetectorFailure>,
}

/// Exactly one of these exists per discovered file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Analyzed {
        path: PathBuf,
        #[serde(flatten)]
        analysis: Analysis,
    },
    Skipped {
        path: PathBuf,
        reason: SkipReason,
    },
    Failed {
        path: PathBuf,
        error: FileError,
    },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Analyzed { path, .. } | Self::Skipped { path, .. } | Self::Failed { path, .. } => {
                path
            }
        }
    }

    pub fn findings(&self) -> &[ClassifiedFinding] {
        match self {
            Self::Analyzed { analysis, .. } => &analysis.findings,
            _ => &[],
        }
    }

    pub fn is_analyzed(&self) -> bool {
        matches!(self, Self::Analyzed { .. })
    }
}

// ============================================================================
// Scan result
// ============================================================================

/// Outcome of one external tool run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    Ran { findings: usize, dropped: usize },
    Unavailable { error: ToolError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolReport {
    pub tool: String,
    pub root: PathBuf,
    #[serde(flatten)]
    pub status: ToolStatus,
    pub duration_ms: u64,
}

/// Aggregate counters, always consistent with the outcome list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounters {
    pub files_discovered: usize,
    pub files_analyzed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub discovery_errors: usize,
    pub total_findings: usize,
    pub findings_by_severity: BTreeMap<Severity, usize>,
    pub findings_by_detector: BTreeMap<String, usize>,
    pub detector_failures: usize,
}

/// The frozen, read-only result of a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub(crate) outcomes: Vec<FileOutcome>,
    pub(crate) discovery_errors: Vec<DiscoveryError>,
    pub(crate) counters: ScanCounters,
    pub(crate) degraded_languages: Vec<Lang>,
    pub(crate) tool_reports: Vec<ToolReport>,
    pub(crate) cancelled: bool,
    pub(crate) elapsed_ms: u64,
}

impl ScanResult {
    /// Per-file outcomes, sorted by path
    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    pub fn discovery_errors(&self) -> &[DiscoveryError] {
        &self.discovery_errors
    }

    pub fn counters(&self) -> &ScanCounters {
        &self.counters
    }

    /// Languages whose bridged backend was unavailable this scan
    pub fn degraded_languages(&self) -> &[Lang] {
        &self.degraded_languages
    }

    pub fn tool_reports(&self) -> &[ToolReport] {
        &self.tool_reports
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Every classified finding, in outcome order
    pub fn findings(&self) -> impl Iterator<Item = &ClassifiedFinding> {
        self.outcomes.iter().flat_map(|o| o.findings().iter())
    }

    pub fn outcome_for(&self, path: &Path) -> Option<&FileOutcome> {
        self.outcomes
            .binary_search_by(|o| o.path().cmp(path))
            .ok()
            .map(|idx| &self.outcomes[idx])
    }

    /// Highest severity present, if any finding exists
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings().map(|f| f.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_saturation() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.raise(), Severity::Critical);
        assert_eq!(Severity::Info.lower(), Severity::Info);
        assert_eq!(Severity::Low.raise().raise(), Severity::High);
    }

    #[test]
    fn test_detector_id_parse() {
        for id in DetectorId::BUILTIN {
            assert_eq!(id.as_str().parse::<DetectorId>(), Ok(id));
        }
        assert!("no-such-detector".parse::<DetectorId>().is_err());
    }

    #[test]
    fn test_tool_level_from_tool_strings() {
        assert_eq!(ToolLevel::from_tool("error"), ToolLevel::Error);
        assert_eq!(ToolLevel::from_tool("Warning"), ToolLevel::Warning);
        assert_eq!(ToolLevel::from_tool("failure-note"), ToolLevel::Info);
        assert!(ToolLevel::Error < ToolLevel::Warning);
    }

    #[test]
    fn test_span_line_count() {
        assert_eq!(Span::lines(10, 10).line_count(), 1);
        assert_eq!(Span::lines(10, 35).line_count(), 26);
        assert!(Span::lines(3, 5).contains_line(5));
        assert!(!Span::lines(3, 5).contains_line(6));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = FileOutcome::Skipped {
            path: PathBuf::from("a.rs"),
            reason: SkipReason::TestFile,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"]["reason"], "test_file");
    }
}
