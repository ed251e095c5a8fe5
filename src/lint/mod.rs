//! External lint tools
//!
//! Tools run after the file scan, once per applicable root, in parallel
//! across (tool, root) pairs. Each tool is an [`ExternalTool`] adapter: it
//! decides whether a root is its business, builds the command line and
//! parses the tool's stdout.
//!
//! A run that cannot produce findings (tool missing, crash, timeout,
//! unparseable output) is recorded as [`ToolStatus::Unavailable`] and
//! contributes nothing; the scan itself never fails because of a tool.
//!
//! ## Shipped adapters
//! - **Rust**: Clippy ([`ClippyTool`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use codeclean_engine::lint::{run_tools, ClippyTool, ExternalTool, DEFAULT_TOOL_TIMEOUT};
//! use std::sync::Arc;
//!
//! let tools: Vec<Arc<dyn ExternalTool>> = vec![Arc::new(ClippyTool)];
//! let runs = run_tools(&tools, &[root], DEFAULT_TOOL_TIMEOUT);
//! ```

mod clippy;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::lang::Lang;
use crate::model::{DetectorId, Finding, Provenance, Span, ToolLevel, ToolReport, ToolStatus};
use crate::process::{run_with_deadline, RunError};

pub use clippy::ClippyTool;

/// Default wall-clock limit for one tool run
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Command line for one tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// One issue as reported by a tool, before it becomes a [`Finding`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFinding {
    /// Absolute, or relative to the root the tool ran in
    pub path: PathBuf,
    pub span: Span,
    /// The tool's own lint code
    pub rule: String,
    pub message: String,
    /// Drives the base severity of the resulting finding
    pub level: Option<ToolLevel>,
}

/// Adapter for one external analyzer
pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, root: &Path) -> bool;

    fn command(&self, root: &Path) -> ToolCommand;

    fn parse_output(&self, stdout: &str, root: &Path) -> Vec<ToolFinding>;
}

/// Outcome of running one tool over one root
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub report: ToolReport,
    pub findings: Vec<Finding>,
}

impl ToolFinding {
    /// Engine finding for this issue; `None` for files in no scanned language
    pub fn into_finding(self, tool: &str, root: &Path) -> Option<Finding> {
        let path = if self.path.is_absolute() {
            self.path
        } else {
            root.join(self.path)
        };
        let lang = Lang::from_path(&path)?;
        let mut finding = Finding::new(
            DetectorId::ExternalTool,
            &path,
            lang,
            self.span,
            format!("{tool}: {}", self.message),
        );
        finding.rule = self.rule;
        finding.tool_level = self.level;
        finding.provenance = Provenance::ExternalTool {
            tool: tool.to_string(),
        };
        Some(finding)
    }
}

/// Run every applicable tool on every root
///
/// Runs are returned in (tool, root) order regardless of completion order.
pub fn run_tools(
    tools: &[Arc<dyn ExternalTool>],
    roots: &[PathBuf],
    timeout: Duration,
) -> Vec<ToolRun> {
    let pairs: Vec<(&Arc<dyn ExternalTool>, &PathBuf)> = tools
        .iter()
        .flat_map(|tool| roots.iter().map(move |root| (tool, root)))
        .filter(|(tool, root)| tool.applies_to(root))
        .collect();

    if pairs.is_empty() {
        debug!("no external tool applies to the scanned roots");
        return Vec::new();
    }

    pairs
        .par_iter()
        .map(|&(tool, root)| run_one(tool.as_ref(), root, timeout))
        .collect()
}

fn run_one(tool: &dyn ExternalTool, root: &Path, timeout: Duration) -> ToolRun {
    let start = Instant::now();
    let status = execute(tool, root, timeout);
    let duration_ms = start.elapsed().as_millis() as u64;

    let (status, findings) = match status {
        Ok(findings) => {
            info!(
                tool = tool.name(),
                root = %root.display(),
                findings = findings.len(),
                duration_ms,
                "external tool finished"
            );
            (
                ToolStatus::Ran {
                    findings: findings.len(),
                    dropped: 0,
                },
                findings,
            )
        }
        Err(error) => {
            warn!(
                tool = tool.name(),
                root = %root.display(),
                error = %error,
                "external tool findings unavailable"
            );
            (ToolStatus::Unavailable { error }, Vec::new())
        }
    };

    ToolRun {
        report: ToolReport {
            tool: tool.name().to_string(),
            root: root.to_path_buf(),
            status,
            duration_ms,
        },
        findings,
    }
}

fn execute(
    tool: &dyn ExternalTool,
    root: &Path,
    timeout: Duration,
) -> Result<Vec<Finding>, ToolError> {
    let name = tool.name().to_string();
    let spec = tool.command(root);

    if which::which(&spec.program).is_err() {
        return Err(ToolError::NotInstalled { tool: name });
    }

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).current_dir(&spec.cwd);

    let captured = run_with_deadline(cmd, None, timeout).map_err(|e| match e {
        RunError::TimedOut => ToolError::Timeout {
            tool: name.clone(),
            millis: timeout.as_millis() as u64,
        },
        RunError::Spawn(err) if err.kind() == std::io::ErrorKind::NotFound => {
            ToolError::NotInstalled { tool: name.clone() }
        }
        RunError::Spawn(err) | RunError::Io(err) => ToolError::Spawn {
            tool: name.clone(),
            message: err.to_string(),
        },
    })?;

    let stdout = String::from_utf8_lossy(&captured.stdout);
    let issues = tool.parse_output(&stdout, root);

    // Lint tools exit non-zero when they find something; that only counts as
    // a failure when nothing parseable came back.
    if !captured.status.success() && issues.is_empty() {
        debug!(tool = %name, stderr = %captured.stderr_summary(), "tool failed");
        return Err(ToolError::NoOutput {
            tool: name,
            exit_code: captured.status.code(),
        });
    }

    Ok(issues
        .into_iter()
        .filter_map(|issue| issue.into_finding(tool.name(), root))
        .collect())
}
