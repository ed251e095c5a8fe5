//! Single-writer result aggregation
//!
//! The [`Aggregator`] is the only thing that writes scan state. It runs on
//! its own thread, consumes [`Event`]s from the walker and the workers, and
//! after the walk is done and every discovered file has reported, it is
//! frozen into a path-sorted [`ScanResult`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::detectors::duplication::{self, FilePrints};
use crate::error::{DiscoveryError, FileError};
use crate::lang::Lang;
use crate::lint::ToolRun;
use crate::model::{
    ClassifiedFinding, DetectorId, FileOutcome, ScanCounters, ScanResult, SkipReason, ToolReport,
    ToolStatus,
};
use crate::scheduler::{CancellationToken, JobOutput, JobState};
use crate::severity::classified;

/// How often the aggregator wakes to check the cancellation token
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Messages into the aggregator
#[derive(Debug)]
pub enum Event {
    /// The walker yielded a file; one outcome is now owed for it
    Discovered(PathBuf),
    DiscoveryFailed(DiscoveryError),
    /// No more `Discovered` events will follow
    WalkFinished,
    Completed(JobOutput),
}

#[derive(Debug, Default)]
pub struct Aggregator {
    outcomes: BTreeMap<PathBuf, FileOutcome>,
    pending: BTreeSet<PathBuf>,
    discovery_errors: Vec<DiscoveryError>,
    prints: Vec<FilePrints>,
    walk_finished: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume events until every discovered file has an outcome
    ///
    /// After `cancel` fires, in-flight files get `grace` to report. Whatever
    /// is still pending then is recorded as `Skipped(Cancelled)` and any
    /// result arriving later is never read.
    pub fn run(
        mut self,
        events: Receiver<Event>,
        cancel: &CancellationToken,
        grace: Duration,
    ) -> Self {
        let mut grace_deadline: Option<Instant> = None;

        loop {
            if self.walk_finished && self.pending.is_empty() {
                break;
            }
            if grace_deadline.is_none() && cancel.is_cancelled() {
                debug!(pending = self.pending.len(), "cancelled, waiting for in-flight files");
                grace_deadline = Some(Instant::now() + grace);
            }
            if grace_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.abandon_pending(|| SkipReason::Cancelled.into());
                break;
            }

            match events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    if cancel.is_cancelled() {
                        self.abandon_pending(|| SkipReason::Cancelled.into());
                    } else {
                        self.abandon_pending(|| {
                            FileError::Internal {
                                message: "worker exited without reporting".to_string(),
                            }
                            .into()
                        });
                    }
                    break;
                }
            }
        }
        self
    }

    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Discovered(path) => {
                self.pending.insert(path);
            }
            Event::DiscoveryFailed(error) => self.discovery_errors.push(error),
            Event::WalkFinished => self.walk_finished = true,
            Event::Completed(output) => self.record(output),
        }
    }

    fn record(&mut self, output: JobOutput) {
        let JobOutput {
            outcome,
            prints,
            mut state,
        } = output;
        let path = outcome.path().to_path_buf();

        if self.outcomes.contains_key(&path) {
            warn!(path = %path.display(), "duplicate outcome dropped");
            return;
        }
        if state == JobState::Classified {
            let _ = state.advance(JobState::Aggregated);
        }
        debug_assert!(state.is_terminal(), "job reported in state {state:?}");

        self.pending.remove(&path);
        self.prints.extend(prints);
        self.outcomes.insert(path, outcome);
    }

    fn abandon_pending(&mut self, outcome: impl Fn() -> Abandoned) {
        for path in std::mem::take(&mut self.pending) {
            let outcome = match outcome() {
                Abandoned::Skipped(reason) => FileOutcome::Skipped {
                    path: path.clone(),
                    reason,
                },
                Abandoned::Failed(error) => FileOutcome::Failed {
                    path: path.clone(),
                    error,
                },
            };
            debug!(path = %path.display(), "no result before shutdown");
            self.outcomes.insert(path, outcome);
        }
    }

    /// Merge external tool findings into the matching analyzed outcomes
    ///
    /// Paths are compared canonically. A finding for a file with no
    /// `Analyzed` outcome is dropped and counted in the run's report.
    pub fn attach_tool_runs(
        &mut self,
        runs: Vec<ToolRun>,
        config: &DetectorConfig,
    ) -> Vec<ToolReport> {
        let by_canonical: HashMap<PathBuf, PathBuf> = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_analyzed())
            .filter_map(|(path, _)| Some((path.canonicalize().ok()?, path.clone())))
            .collect();

        let mut touched = BTreeSet::new();
        let mut reports = Vec::with_capacity(runs.len());

        for run in runs {
            let ToolRun { mut report, findings } = run;
            let (mut attached, mut dropped) = (0, 0);

            for mut finding in findings {
                let key = finding
                    .path
                    .canonicalize()
                    .ok()
                    .and_then(|canonical| by_canonical.get(&canonical));
                let Some(FileOutcome::Analyzed { path, analysis }) =
                    key.and_then(|key| self.outcomes.get_mut(key))
                else {
                    dropped += 1;
                    continue;
                };
                finding.path = path.clone();
                analysis.findings.push(classified(finding, config));
                touched.insert(path.clone());
                attached += 1;
            }

            if let ToolStatus::Ran { .. } = report.status {
                if dropped > 0 {
                    debug!(tool = %report.tool, dropped, "tool findings for unanalyzed files dropped");
                }
                report.status = ToolStatus::Ran {
                    findings: attached,
                    dropped,
                };
            }
            reports.push(report);
        }

        for path in touched {
            self.resort(&path);
        }
        reports
    }

    /// Report statement windows repeated across files
    pub fn cross_file_duplicates(&mut self, config: &DetectorConfig) {
        if !config.is_enabled(DetectorId::DuplicateCode) || self.prints.len() < 2 {
            return;
        }
        let findings = duplication::cross_file(&self.prints);
        let mut touched = BTreeSet::new();

        for finding in findings {
            let Some(FileOutcome::Analyzed { analysis, .. }) = self.outcomes.get_mut(&finding.path)
            else {
                continue;
            };
            let path = finding.path.clone();
            let finding = finding.with_confidence(analysis.confidence);
            analysis.findings.push(classified(finding, config));
            touched.insert(path);
        }
        for path in touched {
            self.resort(&path);
        }
    }

    fn resort(&mut self, path: &Path) {
        if let Some(FileOutcome::Analyzed { analysis, .. }) = self.outcomes.get_mut(path) {
            analysis
                .findings
                .sort_by(|a, b| a.finding.sort_key().cmp(&b.finding.sort_key()));
        }
    }

    /// Freeze into the read-only result; outcomes come out sorted by path
    pub fn freeze(
        self,
        degraded_languages: Vec<Lang>,
        tool_reports: Vec<ToolReport>,
        cancelled: bool,
        elapsed: Duration,
    ) -> ScanResult {
        let outcomes: Vec<FileOutcome> = self.outcomes.into_values().collect();
        let mut discovery_errors = self.discovery_errors;
        discovery_errors.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));

        let counters = count(&outcomes, discovery_errors.len());
        ScanResult {
            outcomes,
            discovery_errors,
            counters,
            degraded_languages,
            tool_reports,
            cancelled,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

enum Abandoned {
    Skipped(SkipReason),
    Failed(FileError),
}

impl From<SkipReason> for Abandoned {
    fn from(reason: SkipReason) -> Self {
        Self::Skipped(reason)
    }
}

impl From<FileError> for Abandoned {
    fn from(error: FileError) -> Self {
        Self::Failed(error)
    }
}

fn count(outcomes: &[FileOutcome], discovery_errors: usize) -> ScanCounters {
    let mut counters = ScanCounters {
        files_discovered: outcomes.len(),
        discovery_errors,
        ..ScanCounters::default()
    };
    for outcome in outcomes {
        match outcome {
            FileOutcome::Analyzed { analysis, .. } => {
                counters.files_analyzed += 1;
                counters.detector_failures += analysis.detector_failures.len();
                for ClassifiedFinding { finding, severity } in &analysis.findings {
                    counters.total_findings += 1;
                    *counters.findings_by_severity.entry(*severity).or_default() += 1;
                    *counters
                        .findings_by_detector
                        .entry(finding.detector.as_str().to_string())
                        .or_default() += 1;
                }
            }
            FileOutcome::Skipped { .. } => counters.files_skipped += 1,
            FileOutcome::Failed { .. } => counters.files_failed += 1,
        }
    }
    counters
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::model::{Analysis, BackendKind, Confidence, Finding, Span};

    fn analyzed(path: &str, lines: &[usize]) -> JobOutput {
        let findings = lines
            .iter()
            .map(|&line| {
                classified(
                    Finding::new(
                        DetectorId::TodoMarker,
                        Path::new(path),
                        Lang::Rust,
                        Span::lines(line, line),
                        "TODO marker",
                    ),
                    &DetectorConfig::default(),
                )
            })
            .collect();
        JobOutput {
            outcome: FileOutcome::Analyzed {
                path: PathBuf::from(path),
                analysis: Analysis {
                    lang: Lang::Rust,
                    backend: BackendKind::Native,
                    confidence: Confidence::High,
                    line_count: 10,
                    findings,
                    detector_failures: Vec::new(),
                },
            },
            prints: None,
            state: JobState::Classified,
        }
    }

    #[test]
    fn test_freeze_sorts_and_counts() {
        let mut agg = Aggregator::new();
        for path in ["b.rs", "a.rs", "c.rs"] {
            agg.apply(Event::Discovered(PathBuf::from(path)));
        }
        agg.apply(Event::Completed(analyzed("c.rs", &[1])));
        agg.apply(Event::Completed(analyzed("a.rs", &[2, 5])));
        agg.apply(Event::Completed(JobOutput {
            outcome: FileOutcome::Skipped {
                path: PathBuf::from("b.rs"),
                reason: SkipReason::Binary,
            },
            prints: None,
            state: JobState::Skipped,
        }));
        agg.apply(Event::WalkFinished);

        let result = agg.freeze(Vec::new(), Vec::new(), false, Duration::from_millis(3));
        let paths: Vec<&Path> = result.outcomes().iter().map(|o| o.path()).collect();
        assert_eq!(paths, vec![Path::new("a.rs"), Path::new("b.rs"), Path::new("c.rs")]);

        let counters = result.counters();
        assert_eq!(counters.files_discovered, 3);
        assert_eq!(counters.files_analyzed, 2);
        assert_eq!(counters.files_skipped, 1);
        assert_eq!(counters.total_findings, 3);
        assert_eq!(counters.findings_by_detector["todo-marker"], 3);
        assert_eq!(result.elapsed_ms(), 3);
    }

    #[test]
    fn test_duplicate_outcome_is_not_double_counted() {
        let mut agg = Aggregator::new();
        agg.apply(Event::Discovered(PathBuf::from("a.rs")));
        agg.apply(Event::Completed(analyzed("a.rs", &[1])));
        agg.apply(Event::Completed(analyzed("a.rs", &[1, 2])));

        let result = agg.freeze(Vec::new(), Vec::new(), false, Duration::ZERO);
        assert_eq!(result.counters().total_findings, 1);
    }

    #[test]
    fn test_run_finishes_when_walk_done_and_nothing_pending() {
        let (tx, rx) = unbounded();
        tx.send(Event::Discovered(PathBuf::from("a.rs"))).unwrap();
        tx.send(Event::WalkFinished).unwrap();
        tx.send(Event::Completed(analyzed("a.rs", &[]))).unwrap();

        let agg = Aggregator::new().run(rx, &CancellationToken::new(), Duration::from_secs(1));
        let result = agg.freeze(Vec::new(), Vec::new(), false, Duration::ZERO);
        assert_eq!(result.counters().files_analyzed, 1);
    }

    #[test]
    fn test_cancel_grace_skips_stragglers_and_drops_late_results() {
        let (tx, rx) = unbounded();
        tx.send(Event::Discovered(PathBuf::from("slow.rs"))).unwrap();
        tx.send(Event::WalkFinished).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let agg = Aggregator::new().run(rx, &cancel, Duration::from_millis(20));
        assert!(tx.send(Event::Completed(analyzed("slow.rs", &[1]))).is_err());

        let result = agg.freeze(Vec::new(), Vec::new(), true, Duration::ZERO);
        assert!(matches!(
            result.outcomes()[0],
            FileOutcome::Skipped {
                reason: SkipReason::Cancelled,
                ..
            }
        ));
        assert_eq!(result.counters().files_skipped, 1);
        assert_eq!(result.counters().total_findings, 0);
    }

    #[test]
    fn test_disconnected_workers_fail_pending_files() {
        let (tx, rx) = unbounded();
        tx.send(Event::Discovered(PathBuf::from("lost.rs"))).unwrap();
        tx.send(Event::WalkFinished).unwrap();
        drop(tx);

        let agg = Aggregator::new().run(rx, &CancellationToken::new(), Duration::from_secs(1));
        let result = agg.freeze(Vec::new(), Vec::new(), false, Duration::ZERO);
        assert!(matches!(
            result.outcomes()[0],
            FileOutcome::Failed {
                error: FileError::Internal { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_tool_findings_attach_by_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let analyzed_path = dir.path().join("lib.rs");
        let skipped_path = dir.path().join("gen.rs");
        std::fs::write(&analyzed_path, "fn a() {}\n").unwrap();
        std::fs::write(&skipped_path, "fn b() {}\n").unwrap();

        let mut agg = Aggregator::new();
        agg.apply(Event::Completed(analyzed(analyzed_path.to_str().unwrap(), &[])));
        agg.apply(Event::Completed(JobOutput {
            outcome: FileOutcome::Skipped {
                path: skipped_path.clone(),
                reason: SkipReason::TooLarge { size: 10, limit: 1 },
            },
            prints: None,
            state: JobState::Skipped,
        }));

        let tool_finding = |path: &Path| {
            let mut f = Finding::new(
                DetectorId::ExternalTool,
                path,
                Lang::Rust,
                Span::lines(1, 1),
                "clippy: needless return",
            );
            f.provenance = crate::model::Provenance::ExternalTool {
                tool: "clippy".to_string(),
            };
            f
        };
        let run = ToolRun {
            report: ToolReport {
                tool: "clippy".to_string(),
                root: dir.path().to_path_buf(),
                status: ToolStatus::Ran {
                    findings: 2,
                    dropped: 0,
                },
                duration_ms: 1,
            },
            findings: vec![
                tool_finding(&dir.path().join(".").join("lib.rs")),
                tool_finding(&skipped_path),
            ],
        };

        let reports = agg.attach_tool_runs(vec![run], &DetectorConfig::default());
        assert_eq!(
            reports[0].status,
            ToolStatus::Ran {
                findings: 1,
                dropped: 1
            }
        );
        let result = agg.freeze(Vec::new(), reports, false, Duration::ZERO);
        let outcome = result.outcome_for(&analyzed_path).unwrap();
        assert_eq!(outcome.findings().len(), 1);
        assert_eq!(outcome.findings()[0].finding.path, analyzed_path);
        assert_eq!(result.counters().findings_by_detector["external-tool"], 1);
    }
}
