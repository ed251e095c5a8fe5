//! Scan entry point
//!
//! [`scan`] wires the pieces together: the walker runs on the calling
//! thread and feeds the bounded worker queue, workers report to a single
//! aggregator thread, external tools run once the file scan is done, and
//! the aggregator is frozen into the returned [`ScanResult`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use crate::aggregate::{Aggregator, Event};
use crate::config::{DetectorConfig, ParserConfig, ScanConfig};
use crate::error::{EngineError, Result};
use crate::lang::Lang;
use crate::lint::{run_tools, ExternalTool, DEFAULT_TOOL_TIMEOUT};
use crate::model::ScanResult;
use crate::parsing::ParserSet;
use crate::scheduler::{CancellationToken, Pipeline, WorkerPool};
use crate::walker::{SourceWalker, TestPatterns, WalkOptions};

/// Upper bound on the default worker count
const MAX_DEFAULT_WORKERS: usize = 8;

/// How long in-flight files may keep running after cancellation
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Capacity of the worker → aggregator channel, per worker
const RESULTS_PER_WORKER: usize = 16;

/// `min(available_parallelism, 8)`
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// Everything one scan needs
#[derive(Clone)]
pub struct ScanRequest {
    pub roots: Vec<PathBuf>,
    /// Empty means every supported language
    pub languages: Vec<Lang>,
    pub config: DetectorConfig,
    pub parsers: ParserConfig,
    pub walk: WalkOptions,
    pub workers: usize,
    pub cancel: CancellationToken,
    /// Wall-clock limit for the whole scan; expiry cancels it
    pub timeout: Option<Duration>,
    pub grace_period: Duration,
    pub external_tools: Vec<Arc<dyn ExternalTool>>,
    pub tool_timeout: Duration,
}

impl std::fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools: Vec<&str> = self.external_tools.iter().map(|t| t.name()).collect();
        f.debug_struct("ScanRequest")
            .field("roots", &self.roots)
            .field("languages", &self.languages)
            .field("workers", &self.workers)
            .field("timeout", &self.timeout)
            .field("grace_period", &self.grace_period)
            .field("external_tools", &tools)
            .finish_non_exhaustive()
    }
}

impl ScanRequest {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            languages: Vec::new(),
            config: DetectorConfig::default(),
            parsers: ParserConfig::default(),
            walk: WalkOptions::default(),
            workers: default_workers(),
            cancel: CancellationToken::new(),
            timeout: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            external_tools: Vec::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Apply every section of a loaded configuration file
    pub fn with_scan_config(mut self, config: &ScanConfig) -> Result<Self> {
        self.config = config.detector_config()?;
        self.parsers = config.parser_config()?;
        self.walk = config.walk_options();
        Ok(self)
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_parsers(mut self, parsers: ParserConfig) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_walk(mut self, walk: WalkOptions) -> Self {
        self.walk = walk;
        self
    }

    pub fn with_languages(mut self, languages: Vec<Lang>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn ExternalTool>) -> Self {
        self.external_tools.push(tool);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Checks that must pass before any scheduling begins
    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.workers == 0 {
            return Err(EngineError::invalid("workers must be at least 1"));
        }
        if !self.roots.iter().any(|root| root.exists()) {
            return Err(EngineError::NoReadableRoots {
                roots: self.roots.clone(),
            });
        }
        Ok(())
    }
}

/// Run one scan to completion (or cancellation)
///
/// Only configuration and root problems are returned as errors; everything
/// that goes wrong with individual files, detectors or tools is recorded in
/// the result.
pub fn scan(request: ScanRequest) -> Result<ScanResult> {
    request.validate()?;
    let start = Instant::now();

    let cancel = request.cancel.clone();
    if let Some(timeout) = request.timeout {
        cancel.set_deadline(start + timeout);
    }

    info!(
        roots = request.roots.len(),
        workers = request.workers,
        languages = ?request.languages,
        "scan started"
    );

    let tests = TestPatterns::new(&request.roots, &request.walk.test_patterns)
        .map_err(|e| EngineError::invalid(format!("walk.test_patterns: {e}")))?;
    let parsers = ParserSet::resolve(&request.parsers, &request.languages);
    let pipeline = Arc::new(
        Pipeline::new(request.config.clone(), parsers, request.walk.clone())
            .with_test_patterns(tests),
    );

    let (events, inbox) = bounded::<Event>(request.workers * RESULTS_PER_WORKER);
    let aggregator = {
        let cancel = cancel.clone();
        let grace = request.grace_period;
        thread::Builder::new()
            .name("codeclean-aggregator".to_string())
            .spawn(move || Aggregator::new().run(inbox, &cancel, grace))?
    };
    let pool = WorkerPool::spawn(
        request.workers,
        Arc::clone(&pipeline),
        cancel.clone(),
        events.clone(),
    )?;

    let walker = SourceWalker::new(request.roots.clone(), request.walk.clone())
        .with_languages(request.languages.clone());
    let mut seen = HashSet::new();
    for item in walker.walk() {
        if cancel.is_cancelled() {
            debug!("cancelled, walker stopped feeding");
            break;
        }
        match item {
            Ok(file) => {
                if !seen.insert(file.path.clone()) {
                    continue;
                }
                if events.send(Event::Discovered(file.path.clone())).is_err() {
                    break;
                }
                if !pool.submit(file) {
                    warn!("worker pool closed before the walk finished");
                    break;
                }
            }
            Err(error) => {
                if events.send(Event::DiscoveryFailed(error)).is_err() {
                    break;
                }
            }
        }
    }
    let _ = events.send(Event::WalkFinished);
    drop(events);

    let mut aggregator = aggregator
        .join()
        .map_err(|_| std::io::Error::other("aggregator thread panicked"))?;

    let cancelled = cancel.is_cancelled();
    if cancelled {
        // Stragglers were already recorded as cancelled; don't wait on them
        pool.detach();
    } else {
        pool.join();
    }
    let tool_reports = if cancelled || request.external_tools.is_empty() {
        Vec::new()
    } else {
        let runs = run_tools(&request.external_tools, &request.roots, request.tool_timeout);
        aggregator.attach_tool_runs(runs, &request.config)
    };
    aggregator.cross_file_duplicates(&request.config);

    let result = aggregator.freeze(
        pipeline.parsers.degraded(),
        tool_reports,
        cancelled,
        start.elapsed(),
    );

    let counters = result.counters();
    info!(
        files = counters.files_discovered,
        analyzed = counters.files_analyzed,
        skipped = counters.files_skipped,
        failed = counters.files_failed,
        findings = counters.total_findings,
        cancelled,
        elapsed_ms = result.elapsed_ms(),
        "scan finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_roots_are_fatal() {
        let err = scan(ScanRequest::new(["/definitely/not/here"])).unwrap_err();
        assert!(matches!(err, EngineError::NoReadableRoots { .. }));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DetectorConfig::default();
        config.bands.high = 0.5;
        let err = scan(ScanRequest::new([dir.path()]).with_config(config)).unwrap_err();
        assert!(err.is_config_error());

        let err = scan(ScanRequest::new([dir.path()]).with_workers(0)).unwrap_err();
        assert!(err.is_config_error());

        let walk = WalkOptions {
            test_patterns: vec!["[unclosed".to_string()],
            ..WalkOptions::default()
        };
        let err = scan(ScanRequest::new([dir.path()]).with_walk(walk)).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("test_patterns"));
    }

    #[test]
    fn test_default_workers_is_bounded() {
        let workers = default_workers();
        assert!((1..=MAX_DEFAULT_WORKERS).contains(&workers));
    }
}
