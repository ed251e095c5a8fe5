//! Per-file jobs and the worker pool that runs them
//!
//! Each worker owns one file's whole pipeline: read, parse, detect, classify.
//! The registry, parser set and configuration are shared read-only through
//! [`Pipeline`]; structural trees never leave the worker that built them.
//!
//! Job lifecycle:
//!
//! ```text
//! Queued -> Parsing -> Detecting -> Classified -> Aggregated
//!    \         \           \
//!     +---------+-----------+--> Skipped | Failed
//! ```

use std::any::Any;
use std::fs;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::Event;
use crate::config::DetectorConfig;
use crate::detectors::duplication::{self, FilePrints};
use crate::detectors::DetectorRegistry;
use crate::error::{FileError, ParseError};
use crate::model::{Analysis, DetectorId, FileDescriptor, FileOutcome, SkipReason};
use crate::parsing::ParserSet;
use crate::severity::classified;
use crate::walker::{TestPatterns, WalkOptions};

/// How many leading bytes are checked for NUL when sniffing binary content
const BINARY_SNIFF_LEN: usize = 8192;

// ============================================================================
// Cancellation
// ============================================================================

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    deadline: OnceCell<Instant>,
}

/// Shared cancellation flag with an optional deadline
///
/// Clones observe the same state. Once the deadline passes the token reads
/// as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.state.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.state.deadline.get() {
            Some(deadline) if Instant::now() >= *deadline => {
                self.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel automatically at `deadline`; only the first deadline set counts
    pub fn set_deadline(&self, deadline: Instant) {
        let _ = self.state.deadline.set(deadline);
    }

    pub fn with_deadline(self, deadline: Instant) -> Self {
        self.set_deadline(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline.get().copied()
    }
}

// ============================================================================
// Job state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Parsing,
    Detecting,
    Classified,
    Aggregated,
    Skipped,
    Failed,
}

/// A transition [`JobState::advance`] refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aggregated | Self::Skipped | Self::Failed)
    }

    pub fn can_advance(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Parsing)
                | (Parsing, Detecting)
                | (Detecting, Classified)
                | (Classified, Aggregated)
                | (Queued | Parsing | Detecting, Skipped | Failed)
        )
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), IllegalTransition> {
        if !self.can_advance(next) {
            return Err(IllegalTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

// ============================================================================
// Per-file pipeline
// ============================================================================

/// Everything a worker needs, shared read-only by all workers of a scan
#[derive(Debug)]
pub struct Pipeline {
    pub config: DetectorConfig,
    pub registry: DetectorRegistry,
    pub parsers: ParserSet,
    pub walk: WalkOptions,
    pub tests: TestPatterns,
}

impl Pipeline {
    pub fn new(config: DetectorConfig, parsers: ParserSet, walk: WalkOptions) -> Self {
        Self {
            registry: DetectorRegistry::from_config(&config),
            config,
            parsers,
            walk,
            tests: TestPatterns::default(),
        }
    }

    /// Extra test-file patterns, compiled against the scan roots
    pub fn with_test_patterns(mut self, tests: TestPatterns) -> Self {
        self.tests = tests;
        self
    }
}

/// What a finished job hands to the aggregator
#[derive(Debug)]
pub struct JobOutput {
    pub outcome: FileOutcome,
    /// Statement windows for the cross-file duplication pass
    pub prints: Option<FilePrints>,
    pub state: JobState,
}

struct Job<'a> {
    file: &'a FileDescriptor,
    state: JobState,
}

impl Job<'_> {
    fn step(&mut self, next: JobState) {
        // The pipeline below only walks legal edges
        let _ = self.state.advance(next);
    }

    fn skip(mut self, reason: SkipReason) -> JobOutput {
        debug!(path = %self.file.path.display(), reason = %reason, "file skipped");
        self.step(JobState::Skipped);
        JobOutput {
            outcome: FileOutcome::Skipped {
                path: self.file.path.clone(),
                reason,
            },
            prints: None,
            state: self.state,
        }
    }

    fn fail(mut self, error: FileError) -> JobOutput {
        debug!(path = %self.file.path.display(), error = %error, "file failed");
        self.step(JobState::Failed);
        JobOutput {
            outcome: FileOutcome::Failed {
                path: self.file.path.clone(),
                error,
            },
            prints: None,
            state: self.state,
        }
    }
}

/// Read a file, retrying once if the read is interrupted
fn read_source(path: &Path) -> io::Result<Vec<u8>> {
    match fs::read(path) {
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            debug!(path = %path.display(), "read interrupted, retrying once");
            fs::read(path)
        }
        other => other,
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// Run one file through read, parse, detect and classify
///
/// The token is checked before each stage; a cancelled job ends as
/// `Skipped(Cancelled)`.
pub fn process(file: &FileDescriptor, pipeline: &Pipeline, cancel: &CancellationToken) -> JobOutput {
    let mut job = Job {
        file,
        state: JobState::Queued,
    };

    if cancel.is_cancelled() {
        return job.skip(SkipReason::Cancelled);
    }
    let limit = pipeline.walk.max_file_size;
    if file.size > limit {
        return job.skip(SkipReason::TooLarge {
            size: file.size,
            limit,
        });
    }
    if pipeline.walk.skip_test_files && pipeline.tests.is_test_file(&file.path, file.lang) {
        return job.skip(SkipReason::TestFile);
    }

    job.step(JobState::Parsing);
    let source = match read_source(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return job.fail(FileError::Read {
                message: e.to_string(),
            })
        }
    };
    if is_binary(&source) {
        return job.skip(SkipReason::Binary);
    }
    let Some(parser) = pipeline.parsers.get(file.lang) else {
        return job.fail(FileError::from(ParseError::Unsupported {
            lang: file.lang.to_string(),
        }));
    };
    if cancel.is_cancelled() {
        return job.skip(SkipReason::Cancelled);
    }
    let tree = match parser.parse(file, &source) {
        Ok(tree) => tree,
        Err(e) => return job.fail(FileError::from(e)),
    };
    drop(source);

    job.step(JobState::Detecting);
    if cancel.is_cancelled() {
        return job.skip(SkipReason::Cancelled);
    }
    let (findings, detector_failures) = pipeline.registry.run_all(&*tree, &pipeline.config);

    let prints = pipeline
        .registry
        .is_registered(file.lang, DetectorId::DuplicateCode)
        .then(|| {
            let window = pipeline.config.thresholds(file.lang).min_duplicate_statements;
            FilePrints {
                path: file.path.clone(),
                lang: file.lang,
                window,
                prints: duplication::fingerprints(&*tree, window),
            }
        });

    let mut findings: Vec<_> = findings
        .into_iter()
        .map(|f| classified(f, &pipeline.config))
        .collect();
    findings.sort_by(|a, b| a.finding.sort_key().cmp(&b.finding.sort_key()));
    job.step(JobState::Classified);

    debug!(
        path = %file.path.display(),
        backend = ?parser.backend(),
        findings = findings.len(),
        detector_failures = detector_failures.len(),
        "file analyzed"
    );

    JobOutput {
        outcome: FileOutcome::Analyzed {
            path: file.path.clone(),
            analysis: Analysis {
                lang: file.lang,
                backend: parser.backend(),
                confidence: tree.confidence(),
                line_count: tree.line_count(),
                findings,
                detector_failures,
            },
        },
        prints,
        state: job.state,
    }
}

/// [`process`], with a panic anywhere in the pipeline turned into `Failed`
pub fn process_guarded(
    file: &FileDescriptor,
    pipeline: &Pipeline,
    cancel: &CancellationToken,
) -> JobOutput {
    match catch_unwind(AssertUnwindSafe(|| process(file, pipeline, cancel))) {
        Ok(output) => output,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(path = %file.path.display(), error = %message, "worker panicked on file");
            JobOutput {
                outcome: FileOutcome::Failed {
                    path: file.path.clone(),
                    error: FileError::Internal { message },
                },
                prints: None,
                state: JobState::Failed,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic while analyzing file".to_string())
}

// ============================================================================
// Worker pool
// ============================================================================

/// Fixed set of OS threads pulling jobs from a bounded queue
pub struct WorkerPool {
    jobs: Sender<FileDescriptor>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads; the job queue holds `2 * workers` files
    pub fn spawn(
        workers: usize,
        pipeline: Arc<Pipeline>,
        cancel: CancellationToken,
        results: Sender<Event>,
    ) -> io::Result<Self> {
        let (jobs, queue) = bounded::<FileDescriptor>(workers * 2);
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let queue = queue.clone();
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();
            let results = results.clone();
            let handle = thread::Builder::new()
                .name(format!("codeclean-worker-{id}"))
                .spawn(move || {
                    for file in queue.iter() {
                        let output = process_guarded(&file, &pipeline, &cancel);
                        if results.send(Event::Completed(output)).is_err() {
                            break;
                        }
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self { jobs, handles })
    }

    /// Queue a file, blocking while the queue is full
    ///
    /// Returns `false` once every worker has gone away.
    pub fn submit(&self, file: FileDescriptor) -> bool {
        self.jobs.send(file).is_ok()
    }

    /// Close the queue and wait for the workers to drain it
    pub fn join(self) {
        drop(self.jobs);
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }

    /// Close the queue without waiting; in-flight jobs finish on their own
    pub fn detach(self) {
        drop(self.jobs);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::lang::Lang;
    use crate::model::{BackendKind, Confidence};

    fn pipeline() -> Pipeline {
        Pipeline::new(
            DetectorConfig::default(),
            ParserSet::uniform(BackendKind::Native, &Lang::ALL),
            WalkOptions::default(),
        )
    }

    fn write(dir: &Path, name: &str, content: &[u8]) -> FileDescriptor {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        let lang = Lang::from_path(&path).unwrap();
        FileDescriptor::new(path, lang, content.len() as u64)
    }

    #[test]
    fn test_state_machine_rejects_illegal_edges() {
        let mut state = JobState::Queued;
        assert!(state.advance(JobState::Parsing).is_ok());
        assert!(state.advance(JobState::Queued).is_err());
        assert!(state.advance(JobState::Classified).is_err());
        assert!(state.advance(JobState::Detecting).is_ok());
        assert!(state.advance(JobState::Classified).is_ok());
        assert!(state.advance(JobState::Failed).is_err());
        assert!(state.advance(JobState::Aggregated).is_ok());
        assert!(state.is_terminal());
        assert!(state.advance(JobState::Skipped).is_err());

        let mut skipped = JobState::Skipped;
        assert!(skipped.advance(JobState::Queued).is_err());
    }

    #[test]
    fn test_cancellation_token_deadline() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());

        let timed = CancellationToken::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(timed.is_cancelled());
    }

    #[test]
    fn test_process_analyzes_and_sorts_findings() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "lib.rs", b"// TODO: later\nfn Bad() { let x = 42; }\n");
        let output = process(&file, &pipeline(), &CancellationToken::new());

        assert_eq!(output.state, JobState::Classified);
        let FileOutcome::Analyzed { analysis, .. } = &output.outcome else {
            panic!("expected analysis, got {:?}", output.outcome);
        };
        assert_eq!(analysis.confidence, Confidence::High);
        let lines: Vec<usize> = analysis
            .findings
            .iter()
            .map(|f| f.finding.span.start_line)
            .collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        assert!(analysis
            .findings
            .iter()
            .any(|f| f.finding.detector == DetectorId::TodoMarker));
        assert!(output.prints.is_some());
    }

    #[test]
    fn test_skips_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline();
        let token = CancellationToken::new();

        let binary = write(dir.path(), "blob.rs", b"fn a() {}\0\0");
        assert!(matches!(
            process(&binary, &pipeline, &token).outcome,
            FileOutcome::Skipped {
                reason: SkipReason::Binary,
                ..
            }
        ));

        let test_file = write(dir.path(), "parser_test.go", b"package p\n");
        assert!(matches!(
            process(&test_file, &pipeline, &token).outcome,
            FileOutcome::Skipped {
                reason: SkipReason::TestFile,
                ..
            }
        ));

        let mut big = write(dir.path(), "big.py", b"x = 1\n");
        big.size = pipeline.walk.max_file_size + 1;
        assert!(matches!(
            process(&big, &pipeline, &token).outcome,
            FileOutcome::Skipped {
                reason: SkipReason::TooLarge { .. },
                ..
            }
        ));

        let broken = write(dir.path(), "broken.go", b"package p\nfunc (\n");
        let output = process(&broken, &pipeline, &token);
        assert_eq!(output.state, JobState::Failed);
        assert!(matches!(
            output.outcome,
            FileOutcome::Failed {
                error: FileError::Parse { .. },
                ..
            }
        ));

        let missing = FileDescriptor::new(dir.path().join("gone.rs"), Lang::Rust, 10);
        assert!(matches!(
            process(&missing, &pipeline, &token).outcome,
            FileOutcome::Failed {
                error: FileError::Read { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_custom_test_patterns_skip_files() {
        let dir = tempfile::tempdir().unwrap();
        let patterns = vec!["*_fixture.py".to_string()];
        let tests = TestPatterns::new(&[dir.path().to_path_buf()], &patterns).unwrap();
        let pipeline = pipeline().with_test_patterns(tests);
        let token = CancellationToken::new();

        let fixture = write(dir.path(), "orders_fixture.py", b"x = 1
");
        assert!(matches!(
            process(&fixture, &pipeline, &token).outcome,
            FileOutcome::Skipped {
                reason: SkipReason::TestFile,
                ..
            }
        ));
        let plain = write(dir.path(), "orders.py", b"x = 1
");
        assert!(process(&plain, &pipeline, &token).outcome.is_analyzed());
    }

    #[test]
    fn test_cancelled_job_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "a.rs", b"fn a() {}\n");
        let token = CancellationToken::new();
        token.cancel();

        let output = process(&file, &pipeline(), &token);
        assert_eq!(output.state, JobState::Skipped);
        assert!(matches!(
            output.outcome,
            FileOutcome::Skipped {
                reason: SkipReason::Cancelled,
                ..
            }
        ));
    }
}
