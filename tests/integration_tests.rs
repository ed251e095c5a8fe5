//! End-to-end scans over temporary source trees

mod common;

use std::path::PathBuf;
use std::time::Duration;

use codeclean_engine::config::{BridgeCommand, ParserSetting};
use codeclean_engine::{
    scan, CancellationToken, Confidence, DetectorConfig, DetectorId, FileOutcome, Lang,
    ParserConfig, ScanConfig, ScanRequest, ScanResult, Severity, SkipReason,
};
use common::{scan_repo, TestRepo};

fn findings_of(result: &ScanResult, detector: DetectorId) -> Vec<PathBuf> {
    result
        .findings()
        .filter(|f| f.finding.detector == detector)
        .map(|f| f.finding.path.clone())
        .collect()
}

fn assert_counters_match(result: &ScanResult) {
    let counters = result.counters();
    let outcomes = result.outcomes();
    assert_eq!(counters.files_discovered, outcomes.len());
    assert_eq!(
        counters.files_analyzed,
        outcomes.iter().filter(|o| o.is_analyzed()).count()
    );
    assert_eq!(
        counters.files_skipped,
        outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Skipped { .. }))
            .count()
    );
    assert_eq!(
        counters.files_failed,
        outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Failed { .. }))
            .count()
    );
    assert_eq!(counters.total_findings, result.findings().count());
    assert_eq!(
        counters.findings_by_severity.values().sum::<usize>(),
        counters.total_findings
    );
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_worker_count_does_not_change_findings() {
    let repo = TestRepo::mixed();
    let single = scan_repo(&repo, 1);
    let many = scan_repo(&repo, 6);

    assert_eq!(single.outcomes().len(), 6);
    assert!(single.counters().total_findings > 0);
    assert_eq!(single.outcomes(), many.outcomes());
    assert_eq!(single.counters(), many.counters());
}

#[test]
fn test_repeated_scans_are_identical() {
    let repo = TestRepo::mixed();
    let first = scan_repo(&repo, 3);
    let second = scan_repo(&repo, 3);

    assert_eq!(first.outcomes(), second.outcomes());
    let severities = |r: &ScanResult| r.findings().map(|f| f.severity).collect::<Vec<_>>();
    assert_eq!(severities(&first), severities(&second));
}

#[test]
fn test_outcomes_sorted_by_path() {
    let repo = TestRepo::mixed();
    for i in (0..20).rev() {
        repo.add_file(&format!("gen/m{i:02}.rs"), "fn f() {}\n");
    }
    let result = scan_repo(&repo, 4);

    let paths: Vec<_> = result.outcomes().iter().map(|o| o.path().to_path_buf()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert_eq!(paths.len(), 26);
    assert_counters_match(&result);
}

// ============================================================================
// Detection through the whole pipeline
// ============================================================================

#[test]
fn test_function_length_boundary() {
    let repo = TestRepo::new();
    repo.add_rust_fn("src/at_limit.rs", "at_limit", 25)
        .add_rust_fn("src/over_limit.rs", "over_limit", 26);

    let result = scan(
        ScanRequest::new([repo.path()])
            .with_config(DetectorConfig::default().with_enabled([DetectorId::FunctionLength])),
    )
    .unwrap();

    let flagged = findings_of(&result, DetectorId::FunctionLength);
    assert_eq!(flagged, vec![repo.file("src/over_limit.rs")]);
    let finding = result.findings().next().unwrap();
    assert_eq!(finding.finding.metric, Some(26.0));
    assert_eq!(finding.finding.threshold, Some(25.0));
    assert_eq!(finding.severity, Severity::Low);
}

#[test]
fn test_one_unparseable_file_among_many() {
    let repo = TestRepo::new();
    for i in 0..100 {
        repo.add_file(
            &format!("pkg/file{i:03}.rs"),
            &format!("// TODO: item {i}\nfn f{i}() {{}}\n"),
        );
    }
    repo.add_file("pkg/broken.go", "package pkg\nfunc (\n");

    let result = scan_repo(&repo, 4);
    let counters = result.counters();
    assert_eq!(counters.files_discovered, 101);
    assert_eq!(counters.files_analyzed, 100);
    assert_eq!(counters.files_failed, 1);
    assert_eq!(findings_of(&result, DetectorId::TodoMarker).len(), 100);

    let broken = repo.file("pkg/broken.go");
    assert!(matches!(
        result.outcome_for(&broken),
        Some(FileOutcome::Failed { .. })
    ));
    assert!(result.findings().all(|f| f.finding.path != broken));
    assert_counters_match(&result);
}

#[test]
fn test_missing_bridge_degrades_to_low_confidence() {
    let repo = TestRepo::new();
    repo.add_file(
        "app/service.py",
        "# TODO: remove global\ndef handle(a, b, c, d, e):\n    return a\n",
    );
    let parsers = ParserConfig::all_native().with_setting(
        Lang::Python,
        ParserSetting::Bridged(BridgeCommand {
            program: "codeclean-no-such-python".to_string(),
            args: Vec::new(),
            builtin_helper: true,
            timeout: Duration::from_secs(5),
        }),
    );

    let result = scan(ScanRequest::new([repo.path()]).with_parsers(parsers)).unwrap();

    assert_eq!(result.degraded_languages(), &[Lang::Python]);
    let findings: Vec<_> = result.findings().collect();
    assert!(!findings.is_empty());
    assert!(findings
        .iter()
        .all(|f| f.finding.confidence == Confidence::Low));
    assert!(matches!(
        result.outcome_for(&repo.file("app/service.py")),
        Some(FileOutcome::Analyzed { analysis, .. }) if analysis.confidence == Confidence::Low
    ));
}

#[test]
fn test_cross_file_duplicate_reported_in_later_file() {
    let block = |name: &str, var: &str| {
        let mut src = format!("fn {name}(input: u32) -> u32 {{\n");
        for i in 0..6 {
            src.push_str(&format!("    let {var}{i} = input * {i} + {};\n", i + 3));
        }
        src.push_str("    input\n}\n");
        src
    };
    let repo = TestRepo::new();
    repo.add_file("src/a.rs", &block("first", "a"))
        .add_file("src/b.rs", &block("second", "b"));

    let result = scan_repo(&repo, 2);
    let duplicates: Vec<_> = result
        .findings()
        .filter(|f| f.finding.detector == DetectorId::DuplicateCode)
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].finding.path, repo.file("src/b.rs"));
    assert!(duplicates[0].finding.message.contains("a.rs:2"));
}

#[test]
fn test_skipped_files_are_reported() {
    let repo = TestRepo::new();
    repo.add_file("src/lib.rs", "fn ok() {}\n")
        .add_file("src/data.rs", "fn x() {}\0\0\0")
        .add_file("pkg/handler_test.go", "package pkg\n");

    let result = scan_repo(&repo, 2);
    let reason = |rel: &str| match result.outcome_for(&repo.file(rel)) {
        Some(FileOutcome::Skipped { reason, .. }) => Some(reason.clone()),
        _ => None,
    };
    assert_eq!(reason("src/data.rs"), Some(SkipReason::Binary));
    assert_eq!(reason("pkg/handler_test.go"), Some(SkipReason::TestFile));
    assert!(result.outcome_for(&repo.file("src/lib.rs")).unwrap().is_analyzed());
    assert_counters_match(&result);
}

#[test]
fn test_configured_test_patterns_are_skipped() {
    let repo = TestRepo::new();
    repo.add_file("src/lib.rs", "fn ok() {}\n")
        .add_file("fixtures/golden.rs", "fn golden() {}\n")
        .add_file("web/cart.check.js", "var a = 1;\n");

    let config = ScanConfig::from_toml_str(
        r#"
        [walk]
        test_patterns = ["fixtures/", "*.check.js"]
        "#,
    )
    .unwrap();
    let result = scan(
        ScanRequest::new([repo.path()])
            .with_scan_config(&config)
            .unwrap()
            .with_parsers(ParserConfig::all_native()),
    )
    .unwrap();

    for rel in ["fixtures/golden.rs", "web/cart.check.js"] {
        assert!(matches!(
            result.outcome_for(&repo.file(rel)),
            Some(FileOutcome::Skipped { reason: SkipReason::TestFile, .. })
        ));
    }
    assert!(result.outcome_for(&repo.file("src/lib.rs")).unwrap().is_analyzed());
    assert_counters_match(&result);
}

#[test]
fn test_result_serializes_for_reporters() {
    let repo = TestRepo::mixed();
    let result = scan_repo(&repo, 2);
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["cancelled"], false);
    assert_eq!(json["outcomes"].as_array().unwrap().len(), 6);
    assert_eq!(json["outcomes"][0]["status"], "analyzed");
    assert!(json["counters"]["total_findings"].as_u64().unwrap() > 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_pre_cancelled_scan_is_consistent() {
    let repo = TestRepo::mixed();
    let token = CancellationToken::new();
    token.cancel();

    let result = scan(
        ScanRequest::new([repo.path()])
            .with_parsers(ParserConfig::all_native())
            .with_cancel(token),
    )
    .unwrap();

    assert!(result.was_cancelled());
    assert!(result.outcomes().iter().all(|o| !o.is_analyzed()));
    assert_counters_match(&result);
}

#[test]
fn test_expired_timeout_cancels() {
    let repo = TestRepo::mixed();
    let result = scan(
        ScanRequest::new([repo.path()])
            .with_parsers(ParserConfig::all_native())
            .with_timeout(Duration::ZERO),
    )
    .unwrap();

    assert!(result.was_cancelled());
    assert_counters_match(&result);
}

#[test]
fn test_overlapping_roots_scan_each_file_once() {
    let repo = TestRepo::mixed();
    let result = scan(
        ScanRequest::new([repo.path().to_path_buf(), repo.file("src")])
            .with_parsers(ParserConfig::all_native()),
    )
    .unwrap();

    assert_eq!(result.outcomes().len(), 6);
    assert_counters_match(&result);
}
