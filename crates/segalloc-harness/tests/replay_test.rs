use segalloc_core::SearchPolicy;
use segalloc_harness::structured_log::{LogEmitter, LogEntry, validate_log_file};
use segalloc_harness::{DriverOptions, HarnessError, generate_storm, parse_trace, replay};

const SHORT_TRACE: &str = "\
# two short-lived buffers around a long-lived one
a 0 2040
a 1 2040
f 1
a 2 48
a 3 4072
f 3
a 4 4072
f 0
f 2
a 5 4072
f 4
f 5
";

#[test]
fn report_serializes_with_stable_fields() {
    let trace = parse_trace(SHORT_TRACE).unwrap();
    let outcome = replay(&trace, &DriverOptions::default()).unwrap();
    let json = serde_json::to_value(&outcome.report).unwrap();

    assert_eq!(json["trace_sha256"], trace.sha256);
    assert_eq!(json["policy"], "skip-sparse");
    assert_eq!(json["ops"], 12);
    assert_eq!(json["allocs"], 6);
    assert_eq!(json["frees"], 6);
    assert_eq!(json["final_live_blocks"], 0);
    assert_eq!(json["heap_checks"], 12);
    assert_eq!(json["peak_live_bytes"], 4072 * 2);
    let utilization = json["peak_utilization"].as_f64().unwrap();
    assert!(utilization > 0.3 && utilization <= 1.0, "{utilization}");
}

#[test]
fn freed_space_is_reused_before_growing() {
    let trace = parse_trace("a 0 4000\nf 0\na 1 4000\nf 1\na 2 100\na 3 3800\n").unwrap();
    let report = replay(&trace, &DriverOptions::default()).unwrap().report;
    assert_eq!(report.growths, 1);
    assert_eq!(report.final_live_blocks, 2);
}

#[test]
fn storm_replays_cleanly_under_both_policies() {
    let trace = generate_storm(0x5EED, 3000, 64, 8192);
    let mut arena_sizes = Vec::new();
    for policy in [SearchPolicy::SkipSparse, SearchPolicy::Sequential] {
        let options = DriverOptions {
            policy,
            ..DriverOptions::default()
        };
        let report = replay(&trace, &options).unwrap().report;
        assert_eq!(report.final_live_blocks, 0);
        assert_eq!(report.final_free_blocks, 1, "everything coalesces back");
        assert_eq!(report.ops, trace.ops.len());
        arena_sizes.push(report.final_arena_bytes);
    }
    assert!(arena_sizes.iter().all(|&bytes| bytes > 0));
}

#[test]
fn replay_is_deterministic() {
    let trace = generate_storm(42, 1000, 32, 2048);
    let options = DriverOptions {
        lifecycle_logging: true,
        ..DriverOptions::default()
    };
    let a = replay(&trace, &options).unwrap();
    let b = replay(&trace, &options).unwrap();
    assert_eq!(a.report, b.report);
    assert_eq!(a.records.len(), b.records.len());
    for ((la, ra), (lb, rb)) in a.records.iter().zip(&b.records) {
        assert_eq!(la, lb);
        assert_eq!(ra.trace_id, rb.trace_id);
        assert_eq!(ra.event, rb.event);
    }
}

#[test]
fn malformed_traces_map_to_parse_exit_code() {
    let err = HarnessError::from(parse_trace("a 0 16\nq 1\n").unwrap_err());
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("line 2"));

    let trace = parse_trace("f 7\n").unwrap();
    let err = replay(&trace, &DriverOptions::default()).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn exported_lifecycle_log_validates() {
    let trace = parse_trace(SHORT_TRACE).unwrap();
    let options = DriverOptions {
        lifecycle_logging: true,
        ..DriverOptions::default()
    };
    let outcome = replay(&trace, &options).unwrap();
    assert!(!outcome.records.is_empty());

    let path = std::env::temp_dir().join(format!(
        "segalloc-replay-{}-{}.jsonl",
        std::process::id(),
        &trace.sha256[..8]
    ));
    let mut emitter = LogEmitter::to_file(&path, "replay-test").unwrap();
    for (line, record) in &outcome.records {
        let entry = LogEntry::from_record(record)
            .with_policy("skip-sparse")
            .with_trace_line(*line);
        emitter.emit_entry(entry).unwrap();
    }
    emitter.flush().unwrap();
    assert_eq!(emitter.lines(), outcome.records.len());
    drop(emitter);

    let (lines, errors) = validate_log_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(lines, outcome.records.len());
    assert!(errors.is_empty(), "{errors:?}");
}
