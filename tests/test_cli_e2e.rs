mod common;

use common::{fixture_path, run_cli};

fn fixture(name: &str) -> String {
    fixture_path(name).display().to_string()
}

// ============================================================================
// version command
// ============================================================================

#[test]
fn version_human() {
    let output = run_cli(&["version"]);
    assert!(
        output.status.success(),
        "version should exit 0: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("phasetrack "),
        "version output should name the binary: {stdout}"
    );
    assert!(
        stdout.contains('.'),
        "version output should contain a version number: {stdout}"
    );
}

#[test]
fn version_json() {
    let output = run_cli(&["version", "--format", "json"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("version JSON should be valid");
    assert_eq!(parsed["name"], "phasetrack");
    assert!(parsed.get("version").is_some(), "JSON should have 'version': {stdout}");
}

// ============================================================================
// replay command
// ============================================================================

#[test]
fn replay_human_summarizes_each_tick() {
    let output = run_cli(&["--quiet", "replay", &fixture("give_and_tick.yaml")]);
    // --quiet suppresses the report too; only the exit status matters here
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let output = run_cli(&["replay", &fixture("give_and_tick.yaml")]);
    assert!(
        output.status.success(),
        "replay should exit 0: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trace: give-and-tick"), "{stdout}");
    assert!(stdout.contains("command_transaction [Command] x1"), "{stdout}");
    assert!(stdout.contains("tick 1: 2 notification(s)"), "{stdout}");
    assert!(stdout.contains("total: 3 notification(s), 0 diagnostic(s)"), "{stdout}");
}

#[test]
fn replay_json_reports_runaway() {
    let output = run_cli(&["replay", &fixture("runaway.yaml"), "--format", "json"]);
    assert!(
        output.status.success(),
        "replay should exit 0: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("replay JSON should be valid");
    let tick = &report["ticks"][0];
    assert_eq!(tick["diagnostics"][0]["kind"], "runaway");
    assert_eq!(tick["diagnostics"][0]["phase"], "block_tick");
    assert_eq!(tick["notifications"][0]["phase"], "unknown_cause");
    assert_eq!(tick["max_depth"], 3);
}

#[test]
fn replay_counts_failed_hooks() {
    let output = run_cli(&["replay", &fixture("failing_hook.yaml"), "--format", "json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tick = &report["ticks"][0];
    assert_eq!(tick["failed_hooks"], 1);
    assert_eq!(tick["notifications"][0]["kind"], "spawn_entities");
}

#[test]
fn replay_writes_event_stream() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.jsonl");
    let output = run_cli(&[
        "--quiet",
        "replay",
        &fixture("give_and_tick.yaml"),
        "--events-file",
        &events.display().to_string(),
    ]);
    assert!(output.status.success());

    let contents = std::fs::read_to_string(&events).unwrap();
    let types: Vec<String> = contents
        .lines()
        .map(|line| {
            let event: serde_json::Value = serde_json::from_str(line).unwrap();
            event["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        types,
        [
            "TickStarted",
            "NotificationEmitted",
            "TickFinished",
            "TickStarted",
            "NotificationEmitted",
            "NotificationEmitted",
            "TickFinished",
        ]
    );
}

#[test]
fn replay_applies_config_file() {
    let output = run_cli(&[
        "replay",
        &fixture("give_and_tick.yaml"),
        "--config",
        &fixture("tracker.yaml"),
        "--format",
        "json",
    ]);
    assert!(
        output.status.success(),
        "replay should exit 0: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // minecraft:item spawns are disabled, leaving only the block change
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let second = report["ticks"][1]["notifications"].as_array().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["kind"], "change_blocks");
}

#[test]
fn replay_missing_trace_exits_with_io_code() {
    let output = run_cli(&["replay", "does/not/exist.yaml"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn replay_invalid_trace_exits_with_trace_code() {
    let output = run_cli(&["replay", &fixture("invalid_phase.yaml")]);
    assert_eq!(output.status.code(), Some(4));
}

// ============================================================================
// validate command
// ============================================================================

#[test]
fn validate_accepts_good_traces() {
    let output = run_cli(&[
        "validate",
        &fixture("give_and_tick.yaml"),
        &fixture("runaway.yaml"),
    ]);
    assert!(
        output.status.success(),
        "validate should exit 0: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("ok: ").count(), 2, "{stdout}");
}

#[test]
fn validate_suggests_phase_name() {
    let output = run_cli(&["validate", &fixture("invalid_phase.yaml")]);
    assert_eq!(output.status.code(), Some(4));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("invalid: "), "{stdout}");
    assert!(stdout.contains("did you mean 'block_tick'?"), "{stdout}");
}

#[test]
fn validate_requires_files() {
    let output = run_cli(&["validate"]);
    assert!(!output.status.success());
}
