#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use phasetrack::config::TrackerConfig;
use phasetrack::error::Severity;
use phasetrack::observability::EventEmitter;
use phasetrack::replay::{Replayer, parse_trace, validate_trace};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(trace) = parse_trace(raw, Path::new("fuzz.yaml")) else {
        return;
    };
    if validate_trace(&trace)
        .iter()
        .any(|issue| issue.severity == Severity::Error)
    {
        return;
    }

    // A validated trace replays without protocol violations, and every
    // tick ends with an empty stack.
    let events = EventEmitter::noop();
    let mut replayer = Replayer::new(&trace, TrackerConfig::default(), &events);
    let report = replayer.run(&trace).expect("validated trace must replay");
    assert_eq!(report.ticks.len(), trace.ticks.len());
    assert_eq!(replayer.tracker().depth(), 0);
});
