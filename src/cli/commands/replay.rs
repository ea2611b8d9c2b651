//! `replay` command
//!
//! Loads a tracker configuration and a hook trace, replays the trace, and
//! prints the resulting notifications and diagnostics.

use crate::cli::args::{OutputFormat, ReplayArgs};
use crate::config::{ConfigLoader, LoaderOptions, TrackerConfig};
use crate::error::TrackerError;
use crate::observability::EventEmitter;
use crate::replay::{ReplayReport, Replayer, load_trace};

/// Replay a hook trace.
///
/// # Errors
///
/// Returns an error if the configuration or trace cannot be loaded, or if
/// the replay hits a protocol or integrity violation.
pub fn run(args: &ReplayArgs, quiet: bool) -> Result<(), TrackerError> {
    let config = match &args.config {
        Some(path) => {
            let loaded = ConfigLoader::new(LoaderOptions::default()).load(path)?;
            for warning in &loaded.warnings {
                tracing::warn!(
                    location = warning.location.as_deref().unwrap_or("<unknown>"),
                    "{}",
                    warning.message
                );
            }
            loaded.config
        }
        None => TrackerConfig::default(),
    };

    let loaded = load_trace(&args.trace)?;
    for warning in &loaded.warnings {
        tracing::warn!(file = %args.trace.display(), "{warning}");
    }

    let events = match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    tracing::info!(file = %args.trace.display(), "replaying trace");
    let report = Replayer::new(&loaded.trace, config, &events).run(&loaded.trace)?;

    if !quiet {
        match args.format {
            OutputFormat::Human => print!("{}", render_human(&report)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
    }
    Ok(())
}

/// Renders a report as indented plain text.
#[must_use]
pub fn render_human(report: &ReplayReport) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    if let Some(name) = &report.name {
        let _ = writeln!(out, "trace: {name}");
    }
    for tick in &report.ticks {
        let _ = writeln!(
            out,
            "tick {}: {} notification(s), {} diagnostic(s), max depth {}",
            tick.tick,
            tick.notifications.len(),
            tick.diagnostics.len(),
            tick.max_depth
        );
        for notification in &tick.notifications {
            let cause = notification
                .cause()
                .0
                .iter()
                .map(|c| c.summary.as_str())
                .collect::<Vec<_>>()
                .join(" <- ");
            let _ = writeln!(
                out,
                "  {} [{}] x{} caused by {cause}",
                notification.kind(),
                notification.phase(),
                notification.capture_count()
            );
        }
        for diagnostic in &tick.diagnostics {
            let _ = writeln!(out, "  ! {diagnostic}");
        }
        if tick.failed_hooks > 0 {
            let _ = writeln!(out, "  {} hook(s) failed", tick.failed_hooks);
        }
    }
    let _ = writeln!(
        out,
        "total: {} notification(s), {} diagnostic(s)",
        report.notification_count(),
        report.diagnostic_count()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{BlockChange, BlockPos, Cause, CauseChain, Notification, PhaseState};
    use crate::replay::TickReport;

    #[test]
    fn test_render_human_lists_notifications() {
        let report = ReplayReport {
            name: Some("demo".to_string()),
            ticks: vec![TickReport {
                tick: 0,
                notifications: vec![Notification::ChangeBlocks {
                    phase: PhaseState::BlockTick,
                    cause: CauseChain(vec![Cause {
                        phase: PhaseState::BlockTick,
                        summary: "BlockTick {block=minecraft:tnt@(0, 64, 0)}".to_string(),
                    }]),
                    changes: vec![BlockChange {
                        pos: BlockPos::new(0, 64, 0),
                        original: "minecraft:tnt".to_string(),
                        replacement: "minecraft:air".to_string(),
                    }],
                }],
                max_depth: 1,
                ..TickReport::default()
            }],
        };
        let text = render_human(&report);
        assert!(text.starts_with("trace: demo\n"));
        assert!(text.contains("change_blocks [BlockTick] x1 caused by BlockTick"));
        assert!(text.ends_with("total: 1 notification(s), 0 diagnostic(s)\n"));
    }
}
