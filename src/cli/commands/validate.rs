//! `validate` command
//!
//! Parses and validates hook traces, reporting every issue found.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::error::{Severity, TraceError, TrackerError, ValidationIssue};
use crate::replay::{parse_trace, validate_trace};

/// Validation result for one file.
#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    issues: Vec<ValidationIssue>,
}

/// Validate trace files.
///
/// # Errors
///
/// Returns the first file's error if any file cannot be read, does not
/// parse, or has validation errors (or warnings, with `--strict`).
pub fn run(args: &ValidateArgs, quiet: bool) -> Result<(), TrackerError> {
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<TrackerError> = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating trace");
        match check_file(path, args.strict) {
            Ok(report) => {
                if !report.valid && first_error.is_none() {
                    first_error = Some(
                        TraceError::Invalid {
                            path: path.clone(),
                            errors: report.issues.clone(),
                        }
                        .into(),
                    );
                }
                reports.push(report);
            }
            Err(e) => {
                reports.push(FileReport {
                    file: path.display().to_string(),
                    valid: false,
                    issues: vec![ValidationIssue {
                        path: String::new(),
                        message: e.to_string(),
                        severity: Severity::Error,
                    }],
                });
                first_error.get_or_insert(e);
            }
        }
    }

    if !quiet {
        match args.format {
            OutputFormat::Human => {
                for report in &reports {
                    if report.valid {
                        println!("ok: {}", report.file);
                    } else {
                        println!("invalid: {}", report.file);
                    }
                    for issue in &report.issues {
                        println!("  {issue}");
                    }
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        }
    }

    first_error.map_or(Ok(()), Err)
}

fn check_file(path: &Path, strict: bool) -> Result<FileReport, TrackerError> {
    let raw = std::fs::read_to_string(path)?;
    let trace = parse_trace(&raw, path)?;
    let issues = validate_trace(&trace);
    let valid = !issues
        .iter()
        .any(|issue| strict || issue.severity == Severity::Error);
    Ok(FileReport {
        file: path.display().to_string(),
        valid,
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_warnings_fail_only_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "empty.yaml", "ticks: []\n");

        let lenient = check_file(&path, false).unwrap();
        assert!(lenient.valid);
        assert_eq!(lenient.issues.len(), 1);

        let strict = check_file(&path, true).unwrap();
        assert!(!strict.valid);
    }

    #[test]
    fn test_run_reports_first_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = write(
            &dir,
            "good.yaml",
            "ticks:\n  - hooks:\n      - phase: entity_tick\n        entity: 1\n",
        );
        let bad = write(&dir, "bad.yaml", "ticks:\n  - hooks:\n      - phase: comand\n");
        let args = ValidateArgs {
            files: vec![good, bad],
            format: OutputFormat::Json,
            strict: false,
        };
        let err = run(&args, true).unwrap_err();
        assert!(matches!(err, TrackerError::Trace(TraceError::Invalid { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_file(&dir.path().join("absent.yaml"), false).unwrap_err();
        assert!(matches!(err, TrackerError::Io(_)));
    }
}
