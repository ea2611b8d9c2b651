//! Error types for `phasetrack`
//!
//! Fatal conditions (protocol and integrity violations) are surfaced as
//! typed errors so integration bugs fail loudly. Runaway re-entrance and
//! individual capture failures are not errors at this level: they degrade
//! gracefully and are reported as diagnostics instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::phase::PhaseState;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `phasetrack` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Hook trace could not be parsed or validated
    pub const TRACE_ERROR: i32 = 4;

    /// A hook broke the push/pop protocol
    pub const PROTOCOL_ERROR: i32 = 5;

    /// Frames were left on the stack at a tick boundary
    pub const INTEGRITY_ERROR: i32 = 6;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `phasetrack` operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A hook violated the enter/exit protocol
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The stack was left unbalanced
    #[error(transparent)]
    Integrity(#[from] IntegrityViolation),

    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Hook trace error
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TrackerError {
    /// Returns the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Protocol(_) => ExitCode::PROTOCOL_ERROR,
            Self::Integrity(_) => ExitCode::INTEGRITY_ERROR,
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Trace(_) | Self::Yaml(_) => ExitCode::TRACE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Protocol Violations
// ============================================================================

/// A hook or extension broke the phase stack protocol.
///
/// These are bugs in the calling code, never expected runtime conditions.
/// The operation that raised one has not mutated the stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// The context passed to `push` is bound to a different state
    #[error("phase state {requested} does not match context bound to {bound}")]
    StateMismatch {
        /// State the caller asked to push
        requested: PhaseState,
        /// State the context was built for
        bound: PhaseState,
    },

    /// The context is missing fields its state requires
    #[error("phase context for {state} is incomplete (missing {missing})")]
    IncompleteContext {
        /// State of the incomplete context
        state: PhaseState,
        /// Comma-separated names of the missing fields
        missing: String,
    },

    /// The idle sentinel was pushed
    #[error("the {0} sentinel cannot be pushed")]
    SentinelPush(PhaseState),

    /// A builder setter was used on a state that has no such field
    #[error("field '{field}' does not apply to phase {state}")]
    FieldNotApplicable {
        /// State the builder is bound to
        state: PhaseState,
        /// Name of the setter that was called
        field: &'static str,
    },

    /// `pop` was called on an empty stack
    #[error("pop on an empty phase stack (exit without matching enter)")]
    PopOnEmpty,
}

/// Frames survived past a point where the stack must be empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} phase frame(s) left on the stack: {}", .stuck.len(), .stuck.join(" <- "))]
pub struct IntegrityViolation {
    /// Names of the stuck frames, top to bottom
    pub stuck: Vec<String>,
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },
}

// ============================================================================
// Trace Errors
// ============================================================================

/// Errors raised while loading a hook trace for replay.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace file is not valid YAML for the trace schema
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the trace file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// The trace parsed but failed semantic validation
    #[error("invalid trace {path}: {} issue(s)", .errors.len())]
    Invalid {
        /// Path to the trace file
        path: PathBuf,
        /// Issues found
        errors: Vec<ValidationIssue>,
    },

    /// A hook names a phase that does not exist
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found in a configuration or trace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "hooks[0].children[2].phase")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Prevents the file from being used
    Error,
    /// Informational; does not prevent loading
    Warning,
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `phasetrack` operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::TRACE_ERROR, 4);
        assert_eq!(ExitCode::PROTOCOL_ERROR, 5);
        assert_eq!(ExitCode::INTEGRITY_ERROR, 6);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
    }

    #[test]
    fn test_protocol_violation_exit_code() {
        let err: TrackerError = ProtocolViolation::PopOnEmpty.into();
        assert_eq!(err.exit_code(), ExitCode::PROTOCOL_ERROR);
    }

    #[test]
    fn test_integrity_violation_exit_code() {
        let err: TrackerError = IntegrityViolation {
            stuck: vec!["BlockTick".to_string()],
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::INTEGRITY_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: TrackerError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: TrackerError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_state_mismatch_display() {
        let err = ProtocolViolation::StateMismatch {
            requested: PhaseState::BlockTick,
            bound: PhaseState::Command,
        };
        let msg = err.to_string();
        assert!(msg.contains("BlockTick"));
        assert!(msg.contains("Command"));
    }

    #[test]
    fn test_integrity_violation_display() {
        let err = IntegrityViolation {
            stuck: vec!["EntityTick".to_string(), "Command".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "2 phase frame(s) left on the stack: EntityTick <- Command"
        );
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "hooks[0].phase".to_string(),
            message: "unknown phase".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(issue.to_string(), "error: unknown phase at hooks[0].phase");
    }

    #[test]
    fn test_config_error_env_var_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "TRACKER_DEPTH".to_string(),
            location: "max_depth".to_string(),
        };
        assert!(err.to_string().contains("TRACKER_DEPTH"));
        assert!(err.to_string().contains("max_depth"));
    }
}
