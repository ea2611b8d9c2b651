//! Configuration validation
//!
//! Runs on the fully deserialized [`TrackerConfig`] and collects every issue
//! instead of stopping at the first one.

use crate::config::schema::TrackerConfig;
use crate::error::{Severity, ValidationIssue};

/// Upper bound on `max_depth`; deeper stacks point at a configuration typo.
pub const MAX_SANE_DEPTH: usize = 65_536;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &TrackerConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_stack(config);
        self.validate_diagnostics(config);
        self.validate_entity_tracker(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_stack(&mut self, config: &TrackerConfig) {
        if config.max_depth < 2 {
            self.add_error(
                "max_depth",
                "max_depth must be at least 2 to allow any nesting",
            );
        } else if config.max_depth > MAX_SANE_DEPTH {
            self.add_error(
                "max_depth",
                &format!("max_depth must not exceed {MAX_SANE_DEPTH}"),
            );
        }

        if config.initial_stack_capacity > MAX_SANE_DEPTH {
            self.add_error(
                "initial_stack_capacity",
                &format!("initial_stack_capacity must not exceed {MAX_SANE_DEPTH}"),
            );
        } else if config.initial_stack_capacity > config.max_depth {
            self.add_warning(
                "initial_stack_capacity",
                "initial_stack_capacity exceeds max_depth; extra capacity is never used",
            );
        }
    }

    fn validate_diagnostics(&mut self, config: &TrackerConfig) {
        if config.max_retained_diagnostics == 0 {
            self.add_warning(
                "max_retained_diagnostics",
                "diagnostics will be logged but not retained",
            );
        }
        if config.verbose && config.max_printed_runaways == 0 {
            self.add_warning(
                "max_printed_runaways",
                "verbose is set but runaway dumps are disabled; verbose wins",
            );
        }
    }

    fn validate_entity_tracker(&mut self, config: &TrackerConfig) {
        for (namespace, types) in &config.entity_tracker.namespaces {
            let path = format!("entity_tracker.namespaces.{namespace}");
            if namespace.is_empty() || namespace.contains(':') {
                self.add_error(&path, "namespace must be non-empty and must not contain ':'");
            }
            for entity_type in types.keys() {
                if entity_type.is_empty() || entity_type.contains(':') {
                    self.add_error(
                        &format!("{path}.{entity_type}"),
                        "entity type must be non-empty and must not contain ':'",
                    );
                }
            }
            if types.is_empty() {
                self.add_warning(&path, "namespace lists no entity types");
            }
        }
    }

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = Validator::new().validate(&TrackerConfig::default());
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = TrackerConfig {
            max_depth: 1,
            ..TrackerConfig::default()
        };
        config
            .entity_tracker
            .namespaces
            .entry("bad:ns".to_string())
            .or_default()
            .insert(String::new(), false);

        let result = Validator::new().validate(&config);
        assert!(result.has_errors());
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors.iter().any(|e| e.path == "max_depth"));
    }

    #[test]
    fn test_capacity_above_depth_warns() {
        let config = TrackerConfig {
            initial_stack_capacity: 512,
            max_depth: 64,
            ..TrackerConfig::default()
        };
        let result = Validator::new().validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "initial_stack_capacity");
    }

    #[test]
    fn test_absurd_capacity_rejected() {
        let config = TrackerConfig {
            initial_stack_capacity: usize::MAX,
            ..TrackerConfig::default()
        };
        let result = Validator::new().validate(&config);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "initial_stack_capacity");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_absurd_depth_rejected() {
        let config = TrackerConfig {
            max_depth: MAX_SANE_DEPTH + 1,
            ..TrackerConfig::default()
        };
        assert!(Validator::new().validate(&config).has_errors());
    }
}
