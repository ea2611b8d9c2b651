//! Configuration loader
//!
//! Loading pipeline:
//! 1. Environment variable expansion (pre-parse, on raw text)
//! 2. YAML parsing and deserialization to [`TrackerConfig`]
//! 3. `PHASETRACK_*` environment overrides
//! 4. Validation

use std::path::Path;

use crate::config::schema::TrackerConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,

    /// Apply `PHASETRACK_*` environment overrides after parsing.
    pub env_overrides: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_config_size: env_or("PHASETRACK_MAX_CONFIG_SIZE", 1024 * 1024),
            env_overrides: true,
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: TrackerConfig,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or too large, if environment
    /// expansion or YAML parsing fails, or if validation finds errors.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.options.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.options.max_config_size),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw, path)
    }

    /// Loads and validates configuration text. `source` is used in messages.
    ///
    /// An empty document yields the default configuration.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn load_str(&self, raw: &str, source: &Path) -> Result<LoadResult, ConfigError> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw, source)?;
        let mut warnings = env_sub.warnings;

        let value: serde_yaml::Value =
            serde_yaml::from_str(&substituted).map_err(|e| parse_error(source, &e))?;

        let mut config: TrackerConfig = if value.is_null() {
            TrackerConfig::default()
        } else {
            serde_yaml::from_value(value).map_err(|e| parse_error(source, &e))?
        };

        if self.options.env_overrides {
            apply_env_overrides(&mut config)?;
        }

        let result = Validator::new().validate(&config);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: source.display().to_string(),
                errors: result.errors,
            });
        }

        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult { config, warnings })
    }
}

fn parse_error(path: &Path, err: &serde_yaml::Error) -> ConfigError {
    let message = err.location().map_or_else(
        || err.to_string(),
        |loc| format!("line {}: {err}", loc.line()),
    );
    ConfigError::ParseError {
        path: path.to_path_buf(),
        message,
    }
}

// ============================================================================
// Environment Overrides
// ============================================================================

/// Applies `PHASETRACK_*` variables on top of the parsed configuration.
fn apply_env_overrides(config: &mut TrackerConfig) -> Result<(), ConfigError> {
    override_from_env("PHASETRACK_MAX_DEPTH", &mut config.max_depth)?;
    override_from_env(
        "PHASETRACK_INITIAL_STACK_CAPACITY",
        &mut config.initial_stack_capacity,
    )?;
    override_from_env(
        "PHASETRACK_MAX_PRINTED_RUNAWAYS",
        &mut config.max_printed_runaways,
    )?;
    override_from_env(
        "PHASETRACK_MAX_RETAINED_DIAGNOSTICS",
        &mut config.max_retained_diagnostics,
    )?;
    override_from_env("PHASETRACK_VERBOSE", &mut config.verbose)?;
    Ok(())
}

fn override_from_env<T: std::str::FromStr>(name: &str, slot: &mut T) -> Result<(), ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        value: raw.clone(),
        expected: std::any::type_name::<T>().to_string(),
    })?;
    Ok(())
}

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text before parsing so substituted values keep YAML
/// type inference.
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Substitutes environment variables in raw YAML text.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset, with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = read_until_close(&mut chars).ok_or_else(|| {
                        ConfigError::ParseError {
                            path: source.to_path_buf(),
                            message: "unclosed environment variable reference".to_string(),
                        }
                    })?;
                    self.expand(&spec, source, &mut result)?;
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    fn expand(&mut self, spec: &str, source: &Path, out: &mut String) -> Result<(), ConfigError> {
        let (name, fallback) = match spec.find(":-").or_else(|| spec.find(":?")) {
            Some(idx) => (&spec[..idx], Some((&spec[idx + 1..idx + 2], &spec[idx + 2..]))),
            None => (spec, None),
        };

        if let Ok(value) = std::env::var(name) {
            out.push_str(&value);
            return Ok(());
        }

        match fallback {
            Some(("-", default)) => out.push_str(default),
            Some((_, message)) => {
                return Err(ConfigError::EnvVarNotSet {
                    var: name.to_string(),
                    location: message.to_string(),
                });
            }
            None => self.warnings.push(LoadWarning {
                message: format!("Environment variable '{name}' is not set, using empty string"),
                location: Some(source.display().to_string()),
            }),
        }
        Ok(())
    }
}

/// Reads up to the matching `}`, honoring nested braces.
fn read_until_close(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut value = String::new();
    let mut depth = 1;
    for c in chars.by_ref() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(value);
                }
            }
            _ => {}
        }
        value.push(c);
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
