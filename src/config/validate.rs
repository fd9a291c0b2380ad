//! Configuration validation.

use super::model::AppConfig;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Blocks configuration loading.
    Error,
    /// Logged but allows loading.
    Warning,
}

/// A validation issue found during configuration checking.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: ValidationSeverity,
    /// Path to the problematic config field (e.g., "queue.max_concurrent").
    pub path: String,
    /// Description of the issue.
    pub message: String,
    /// Optional suggestion for fixing the issue.
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Creates a new error-level validation issue.
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Creates a new warning-level validation issue.
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Warning,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Adds a suggestion to this validation issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Result of validating a configuration.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }
}

/// Validates the configuration.
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.queue.max_concurrent < 1 {
        result.add(
            ValidationIssue::error(
                "queue.max_concurrent",
                "Concurrency cap must be at least 1",
            )
            .with_suggestion("Set queue.max_concurrent to 1 or higher"),
        );
    }

    if let Some(timeout) = config.queue.job_timeout_seconds {
        if timeout == 0 {
            result.add(ValidationIssue::error(
                "queue.job_timeout_seconds",
                "Job timeout of 0 would kill every job immediately; omit it for no limit",
            ));
        }
    }

    if config.probe.timeout_seconds == 0 || config.probe.timeout_seconds > 60 {
        result.add(
            ValidationIssue::error(
                "probe.timeout_seconds",
                format!(
                    "Probe timeout of {}s is outside the sane 1-60s range",
                    config.probe.timeout_seconds
                ),
            )
            .with_suggestion("Capability probes are meant to be quick; 8s is a good default"),
        );
    }

    for (field, path) in [
        (&config.tools.ffmpeg, "tools.ffmpeg"),
        (&config.tools.ffprobe, "tools.ffprobe"),
    ] {
        if field.as_os_str().is_empty() {
            result.add(ValidationIssue::error(path, "Tool path must not be empty"));
        }
    }

    for (i, pattern) in config.output.artifact_patterns.iter().enumerate() {
        if let Err(e) = glob::Pattern::new(pattern) {
            result.add(ValidationIssue::error(
                format!("output.artifact_patterns[{i}]"),
                format!("Invalid glob pattern '{pattern}': {e}"),
            ));
        }
    }

    if config.output.artifact_patterns.is_empty() {
        result.add(ValidationIssue::warning(
            "output.artifact_patterns",
            "No artifact patterns configured; completed jobs will deliver nothing",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let result = validate_config(&AppConfig::default());
        assert!(result.is_valid());
        assert_eq!(result.error_count(), 0);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AppConfig::default();
        config.queue.max_concurrent = 0;
        let result = validate_config(&config);
        assert!(!result.is_valid());
        assert!(result.errors().any(|i| i.path == "queue.max_concurrent"));
    }

    #[test]
    fn bad_glob_pattern_is_rejected() {
        let mut config = AppConfig::default();
        config.output.artifact_patterns = vec!["[".to_string()];
        let result = validate_config(&config);
        assert!(!result.is_valid());
    }

    #[test]
    fn empty_patterns_only_warn() {
        let mut config = AppConfig::default();
        config.output.artifact_patterns.clear();
        let result = validate_config(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn out_of_range_probe_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.probe.timeout_seconds = 300;
        assert!(!validate_config(&config).is_valid());
    }
}
