//! Configuration file loading and parsing.

use std::path::Path;

use anyhow::{Context, Result};

use super::model::AppConfig;
use super::validate::{validate_config, ValidationIssue};
use crate::error::ConfigError;

/// Loads the configuration file from disk and parses it.
pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: AppConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(config)
}

/// Loads and fully validates the configuration file.
///
/// A missing file is not an error; the defaults are used so the pipeline
/// works out of the box with tools on PATH.
pub fn load_and_validate(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        load_from_path(path).context("Failed to load configuration")?
    } else {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        AppConfig::default()
    };

    let result = validate_config(&config);

    for issue in result.warnings() {
        tracing::warn!(
            path = %issue.path,
            message = %issue.message,
            suggestion = ?issue.suggestion,
            "Config validation warning"
        );
    }

    let errors: Vec<_> = result.errors().collect();
    if !errors.is_empty() {
        let report = format_validation_errors(&errors);
        tracing::error!("{}", report);
        anyhow::bail!(ConfigError::ValidationFailed {
            error_count: errors.len()
        });
    }

    Ok(config)
}

/// Formats validation errors into a human-readable report.
fn format_validation_errors(errors: &[&ValidationIssue]) -> String {
    let mut report = String::from("\nConfig Validation Failed\n");
    report.push_str("========================\n\n");

    for error in errors {
        report.push_str(&format!("ERROR {}\n", error.path));
        report.push_str(&format!("  └─ {}\n", error.message));
        if let Some(suggestion) = &error.suggestion {
            report.push_str(&format!("     {}\n", suggestion));
        }
        report.push('\n');
    }

    report.push_str(&format!(
        "---\n{} error(s)\nConfig rejected.\n",
        errors.len()
    ));

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_and_validate(Path::new("/nonexistent/pipeline.yaml")).unwrap();
        assert_eq!(config.queue.max_concurrent, 2);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "queue: [not, a, mapping]").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "queue:\n  max_concurrent: 0\n").unwrap();

        assert!(load_and_validate(&path).is_err());
    }

    #[test]
    fn valid_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(
            &path,
            "queue:\n  max_concurrent: 4\ntools:\n  ffmpeg: /usr/bin/ffmpeg\n",
        )
        .unwrap();

        let config = load_and_validate(&path).unwrap();
        assert_eq!(config.queue.max_concurrent, 4);
        assert_eq!(config.tools.ffmpeg, std::path::PathBuf::from("/usr/bin/ffmpeg"));
    }
}
