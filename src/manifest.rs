//! Job manifest: the YAML list of commands to enqueue.
//!
//! Each entry is an argument vector some command builder already produced;
//! the orchestrator treats it as opaque. Optional fields supply progress
//! totals, either explicitly or via a probe of the named input file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::QueueError;
use crate::media;
use crate::progress::ProgressContext;
use crate::queue::JobSpec;

/// A parsed job manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct JobManifest {
    pub jobs: Vec<ManifestEntry>,
}

/// One job to enqueue.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// Executable to run.
    pub program: PathBuf,

    /// Argument vector, passed through untouched.
    #[serde(default)]
    pub args: Vec<String>,

    /// Destination for artifacts; defaults to the configured output
    /// directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Artifact filename patterns; defaults to the configured patterns.
    #[serde(default)]
    pub artifacts: Option<Vec<String>>,

    /// Input file to probe for progress totals.
    #[serde(default)]
    pub input: Option<PathBuf>,

    /// Explicit frame total, overriding anything probed.
    #[serde(default)]
    pub total_frames: Option<u64>,

    /// Explicit duration total, overriding anything probed.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Loads a manifest file.
pub fn load(path: &Path) -> Result<JobManifest, QueueError> {
    let content = std::fs::read_to_string(path).map_err(|e| QueueError::ManifestFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| QueueError::ManifestFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

impl ManifestEntry {
    /// Builds the job spec, filling defaults from the configuration and
    /// resolving the progress context. A failed input probe degrades to an
    /// indeterminate context, never to an error.
    pub fn to_spec(&self, config: &AppConfig) -> JobSpec {
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output.directory.clone());
        let patterns = self
            .artifacts
            .clone()
            .unwrap_or_else(|| config.output.artifact_patterns.clone());

        JobSpec::new(self.program.clone(), self.args.clone(), output_dir)
            .with_artifact_patterns(patterns)
            .with_context(self.progress_context(config))
    }

    fn progress_context(&self, config: &AppConfig) -> ProgressContext {
        let mut ctx = match self.duration_seconds {
            Some(seconds) => ProgressContext::with_duration_secs(seconds),
            None => match &self.input {
                Some(input) => match media::probe(&config.tools.ffprobe, input) {
                    Ok(info) => info.progress_context(),
                    Err(e) => {
                        warn!(input = %input.display(), error = %e, "Input probe failed, progress will be indeterminate");
                        ProgressContext::unknown()
                    }
                },
                None => ProgressContext::unknown(),
            },
        };

        if let Some(frames) = self.total_frames {
            ctx = ctx.and_total_frames(frames);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.yaml");
        let yaml = r#"
jobs:
  - program: yt-dlp
    args: ["--no-playlist", "https://example.test/v"]
  - program: ffmpeg
    args: ["-i", "in.mkv", "out.mkv"]
    total_frames: 2400
    output_dir: /srv/done
"#;
        std::fs::write(&path, yaml).unwrap();

        let manifest = load(&path).unwrap();
        assert_eq!(manifest.jobs.len(), 2);
        assert_eq!(manifest.jobs[0].program, PathBuf::from("yt-dlp"));
        assert_eq!(manifest.jobs[1].total_frames, Some(2400));
    }

    #[test]
    fn missing_manifest_is_an_error() {
        assert!(matches!(
            load(Path::new("/nonexistent/jobs.yaml")),
            Err(QueueError::ManifestFailed { .. })
        ));
    }

    #[test]
    fn spec_defaults_come_from_the_config() {
        let config = AppConfig::default();
        let entry = ManifestEntry {
            program: PathBuf::from("yt-dlp"),
            args: vec!["URL".into()],
            output_dir: None,
            artifacts: None,
            input: None,
            total_frames: None,
            duration_seconds: None,
        };

        let spec = entry.to_spec(&config);
        assert_eq!(spec.output_dir, config.output.directory);
        assert_eq!(spec.artifact_patterns, config.output.artifact_patterns);
        assert!(spec.context.is_empty());
    }

    #[test]
    fn explicit_totals_override_probing() {
        let config = AppConfig::default();
        let entry = ManifestEntry {
            program: PathBuf::from("ffmpeg"),
            args: vec![],
            output_dir: Some(PathBuf::from("/out")),
            artifacts: None,
            input: None,
            total_frames: Some(200),
            duration_seconds: Some(60.0),
        };

        let spec = entry.to_spec(&config);
        assert_eq!(crate::progress::extract("frame=100", &spec.context), 50.0);
    }
}
