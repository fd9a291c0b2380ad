//! Configuration data structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::encoder::ScannerConfig;

/// Root configuration structure containing all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Queue and scheduling settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Capability probing settings.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Finished artifact handling.
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tools: ToolsConfig::default(),
            queue: QueueConfig::default(),
            probe: ProbeConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    /// Scanner view of this configuration.
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            ffmpeg: self.tools.ffmpeg.clone(),
            vainfo: self.tools.vainfo.clone(),
            probe_timeout: Duration::from_secs(self.probe.timeout_seconds),
            render_node_dir: self.probe.render_device_dir.clone(),
        }
    }
}

/// Paths to the external tools the pipeline drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Transcoder binary.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Media prober binary.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    /// VA-API diagnostic tool; optional, probed devices are assumed usable
    /// when it is missing.
    #[serde(default = "default_vainfo")]
    pub vainfo: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            vainfo: default_vainfo(),
        }
    }
}

/// Queue and scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of concurrently running jobs.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Optional per-job wall-clock budget in seconds.
    #[serde(default)]
    pub job_timeout_seconds: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            job_timeout_seconds: None,
        }
    }
}

/// Capability probing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Timeout for each capability/benchmark probe in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,

    /// Directory holding DRM render nodes.
    #[serde(default = "default_render_device_dir")]
    pub render_device_dir: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_probe_timeout(),
            render_device_dir: default_render_device_dir(),
        }
    }
}

/// Finished artifact handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default destination directory for finished artifacts.
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Default filename patterns identifying finished artifacts inside a
    /// job's working directory.
    #[serde(default = "default_artifact_patterns")]
    pub artifact_patterns: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            artifact_patterns: default_artifact_patterns(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_vainfo() -> PathBuf {
    PathBuf::from("vainfo")
}

fn default_max_concurrent() -> usize {
    2
}

fn default_probe_timeout() -> u64 {
    8
}

fn default_render_device_dir() -> PathBuf {
    PathBuf::from("/dev/dri")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_artifact_patterns() -> Vec<String> {
    ["*.mkv", "*.mp4", "*.webm", "*.m4a", "*.opus"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_an_empty_document() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.queue.max_concurrent, 2);
        assert_eq!(config.probe.timeout_seconds, 8);
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert!(config.queue.job_timeout_seconds.is_none());
    }

    #[test]
    fn partial_sections_keep_their_defaults() {
        let yaml = "queue:\n  max_concurrent: 5\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queue.max_concurrent, 5);
        assert!(config.queue.job_timeout_seconds.is_none());
        assert_eq!(config.probe.render_device_dir, PathBuf::from("/dev/dri"));
    }
}
