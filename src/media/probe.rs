//! FFprobe wrapper supplying progress totals for transcode jobs.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::progress::ProgressContext;

/// Totals probed from a media file, enough to turn transcoder status lines
/// into percentages.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    /// File path, for logging.
    pub path: String,
    /// Container duration in seconds.
    pub duration: Option<f64>,
    /// Frame count of the first video stream, when the container records it.
    pub total_frames: Option<u64>,
    /// Stream time base as a rational (numerator, denominator).
    pub time_base: Option<(u32, u32)>,
    /// Stream duration in time-base units.
    pub duration_ts: Option<i64>,
}

impl MediaInfo {
    /// Builds the progress context for a job transcoding this file. A frame
    /// total is preferred; a stream duration in time-base units stands in
    /// when the container-level duration is missing.
    pub fn progress_context(&self) -> ProgressContext {
        let mut ctx = if let Some(duration) = self.duration {
            ProgressContext::with_duration_secs(duration)
        } else if let (Some((num, den)), Some(ts)) = (self.time_base, self.duration_ts) {
            ProgressContext::from_time_base(num, den, ts)
        } else {
            ProgressContext::unknown()
        };

        if let Some(frames) = self.total_frames {
            ctx = ctx.and_total_frames(frames);
        }
        ctx
    }
}

/// Probes a media file using ffprobe.
pub fn probe(ffprobe: &Path, path: &Path) -> Result<MediaInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .context("Failed to run ffprobe")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let json: Value =
        serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe output")?;

    Ok(parse_probe_output(&json, path))
}

/// Extracts the totals from ffprobe's JSON document. ffprobe reports most
/// numbers as strings; anything missing or malformed is simply absent.
fn parse_probe_output(json: &Value, path: &Path) -> MediaInfo {
    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    let video = json["streams"]
        .as_array()
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s["codec_type"].as_str() == Some("video"))
        });

    let total_frames = video
        .and_then(|s| s["nb_frames"].as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0);

    let time_base = video
        .and_then(|s| s["time_base"].as_str())
        .and_then(parse_rational);

    let duration_ts = video
        .and_then(|s| s["duration_ts"].as_i64())
        .filter(|ts| *ts > 0);

    MediaInfo {
        path: path.display().to_string(),
        duration,
        total_frames,
        time_base,
        duration_ts,
    }
}

/// Parses a `num/den` rational token.
fn parse_rational(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.split_once('/')?;
    Some((num.trim().parse().ok()?, den.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_duration_and_frames() {
        let doc = json!({
            "format": { "duration": "120.5" },
            "streams": [
                { "codec_type": "audio", "time_base": "1/48000" },
                {
                    "codec_type": "video",
                    "nb_frames": "2890",
                    "time_base": "1/90000",
                    "duration_ts": 10845000
                }
            ]
        });

        let info = parse_probe_output(&doc, Path::new("clip.mkv"));
        assert_eq!(info.duration, Some(120.5));
        assert_eq!(info.total_frames, Some(2890));
        assert_eq!(info.time_base, Some((1, 90000)));
        assert_eq!(info.duration_ts, Some(10845000));
    }

    #[test]
    fn malformed_numbers_are_absent() {
        let doc = json!({
            "format": { "duration": "n/a" },
            "streams": [
                { "codec_type": "video", "nb_frames": "unknown", "time_base": "broken" }
            ]
        });

        let info = parse_probe_output(&doc, Path::new("clip.mkv"));
        assert_eq!(info.duration, None);
        assert_eq!(info.total_frames, None);
        assert_eq!(info.time_base, None);
    }

    #[test]
    fn context_prefers_frames_and_falls_back_to_time_base() {
        let with_frames = MediaInfo {
            duration: Some(100.0),
            total_frames: Some(2400),
            ..Default::default()
        };
        let ctx = with_frames.progress_context();
        assert_eq!(crate::progress::extract("frame=1200", &ctx), 50.0);

        let time_base_only = MediaInfo {
            time_base: Some((1, 90000)),
            duration_ts: Some(8_100_000), // 90 seconds
            ..Default::default()
        };
        let ctx = time_base_only.progress_context();
        assert_eq!(crate::progress::extract("time=00:00:45.00", &ctx), 50.0);
    }

    #[test]
    fn empty_info_yields_an_empty_context() {
        assert!(MediaInfo::default().progress_context().is_empty());
    }

    #[test]
    fn rational_parsing() {
        assert_eq!(parse_rational("1/90000"), Some((1, 90000)));
        assert_eq!(parse_rational("24000/1001"), Some((24000, 1001)));
        assert_eq!(parse_rational("broken"), None);
        assert_eq!(parse_rational("1/"), None);
    }
}
