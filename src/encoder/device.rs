//! Render device discovery and micro-benchmarking for hardware encoders.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::catalog::{Backend, Codec, EncoderDescriptor};
use crate::process::{self, supervisor::RunOptions, EXIT_LAUNCH_FAILED};

/// Default location of DRM render nodes.
pub const RENDER_NODE_DIR: &str = "/dev/dri";

/// Outcome of device selection for one hardware encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChoice {
    /// Winning render node.
    pub device: PathBuf,
    /// Measured encode time; `None` when benchmarking was skipped because
    /// only one candidate existed.
    pub encode_time: Option<Duration>,
}

/// Lists render nodes (`renderD*`) under `dir`, sorted by name.
pub fn enumerate_render_nodes(dir: &Path) -> Vec<PathBuf> {
    let mut nodes: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("renderD"))
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    nodes.sort();
    nodes
}

/// Checks `vainfo` output for an encode entrypoint of the given codec.
///
/// Lines of interest look like
/// `VAProfileH264Main : VAEntrypointEncSlice`; low-power entrypoints
/// (`EncSliceLP`) count as well.
pub fn reports_encode_entrypoint(lines: &[String], codec: Codec) -> bool {
    let profile_prefix = match codec {
        Codec::H264 => "VAProfileH264",
        Codec::Hevc => "VAProfileHEVC",
    };
    lines
        .iter()
        .any(|line| line.contains(profile_prefix) && line.contains("VAEntrypointEncSlice"))
}

/// Asks the diagnostic companion tool whether `device` can encode `codec`.
///
/// A missing tool is not a verdict: the caller should let the real test
/// encode decide, so launch failure answers `true`. A present tool that
/// exits non-zero or lists no encode entrypoint answers `false`.
pub async fn device_supports_codec(
    vainfo: &Path,
    device: &Path,
    codec: Codec,
    timeout: Duration,
) -> bool {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let opts = RunOptions {
        listener: Some(Arc::new(move |line: &str, _| {
            sink.lock().unwrap().push(line.to_string());
        })),
        timeout: Some(timeout),
        ..Default::default()
    };

    let args = vec![
        "--display".to_string(),
        "drm".to_string(),
        "--device".to_string(),
        device.display().to_string(),
    ];
    let code = process::run(vainfo, &args, opts).await;

    if code == EXIT_LAUNCH_FAILED {
        debug!(device = %device.display(), "vainfo not present, assuming device is usable");
        return true;
    }
    if code != 0 {
        return false;
    }

    let lines = lines.lock().unwrap();
    reports_encode_entrypoint(&lines, codec)
}

/// Builds the argument vector for a short synthetic test encode: a generated
/// test pattern, a handful of frames, output discarded.
pub fn test_encode_args(
    desc: &EncoderDescriptor,
    device: Option<&Path>,
    frames: u32,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-v".into(),
        "error".into(),
    ];

    // Device argument injection is backend-specific; keep the match
    // exhaustive so new backends cannot be forgotten here.
    match desc.backend {
        Backend::Vaapi => {
            if let Some(device) = device {
                args.push("-init_hw_device".into());
                args.push(format!("vaapi=hw:{}", device.display()));
                args.push("-filter_hw_device".into());
                args.push("hw".into());
            }
        }
        Backend::Software
        | Backend::Nvenc
        | Backend::Qsv
        | Backend::Amf
        | Backend::V4l2m2m
        | Backend::Auto => {}
    }

    args.push("-f".into());
    args.push("lavfi".into());
    args.push("-i".into());
    args.push("testsrc2=size=640x360:rate=30".into());
    args.push("-frames:v".into());
    args.push(frames.to_string());

    if desc.backend == Backend::Vaapi {
        args.push("-vf".into());
        args.push("format=nv12,hwupload".into());
    }

    args.push("-c:v".into());
    args.push(desc.name.into());
    args.push("-f".into());
    args.push("null".into());
    args.push("-".into());

    args
}

/// Runs a timed synthetic encode. `None` on any failure (non-zero exit,
/// timeout, missing binary).
pub async fn timed_test_encode(
    ffmpeg: &Path,
    desc: &EncoderDescriptor,
    device: Option<&Path>,
    frames: u32,
    timeout: Duration,
) -> Option<Duration> {
    let args = test_encode_args(desc, device, frames);
    let opts = RunOptions {
        discard_output: true,
        timeout: Some(timeout),
        ..Default::default()
    };

    let started = Instant::now();
    let code = process::run(ffmpeg, &args, opts).await;
    let elapsed = started.elapsed();

    if code == 0 {
        info!(
            encoder = desc.name,
            device = ?device.map(|d| d.display().to_string()),
            elapsed_ms = elapsed.as_millis() as u64,
            "Test encode succeeded"
        );
        Some(elapsed)
    } else {
        debug!(
            encoder = desc.name,
            device = ?device.map(|d| d.display().to_string()),
            code,
            "Test encode failed"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::catalog;

    #[test]
    fn render_node_listing_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("renderD129"), b"").unwrap();
        std::fs::write(dir.path().join("card0"), b"").unwrap();
        std::fs::write(dir.path().join("renderD128"), b"").unwrap();

        let nodes = enumerate_render_nodes(dir.path());
        assert_eq!(
            nodes,
            vec![
                dir.path().join("renderD128"),
                dir.path().join("renderD129"),
            ]
        );
    }

    #[test]
    fn missing_render_dir_yields_no_nodes() {
        assert!(enumerate_render_nodes(Path::new("/nonexistent/dri")).is_empty());
    }

    #[test]
    fn entrypoint_detection() {
        let lines: Vec<String> = vec![
            "      VAProfileH264Main               : VAEntrypointVLD".into(),
            "      VAProfileH264Main               : VAEntrypointEncSlice".into(),
        ];
        assert!(reports_encode_entrypoint(&lines, Codec::H264));
        assert!(!reports_encode_entrypoint(&lines, Codec::Hevc));

        let decode_only: Vec<String> =
            vec!["      VAProfileHEVCMain              : VAEntrypointVLD".into()];
        assert!(!reports_encode_entrypoint(&decode_only, Codec::Hevc));
    }

    #[test]
    fn vaapi_test_args_carry_the_device() {
        let desc = catalog::find("h264_vaapi").unwrap();
        let args = test_encode_args(desc, Some(Path::new("/dev/dri/renderD128")), 10);
        assert!(args.contains(&"vaapi=hw:/dev/dri/renderD128".to_string()));
        assert!(args.contains(&"format=nv12,hwupload".to_string()));
        assert!(args.contains(&"h264_vaapi".to_string()));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn software_test_args_have_no_device_plumbing() {
        let desc = catalog::find("libx264").unwrap();
        let args = test_encode_args(desc, None, 10);
        assert!(!args.iter().any(|a| a.contains("hw_device")));
        assert!(args.contains(&"10".to_string()));
        assert!(args.contains(&"libx264".to_string()));
    }
}
