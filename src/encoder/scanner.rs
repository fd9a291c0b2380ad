//! Empirical encoder capability discovery.
//!
//! Every answer is probed from the transcoder binary at most once per
//! scanner instance and cached. Probes run under the process supervisor
//! with short timeouts, and every failure mode degrades to "unavailable"
//! so capability discovery can never block or break job execution.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::catalog::{Backend, Codec, EncoderDescriptor, ENCODERS, SOFTWARE_PRESETS, X264_PROFILES, X265_PROFILES};
use super::device::{self, DeviceChoice};
use super::help_text;
use crate::process::{self, supervisor::RunOptions};

/// Frames encoded for the availability check.
const AVAILABILITY_FRAMES: u32 = 10;

/// Frames encoded for the device benchmark; long enough to separate devices,
/// short enough to stay inside the probe timeout.
const BENCHMARK_FRAMES: u32 = 90;

/// Discovered preset/profile lists for one encoder on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderCapability {
    pub presets: Vec<String>,
    pub profiles: Vec<String>,
}

/// Tool paths and limits the scanner probes with.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub ffmpeg: PathBuf,
    pub vainfo: PathBuf,
    pub probe_timeout: Duration,
    pub render_node_dir: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            vainfo: PathBuf::from("vainfo"),
            probe_timeout: Duration::from_secs(8),
            render_node_dir: PathBuf::from(device::RENDER_NODE_DIR),
        }
    }
}

type CellMap<T> = Mutex<HashMap<&'static str, Arc<OnceCell<T>>>>;

/// Probes and caches what the transcoder binary can do on this machine.
///
/// Each cache key is computed at most once: concurrent callers for the same
/// key collapse onto a single in-flight probe and observe its result, while
/// probes for different keys proceed in parallel. Cache lifetime is the
/// scanner instance.
pub struct CapabilityScanner {
    config: ScannerConfig,
    encoder_list: OnceCell<HashSet<String>>,
    capabilities: CellMap<EncoderCapability>,
    availability: CellMap<bool>,
    best_device: CellMap<Option<DeviceChoice>>,
}

impl CapabilityScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            encoder_list: OnceCell::new(),
            capabilities: Mutex::new(HashMap::new()),
            availability: Mutex::new(HashMap::new()),
            best_device: Mutex::new(HashMap::new()),
        }
    }

    /// Raw encoder names the binary reports, probed once per instance.
    pub async fn list_encoders(&self) -> HashSet<String> {
        self.encoder_list
            .get_or_init(|| self.probe_encoder_list())
            .await
            .clone()
    }

    /// Probes capabilities for every catalog encoder, warming the cache.
    pub async fn scan_capabilities(&self) {
        for desc in ENCODERS {
            self.capabilities(desc).await;
        }
    }

    /// Preset/profile lists for one encoder.
    ///
    /// Software encoders are answered from the pinned tables (the binary
    /// does not expose their presets); the `auto` placeholder is always
    /// empty; everything else is parsed from the binary's help text.
    pub async fn capabilities(&self, desc: &'static EncoderDescriptor) -> EncoderCapability {
        match desc.backend {
            Backend::Software => {
                let profiles = match desc.codec {
                    Codec::H264 => X264_PROFILES,
                    Codec::Hevc => X265_PROFILES,
                };
                EncoderCapability {
                    presets: SOFTWARE_PRESETS.iter().map(|s| s.to_string()).collect(),
                    profiles: profiles.iter().map(|s| s.to_string()).collect(),
                }
            }
            Backend::Auto => EncoderCapability::default(),
            _ => {
                let cell = cell_for(&self.capabilities, desc.name);
                cell.get_or_init(|| self.probe_capabilities(desc)).await.clone()
            }
        }
    }

    /// Ordered speed presets usable with this encoder.
    pub async fn available_presets(&self, desc: &'static EncoderDescriptor) -> Vec<String> {
        self.capabilities(desc).await.presets
    }

    /// Ordered profiles usable with this encoder.
    pub async fn available_profiles(&self, desc: &'static EncoderDescriptor) -> Vec<String> {
        self.capabilities(desc).await.profiles
    }

    /// Whether this encoder actually works here: listed by the binary and
    /// able to complete a short synthetic test encode.
    pub async fn is_available(&self, desc: &'static EncoderDescriptor) -> bool {
        if desc.backend == Backend::Auto {
            return false;
        }

        let cell = cell_for(&self.availability, desc.name);
        *cell.get_or_init(|| self.probe_availability(desc)).await
    }

    /// Fastest usable render device for a hardware encoder, measured once
    /// and reused for the scanner's lifetime. `None` for software encoders
    /// and when no device works.
    pub async fn best_device(&self, desc: &'static EncoderDescriptor) -> Option<DeviceChoice> {
        if !desc.backend.is_hardware() {
            return None;
        }

        let cell = cell_for(&self.best_device, desc.name);
        cell.get_or_init(|| self.probe_best_device(desc)).await.clone()
    }

    async fn probe_encoder_list(&self) -> HashSet<String> {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let opts = RunOptions {
            listener: Some(Arc::new(move |line: &str, _| {
                sink.lock().unwrap().push(line.to_string());
            })),
            timeout: Some(self.config.probe_timeout),
            ..Default::default()
        };

        let args: Vec<String> = vec!["-hide_banner".into(), "-encoders".into()];
        let code = process::run(&self.config.ffmpeg, &args, opts).await;
        if code != 0 {
            debug!(code, "Encoder listing probe failed");
            return HashSet::new();
        }

        let lines = lines.lock().unwrap();
        let encoders = parse_encoder_table(&lines);
        info!(count = encoders.len(), "Discovered encoders");
        encoders
    }

    async fn probe_capabilities(&self, desc: &EncoderDescriptor) -> EncoderCapability {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let opts = RunOptions {
            listener: Some(Arc::new(move |line: &str, _| {
                sink.lock().unwrap().push(line.to_string());
            })),
            timeout: Some(self.config.probe_timeout),
            ..Default::default()
        };

        let args: Vec<String> = vec![
            "-hide_banner".into(),
            "-h".into(),
            format!("encoder={}", desc.name),
        ];
        let code = process::run(&self.config.ffmpeg, &args, opts).await;
        if code != 0 {
            debug!(encoder = desc.name, code, "Capability probe failed");
            return EncoderCapability::default();
        }

        let text = lines.lock().unwrap().join("\n");
        let help = help_text::parse(&text);
        debug!(
            encoder = desc.name,
            presets = help.presets.len(),
            profiles = help.profiles.len(),
            "Capability probe finished"
        );
        EncoderCapability {
            presets: help.presets,
            profiles: help.profiles,
        }
    }

    async fn probe_availability(&self, desc: &'static EncoderDescriptor) -> bool {
        if !self.list_encoders().await.contains(desc.name) {
            debug!(encoder = desc.name, "Not in the binary's encoder list");
            return false;
        }

        let device = if desc.backend.takes_device_path() {
            match self.best_device(desc).await {
                Some(choice) => Some(choice.device),
                None => return false,
            }
        } else {
            None
        };

        let available = device::timed_test_encode(
            &self.config.ffmpeg,
            desc,
            device.as_deref(),
            AVAILABILITY_FRAMES,
            self.config.probe_timeout,
        )
        .await
        .is_some();

        info!(encoder = desc.name, available, "Availability check finished");
        available
    }

    async fn probe_best_device(&self, desc: &'static EncoderDescriptor) -> Option<DeviceChoice> {
        let nodes = device::enumerate_render_nodes(&self.config.render_node_dir);
        if nodes.is_empty() {
            debug!(encoder = desc.name, "No render devices exposed");
            return None;
        }

        // The diagnostic tool only speaks VA-API; other backends go straight
        // to the test encode.
        let mut candidates = Vec::new();
        for node in nodes {
            let supported = match desc.backend {
                Backend::Vaapi => {
                    device::device_supports_codec(
                        &self.config.vainfo,
                        &node,
                        desc.codec,
                        self.config.probe_timeout,
                    )
                    .await
                }
                _ => true,
            };
            if supported {
                candidates.push(node);
            }
        }

        match candidates.len() {
            0 => None,
            1 => {
                let device = candidates.remove(0);
                info!(encoder = desc.name, device = %device.display(), "Single candidate device, skipping benchmark");
                Some(DeviceChoice {
                    device,
                    encode_time: None,
                })
            }
            _ => {
                let mut best: Option<DeviceChoice> = None;
                for node in candidates {
                    let elapsed = device::timed_test_encode(
                        &self.config.ffmpeg,
                        desc,
                        Some(&node),
                        BENCHMARK_FRAMES,
                        self.config.probe_timeout,
                    )
                    .await;

                    if let Some(elapsed) = elapsed {
                        let faster = best
                            .as_ref()
                            .and_then(|b| b.encode_time)
                            .map_or(true, |t| elapsed < t);
                        if faster {
                            best = Some(DeviceChoice {
                                device: node,
                                encode_time: Some(elapsed),
                            });
                        }
                    }
                }

                if let Some(choice) = &best {
                    info!(
                        encoder = desc.name,
                        device = %choice.device.display(),
                        "Benchmark winner"
                    );
                }
                best
            }
        }
    }
}

/// Fetches or inserts the memoization cell for a key. The map lock is held
/// only for the lookup so probes of different keys run in parallel.
fn cell_for<T>(map: &CellMap<T>, key: &'static str) -> Arc<OnceCell<T>> {
    let mut map = map.lock().unwrap();
    map.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
}

/// Parses the tabular `-encoders` listing: everything after the `------`
/// separator row contributes its second whitespace-delimited token.
fn parse_encoder_table(lines: &[String]) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut in_table = false;

    for line in lines {
        if !in_table {
            if line.trim_start().starts_with("------") {
                in_table = true;
            }
            continue;
        }
        let mut parts = line.split_whitespace();
        let _flags = parts.next();
        if let Some(name) = parts.next() {
            names.insert(name.to_string());
        }
    }

    names
}
