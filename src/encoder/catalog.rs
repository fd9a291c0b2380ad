//! Static catalog of encoders the pipeline knows how to drive.

use std::fmt;

/// Codec family an encoder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    Hevc,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::H264 => write!(f, "h264"),
            Codec::Hevc => write!(f, "hevc"),
        }
    }
}

/// Backend implementing an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU implementation (libx264 / libx265).
    Software,
    /// NVIDIA NVENC.
    Nvenc,
    /// Intel Quick Sync.
    Qsv,
    /// AMD AMF.
    Amf,
    /// VA-API render nodes.
    Vaapi,
    /// V4L2 memory-to-memory (SBCs and similar).
    V4l2m2m,
    /// Placeholder that defers backend choice to runtime detection.
    Auto,
}

impl Backend {
    /// True for backends that encode on a hardware device node and are
    /// therefore subject to device detection and benchmarking.
    pub fn is_hardware(&self) -> bool {
        match self {
            Backend::Software | Backend::Auto => false,
            Backend::Nvenc | Backend::Qsv | Backend::Amf | Backend::Vaapi | Backend::V4l2m2m => {
                true
            }
        }
    }

    /// True for backends that take an explicit render device path argument.
    pub fn takes_device_path(&self) -> bool {
        match self {
            Backend::Vaapi | Backend::V4l2m2m => true,
            Backend::Software | Backend::Nvenc | Backend::Qsv | Backend::Amf | Backend::Auto => {
                false
            }
        }
    }
}

/// One entry of the static encoder catalog: a codec/backend pairing and the
/// name the transcoder binary knows it by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderDescriptor {
    pub codec: Codec,
    pub backend: Backend,
    /// Binary-facing name (`-c:v <name>`).
    pub name: &'static str,
}

/// Every encoder the pipeline can be asked about. Fixed at compile time.
pub const ENCODERS: &[EncoderDescriptor] = &[
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::Software,
        name: "libx264",
    },
    EncoderDescriptor {
        codec: Codec::Hevc,
        backend: Backend::Software,
        name: "libx265",
    },
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::Nvenc,
        name: "h264_nvenc",
    },
    EncoderDescriptor {
        codec: Codec::Hevc,
        backend: Backend::Nvenc,
        name: "hevc_nvenc",
    },
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::Qsv,
        name: "h264_qsv",
    },
    EncoderDescriptor {
        codec: Codec::Hevc,
        backend: Backend::Qsv,
        name: "hevc_qsv",
    },
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::Amf,
        name: "h264_amf",
    },
    EncoderDescriptor {
        codec: Codec::Hevc,
        backend: Backend::Amf,
        name: "hevc_amf",
    },
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::Vaapi,
        name: "h264_vaapi",
    },
    EncoderDescriptor {
        codec: Codec::Hevc,
        backend: Backend::Vaapi,
        name: "hevc_vaapi",
    },
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::V4l2m2m,
        name: "h264_v4l2m2m",
    },
    EncoderDescriptor {
        codec: Codec::H264,
        backend: Backend::Auto,
        name: "auto",
    },
];

/// Looks a descriptor up by its binary-facing name.
pub fn find(name: &str) -> Option<&'static EncoderDescriptor> {
    ENCODERS.iter().find(|e| e.name == name)
}

/// Suggests the catalog name closest to `input`, for CLI error messages.
pub fn suggest(input: &str) -> &'static str {
    ENCODERS
        .iter()
        .map(|e| e.name)
        .min_by_key(|name| strsim::levenshtein(input, name))
        .unwrap_or("libx264")
}

/// Speed presets for the software encoders. The binary does not expose these
/// through its help output, so they are pinned here.
pub const SOFTWARE_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

/// Profiles for software H.264.
pub const X264_PROFILES: &[&str] = &["baseline", "main", "high", "high10", "high422", "high444"];

/// Profiles for software H.265.
pub const X265_PROFILES: &[&str] = &["main", "main10", "mainstillpicture"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<&str> = ENCODERS.iter().map(|e| e.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ENCODERS.len());
    }

    #[test]
    fn find_known_and_unknown() {
        assert_eq!(find("hevc_nvenc").map(|e| e.backend), Some(Backend::Nvenc));
        assert!(find("libaom-av1").is_none());
    }

    #[test]
    fn hardware_classification() {
        assert!(!Backend::Software.is_hardware());
        assert!(!Backend::Auto.is_hardware());
        assert!(Backend::Vaapi.is_hardware());
        assert!(Backend::Vaapi.takes_device_path());
        assert!(!Backend::Nvenc.takes_device_path());
    }

    #[test]
    fn suggestion_finds_the_closest_name() {
        assert_eq!(suggest("h264_vapi"), "h264_vaapi");
        assert_eq!(suggest("libx246"), "libx264");
    }
}
