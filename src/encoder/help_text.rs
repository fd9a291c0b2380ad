//! Parser for the transcoder's per-encoder help text.
//!
//! `ffmpeg -h encoder=<name>` prints an AVOptions listing: option lines
//! (`  -preset <int> ...`) followed by deeper-indented value lines whose
//! first token is the value name. This is a small streaming scanner over
//! that shape, not a grammar; anything it does not recognize is skipped and
//! a missing section simply yields an empty list.

/// Parsed capability lists for one encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderHelp {
    /// Speed/effort preset values, in the order the binary listed them.
    pub presets: Vec<String>,
    /// Profile values, in the order the binary listed them.
    pub profiles: Vec<String>,
}

impl EncoderHelp {
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty() && self.profiles.is_empty()
    }
}

/// Flags that introduce a speed-preset section, in priority order: when
/// several are present, the first of these with any collected values wins.
const SPEED_FLAGS: &[&str] = &["-preset", "-quality", "-usage"];

const PROFILE_FLAG: &str = "-profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Index into [`SPEED_FLAGS`].
    Speed(usize),
    Profile,
}

/// Parses encoder help text into preset and profile lists.
pub fn parse(help: &str) -> EncoderHelp {
    let mut speed_values: Vec<Vec<String>> = vec![Vec::new(); SPEED_FLAGS.len()];
    let mut profiles: Vec<String> = Vec::new();

    // Active section plus the indent of the option line that opened it.
    let mut current: Option<(Section, usize)> = None;

    for line in help.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            current = None;
            continue;
        }
        let indent = line.len() - trimmed.len();

        if let Some(flag) = trimmed.strip_prefix('-') {
            // An option line. Recognized flags open a section, anything
            // else closes whatever was open.
            let name = flag.split_whitespace().next().unwrap_or("");
            let full = format!("-{name}");
            current = if let Some(i) = SPEED_FLAGS.iter().position(|f| *f == full) {
                Some((Section::Speed(i), indent))
            } else if full == PROFILE_FLAG {
                Some((Section::Profile, indent))
            } else {
                None
            };
            continue;
        }

        match current {
            Some((section, option_indent)) if indent > option_indent => {
                if let Some(value) = trimmed.split_whitespace().next() {
                    match section {
                        Section::Speed(i) => speed_values[i].push(value.to_string()),
                        Section::Profile => profiles.push(value.to_string()),
                    }
                }
            }
            // A line at or above the option indent that is not a flag ends
            // the section.
            _ => current = None,
        }
    }

    let presets = speed_values
        .into_iter()
        .find(|values| !values.is_empty())
        .unwrap_or_default();

    EncoderHelp { presets, profiles }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NVENC_HELP: &str = "\
Encoder h264_nvenc [NVIDIA NVENC H.264 encoder]:
    General capabilities: dr1 delay hardware
    Threading capabilities: none
    Supported pixel formats: yuv420p nv12 p010le
h264_nvenc AVOptions:
  -preset            <int>        E..V....... Set the encoding preset (from 0 to 18) (default p4)
     default         0            E..V.......
     slow            1            E..V....... hq 2 passes
     medium          2            E..V....... hq 1 pass
     fast            3            E..V....... hp 1 pass
  -profile           <int>        E..V....... Set the encoding profile (from 0 to 3) (default main)
     baseline        0            E..V.......
     main            1            E..V.......
     high            2            E..V.......
     high444p        3            E..V.......
  -level             <int>        E..V....... Set the encoding level restriction (from 0 to 62)
     auto            0            E..V.......
";

    const AMF_HELP: &str = "\
Encoder h264_amf [AMD AMF H.264 Encoder]:
h264_amf AVOptions:
  -usage             <int>        E..V....... Encoder Usage (from 0 to 3) (default transcoding)
     transcoding     0            E..V.......
     ultralowlatency 1            E..V.......
  -quality           <int>        E..V....... Quality Preference (from 0 to 2) (default speed)
     speed           0            E..V.......
     balanced        1            E..V.......
     quality         2            E..V.......
  -profile           <int>        E..V....... Profile (from 66 to 257) (default main)
     main            77           E..V.......
     high            100          E..V.......
";

    #[test]
    fn parses_preset_and_profile_sections() {
        let help = parse(NVENC_HELP);
        assert_eq!(help.presets, vec!["default", "slow", "medium", "fast"]);
        assert_eq!(help.profiles, vec!["baseline", "main", "high", "high444p"]);
    }

    #[test]
    fn quality_beats_usage_when_preset_is_absent() {
        let help = parse(AMF_HELP);
        // -usage appears first in the text, but -quality has higher priority.
        assert_eq!(help.presets, vec!["speed", "balanced", "quality"]);
        assert_eq!(help.profiles, vec!["main", "high"]);
    }

    #[test]
    fn unrecognized_option_closes_the_section() {
        let text = "\
  -preset            <int>        E..V.......
     fast            0            E..V.......
  -b:v               <int64>      E..V.......
     stray           0            E..V.......
";
        let help = parse(text);
        assert_eq!(help.presets, vec!["fast"]);
        assert!(help.profiles.is_empty());
    }

    #[test]
    fn non_indented_line_closes_the_section() {
        let text = "\
  -preset            <int>        E..V.......
     fast            0            E..V.......
Stream mapping:
     notavalue       0
";
        let help = parse(text);
        assert_eq!(help.presets, vec!["fast"]);
    }

    #[test]
    fn missing_sections_yield_empty_lists() {
        assert!(parse("").is_empty());
        assert!(parse("Encoder libx264 [libx264 H.264]:\n    threads: auto\n").is_empty());
    }

    #[test]
    fn header_lines_before_options_are_ignored() {
        let help = parse(NVENC_HELP);
        assert!(!help.presets.contains(&"General".to_string()));
        assert!(!help.presets.contains(&"Supported".to_string()));
    }
}
