//! Progress extraction from tool output lines.
//!
//! Two line grammars are understood: the transcoder's `frame=`/`time=`
//! status lines and the bare `NN.N%` tokens downloaders print. Extraction is
//! pure; percentages are computed against an optional [`ProgressContext`]
//! built from probed media metadata.

/// Returned when a line carries no usable progress information. Callers show
/// an indeterminate state for it.
pub const UNKNOWN_PROGRESS: f32 = -1.0;

/// Known totals a percentage can be computed against.
///
/// Constructors discard zero or negative totals so extraction never has to
/// guard against division by zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressContext {
    total_frames: Option<u64>,
    total_duration_ms: Option<f64>,
}

impl ProgressContext {
    /// A context with no known totals; only the percent-token grammar can
    /// produce a value against it.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Context with a known total frame count.
    pub fn with_total_frames(total_frames: u64) -> Self {
        Self {
            total_frames: (total_frames > 0).then_some(total_frames),
            total_duration_ms: None,
        }
    }

    /// Context with a known total duration in seconds.
    pub fn with_duration_secs(seconds: f64) -> Self {
        Self {
            total_frames: None,
            total_duration_ms: (seconds > 0.0).then_some(seconds * 1000.0),
        }
    }

    /// Context with a duration expressed in time-base units, as probed from
    /// a container stream (`duration_ts` ticks of `num/den` seconds each).
    pub fn from_time_base(num: u32, den: u32, duration_ts: i64) -> Self {
        let total_duration_ms = if num > 0 && den > 0 && duration_ts > 0 {
            Some(duration_ts as f64 * num as f64 / den as f64 * 1000.0)
        } else {
            None
        };
        Self {
            total_frames: None,
            total_duration_ms,
        }
    }

    /// Merges a frame total into an existing context.
    pub fn and_total_frames(mut self, total_frames: u64) -> Self {
        if total_frames > 0 {
            self.total_frames = Some(total_frames);
        }
        self
    }

    /// True if no total is known.
    pub fn is_empty(&self) -> bool {
        self.total_frames.is_none() && self.total_duration_ms.is_none()
    }
}

/// Extracts a progress percentage from one output line.
///
/// Grammar precedence: a `frame=` token against a known frame total, then an
/// `HH:MM:SS.CC` timestamp against a known duration, then a bare percent
/// token. Returns [`UNKNOWN_PROGRESS`] when nothing computable is present.
///
/// Results are rounded to one decimal place. Values above 100 are passed
/// through unclamped: elapsed time can slightly exceed the probed container
/// duration, and callers are expected to tolerate it.
pub fn extract(line: &str, ctx: &ProgressContext) -> f32 {
    if let (Some(total), Some(frame)) = (ctx.total_frames, frame_number(line)) {
        return round_tenth(frame as f64 / total as f64 * 100.0);
    }

    if let (Some(total_ms), Some(elapsed_ms)) = (ctx.total_duration_ms, elapsed_ms(line)) {
        return round_tenth(elapsed_ms / total_ms * 100.0);
    }

    if let Some(percent) = percent_token(line) {
        return round_tenth(percent);
    }

    UNKNOWN_PROGRESS
}

/// Extracts the integer after a `frame=` marker, tolerating the padding the
/// transcoder inserts (`frame=  120`).
fn frame_number(line: &str) -> Option<u64> {
    let idx = line.find("frame=")?;
    let rest = line[idx + "frame=".len()..].trim_start();
    let digits: &str = rest
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or("");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Finds the first `HH:MM:SS.CC` token in the line and converts it to
/// milliseconds. Tokens glued to a `key=` prefix (`time=00:01:23.45`) are
/// handled.
fn elapsed_ms(line: &str) -> Option<f64> {
    for raw in line.split_whitespace() {
        let token = raw.rsplit('=').next().unwrap_or(raw);
        if let Some(ms) = parse_timestamp(token) {
            return Some(ms);
        }
    }
    None
}

/// Parses `HH:MM:SS.CC` into milliseconds. Malformed tokens yield `None`,
/// never an error.
fn parse_timestamp(token: &str) -> Option<f64> {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit() || c == '.'))
    {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some((hours * 3600.0 + minutes * 60.0 + seconds) * 1000.0)
}

/// Extracts a bare percent token (`42.7%`), the grammar downloaders use.
fn percent_token(line: &str) -> Option<f64> {
    for part in line.split_whitespace() {
        if let Some(num_str) = part.strip_suffix('%') {
            if let Ok(num) = num_str.parse::<f64>() {
                if num.is_finite() && num >= 0.0 {
                    return Some(num);
                }
            }
        }
    }
    None
}

fn round_tenth(value: f64) -> f32 {
    ((value * 10.0).round() / 10.0) as f32
}
