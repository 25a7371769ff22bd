//! Argument list construction for the external downloader.

use std::path::Path;

use crate::queue::job::{JobRequest, MediaFormat};

/// Supported audio bitrate buckets in kbps.
pub const AUDIO_BITRATES_KBPS: [u32; 7] = [64, 96, 128, 160, 192, 256, 320];

/// Used when the requested bitrate cannot be parsed.
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 192;

const AUDIO_CODEC: &str = "mp3";

const KNOWN_HEIGHTS: [u32; 8] = [144, 240, 360, 480, 720, 1080, 1440, 2160];

/// Map a free-form bitrate ("192k", "256kbps", "300") to the nearest bucket.
/// Ties round up.
pub fn audio_bitrate_bucket(raw: &str) -> u32 {
    let normalized = raw.trim().to_ascii_lowercase();
    let digits = normalized
        .strip_suffix("kbps")
        .or_else(|| normalized.strip_suffix("kbit/s"))
        .or_else(|| normalized.strip_suffix('k'))
        .unwrap_or(&normalized)
        .trim();

    let Ok(requested) = digits.parse::<u32>() else {
        return DEFAULT_AUDIO_BITRATE_KBPS;
    };
    if requested == 0 {
        return DEFAULT_AUDIO_BITRATE_KBPS;
    }

    AUDIO_BITRATES_KBPS
        .iter()
        .copied()
        .min_by_key(|bucket| (bucket.abs_diff(requested), std::cmp::Reverse(*bucket)))
        .unwrap_or(DEFAULT_AUDIO_BITRATE_KBPS)
}

/// Target height for a quality label, `None` meaning "best available".
pub fn quality_height(raw: &str) -> Option<u32> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "low" => Some(360),
        "medium" => Some(720),
        "high" => Some(1080),
        "4k" | "uhd" => Some(2160),
        other => {
            let height = other.strip_suffix('p').unwrap_or(other).parse::<u32>().ok()?;
            KNOWN_HEIGHTS.contains(&height).then_some(height)
        }
    }
}

/// Format-selection expression preferring `container`, falling back to any
/// container and finally to whatever is best.
pub fn video_format_selector(height: Option<u32>, container: &str) -> String {
    match height {
        Some(h) => format!(
            "bestvideo[height<={h}][ext={container}]+bestaudio\
             /bestvideo[height<={h}]+bestaudio\
             /best[height<={h}]\
             /best"
        ),
        None => format!("bestvideo[ext={container}]+bestaudio/bestvideo+bestaudio/best"),
    }
}

/// Full argument list (excluding any interpreter prefix).
pub fn build_args(request: &JobRequest, output_template: &Path) -> Vec<String> {
    let mut args = vec!["--newline".to_string(), "--no-playlist".to_string()];

    match &request.format {
        MediaFormat::Audio => {
            let kbps = audio_bitrate_bucket(&request.bitrate);
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                AUDIO_CODEC.to_string(),
                "--audio-quality".to_string(),
                format!("{kbps}K"),
            ]);
        }
        MediaFormat::Video(container) => {
            args.extend([
                "-f".to_string(),
                video_format_selector(quality_height(&request.quality), container),
                "--merge-output-format".to_string(),
                container.clone(),
            ]);
        }
    }

    args.extend([
        "-o".to_string(),
        output_template.to_string_lossy().into_owned(),
        "--".to_string(),
        request.source_id.clone(),
    ]);

    args
}
