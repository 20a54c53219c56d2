//! ffmpeg/ffprobe adapter
//!
//! Command construction and codec decisions are pure functions so the upload
//! pipeline can be tested without the binaries. [`FfmpegTranscoder`] runs the
//! real processes through `tokio::process`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "ts", "mpg", "mpeg", "avi", "mkv", "flv", "3gp", "rmvb", "webm", "vob", "ogv", "rrc",
    "gifv", "mng", "mov", "qt", "wmv", "yuv", "rm", "asf", "amv", "m4p", "m4v", "mp2", "mpe",
    "mpv", "svi", "3g2", "mxf", "roq", "nsv", "f4v", "f4p", "f4a", "f4b",
];

pub const TARGET_VIDEO_CODEC: &str = "h264";
pub const TARGET_AUDIO_CODEC: &str = "aac";
pub const TARGET_EXTENSION: &str = "mp4";

/// Parts produced by a split land under this share of the size ceiling.
const SPLIT_HEADROOM: f64 = 0.9;

/// Whether `path` looks like a video by extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn has_target_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(TARGET_EXTENSION))
        .unwrap_or(false)
}

/// A video conforms only when it is h264 + aac inside an `.mp4`.
pub fn needs_reencode(video_codec: &str, audio_codec: &str, path: &Path) -> bool {
    let codecs_ok = video_codec == TARGET_VIDEO_CODEC && audio_codec == TARGET_AUDIO_CODEC;
    !(codecs_ok && has_target_extension(path))
}

/// Which streams a conversion has to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertPlan {
    /// Both codecs already fine, only the container changes
    Remux,
    VideoOnly,
    AudioOnly,
    Full,
}

impl ConvertPlan {
    pub fn for_codecs(video_codec: &str, audio_codec: &str) -> Self {
        let video = video_codec != TARGET_VIDEO_CODEC;
        let audio = audio_codec != TARGET_AUDIO_CODEC;
        match (video, audio) {
            (false, false) => ConvertPlan::Remux,
            (true, false) => ConvertPlan::VideoOnly,
            (false, true) => ConvertPlan::AudioOnly,
            (true, true) => ConvertPlan::Full,
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Full ffmpeg argv converting `input` to h264/aac at `output`.
pub fn build_convert_cmd(
    input: &Path,
    output: &Path,
    video_codec: &str,
    audio_codec: &str,
) -> Vec<String> {
    let mut cmd = args(&["ffmpeg", "-v", "quiet", "-stats", "-y", "-i"]);
    cmd.push(path_arg(input));
    cmd.extend(args(&["-b:a", "128k", "-hide_banner"]));

    let codec_args: &[&str] = match ConvertPlan::for_codecs(video_codec, audio_codec) {
        ConvertPlan::Remux => &["-c:v", "copy", "-c:a", "copy"],
        ConvertPlan::VideoOnly => &[
            "-c:v", "libx264", "-preset", "ultrafast", "-threads", "2", "-c:a", "copy", "-crf",
            "23", "-maxrate", "4M",
        ],
        ConvertPlan::AudioOnly => &["-c:v", "copy", "-c:a", "aac"],
        ConvertPlan::Full => &[
            "-c:v", "libx264", "-c:a", "aac", "-preset", "ultrafast", "-threads", "2", "-crf",
            "23", "-maxrate", "4M",
        ],
    };
    cmd.extend(args(codec_args));
    cmd.push(path_arg(output));
    cmd
}

/// Where a conversion writes and where the result finally lives.
///
/// When the target name equals the input (an `.mp4` with the wrong codecs)
/// ffmpeg writes to `<stem>_reencode.mp4` first.
pub fn convert_output_paths(input: &Path) -> (PathBuf, PathBuf) {
    let final_path = input.with_extension(TARGET_EXTENSION);
    if final_path == input {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = input.with_file_name(format!("{}_reencode.{}", stem, TARGET_EXTENSION));
        (temp, final_path)
    } else {
        (final_path.clone(), final_path)
    }
}

/// `<dir>/<stem>_part%03d<ext>` pattern handed to the segment muxer.
pub fn split_pattern(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    input.with_file_name(format!("{}_part%03d{}", stem, ext))
}

/// Full ffmpeg argv splitting `input` into stream-copied segments.
pub fn build_split_cmd(input: &Path, segment_seconds: u64) -> Vec<String> {
    let mut cmd = args(&["ffmpeg", "-v", "error", "-y", "-i"]);
    cmd.push(path_arg(input));
    cmd.extend(args(&["-c", "copy", "-map", "0", "-f", "segment", "-segment_time"]));
    cmd.push(segment_seconds.to_string());
    cmd.extend(args(&["-segment_start_number", "1", "-reset_timestamps", "1"]));
    cmd.push(path_arg(&split_pattern(input)));
    cmd
}

/// Segment length so every part stays under 90% of `ceiling`.
///
/// Falls back to `fallback` when the duration is unknown.
pub fn segment_seconds_for(
    duration: Option<f64>,
    size: u64,
    ceiling: u64,
    fallback: u64,
) -> u64 {
    match duration {
        Some(duration) if duration > 0.0 && size > 0 => {
            let bytes_per_second = size as f64 / duration;
            let seconds = (ceiling as f64 * SPLIT_HEADROOM / bytes_per_second).floor() as u64;
            seconds.max(1)
        }
        _ => fallback.max(1),
    }
}

/// Stream selector for codec probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn selector(&self) -> &'static str {
        match self {
            StreamKind::Video => "v:0",
            StreamKind::Audio => "a:0",
        }
    }
}

/// Result of running a conversion or split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    pub success: bool,
    pub stderr: String,
}

impl TranscodeOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
        }
    }
}

/// Media inspection and conversion as consumed by the upload pipeline.
#[allow(async_fn_in_trait)]
pub trait Transcoder {
    /// Codec name of the first stream of `kind`; empty when there is none.
    async fn probe_codec(&self, path: &Path, kind: StreamKind) -> Result<String>;

    /// Container duration in seconds; `None` when it cannot be read.
    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>>;

    /// ffprobe reports errors or a missing `moov` atom.
    async fn is_corrupted(&self, path: &Path) -> Result<bool>;

    /// Run a command built by [`build_convert_cmd`] or [`build_split_cmd`].
    async fn run(&self, cmd: &[String]) -> Result<TranscodeOutcome>;
}

#[derive(Deserialize)]
struct FfprobeFormatOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -show_entries format=duration -of json` output.
pub fn parse_probe_duration(stdout: &[u8]) -> Option<f64> {
    let parsed: FfprobeFormatOutput = serde_json::from_slice(stdout).ok()?;
    parsed
        .format?
        .duration?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
}

/// Shells out to `ffmpeg` and `ffprobe` found on `PATH` (or given explicitly).
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn ffprobe(&self, args: &[&str], path: &Path) -> Result<std::process::Output> {
        Command::new(&self.ffprobe)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::TranscodeError(format!("failed to start {}: {}", self.ffprobe, e)))
    }
}

impl Transcoder for FfmpegTranscoder {
    async fn probe_codec(&self, path: &Path, kind: StreamKind) -> Result<String> {
        let output = self
            .ffprobe(
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    kind.selector(),
                    "-show_entries",
                    "stream=codec_name",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
                path,
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>> {
        let output = self
            .ffprobe(
                &["-v", "error", "-show_entries", "format=duration", "-of", "json"],
                path,
            )
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_probe_duration(&output.stdout))
    }

    async fn is_corrupted(&self, path: &Path) -> Result<bool> {
        let output = self.ffprobe(&["-v", "error", "-i"], path).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(!output.status.success() || stderr.contains("moov atom not found"))
    }

    async fn run(&self, cmd: &[String]) -> Result<TranscodeOutcome> {
        let (program, rest) = cmd
            .split_first()
            .ok_or_else(|| Error::TranscodeError("empty command".into()))?;
        let program = if program == "ffmpeg" {
            self.ffmpeg.as_str()
        } else {
            program.as_str()
        };

        debug!(command = %cmd.join(" "), "Running transcoder");
        let output = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::TranscodeError(format!("failed to start {}: {}", program, e)))?;

        Ok(TranscodeOutcome {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_detection_is_case_insensitive() {
        assert!(is_video_file(Path::new("a/b/Lesson 1.MKV")));
        assert!(is_video_file(Path::new("clip.mp4")));
        assert!(!is_video_file(Path::new("notes.pdf")));
        assert!(!is_video_file(Path::new("mp4")));
    }

    #[test]
    fn conforming_video_needs_nothing() {
        assert!(!needs_reencode("h264", "aac", Path::new("x.mp4")));
        assert!(!needs_reencode("h264", "aac", Path::new("x.MP4")));
        assert!(needs_reencode("h264", "aac", Path::new("x.mkv")));
        assert!(needs_reencode("hevc", "aac", Path::new("x.mp4")));
        assert!(needs_reencode("h264", "opus", Path::new("x.mp4")));
    }

    #[test]
    fn plan_follows_codec_mismatch() {
        assert_eq!(ConvertPlan::for_codecs("h264", "aac"), ConvertPlan::Remux);
        assert_eq!(ConvertPlan::for_codecs("hevc", "aac"), ConvertPlan::VideoOnly);
        assert_eq!(ConvertPlan::for_codecs("h264", "mp3"), ConvertPlan::AudioOnly);
        assert_eq!(ConvertPlan::for_codecs("vp9", "opus"), ConvertPlan::Full);
        assert_eq!(ConvertPlan::for_codecs("", ""), ConvertPlan::Full);
    }

    #[test]
    fn remux_command_copies_both_streams() {
        let cmd = build_convert_cmd(Path::new("in.mkv"), Path::new("in.mp4"), "h264", "aac");
        assert_eq!(cmd[0], "ffmpeg");
        assert!(cmd.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(cmd.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert_eq!(cmd.last().map(String::as_str), Some("in.mp4"));
    }

    #[test]
    fn full_command_encodes_both_streams() {
        let cmd = build_convert_cmd(Path::new("in.avi"), Path::new("in.mp4"), "mpeg4", "mp3");
        assert!(cmd.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(cmd.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(cmd.windows(2).any(|w| w == ["-crf", "23"]));
    }

    #[test]
    fn same_name_conversion_uses_temp_output() {
        let (temp, final_path) = convert_output_paths(Path::new("/v/clip.mp4"));
        assert_eq!(temp, PathBuf::from("/v/clip_reencode.mp4"));
        assert_eq!(final_path, PathBuf::from("/v/clip.mp4"));

        let (temp, final_path) = convert_output_paths(Path::new("/v/clip.mkv"));
        assert_eq!(temp, PathBuf::from("/v/clip.mp4"));
        assert_eq!(final_path, temp);
    }

    #[test]
    fn split_command_uses_segment_muxer() {
        let cmd = build_split_cmd(Path::new("/v/big.mkv"), 1200);
        let joined = cmd.join(" ");
        assert!(joined.contains("-c copy -map 0 -f segment -segment_time 1200"));
        assert!(joined.contains("-reset_timestamps 1"));
        assert_eq!(cmd.last().map(String::as_str), Some("/v/big_part%03d.mkv"));
    }

    #[test]
    fn segment_length_keeps_parts_under_ceiling() {
        let gb = 1024 * 1024 * 1024;
        // 5 GB over 5000 s; 90% of 2 GB takes about 1800 s.
        let seconds = segment_seconds_for(Some(5000.0), 5 * gb, 2 * gb, 3600);
        assert!((1799..=1800).contains(&seconds));
        assert!((seconds as f64) * (5.0 * gb as f64 / 5000.0) < 2.0 * gb as f64);
    }

    #[test]
    fn segment_length_falls_back_without_duration() {
        assert_eq!(segment_seconds_for(None, 10, 5, 3600), 3600);
        assert_eq!(segment_seconds_for(Some(0.0), 10, 5, 900), 900);
    }

    #[test]
    fn parses_ffprobe_duration_json() {
        let json = br#"{"format": {"duration": "61.480000"}}"#;
        assert_eq!(parse_probe_duration(json), Some(61.48));
        assert_eq!(parse_probe_duration(br#"{"format": {}}"#), None);
        assert_eq!(parse_probe_duration(b""), None);
    }

    #[tokio::test]
    async fn run_rejects_empty_command() {
        let transcoder = FfmpegTranscoder::default();
        let err = transcoder.run(&[]).await.unwrap_err();
        assert!(matches!(err, Error::TranscodeError(_)));
    }
}
