//! Stage 2: bring every video to h264/aac in an mp4 container

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::scan::FileSet;
use crate::error::Result;
use crate::transcode::{
    build_convert_cmd, convert_output_paths, needs_reencode, StreamKind, Transcoder,
};

/// Decides what happens to videos that ffprobe cannot read.
pub trait CorruptionPolicy {
    /// Return `true` to delete every listed file.
    fn delete_corrupted(&self, videos: &[PathBuf]) -> bool;
}

/// Never deletes anything.
pub struct KeepCorrupted;

impl CorruptionPolicy for KeepCorrupted {
    fn delete_corrupted(&self, _videos: &[PathBuf]) -> bool {
        false
    }
}

/// Always deletes, for unattended runs.
pub struct DeleteCorrupted;

impl CorruptionPolicy for DeleteCorrupted {
    fn delete_corrupted(&self, _videos: &[PathBuf]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReencodeReport {
    pub removed: usize,
    pub converted: usize,
    pub failed: usize,
    pub conforming: usize,
}

/// Corrupted or without a usable duration.
async fn is_invalid<T: Transcoder>(transcoder: &T, path: &Path) -> Result<bool> {
    let duration = transcoder.probe_duration(path).await?;
    if !duration.is_some_and(|d| d > 0.0) {
        return Ok(true);
    }
    transcoder.is_corrupted(path).await
}

async fn convert<T: Transcoder>(
    transcoder: &T,
    path: &Path,
    video_codec: &str,
    audio_codec: &str,
) -> Result<bool> {
    let (output, final_path) = convert_output_paths(path);
    let cmd = build_convert_cmd(path, &output, video_codec, audio_codec);
    let outcome = transcoder.run(&cmd).await?;

    if !outcome.success {
        error!(file = %path.display(), stderr = %outcome.stderr.trim(), "Conversion failed");
        if output.exists() {
            let _ = fs::remove_file(&output);
        }
        return Ok(false);
    }

    fs::remove_file(path)?;
    if output != final_path {
        fs::rename(&output, &final_path)?;
    }
    info!(file = %final_path.display(), "Video converted");
    Ok(true)
}

/// Run the re-encode stage over every video under `root`.
pub async fn run<T: Transcoder, P: CorruptionPolicy>(
    root: &Path,
    transcoder: &T,
    policy: &P,
) -> Result<ReencodeReport> {
    let mut report = ReencodeReport::default();
    let videos: Vec<PathBuf> = FileSet::scan(root)?
        .videos()
        .map(|e| e.path.clone())
        .collect();

    let mut invalid = Vec::new();
    for path in &videos {
        match is_invalid(transcoder, path).await {
            Ok(true) => invalid.push(path.clone()),
            Ok(false) => {}
            Err(e) => warn!(file = %path.display(), "Failed to probe video: {}", e),
        }
    }

    let mut removed = Vec::new();
    if !invalid.is_empty() {
        println!("⚠️  {} video(s) look corrupted:", invalid.len());
        for path in &invalid {
            println!("   {}", path.display());
        }
        if policy.delete_corrupted(&invalid) {
            for path in invalid {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        warn!(file = %path.display(), "Removed corrupted video");
                        removed.push(path);
                    }
                    Err(e) => error!(file = %path.display(), "Failed to remove: {}", e),
                }
            }
        }
    }
    report.removed = removed.len();

    for path in videos.iter().filter(|p| !removed.contains(p)) {
        let codecs = async {
            let video = transcoder.probe_codec(path, StreamKind::Video).await?;
            let audio = transcoder.probe_codec(path, StreamKind::Audio).await?;
            Ok::<_, crate::error::Error>((video, audio))
        }
        .await;

        let (video, audio) = match codecs {
            Ok(codecs) => codecs,
            Err(e) => {
                error!(file = %path.display(), "Failed to read codecs: {}", e);
                report.failed += 1;
                continue;
            }
        };

        if !needs_reencode(&video, &audio, path) {
            report.conforming += 1;
            continue;
        }

        println!("🎞️  Converting {} ({}/{})", path.display(), video, audio);
        match convert(transcoder, path, &video, &audio).await {
            Ok(true) => report.converted += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                error!(file = %path.display(), "Conversion failed: {}", e);
                report.failed += 1;
            }
        }
    }

    println!(
        "🎞️  2/6 - Re-encode: {} converted, {} already conforming, {} failed, {} removed",
        report.converted, report.conforming, report.failed, report.removed
    );
    Ok(report)
}
