//! Stage 3: cut videos that are still too large into stream-copied parts

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{error, info, warn};

use super::scan::FileSet;
use crate::config::UploadLimits;
use crate::error::{Error, Result};
use crate::remote::human_size;
use crate::transcode::{build_split_cmd, segment_seconds_for, Transcoder};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub split: usize,
    pub parts: usize,
    pub failed: usize,
}

/// Existing `<stem>_partNNN<ext>` files next to `input`, ordered by index.
pub fn collect_parts(input: &Path) -> Result<Vec<PathBuf>> {
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let re = Regex::new(&format!(
        r"^{}_part(\d+){}$",
        regex::escape(&stem),
        regex::escape(&ext)
    ))
    .map_err(|e| Error::Unknown(e.to_string()))?;

    let mut parts: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(caps) = re.captures(&name) else {
            continue;
        };
        if let Ok(index) = caps[1].parse::<u64>() {
            parts.push((index, entry.path()));
        }
    }
    parts.sort_by_key(|(index, _)| *index);
    Ok(parts.into_iter().map(|(_, path)| path).collect())
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(file = %path.display(), "Failed to remove partial segment: {}", e);
        }
    }
}

async fn split_one<T: Transcoder>(
    transcoder: &T,
    path: &Path,
    size: u64,
    limits: &UploadLimits,
) -> Result<Option<Vec<PathBuf>>> {
    let duration = transcoder.probe_duration(path).await.unwrap_or_else(|e| {
        warn!(file = %path.display(), "Duration probe failed: {}", e);
        None
    });
    let seconds = segment_seconds_for(
        duration,
        size,
        limits.safe_size_limit,
        limits.segment_seconds,
    );
    println!(
        "✂️  Splitting {} ({}) every {}s",
        path.display(),
        human_size(size),
        seconds
    );

    let outcome = transcoder.run(&build_split_cmd(path, seconds)).await?;
    let parts = collect_parts(path)?;

    if !outcome.success || parts.is_empty() {
        error!(file = %path.display(), stderr = %outcome.stderr.trim(), "Split failed");
        remove_all(&parts);
        return Ok(None);
    }

    fs::remove_file(path)?;
    info!(file = %path.display(), parts = parts.len(), "Video split");
    Ok(Some(parts))
}

/// Run the split stage over every video under `root` above the ceiling.
pub async fn run<T: Transcoder>(
    root: &Path,
    transcoder: &T,
    limits: &UploadLimits,
) -> Result<SplitReport> {
    let mut report = SplitReport::default();
    let files = FileSet::scan(root)?;
    let oversized: Vec<_> = files
        .videos()
        .filter(|e| e.size > limits.safe_size_limit)
        .cloned()
        .collect();

    for entry in oversized {
        match split_one(transcoder, &entry.path, entry.size, limits).await {
            Ok(Some(parts)) => {
                report.split += 1;
                report.parts += parts.len();
            }
            Ok(None) => report.failed += 1,
            Err(e) => {
                error!(file = %entry.path.display(), "Split failed: {}", e);
                report.failed += 1;
            }
        }
    }

    println!(
        "✂️  3/6 - Split: {} video(s) into {} part(s), {} failed",
        report.split, report.parts, report.failed
    );
    Ok(report)
}
