//! upload and reencode

use std::path::{Path, PathBuf};

use dialoguer::Confirm;
use tracing::warn;

use crate::chat::ChatRef;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::transcode::FfmpegTranscoder;
use crate::upload::reencode::{self, ReencodeReport};
use crate::upload::{run_pipeline, CorruptionPolicy, PipelineReport, UploadOptions};

use super::connect;

/// Asks before deleting corrupted videos unless `assume_yes` is set.
pub struct ConfirmPolicy {
    pub assume_yes: bool,
}

impl CorruptionPolicy for ConfirmPolicy {
    fn delete_corrupted(&self, videos: &[PathBuf]) -> bool {
        if self.assume_yes {
            return true;
        }
        Confirm::new()
            .with_prompt(format!("Delete {} corrupted video(s)?", videos.len()))
            .default(false)
            .interact()
            .unwrap_or_else(|e| {
                warn!("Prompt failed, keeping files: {}", e);
                false
            })
    }
}

fn existing_dir(folder: &Path) -> Result<PathBuf> {
    if !folder.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }
    Ok(folder.canonicalize()?)
}

pub async fn upload(
    config: &Config,
    folder: &Path,
    destination: Option<&str>,
    assume_yes: bool,
) -> Result<PipelineReport> {
    let root = existing_dir(folder)?;
    let destination = destination
        .filter(|d| !d.trim().is_empty())
        .map(ChatRef::parse)
        .transpose()?;

    let conn = connect(config).await?;
    let options = UploadOptions {
        root,
        destination,
        limits: config.upload.clone(),
    };
    let report = run_pipeline(
        &conn.remote,
        &FfmpegTranscoder::default(),
        &ConfirmPolicy { assume_yes },
        &options,
    )
    .await?;

    println!(
        "✅ Upload finished: {} sent, {} pending",
        report.upload.sent, report.upload.pending
    );
    Ok(report)
}

/// Re-encode a folder without uploading anything.
pub async fn reencode(folder: &Path, assume_yes: bool) -> Result<ReencodeReport> {
    let root = existing_dir(folder)?;
    reencode::run(&root, &FfmpegTranscoder::default(), &ConfirmPolicy { assume_yes }).await
}
