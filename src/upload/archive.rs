//! Stage 1: pack loose non-video files into zip volumes

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::scan::{FileEntry, FileSet};
use crate::error::{Error, Result};

/// Group files greedily, in order, so each volume's summed input size stays
/// within `ceiling`. A file larger than the ceiling gets a volume to itself.
pub fn plan_volumes(files: &[FileEntry], ceiling: u64) -> Vec<Vec<FileEntry>> {
    let mut volumes: Vec<Vec<FileEntry>> = Vec::new();
    let mut current: Vec<FileEntry> = Vec::new();
    let mut current_size = 0u64;

    for file in files {
        if !current.is_empty() && current_size.saturating_add(file.size) > ceiling {
            volumes.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size = current_size.saturating_add(file.size);
        current.push(file.clone());
    }
    if !current.is_empty() {
        volumes.push(current);
    }
    volumes
}

pub fn volume_name(number: u32) -> String {
    format!("Documents_Part{:03}.zip", number)
}

/// Highest volume number already present directly under `root`.
pub fn highest_volume(root: &Path) -> Result<u32> {
    let re = Regex::new(r"^Documents_Part(\d+)\.zip$").map_err(|e| Error::Unknown(e.to_string()))?;
    let mut highest = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(caps) = re.captures(&name.to_string_lossy()) {
            if let Ok(n) = caps[1].parse::<u32>() {
                highest = highest.max(n);
            }
        }
    }
    Ok(highest)
}

fn write_volume(path: &Path, files: &[FileEntry]) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
        .large_file(files.iter().any(|f| f.size >= u32::MAX as u64));

    for entry in files {
        zip.start_file(entry.rel.as_str(), options)?;
        let mut input = File::open(&entry.path)?;
        io::copy(&mut input, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

/// Remove `dir` and its now-empty parents, stopping at `root`.
fn prune_empty_dirs(root: &Path, dir: Option<&Path>) {
    let mut current = dir;
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Archive every loose non-video file under `root`.
///
/// Returns the paths of the volumes written.
pub fn run(root: &Path, files: &FileSet, ceiling: u64) -> Result<Vec<PathBuf>> {
    let candidates: Vec<FileEntry> = files.archivable().cloned().collect();
    if candidates.is_empty() {
        println!("🗜️  1/6 - No loose files to archive");
        return Ok(Vec::new());
    }

    let mut number = highest_volume(root)?;
    let mut written = Vec::new();

    for volume in plan_volumes(&candidates, ceiling) {
        number += 1;
        let path = root.join(volume_name(number));
        if let Err(e) = write_volume(&path, &volume) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        info!(volume = %path.display(), files = volume.len(), "Archive volume written");

        for entry in &volume {
            if let Err(e) = fs::remove_file(&entry.path) {
                warn!(file = %entry.path.display(), "Failed to remove archived file: {}", e);
            }
            prune_empty_dirs(root, entry.path.parent());
        }
        written.push(path);
    }

    println!("🗜️  1/6 - Archived loose files into {} volume(s)", written.len());
    Ok(written)
}
