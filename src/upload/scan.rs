//! Folder scans and natural ordering
//!
//! A scan produces a [`FileSet`]: every regular, non-hidden file under the
//! upload root except bookkeeping files, ordered naturally by root-relative
//! path. Stages plan their work from a `FileSet` instead of walking the disk
//! themselves.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::transcode::is_video_file;

/// Name of the processed-file ledger kept in the upload root.
pub const LEDGER_FILE: &str = ".processed_files";
/// Per-folder CSV with video titles and descriptions.
pub const SIDECAR_FILE: &str = "video_details.csv";

/// One file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Path relative to the upload root, `/`-separated
    pub rel: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, rel: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            rel: rel.into(),
            size,
        }
    }

    pub fn name(&self) -> &str {
        self.rel.rsplit('/').next().unwrap_or(&self.rel)
    }

    pub fn is_video(&self) -> bool {
        is_video_file(Path::new(&self.rel))
    }

    pub fn is_zip(&self) -> bool {
        self.name().to_ascii_lowercase().ends_with(".zip")
    }
}

/// Immutable, naturally ordered snapshot of the upload folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    entries: Vec<FileEntry>,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Files that never take part in archiving, tagging or uploading.
pub fn is_bookkeeping(name: &str) -> bool {
    is_hidden(name) || name == LEDGER_FILE || name == SIDECAR_FILE
}

impl FileSet {
    /// Build a set from entries, sorting them naturally.
    pub fn from_entries(mut entries: Vec<FileEntry>) -> Self {
        entries.sort_by(|a, b| natural_cmp(&a.rel, &b.rel));
        entries.dedup_by(|a, b| a.rel == b.rel);
        Self { entries }
    }

    /// Walk `root`, skipping hidden directories and bookkeeping files.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            entry.depth() == 0 || !is_hidden(&entry.file_name().to_string_lossy())
        });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if is_bookkeeping(&name) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let size = entry.metadata()?.len();
            entries.push(FileEntry::new(entry.path(), rel, size));
        }

        Ok(Self::from_entries(entries))
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn videos(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.is_video())
    }

    /// Non-video files that still need to go into an archive volume.
    pub fn archivable(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| !e.is_video() && !e.is_zip())
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Compare strings the way a person would: digit runs by numeric value,
/// everything else case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut xs = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    xs.push(c);
                    left.next();
                }
                let mut ys = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    ys.push(c);
                    right.next();
                }
                let xt = xs.trim_start_matches('0');
                let yt = ys.trim_start_matches('0');
                let ordering = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                // Directory separators sort before any other character.
                let ordering = match (x == '/', y == '/') {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => x.to_lowercase().cmp(y.to_lowercase()),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut names = vec!["Aula 10.mp4", "Aula 2.mp4", "aula 1.mp4", "Aula 02b.mp4"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["aula 1.mp4", "Aula 2.mp4", "Aula 02b.mp4", "Aula 10.mp4"]);
    }

    #[test]
    fn natural_order_puts_folder_contents_together() {
        let mut names = vec!["a b.txt", "a/z.txt", "a-c.txt"];
        names.sort_by(|x, y| natural_cmp(x, y));
        assert_eq!(names, vec!["a/z.txt", "a b.txt", "a-c.txt"]);
    }

    #[test]
    fn scan_skips_hidden_and_bookkeeping_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Module 1")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("Module 1/Lesson 2.mp4"), b"vv").unwrap();
        fs::write(root.join("Module 1/Lesson 10.mp4"), b"vvv").unwrap();
        fs::write(root.join("Module 1/video_details.csv"), b"x").unwrap();
        fs::write(root.join("notes.pdf"), b"pdf").unwrap();
        fs::write(root.join(".processed_files"), b"").unwrap();
        fs::write(root.join(".DS_Store"), b"").unwrap();
        fs::write(root.join(".git/config"), b"").unwrap();

        let set = FileSet::scan(root).unwrap();
        let rels: Vec<_> = set.entries().iter().map(|e| e.rel.as_str()).collect();

        assert_eq!(
            rels,
            vec!["Module 1/Lesson 2.mp4", "Module 1/Lesson 10.mp4", "notes.pdf"]
        );
        assert_eq!(set.total_size(), 8);
        assert_eq!(set.videos().count(), 2);
        assert_eq!(set.archivable().count(), 1);
    }

    #[test]
    fn zip_volumes_are_not_archived_again() {
        let set = FileSet::from_entries(vec![
            FileEntry::new("/r/Documents_Part001.zip", "Documents_Part001.zip", 1),
            FileEntry::new("/r/a.txt", "a.txt", 1),
        ]);
        let names: Vec<_> = set.archivable().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a.txt"]);
    }
}
