//! Stage 4: tags, totals and the folder tree sent as the summary
//!
//! Tags are a pure function of the [`FileSet`]: the n-th file in natural
//! order is `F00n`. Video titles and descriptions come from per-folder
//! `video_details.csv` sidecars when present, otherwise from the file name.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};
use walkdir::WalkDir;

use super::scan::{natural_cmp, FileSet, SIDECAR_FILE};
use crate::error::Result;
use crate::transcode::Transcoder;

/// Tag of the `index`-th file (1-based) in natural order.
pub fn tag_for(index: usize) -> String {
    format!("F{:03}", index)
}

/// Root-relative path → tag for every file in `files`.
pub fn assign_tags(files: &FileSet) -> BTreeMap<String, String> {
    files
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.rel.clone(), tag_for(i + 1)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    /// Seconds
    pub duration: f64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub rel: String,
    pub path: PathBuf,
    pub tag: String,
    pub size: u64,
    pub video: Option<VideoMeta>,
}

impl ManifestEntry {
    pub fn name(&self) -> &str {
        self.rel.rsplit('/').next().unwrap_or(&self.rel)
    }

    pub fn is_zip(&self) -> bool {
        self.name().to_ascii_lowercase().ends_with(".zip")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub project: String,
    pub entries: Vec<ManifestEntry>,
    pub total_size: u64,
    pub total_duration: f64,
}

/// Row read from a sidecar descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarRow {
    pub duration: Option<f64>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// `"HH:MM:SS"`, `"MM:SS"` or plain seconds.
pub fn parse_duration_field(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if !value.contains(':') {
        return value.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0);
    }
    let mut seconds = 0.0;
    for part in value.split(':') {
        seconds = seconds * 60.0 + part.trim().parse::<f64>().ok()?;
    }
    Some(seconds).filter(|d| *d > 0.0)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse one sidecar. Keys are root-relative paths of the listed files.
pub fn parse_sidecar(content: &[u8], folder_rel: &str) -> Result<HashMap<String, SidecarRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);
    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };
    let name_col = column(&["filename", "File Name"]);
    let duration_col = column(&["duration"]);
    let title_col = column(&["title"]);
    let description_col = column(&["description"]);

    let mut rows = HashMap::new();
    let Some(name_col) = name_col else {
        return Ok(rows);
    };

    for record in reader.records() {
        let record = record?;
        let Some(name) = non_empty(record.get(name_col)) else {
            continue;
        };
        let rel = if folder_rel.is_empty() {
            name
        } else {
            format!("{}/{}", folder_rel, name)
        };
        let row = SidecarRow {
            duration: duration_col
                .and_then(|c| record.get(c))
                .and_then(parse_duration_field),
            title: non_empty(title_col.and_then(|c| record.get(c))),
            description: non_empty(description_col.and_then(|c| record.get(c))),
        };
        rows.insert(rel, row);
    }
    Ok(rows)
}

/// Every sidecar under `root`, merged. Unreadable sidecars are logged and
/// skipped.
pub fn load_sidecars(root: &Path) -> HashMap<String, SidecarRow> {
    let mut rows = HashMap::new();
    let sidecars = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == SIDECAR_FILE);

    for entry in sidecars {
        let folder_rel = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let parsed = std::fs::read(entry.path())
            .map_err(crate::error::Error::from)
            .and_then(|content| parse_sidecar(&content, &folder_rel));
        match parsed {
            Ok(parsed) => {
                debug!(sidecar = %entry.path().display(), rows = parsed.len(), "Loaded sidecar");
                rows.extend(parsed);
            }
            Err(e) => error!(sidecar = %entry.path().display(), "Failed to read sidecar: {}", e),
        }
    }
    rows
}

/// Build the manifest for `files`, probing durations the sidecars lack.
pub async fn build<T: Transcoder>(
    root: &Path,
    project: &str,
    files: &FileSet,
    transcoder: &T,
) -> Result<Manifest> {
    let sidecars = load_sidecars(root);
    let mut entries = Vec::with_capacity(files.len());
    let mut total_duration = 0.0;

    for (i, file) in files.entries().iter().enumerate() {
        let video = if file.is_video() {
            let row = sidecars.get(&file.rel).cloned().unwrap_or_default();
            let duration = match row.duration {
                Some(duration) => duration,
                None => match transcoder.probe_duration(&file.path).await {
                    Ok(duration) => duration.unwrap_or(0.0),
                    Err(e) => {
                        warn!(file = %file.path.display(), "Duration probe failed: {}", e);
                        0.0
                    }
                },
            };
            total_duration += duration;
            let name = file.name().to_string();
            Some(VideoMeta {
                duration,
                title: row.title.unwrap_or_else(|| name.clone()),
                description: row.description.unwrap_or(name),
            })
        } else {
            None
        };

        entries.push(ManifestEntry {
            rel: file.rel.clone(),
            path: file.path.clone(),
            tag: tag_for(i + 1),
            size: file.size,
            video,
        });
    }

    Ok(Manifest {
        project: project.to_string(),
        entries,
        total_size: files.total_size(),
        total_duration,
    })
}

/// `"Hh Mm Ss"`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

#[derive(Default)]
struct TreeNode {
    children: Vec<(String, TreeNode)>,
    tag: Option<String>,
}

impl TreeNode {
    fn child(&mut self, name: &str) -> &mut TreeNode {
        let index = match self.children.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.children.push((name.to_string(), TreeNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }

    fn sort(&mut self) {
        self.children.sort_by(|a, b| natural_cmp(&a.0, &b.0));
        for (_, child) in &mut self.children {
            child.sort();
        }
    }

    fn render(&self, prefix: &str, lines: &mut Vec<String>) {
        let count = self.children.len();
        for (i, (name, node)) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            let connector = if last { "└── " } else { "├── " };
            match &node.tag {
                Some(tag) => lines.push(format!("{}{}📄 `#{}` {}", prefix, connector, tag, name)),
                None => {
                    lines.push(format!("{}{}📁 {}/", prefix, connector, name));
                    let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
                    node.render(&next, lines);
                }
            }
        }
    }
}

impl Manifest {
    pub fn header(&self, invite_link: &str) -> String {
        format!(
            "{}\n\nSize: {:.2} GB\nDuration: {}\nInvite: {}",
            self.project,
            self.total_size as f64 / (1024.0 * 1024.0 * 1024.0),
            format_duration(self.total_duration),
            invite_link
        )
    }

    /// Folder tree with each file's tag, in natural order.
    pub fn tree(&self) -> String {
        let mut root = TreeNode::default();
        for entry in &self.entries {
            let mut node = &mut root;
            for component in entry.rel.split('/') {
                node = node.child(component);
            }
            node.tag = Some(entry.tag.clone());
        }
        root.sort();

        let mut lines = vec![format!("📁 {}/", self.project)];
        root.render("", &mut lines);
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::scan::FileEntry;
    use crate::upload::testing::{FakeTranscoder, Probe};
    use std::fs;
    use tempfile::tempdir;

    fn set(rels: &[&str]) -> FileSet {
        FileSet::from_entries(
            rels.iter()
                .map(|r| FileEntry::new(format!("/r/{}", r), *r, 1))
                .collect(),
        )
    }

    #[test]
    fn tags_follow_natural_order() {
        let tags = assign_tags(&set(&["b/10.mp4", "b/2.mp4", "a.zip"]));
        assert_eq!(tags["a.zip"], "F001");
        assert_eq!(tags["b/2.mp4"], "F002");
        assert_eq!(tags["b/10.mp4"], "F003");
    }

    #[test]
    fn inserting_a_file_only_shifts_later_tags() {
        let before = assign_tags(&set(&["1.mp4", "3.mp4", "5.mp4"]));
        let after = assign_tags(&set(&["1.mp4", "3.mp4", "4.mp4", "5.mp4"]));

        assert_eq!(before["1.mp4"], after["1.mp4"]);
        assert_eq!(before["3.mp4"], after["3.mp4"]);
        assert_eq!(after["4.mp4"], "F003");
        assert_eq!(after["5.mp4"], "F004");
        assert_eq!(assign_tags(&set(&["5.mp4", "3.mp4", "1.mp4"])), before);
    }

    #[test]
    fn durations_parse_clock_and_seconds() {
        assert_eq!(parse_duration_field("01:02:03"), Some(3723.0));
        assert_eq!(parse_duration_field("02:30"), Some(150.0));
        assert_eq!(parse_duration_field("61.5"), Some(61.5));
        assert_eq!(parse_duration_field("0"), None);
        assert_eq!(parse_duration_field("n/a"), None);
    }

    #[test]
    fn duration_is_formatted_as_hours_minutes_seconds() {
        assert_eq!(format_duration(3723.9), "1h 2m 3s");
        assert_eq!(format_duration(0.0), "0h 0m 0s");
    }

    #[test]
    fn sidecar_accepts_either_name_column() {
        let csv = b"File Name,duration,title,description\na.mp4,00:01:00,Intro,Welcome\n";
        let rows = parse_sidecar(csv, "Module 1").unwrap();
        let row = &rows["Module 1/a.mp4"];
        assert_eq!(row.duration, Some(60.0));
        assert_eq!(row.title.as_deref(), Some("Intro"));
        assert_eq!(row.description.as_deref(), Some("Welcome"));

        let rows = parse_sidecar(b"filename,description\nb.mp4,\n", "").unwrap();
        assert_eq!(rows["b.mp4"], SidecarRow::default());
    }

    #[test]
    fn tree_renders_folders_before_their_siblings() {
        let manifest = Manifest {
            project: "Course".into(),
            entries: vec![
                entry("Module 1/a.mp4", "F001"),
                entry("Module 1/b.mp4", "F002"),
                entry("notes.zip", "F003"),
            ],
            total_size: 0,
            total_duration: 0.0,
        };
        let expected = "📁 Course/\n\
                        ├── 📁 Module 1/\n\
                        │   ├── 📄 `#F001` a.mp4\n\
                        │   └── 📄 `#F002` b.mp4\n\
                        └── 📄 `#F003` notes.zip";
        assert_eq!(manifest.tree(), expected);
    }

    fn entry(rel: &str, tag: &str) -> ManifestEntry {
        ManifestEntry {
            rel: rel.into(),
            path: PathBuf::from(rel),
            tag: tag.into(),
            size: 1,
            video: None,
        }
    }

    #[tokio::test]
    async fn build_merges_sidecar_and_probed_durations() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("m")).unwrap();
        fs::write(root.join("m/a.mp4"), b"aa").unwrap();
        fs::write(root.join("m/b.mp4"), b"bb").unwrap();
        fs::write(root.join("Documents_Part001.zip"), b"z").unwrap();
        fs::write(
            root.join("m").join(SIDECAR_FILE),
            "filename,duration,description\na.mp4,90,First lesson\n",
        )
        .unwrap();

        let transcoder =
            FakeTranscoder::default().with(&root.join("m/b.mp4"), Probe::conforming().duration(30.0));
        let files = FileSet::scan(root).unwrap();
        let manifest = build(root, "Course", &files, &transcoder).await.unwrap();

        let rels: Vec<_> = manifest.entries.iter().map(|e| e.rel.as_str()).collect();
        assert_eq!(rels, vec!["Documents_Part001.zip", "m/a.mp4", "m/b.mp4"]);
        let a = manifest.entries[1].video.as_ref().unwrap();
        assert_eq!(a.description, "First lesson");
        assert_eq!(a.title, "a.mp4");
        assert_eq!(manifest.entries[2].video.as_ref().unwrap().description, "b.mp4");
        assert_eq!(manifest.total_duration, 120.0);
        assert_eq!(manifest.total_size, 5);
        assert!(manifest.header("https://t.me/+x").contains("Duration: 0h 2m 0s"));
    }
}
