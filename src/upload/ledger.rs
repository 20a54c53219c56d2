//! Processed-file ledger
//!
//! Newline-delimited, append-only. Each line is either a root-relative file
//! name that was uploaded or a single `CHAT_ID:<value>` record naming the
//! destination chat.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::scan::LEDGER_FILE;
use crate::error::{Error, Result};

const CHAT_ID_PREFIX: &str = "CHAT_ID:";

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    processed: HashSet<String>,
    chat_id: Option<String>,
}

impl Ledger {
    /// Load `<root>/.processed_files`; a missing file is an empty ledger.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(LEDGER_FILE);
        let mut ledger = Self {
            path,
            processed: HashSet::new(),
            chat_id: None,
        };

        let content = match fs::read_to_string(&ledger.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ledger),
            Err(e) => return Err(e.into()),
        };

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.strip_prefix(CHAT_ID_PREFIX) {
                Some(id) => {
                    let id = id.trim();
                    if !id.is_empty() && ledger.chat_id.is_none() {
                        ledger.chat_id = Some(id.to_string());
                    }
                }
                None => {
                    ledger.processed.insert(line.to_string());
                }
            }
        }
        debug!(
            path = %ledger.path.display(),
            processed = ledger.processed.len(),
            "Loaded ledger"
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded destination chat, if any.
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.processed.contains(rel)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    fn append(&self, line: &str) -> Result<()> {
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{}", line)?;
            file.flush()
        };
        write().map_err(|e| Error::Persistence {
            what: format!("ledger {}", self.path.display()),
            reason: e.to_string(),
        })
    }

    /// Record the destination chat unless one is already recorded.
    pub fn record_chat_id(&mut self, id: &str) -> Result<()> {
        if self.chat_id.is_some() {
            return Ok(());
        }
        self.chat_id = Some(id.to_string());
        self.append(&format!("{}{}", CHAT_ID_PREFIX, id))
    }

    /// Mark `rel` as uploaded. Membership is updated even if the write fails.
    pub fn mark(&mut self, rel: &str) -> Result<()> {
        if !self.processed.insert(rel.to_string()) {
            return Ok(());
        }
        self.append(rel).inspect_err(|e| {
            warn!(file = rel, "Ledger entry not persisted: {}", e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path()).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.chat_id(), None);
    }

    #[test]
    fn parses_chat_id_and_entries() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(LEDGER_FILE),
            "CHAT_ID:12345\nintro.mp4\n\nModule 1/a.mp4\n",
        )
        .unwrap();

        let ledger = Ledger::load(dir.path()).unwrap();
        assert_eq!(ledger.chat_id(), Some("12345"));
        assert!(ledger.contains("intro.mp4"));
        assert!(ledger.contains("Module 1/a.mp4"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn marks_are_appended_and_reloaded() {
        let dir = tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path()).unwrap();
        ledger.record_chat_id("-100777").unwrap();
        ledger.mark("a.mp4").unwrap();
        ledger.mark("a.mp4").unwrap();

        let content = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "CHAT_ID:-100777\na.mp4\n");

        let reloaded = Ledger::load(dir.path()).unwrap();
        assert!(reloaded.contains("a.mp4"));
        assert_eq!(reloaded.chat_id(), Some("-100777"));
    }

    #[test]
    fn chat_id_is_recorded_at_most_once() {
        let dir = tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path()).unwrap();
        ledger.record_chat_id("1").unwrap();
        ledger.record_chat_id("2").unwrap();

        let content = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content.matches("CHAT_ID:").count(), 1);
        assert_eq!(ledger.chat_id(), Some("1"));
    }
}
