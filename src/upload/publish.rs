//! Stages 5 and 6: send files in tag order, then the pinned summary

use std::time::Duration;

use tracing::{error, info, warn};

use super::ledger::Ledger;
use super::manifest::{Manifest, ManifestEntry};
use super::UploadContext;
use crate::config::UploadLimits;
use crate::error::Result;
use crate::metrics;
use crate::remote::{human_size, OutgoingFile, RemoteService};

/// Cut `text` to at most `limit` characters, ending in `...` when cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

/// Caption for one manifest entry.
pub fn caption_for(entry: &ManifestEntry, limit: usize) -> String {
    let caption = match &entry.video {
        Some(meta) => format!("#{} - {}", entry.tag, meta.description),
        None if entry.is_zip() => format!("📦 #{} - Extra files: {}", entry.tag, entry.name()),
        None => format!("#{} - {}", entry.tag, entry.name()),
    };
    truncate_chars(&caption, limit)
}

fn outgoing(entry: &ManifestEntry, limit: usize) -> OutgoingFile {
    let caption = caption_for(entry, limit);
    match &entry.video {
        Some(meta) => OutgoingFile::video(&entry.path, caption, meta.duration.round() as u32),
        None => OutgoingFile::document(&entry.path, caption),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub sent: usize,
    /// Already in the ledger before this run
    pub already_sent: usize,
    /// Still missing from the ledger after the last pass
    pub pending: usize,
    pub passes: u32,
    /// A ledger append failed; a rerun may send some files twice
    pub ledger_degraded: bool,
}

/// Stage 5. Files already in the ledger are skipped; a rate limit sleeps,
/// moves on and schedules another pass (up to `max_passes`).
pub async fn upload_files<R: RemoteService>(
    remote: &R,
    ctx: &UploadContext,
    manifest: &Manifest,
    ledger: &mut Ledger,
    limits: &UploadLimits,
) -> Result<UploadReport> {
    let mut report = UploadReport {
        already_sent: manifest
            .entries
            .iter()
            .filter(|e| ledger.contains(&e.rel))
            .count(),
        ..UploadReport::default()
    };

    let total = manifest.entries.len();
    if report.already_sent == total {
        println!("🚀 5/6 - All {} file(s) were sent before", total);
        return Ok(report);
    }

    for pass in 1..=limits.max_passes.max(1) {
        report.passes = pass;
        let mut rate_limited = false;

        for entry in &manifest.entries {
            if ledger.contains(&entry.rel) {
                continue;
            }
            if !entry.path.exists() {
                warn!(file = %entry.rel, "File disappeared before upload");
                continue;
            }

            println!(
                "🚀 [{}] {} ({})",
                entry.tag,
                entry.rel,
                human_size(entry.size)
            );
            match remote.send_file(&ctx.destination, &outgoing(entry, limits.caption_limit)).await {
                Ok(id) => {
                    info!(file = %entry.rel, message_id = id, "File uploaded");
                    metrics::record_file_upload("ok");
                    report.sent += 1;
                    if ledger.mark(&entry.rel).is_err() {
                        report.ledger_degraded = true;
                    }
                }
                Err(e) => match e.rate_limit_seconds() {
                    Some(seconds) => {
                        warn!(file = %entry.rel, "Rate limited, sleeping {}s", seconds);
                        metrics::record_file_upload("rate_limited");
                        rate_limited = true;
                        tokio::time::sleep(Duration::from_secs(seconds)).await;
                    }
                    None => {
                        error!(file = %entry.rel, "Upload failed: {}", e);
                        metrics::record_file_upload("error");
                    }
                },
            }
        }

        if !rate_limited {
            break;
        }
        info!(pass, "Upload pass hit a rate limit, rescanning");
    }

    report.pending = manifest
        .entries
        .iter()
        .filter(|e| !ledger.contains(&e.rel))
        .count();
    println!(
        "🚀 5/6 - Upload: {} sent, {} sent before, {} pending",
        report.sent, report.already_sent, report.pending
    );
    if report.ledger_degraded {
        println!("⚠️  Some uploads could not be recorded; a rerun may repeat them");
    }
    Ok(report)
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Split `text` into chunks of at most `limit` UTF-16 units, the unit
/// Telegram measures message length in. Cuts fall on line breaks when a
/// line fits, otherwise between characters.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(2);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = utf16_len(line);
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        for c in line.chars() {
            let c_len = c.len_utf16();
            if current_len + c_len > limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += c_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Header, tree and footer joined as one message body.
pub fn summary_text(manifest: &Manifest, invite_link: &str, footer: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        manifest.header(invite_link),
        manifest.tree(),
        footer
    )
}

/// Stage 6. Returns the number of summary messages sent.
pub async fn send_summary<R: RemoteService>(
    remote: &R,
    ctx: &UploadContext,
    manifest: &Manifest,
    limits: &UploadLimits,
) -> Result<usize> {
    let footer = format!(
        "{} · {}",
        limits.footer,
        chrono::Local::now().format("%Y-%m-%d")
    );
    let text = summary_text(manifest, &ctx.invite_link, &footer);
    let chunks = chunk_message(&text, limits.message_limit);

    let mut first_id = None;
    for chunk in &chunks {
        let id = remote.send_text(&ctx.destination, chunk).await?;
        first_id.get_or_insert(id);
    }

    if let Some(id) = first_id {
        if let Err(e) = remote.pin_message(&ctx.destination, id).await {
            warn!(message_id = id, "Failed to pin summary: {}", e);
        }
    }

    println!("📌 6/6 - Summary sent in {} message(s)", chunks.len());
    Ok(chunks.len())
}
