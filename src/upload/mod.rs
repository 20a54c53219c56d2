//! Six-stage folder upload pipeline
//!
//! Stages run strictly in order, each over the tree the previous one left:
//! archive loose files, re-encode videos, split oversized videos, build the
//! manifest, upload, send the summary. Everything a stage needs arrives as an
//! argument; the destination travels in [`UploadContext`].

pub mod archive;
pub mod ledger;
pub mod manifest;
pub mod publish;
pub mod reencode;
pub mod scan;
pub mod split;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::chat::ChatRef;
use crate::config::UploadLimits;
use crate::error::{Error, Result};
use crate::remote::{human_size, ChatInfo, RemoteService};
use crate::transcode::Transcoder;

pub use ledger::Ledger;
pub use manifest::Manifest;
pub use reencode::{CorruptionPolicy, DeleteCorrupted, KeepCorrupted};
pub use scan::{FileEntry, FileSet};

/// Shown in the summary when the invite link cannot be exported.
pub const INVITE_PLACEHOLDER: &str = "https://t.me/placeholder";

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub root: PathBuf,
    /// Operator-chosen destination; overrides the ledger for this run
    pub destination: Option<ChatRef>,
    pub limits: UploadLimits,
}

/// Where this run sends things.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadContext {
    pub destination: ChatInfo,
    pub invite_link: String,
    pub project: String,
}

/// Folder name used as project name and channel title.
pub fn project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

fn recorded_chat(ledger: &Ledger) -> Option<i64> {
    let raw = ledger.chat_id()?;
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(value = raw, "Ignoring unparsable CHAT_ID record");
            None
        }
    }
}

/// Ledger record, then operator choice, then a new channel.
///
/// A recorded chat always wins so the ledger never lists files that were
/// sent somewhere else.
pub async fn resolve_destination<R: RemoteService>(
    remote: &R,
    options: &UploadOptions,
    ledger: &mut Ledger,
) -> Result<UploadContext> {
    let project = project_name(&options.root);
    let recorded = recorded_chat(ledger);

    let destination = match (recorded, &options.destination) {
        (Some(id), chosen) => {
            if let Some(chosen) = chosen.as_ref().filter(|c| **c != ChatRef::Id(id)) {
                warn!(
                    recorded = id,
                    chosen = %chosen,
                    "Folder was already uploaded to another chat; ignoring the chosen destination"
                );
                println!("⚠️  Ignoring {}: this folder belongs to chat {}", chosen, id);
            }
            println!("♻️  Resuming upload into chat {}", id);
            remote.resolve_chat(&ChatRef::Id(id)).await?
        }
        (None, Some(chat)) => remote.resolve_chat(chat).await?,
        (None, None) => {
            let title = project.replace(['-', '_'], " ");
            let channel = remote.create_channel(&title, "").await?;
            println!("📢 Created channel {} ({})", title, channel.id);
            channel
        }
    };

    if let Err(e) = ledger.record_chat_id(&destination.id.to_string()) {
        warn!("Destination not recorded in ledger: {}", e);
    }

    let invite_link = match remote.export_invite_link(&destination).await {
        Ok(link) => link,
        Err(e) => {
            warn!(chat = destination.id, "Failed to export invite link: {}", e);
            INVITE_PLACEHOLDER.to_string()
        }
    };

    Ok(UploadContext {
        destination,
        invite_link,
        project,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub volumes: usize,
    pub reencode: reencode::ReencodeReport,
    pub split: split::SplitReport,
    pub files: usize,
    pub upload: publish::UploadReport,
    pub summary_messages: usize,
}

/// Run all six stages over `options.root`.
pub async fn run_pipeline<R, T, P>(
    remote: &R,
    transcoder: &T,
    policy: &P,
    options: &UploadOptions,
) -> Result<PipelineReport>
where
    R: RemoteService,
    T: Transcoder,
    P: CorruptionPolicy,
{
    let root = options.root.as_path();
    if !root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    let limits = &options.limits;

    let mut ledger = Ledger::load(root)?;
    let ctx = resolve_destination(remote, options, &mut ledger).await?;
    info!(
        root = %root.display(),
        chat = ctx.destination.id,
        processed = ledger.len(),
        "Upload started"
    );
    println!("📤 {} => {}", root.display(), ctx.destination.title);

    let mut report = PipelineReport::default();

    let files = FileSet::scan(root)?;
    report.volumes = archive::run(root, &files, limits.safe_size_limit)?.len();
    report.reencode = reencode::run(root, transcoder, policy).await?;
    report.split = split::run(root, transcoder, limits).await?;

    let files = FileSet::scan(root)?;
    let manifest = manifest::build(root, &ctx.project, &files, transcoder).await?;
    report.files = manifest.entries.len();
    println!(
        "🧾 4/6 - Manifest: {} file(s), {}, {}",
        manifest.entries.len(),
        human_size(manifest.total_size),
        manifest::format_duration(manifest.total_duration)
    );

    report.upload = publish::upload_files(remote, &ctx, &manifest, &mut ledger, limits).await?;
    report.summary_messages = publish::send_summary(remote, &ctx, &manifest, limits).await?;

    info!(chat = ctx.destination.id, "Upload finished");
    Ok(report)
}
