//! Download chat media to the local disk

use std::path::PathBuf;

use tracing::{error, info, warn};

use super::{fetch_gap, run_items, start, ItemHandler, ItemOutcome};
use super::{TransferReport, TransferSettings};
use crate::chat::{ChatRef, MessageLink};
use crate::checkpoint::{CheckpointKey, CheckpointStore, OperationKind};
use crate::error::{Error, Result};
use crate::remote::{ChatInfo, RemoteMessage, RemoteService};

const OP: &str = "download";

struct DownloadItem<'a, R> {
    remote: &'a R,
    chat: &'a ChatInfo,
    dir: PathBuf,
}

impl<R: RemoteService> ItemHandler for DownloadItem<'_, R> {
    async fn handle(&self, message: &RemoteMessage) -> Result<ItemOutcome> {
        if !message.media.is_downloadable() {
            return Ok(ItemOutcome::Skipped);
        }
        match self
            .remote
            .download_media(self.chat, message, &self.dir)
            .await?
        {
            Some(path) => {
                info!(message_id = message.id, path = %path.display(), "Media downloaded");
                Ok(ItemOutcome::Done)
            }
            None => {
                warn!(message_id = message.id, "Nothing downloaded");
                Ok(ItemOutcome::Skipped)
            }
        }
    }
}

/// Download every media item after the checkpoint into
/// `<downloads>/<chat title>/`.
pub async fn download_chat<R: RemoteService>(
    remote: &R,
    store: &mut CheckpointStore,
    settings: &TransferSettings,
    source: &ChatRef,
) -> Result<TransferReport> {
    start(OP);
    super::enter(OP, super::OperationState::Resolving);
    let chat = remote.resolve_chat(source).await.inspect_err(|e| {
        error!(chat = %source, "Failed to resolve chat: {}", e);
        super::enter(OP, super::OperationState::Failed);
    })?;
    let dir = settings.chat_download_dir(&chat);
    println!("📥 Downloading {} into {}", chat.title, dir.display());

    let key = CheckpointKey::new(OperationKind::DownloadChat, chat.id, None);
    let messages = fetch_gap(OP, remote, &chat, store, &key, settings).await?;
    let handler = DownloadItem {
        remote,
        chat: &chat,
        dir,
    };
    run_items(OP, &handler, &messages, store, &key, settings).await
}

/// Download the media of a single message link.
///
/// No checkpoint is kept. Transient failures are logged and yield `None`.
pub async fn download_single<R: RemoteService>(
    remote: &R,
    settings: &TransferSettings,
    link: &str,
) -> Result<Option<PathBuf>> {
    let link = MessageLink::parse(link)?;
    let chat = remote.resolve_chat(&link.chat).await?;

    let result = async {
        let message = remote
            .message_by_id(&chat, link.message_id)
            .await?
            .ok_or_else(|| {
                Error::InvalidReference(format!("message {} not found", link.message_id))
            })?;
        remote
            .download_media(&chat, &message, &settings.chat_download_dir(&chat))
            .await
    }
    .await;

    match result {
        Ok(Some(path)) => {
            println!("✅ Saved {}", path.display());
            Ok(Some(path))
        }
        Ok(None) => {
            warn!(message_id = link.message_id, "Message has no downloadable media");
            Ok(None)
        }
        Err(e) if e.is_transient() => {
            error!(message_id = link.message_id, "Download failed: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
