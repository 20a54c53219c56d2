//! Clone a chat into another chat

use std::path::PathBuf;

use tracing::info;

use super::{fetch_gap, resolve_pair, run_items, start, ItemHandler, ItemOutcome};
use super::{TransferReport, TransferSettings};
use crate::chat::ChatRef;
use crate::checkpoint::{CheckpointKey, CheckpointStore, OperationKind};
use crate::error::{Error, Result};
use crate::remote::{ChatInfo, OutgoingFile, RemoteMessage, RemoteService};

const OP: &str = "clone";

struct CloneItem<'a, R> {
    remote: &'a R,
    source: &'a ChatInfo,
    destination: &'a ChatInfo,
    download_dir: PathBuf,
}

impl<R: RemoteService> CloneItem<'_, R> {
    /// Protected chats cannot be forwarded from, so content is copied.
    async fn copy(&self, message: &RemoteMessage) -> Result<()> {
        if !message.media.is_downloadable() {
            let text = if message.text.trim().is_empty() {
                message.media.describe()
            } else {
                message.text.clone()
            };
            self.remote.send_text(self.destination, &text).await?;
            return Ok(());
        }

        let path = self
            .remote
            .download_media(self.source, message, &self.download_dir)
            .await?
            .ok_or_else(|| {
                Error::InvalidReference(format!("message {} had no media to copy", message.id))
            })?;

        let file = OutgoingFile {
            path,
            caption: message.text.clone(),
            kind: message.media.send_kind(),
        };
        self.remote.send_file(self.destination, &file).await?;
        Ok(())
    }
}

impl<R: RemoteService> ItemHandler for CloneItem<'_, R> {
    async fn handle(&self, message: &RemoteMessage) -> Result<ItemOutcome> {
        if self.source.protected {
            self.copy(message).await?;
        } else {
            self.remote
                .forward(self.source, self.destination, message.id)
                .await?;
        }
        info!(message_id = message.id, "Message cloned");
        Ok(ItemOutcome::Done)
    }
}

/// Copy every message after the checkpoint from `source` to `destination`.
///
/// Without a destination a new channel is created for the run.
pub async fn clone_chat<R: RemoteService>(
    remote: &R,
    store: &mut CheckpointStore,
    settings: &TransferSettings,
    source: &ChatRef,
    destination: Option<&ChatRef>,
) -> Result<TransferReport> {
    start(OP);
    let (source, destination) = resolve_pair(OP, remote, source, destination, settings).await?;
    let key = CheckpointKey::new(OperationKind::Clone, source.id, Some(destination.id));

    let messages = fetch_gap(OP, remote, &source, store, &key, settings).await?;
    let handler = CloneItem {
        remote,
        source: &source,
        destination: &destination,
        download_dir: settings.chat_download_dir(&source),
    };
    run_items(OP, &handler, &messages, store, &key, settings).await
}
