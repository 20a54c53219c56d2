//! Download media and re-upload it to another chat

use std::path::PathBuf;

use tracing::{info, warn};

use super::{fetch_gap, resolve_pair, run_items, start, ItemHandler, ItemOutcome};
use super::{TransferReport, TransferSettings};
use crate::chat::ChatRef;
use crate::checkpoint::{CheckpointKey, CheckpointStore, OperationKind};
use crate::error::{Error, Result};
use crate::remote::{ChatInfo, OutgoingFile, RemoteMessage, RemoteService};

const OP: &str = "downup";

struct DownUpItem<'a, R> {
    remote: &'a R,
    source: &'a ChatInfo,
    destination: &'a ChatInfo,
    dir: PathBuf,
}

impl<R: RemoteService> ItemHandler for DownUpItem<'_, R> {
    async fn handle(&self, message: &RemoteMessage) -> Result<ItemOutcome> {
        if !message.media.is_downloadable() {
            return Ok(ItemOutcome::Skipped);
        }

        // History pages can be stale by the time the item is reached.
        let fresh = self
            .remote
            .message_by_id(self.source, message.id)
            .await?
            .ok_or_else(|| Error::InvalidReference(format!("message {} vanished", message.id)))?;

        let path = self
            .remote
            .download_media(self.source, &fresh, &self.dir)
            .await?
            .ok_or_else(|| {
                Error::InvalidReference(format!("message {} had no media", message.id))
            })?;

        let file = OutgoingFile {
            path,
            caption: fresh.text.clone(),
            kind: fresh.media.send_kind(),
        };
        let sent = self.remote.send_file(self.destination, &file).await?;
        info!(message_id = message.id, sent_id = sent, "Media re-uploaded");

        // The local copy only relays the media.
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            warn!(file = %file.path.display(), "Failed to remove relayed file: {}", e);
        }
        Ok(ItemOutcome::Done)
    }
}

/// Download each media item of `source` and upload it to `destination`.
pub async fn down_up<R: RemoteService>(
    remote: &R,
    store: &mut CheckpointStore,
    settings: &TransferSettings,
    source: &ChatRef,
    destination: Option<&ChatRef>,
) -> Result<TransferReport> {
    start(OP);
    let (source, destination) = resolve_pair(OP, remote, source, destination, settings).await?;
    let key = CheckpointKey::new(OperationKind::DownUp, source.id, Some(destination.id));

    let messages = fetch_gap(OP, remote, &source, store, &key, settings).await?;
    let handler = DownUpItem {
        remote,
        source: &source,
        destination: &destination,
        dir: settings.chat_download_dir(&source),
    };
    run_items(OP, &handler, &messages, store, &key, settings).await
}
