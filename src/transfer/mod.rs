//! Resumable batch transfers
//!
//! Every operation follows the same shape: resolve chats, read the history
//! gap after the checkpoint, then run each item through an [`ItemHandler`]
//! while the checkpoint advances behind it.

pub mod clone;
pub mod download;
pub mod downup;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::remote::{AdminRights, ChatInfo, RemoteMessage, RemoteService};

pub use clone::clone_chat;
pub use download::{download_chat, download_single};
pub use downup::down_up;

/// Lifecycle of one operation, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Preparing,
    Resolving,
    Iterating { done: usize, total: usize },
    Completed,
    Failed,
}

fn enter(op: &str, state: OperationState) {
    match state {
        OperationState::Failed => error!(op, ?state, "Operation state changed"),
        _ => info!(op, ?state, "Operation state changed"),
    }
}

/// Summary returned by every checkpointed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub processed: usize,
    pub skipped: usize,
    /// Last id written to the checkpoint store
    pub last_id: i64,
    /// At least one checkpoint write failed; resuming may redo items
    pub checkpoint_degraded: bool,
}

impl TransferReport {
    pub fn print_summary(&self, op: &str) {
        println!(
            "✅ {} finished: {} processed, {} skipped, last message {}",
            op, self.processed, self.skipped, self.last_id
        );
        if self.checkpoint_degraded {
            println!("⚠️  Progress could not be saved for every item; a rerun may repeat some");
        }
    }
}

/// Knobs shared by the transfer operations.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub page_size: usize,
    pub max_rate_limit_retries: u32,
    /// Pause between items (clone only)
    pub item_delay: Duration,
    pub downloads_dir: PathBuf,
    pub title_prefix: String,
    pub admins: Vec<String>,
}

impl TransferSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.history_page_size,
            max_rate_limit_retries: config.max_rate_limit_retries,
            item_delay: config.clone_item_delay,
            downloads_dir: config.downloads_dir.clone(),
            title_prefix: config.channel_title_prefix.clone(),
            admins: config.admins.clone(),
        }
    }

    /// Local folder for media of `chat`.
    pub fn chat_download_dir(&self, chat: &ChatInfo) -> PathBuf {
        self.downloads_dir.join(chat_folder_name(&chat.title))
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Sanitize chat title to safe folder name.
pub fn chat_folder_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_' || *c == '-')
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated: String = joined.chars().take(50).collect();
    if truncated.is_empty() {
        "unknown_chat".to_string()
    } else {
        truncated
    }
}

/// Per-item result reported by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    /// Nothing to transfer, but the checkpoint still moves past it
    Skipped,
}

/// The action an operation performs for one history item.
#[allow(async_fn_in_trait)]
pub trait ItemHandler {
    async fn handle(&self, message: &RemoteMessage) -> Result<ItemOutcome>;
}

fn advance(store: &mut CheckpointStore, key: &CheckpointKey, id: i32, report: &mut TransferReport) {
    let id = i64::from(id);
    if let Err(e) = store.set(key, id) {
        warn!(key = %key, "Checkpoint not persisted: {}", e);
        report.checkpoint_degraded = true;
    }
    report.last_id = report.last_id.max(id);
}

/// Run `handler` over `messages` (oldest first), checkpointing after each.
///
/// Transient failures skip the item; rate limits sleep and retry the same
/// item up to `max_rate_limit_retries` times; anything else aborts with the
/// checkpoint left at the last finished item.
pub async fn run_items<H: ItemHandler>(
    op: &'static str,
    handler: &H,
    messages: &[RemoteMessage],
    store: &mut CheckpointStore,
    key: &CheckpointKey,
    settings: &TransferSettings,
) -> Result<TransferReport> {
    let resume_from = store.get(key);
    let mut report = TransferReport {
        last_id: resume_from,
        ..TransferReport::default()
    };
    let total = messages.len();
    enter(op, OperationState::Iterating { done: 0, total });

    for (index, message) in messages.iter().enumerate() {
        if i64::from(message.id) <= resume_from {
            continue;
        }

        let mut attempts = 0u32;
        loop {
            let result = if message.is_empty() {
                Err(Error::InvalidReference(format!(
                    "message {} has neither text nor media",
                    message.id
                )))
            } else {
                handler.handle(message).await
            };

            match result {
                Ok(ItemOutcome::Done) => {
                    report.processed += 1;
                    metrics::record_item(op, "ok");
                    println!(
                        "📦 [{}/{}] message {} ({})",
                        index + 1,
                        total,
                        message.id,
                        message.media.describe()
                    );
                    break;
                }
                Ok(ItemOutcome::Skipped) => {
                    report.skipped += 1;
                    metrics::record_item(op, "skipped");
                    break;
                }
                Err(e) if e.is_transient() => {
                    warn!(op, message_id = message.id, "Skipping message: {}", e);
                    report.skipped += 1;
                    metrics::record_item(op, "skipped");
                    break;
                }
                Err(e) => match e.rate_limit_seconds() {
                    Some(seconds) if attempts < settings.max_rate_limit_retries => {
                        attempts += 1;
                        warn!(
                            op,
                            message_id = message.id,
                            attempt = attempts,
                            "Rate limited, sleeping {}s",
                            seconds
                        );
                        metrics::record_item(op, "rate_limited");
                        tokio::time::sleep(Duration::from_secs(seconds)).await;
                    }
                    _ => {
                        error!(op, message_id = message.id, "Transfer aborted: {}", e);
                        metrics::record_item(op, "error");
                        enter(op, OperationState::Failed);
                        return Err(e);
                    }
                },
            }
        }

        advance(store, key, message.id, &mut report);
        enter(
            op,
            OperationState::Iterating {
                done: index + 1,
                total,
            },
        );

        if !settings.item_delay.is_zero() && index + 1 < total {
            tokio::time::sleep(settings.item_delay).await;
        }
    }

    enter(op, OperationState::Completed);
    Ok(report)
}

/// Create a broadcast channel mirroring `source_title`, with invite link in
/// its description and every configured admin promoted.
pub async fn create_destination<R: RemoteService>(
    remote: &R,
    source_title: &str,
    settings: &TransferSettings,
) -> Result<ChatInfo> {
    let chat_title = source_title.replace(['-', '_'], " ");
    let title = format!("{} - {}", settings.title_prefix, chat_title);
    let channel = remote.create_channel(&title, "").await?;
    println!("📢 Created channel {} ({})", title, channel.id);

    let link = remote.export_invite_link(&channel).await?;
    remote
        .set_description(&channel, &format!("{}\n\n📌 Invite link: {}", chat_title, link))
        .await?;

    for admin in &settings.admins {
        if let Err(e) = remote
            .promote_admin(&channel, admin, AdminRights::full())
            .await
        {
            warn!(admin = %admin, "Failed to promote admin: {}", e);
        }
    }

    Ok(channel)
}

/// Shared preamble: log state, resolve the source and the optional
/// destination, creating one when absent.
pub(crate) async fn resolve_pair<R: RemoteService>(
    op: &'static str,
    remote: &R,
    source: &crate::chat::ChatRef,
    destination: Option<&crate::chat::ChatRef>,
    settings: &TransferSettings,
) -> Result<(ChatInfo, ChatInfo)> {
    enter(op, OperationState::Resolving);
    let source = remote.resolve_chat(source).await.inspect_err(|_| {
        enter(op, OperationState::Failed);
    })?;
    let destination = match destination {
        Some(chat) => remote.resolve_chat(chat).await,
        None => create_destination(remote, &source.title, settings).await,
    }
    .inspect_err(|_| enter(op, OperationState::Failed))?;

    println!(
        "🔁 {} => {} (protected: {})",
        source.title, destination.title, source.protected
    );
    Ok((source, destination))
}

pub(crate) fn start(op: &'static str) {
    enter(op, OperationState::Preparing);
}

/// Read the history gap, failing the operation when it cannot be listed.
pub(crate) async fn fetch_gap<R: RemoteService>(
    op: &'static str,
    remote: &R,
    chat: &ChatInfo,
    store: &CheckpointStore,
    key: &CheckpointKey,
    settings: &TransferSettings,
) -> Result<Vec<RemoteMessage>> {
    store.log_resume(key);
    let messages = crate::history::fetch_since(remote, chat, store.get(key), settings.page_size)
        .await
        .inspect_err(|e| {
            error!(op, chat = chat.id, "Failed to read history: {}", e);
            enter(op, OperationState::Failed);
        })?;
    if messages.is_empty() {
        println!("ℹ️  No new messages in {}", chat.title);
    } else {
        println!("📜 {} new messages in {}", messages.len(), chat.title);
    }
    Ok(messages)
}
