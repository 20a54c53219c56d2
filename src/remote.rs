//! Remote service boundary
//!
//! Everything the transfer controller and the upload pipeline need from
//! Telegram goes through [`RemoteService`]. The grammers-backed
//! implementation lives in [`crate::telegram`]; tests use in-memory fakes.

use std::path::{Path, PathBuf};

use crate::chat::ChatRef;
use crate::error::Result;

/// Resolved chat metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: i64,
    pub title: String,
    /// Forwarding and saving are disabled in this chat
    pub protected: bool,
}

/// Media attached to a message, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    Document {
        file_name: Option<String>,
        mime_type: Option<String>,
        size: u64,
    },
    Audio {
        file_name: Option<String>,
        size: u64,
    },
    Video {
        file_name: Option<String>,
        duration: u32,
        size: u64,
    },
    Voice {
        duration: u32,
    },
    Photo,
    VideoNote {
        duration: u32,
    },
    Animation {
        file_name: Option<String>,
    },
    Sticker,
    Location {
        latitude: f64,
        longitude: f64,
    },
    Contact {
        phone: String,
        name: String,
    },
    Text,
}

impl MediaKind {
    /// Whether the media has a file that can be downloaded.
    pub fn is_downloadable(&self) -> bool {
        !matches!(
            self,
            MediaKind::Location { .. } | MediaKind::Contact { .. } | MediaKind::Text
        )
    }

    /// File name used when saving this media for a message.
    pub fn file_name(&self, message_id: i32) -> String {
        let named = |name: &Option<String>, fallback: &str| match name {
            Some(name) if !name.trim().is_empty() => format!("{}-{}", message_id, name),
            _ => format!("{}-{}", message_id, fallback),
        };
        match self {
            MediaKind::Document {
                file_name,
                mime_type,
                ..
            } => {
                let extension = mime_type
                    .as_deref()
                    .and_then(|mime| mime_guess::get_mime_extensions_str(mime))
                    .and_then(|exts| exts.first())
                    .copied()
                    .unwrap_or("bin");
                named(file_name, &format!("document.{}", extension))
            }
            MediaKind::Audio { file_name, .. } => named(file_name, "audio.mp3"),
            MediaKind::Video { file_name, .. } => named(file_name, "video.mp4"),
            MediaKind::Voice { .. } => format!("{}-voice.ogg", message_id),
            MediaKind::Photo => format!("{}-photo.jpg", message_id),
            MediaKind::VideoNote { .. } => format!("{}-video_note.mp4", message_id),
            MediaKind::Animation { file_name } => named(file_name, "animation.mp4"),
            MediaKind::Sticker => format!("{}-sticker.webp", message_id),
            MediaKind::Location { .. } => format!("{}-location.txt", message_id),
            MediaKind::Contact { .. } => format!("{}-contact.vcf", message_id),
            MediaKind::Text => format!("{}-message.txt", message_id),
        }
    }

    /// Short human description for logs.
    pub fn describe(&self) -> String {
        match self {
            MediaKind::Document { size, .. } => format!("document ({})", human_size(*size)),
            MediaKind::Audio { size, .. } => format!("audio ({})", human_size(*size)),
            MediaKind::Video { duration, size, .. } => {
                format!("video {}s ({})", duration, human_size(*size))
            }
            MediaKind::Voice { duration } => format!("voice {}s", duration),
            MediaKind::Photo => "photo".to_string(),
            MediaKind::VideoNote { duration } => format!("video note {}s", duration),
            MediaKind::Animation { .. } => "animation".to_string(),
            MediaKind::Sticker => "sticker".to_string(),
            MediaKind::Location {
                latitude,
                longitude,
            } => format!("location {:.5},{:.5}", latitude, longitude),
            MediaKind::Contact { name, .. } => format!("contact {}", name),
            MediaKind::Text => "text".to_string(),
        }
    }

    /// How a downloaded copy of this media is sent back.
    pub fn send_kind(&self) -> SendKind {
        match self {
            MediaKind::Video { duration, .. } | MediaKind::VideoNote { duration } => {
                SendKind::Video {
                    duration: *duration,
                }
            }
            MediaKind::Audio { .. } => SendKind::Audio,
            MediaKind::Voice { .. } => SendKind::Voice,
            MediaKind::Photo => SendKind::Photo,
            MediaKind::Animation { .. } => SendKind::Animation,
            MediaKind::Sticker => SendKind::Sticker,
            MediaKind::Document { .. }
            | MediaKind::Location { .. }
            | MediaKind::Contact { .. }
            | MediaKind::Text => SendKind::Document,
        }
    }
}

/// Format a byte count for operator-facing output.
pub fn human_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1024.0 / 1024.0;
    if mb >= 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{:.2} MB", mb)
    }
}

/// A message fetched from chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMessage {
    pub id: i32,
    pub text: String,
    pub media: MediaKind,
}

impl RemoteMessage {
    pub fn text(id: i32, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            media: MediaKind::Text,
        }
    }

    pub fn with_media(id: i32, caption: impl Into<String>, media: MediaKind) -> Self {
        Self {
            id,
            text: caption.into(),
            media,
        }
    }

    pub fn has_media(&self) -> bool {
        !matches!(self.media, MediaKind::Text)
    }

    /// Service messages and deleted stubs carry neither text nor media.
    pub fn is_empty(&self) -> bool {
        !self.has_media() && self.text.trim().is_empty()
    }
}

/// Presentation used when sending a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Document,
    /// Streamable video with a known duration in seconds
    Video { duration: u32 },
    Audio,
    Voice,
    Photo,
    Animation,
    Sticker,
}

/// A local file to be sent to a chat.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingFile {
    pub path: PathBuf,
    pub caption: String,
    pub kind: SendKind,
}

impl OutgoingFile {
    pub fn document(path: impl Into<PathBuf>, caption: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            caption: caption.into(),
            kind: SendKind::Document,
        }
    }

    pub fn video(path: impl Into<PathBuf>, caption: impl Into<String>, duration: u32) -> Self {
        Self {
            path: path.into(),
            caption: caption.into(),
            kind: SendKind::Video { duration },
        }
    }
}

/// Privileges granted to admins of a chat created by tg_turbo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminRights {
    pub change_info: bool,
    pub post_messages: bool,
    pub edit_messages: bool,
    pub delete_messages: bool,
    pub ban_users: bool,
    pub invite_users: bool,
    pub pin_messages: bool,
    pub add_admins: bool,
    pub manage_call: bool,
    pub manage_chat: bool,
}

impl AdminRights {
    /// Full management rights, used for every configured admin.
    pub const fn full() -> Self {
        Self {
            change_info: true,
            post_messages: true,
            edit_messages: true,
            delete_messages: true,
            ban_users: true,
            invite_users: true,
            pin_messages: true,
            add_admins: true,
            manage_call: true,
            manage_chat: true,
        }
    }
}

/// Operations consumed from Telegram.
///
/// Every call may fail with [`crate::Error::RateLimited`] or
/// [`crate::Error::InvalidReference`] in addition to generic failures.
#[allow(async_fn_in_trait)]
pub trait RemoteService {
    /// Look up a chat by id, username or link.
    async fn resolve_chat(&self, chat: &ChatRef) -> Result<ChatInfo>;

    /// One page of history, newest first, with ids strictly below
    /// `offset_id` (`0` starts from the newest message).
    async fn history_page(
        &self,
        chat: &ChatInfo,
        offset_id: i32,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>>;

    /// Fetch a single message; `None` when it does not exist.
    async fn message_by_id(&self, chat: &ChatInfo, id: i32) -> Result<Option<RemoteMessage>>;

    /// Download the media of `message` into `dest`; `None` when there was
    /// nothing to download.
    async fn download_media(
        &self,
        chat: &ChatInfo,
        message: &RemoteMessage,
        dest: &Path,
    ) -> Result<Option<PathBuf>>;

    /// Send a text message, returning its id.
    async fn send_text(&self, chat: &ChatInfo, text: &str) -> Result<i32>;

    /// Upload and send a local file, returning the message id.
    async fn send_file(&self, chat: &ChatInfo, file: &OutgoingFile) -> Result<i32>;

    /// Forward a message by reference.
    async fn forward(&self, source: &ChatInfo, destination: &ChatInfo, id: i32) -> Result<()>;

    /// Create a broadcast channel.
    async fn create_channel(&self, title: &str, about: &str) -> Result<ChatInfo>;

    async fn set_description(&self, chat: &ChatInfo, about: &str) -> Result<()>;

    async fn export_invite_link(&self, chat: &ChatInfo) -> Result<String>;

    /// Invite `user` (username or id) and grant `rights`.
    async fn promote_admin(&self, chat: &ChatInfo, user: &str, rights: AdminRights) -> Result<()>;

    async fn pin_message(&self, chat: &ChatInfo, id: i32) -> Result<()>;
}
