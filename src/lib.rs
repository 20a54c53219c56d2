//! tg_turbo: resumable Telegram media transfer library
//!
//! This library provides tools to:
//! - Clone chats by forwarding, or by download and re-upload when protected
//! - Download whole chats or single messages with resumable checkpoints
//! - Re-encode, split and upload local folders as tagged, ordered channels
//! - Expose Prometheus metrics for long-running transfers

pub mod chat;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod remote;
pub mod session;
pub mod telegram;
pub mod transcode;
pub mod transfer;
pub mod upload;

// Re-export common types
pub use chat::{ChatRef, MessageLink};
pub use checkpoint::{CheckpointKey, CheckpointStore, OperationKind};
pub use config::{Config, UploadLimits};
pub use error::{Error, Result};
pub use remote::{ChatInfo, MediaKind, OutgoingFile, RemoteMessage, RemoteService, SendKind};
pub use session::{check_session_exists, get_client, SessionLock};
pub use transcode::{FfmpegTranscoder, Transcoder};

// Commands use the re-exported types, so they are declared last
pub mod commands;
