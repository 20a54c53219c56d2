//! Error types for tg_turbo

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Session file not found: {0}")]
    SessionNotFound(String),

    #[error("Session is locked by another process")]
    SessionLocked,

    #[error("Failed to acquire session lock: {0}")]
    LockError(String),

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("Rate limited by Telegram, retry in {0}s")]
    RateLimited(u64),

    #[error("Invalid remote reference: {0}")]
    InvalidReference(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Failed to persist {what}: {reason}")]
    Persistence { what: String, reason: String },

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Transcode error: {0}")]
    TranscodeError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authorization required")]
    AuthorizationRequired,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// RPC names that only invalidate the current item.
const TRANSIENT_RPC_NAMES: &[&str] = &[
    "MESSAGE_ID_INVALID",
    "MESSAGE_EMPTY",
    "FILE_REFERENCE_EXPIRED",
    "FILE_REFERENCE_INVALID",
    "MEDIA_EMPTY",
];

impl Error {
    /// Classify a raw Telegram error string (best-effort).
    pub fn from_telegram_message(message: &str) -> Self {
        if let Some(seconds) = parse_flood_wait_seconds(message) {
            return Error::RateLimited(seconds);
        }
        if TRANSIENT_RPC_NAMES.iter().any(|name| message.contains(name)) {
            return Error::InvalidReference(message.to_string());
        }
        Error::TelegramError(message.to_string())
    }

    /// Errors that skip the current item without aborting the batch.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::InvalidReference(_))
    }

    /// Seconds to wait before the remote service accepts requests again.
    pub fn rate_limit_seconds(&self) -> Option<u64> {
        match self {
            Error::RateLimited(seconds) => Some(*seconds),
            _ => None,
        }
    }
}

/// Extract flood wait seconds from an error string (best-effort)
pub fn parse_flood_wait_seconds(error: &str) -> Option<u64> {
    if let Some(idx) = error.find("FLOOD_WAIT_") {
        let start = idx + "FLOOD_WAIT_".len();
        let secs = error[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>();
        if let Ok(v) = secs.parse::<u64>() {
            return Some(v);
        }
    }

    if error.contains("FLOOD_WAIT") {
        if let Some(idx) = error.find("value:") {
            let start = idx + "value:".len();
            let secs = error[start..]
                .trim_start()
                .trim_start_matches("Some(")
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>();
            if let Ok(v) = secs.parse::<u64>() {
                return Some(v);
            }
        }
    }

    None
}

impl From<grammers_client::InvocationError> for Error {
    fn from(err: grammers_client::InvocationError) -> Self {
        Error::from_telegram_message(&err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ArchiveError(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::IoError(std::io::Error::other(err.to_string()))
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::IoError(std::io::Error::other(err.to_string()))
    }
}
