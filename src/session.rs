//! Session management for the Telegram client
//!
//! Provides:
//! - File-based session locking so only one tg_turbo process runs at a time
//! - Session file validation
//! - Client creation with proper configuration

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use grammers_client::Client;
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use grammers_session::storages::SqliteSession;

use crate::config::Config;
use crate::error::{Error, Result};

/// Exclusive lock held for the whole run.
///
/// Also keeps two invocations from writing the same checkpoint file or
/// upload ledger.
pub struct SessionLock {
    path: PathBuf,
    lock_file: Option<File>,
}

impl SessionLock {
    /// Acquire an exclusive lock on `path`.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                lock_file: Some(lock_file),
            }),
            Err(_) => {
                eprintln!(
                    r#"
⚠️  The Telegram session is already in use by another tg_turbo process.

Running two transfers on one session leads to flood waits and clobbered
progress files. Wait for the other run to finish and try again.
"#
                );
                Err(Error::SessionLocked)
            }
        }
    }

    /// Lock named after the configured session.
    pub fn for_config(config: &Config) -> Result<Self> {
        Self::acquire(&config.lock_file)
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Check that the session file exists.
pub fn check_session_exists(session_file: &str) -> Result<()> {
    if !Path::new(session_file).exists() {
        eprintln!(
            r#"
⚠️  Session file '{}' not found.

To create it:
1. Run: tg_turbo login   (or cargo run --bin init_session)
2. Enter the code Telegram sends you
"#,
            session_file
        );
        return Err(Error::SessionNotFound(session_file.to_string()));
    }

    Ok(())
}

/// Open (or create) the sqlite session at `session_file`.
pub fn open_session(session_file: &str) -> Result<Arc<SqliteSession>> {
    let session = SqliteSession::open(session_file)
        .map_err(|e| Error::SessionNotFound(format!("Failed to open session: {}", e)))?;
    Ok(Arc::new(session))
}

/// Holder for SenderPool components and Client
pub struct TelegramClient {
    pub client: Client,
    pub handle: SenderPoolHandle,
    _runner_handle: tokio::task::JoinHandle<()>,
}

impl TelegramClient {
    pub async fn connect(session: Arc<SqliteSession>, api_id: i32) -> Result<Self> {
        let pool = SenderPool::new(session, api_id);
        let client = Client::new(&pool);

        let SenderPool {
            runner,
            updates: _,
            handle,
        } = pool;

        let runner_handle = tokio::spawn(async move {
            runner.run().await;
        });

        Ok(Self {
            client,
            handle,
            _runner_handle: runner_handle,
        })
    }
}

impl std::ops::Deref for TelegramClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Connect with an existing, authorized session.
pub async fn get_client(config: &Config) -> Result<TelegramClient> {
    let session_file = config.session_file();
    check_session_exists(&session_file)?;
    let client = TelegramClient::connect(open_session(&session_file)?, config.api_id).await?;
    if !client.is_authorized().await? {
        return Err(Error::AuthorizationRequired);
    }
    Ok(client)
}

/// Connect for login; the session file is created if missing.
pub async fn get_client_for_init(config: &Config) -> Result<TelegramClient> {
    TelegramClient::connect(open_session(&config.session_file())?, config.api_id).await
}
