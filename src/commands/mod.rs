//! Command implementations
//!
//! Each module backs one or more CLI subcommands. Commands that talk to
//! Telegram hold the session lock for their whole run.

pub mod login;
pub mod menu;
pub mod transfer;
pub mod upload;

use crate::config::Config;
use crate::error::Result;
use crate::session::{get_client, SessionLock, TelegramClient};
use crate::telegram::TelegramRemote;

/// A locked, connected session.
pub struct Connection {
    pub remote: TelegramRemote,
    _client: TelegramClient,
    _lock: SessionLock,
}

/// Take the session lock, then connect.
pub async fn connect(config: &Config) -> Result<Connection> {
    let lock = SessionLock::for_config(config)?;
    let client = get_client(config).await?;
    Ok(Connection {
        remote: TelegramRemote::new(client.client.clone()),
        _client: client,
        _lock: lock,
    })
}
