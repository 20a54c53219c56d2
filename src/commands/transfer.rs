//! clone, download-chat, download-media and down-up

use crate::chat::ChatRef;
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::error::Result;
use crate::transfer::{self, TransferReport, TransferSettings};

use super::connect;

fn parse_pair(source: &str, destination: Option<&str>) -> Result<(ChatRef, Option<ChatRef>)> {
    let source = ChatRef::parse(source)?;
    let destination = destination
        .filter(|d| !d.trim().is_empty())
        .map(ChatRef::parse)
        .transpose()?;
    Ok((source, destination))
}

pub async fn clone(config: &Config, source: &str, destination: Option<&str>) -> Result<TransferReport> {
    let (source, destination) = parse_pair(source, destination)?;
    let conn = connect(config).await?;
    let mut store = CheckpointStore::load(config.checkpoint_file.clone());
    let settings = TransferSettings::from_config(config);

    let report = transfer::clone_chat(
        &conn.remote,
        &mut store,
        &settings,
        &source,
        destination.as_ref(),
    )
    .await?;
    report.print_summary("Clone");
    Ok(report)
}

pub async fn download_chat(config: &Config, source: &str) -> Result<TransferReport> {
    let source = ChatRef::parse(source)?;
    let conn = connect(config).await?;
    let mut store = CheckpointStore::load(config.checkpoint_file.clone());
    let settings = TransferSettings::from_config(config);

    let report = transfer::download_chat(&conn.remote, &mut store, &settings, &source).await?;
    report.print_summary("Download");
    Ok(report)
}

pub async fn download_media(config: &Config, link: &str) -> Result<()> {
    let conn = connect(config).await?;
    let settings = TransferSettings::from_config(config);

    if transfer::download_single(&conn.remote, &settings, link)
        .await?
        .is_none()
    {
        println!("ℹ️  Nothing was downloaded from {}", link);
    }
    Ok(())
}

pub async fn down_up(config: &Config, source: &str, destination: Option<&str>) -> Result<TransferReport> {
    let (source, destination) = parse_pair(source, destination)?;
    let conn = connect(config).await?;
    let mut store = CheckpointStore::load(config.checkpoint_file.clone());
    let settings = TransferSettings::from_config(config);

    let report = transfer::down_up(
        &conn.remote,
        &mut store,
        &settings,
        &source,
        destination.as_ref(),
    )
    .await?;
    report.print_summary("Down-up");
    Ok(report)
}
