//! Upload one folder without going through the main CLI.
//!
//! Usage: upload_folder <folder> [destination]

use std::path::PathBuf;

use tg_turbo::commands::upload;
use tg_turbo::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tg_turbo=info".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(folder) = args.next() else {
        anyhow::bail!("usage: upload_folder <folder> [destination]");
    };
    let destination = args.next();

    let config = Config::new();
    upload::upload(&config, &PathBuf::from(folder), destination.as_deref(), false).await?;
    Ok(())
}
