//! tg_turbo CLI - main entry point

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use tg_turbo::{commands, metrics, Config};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tg_turbo")]
#[command(about = "Resumable Telegram media clone, download and upload", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Config file (defaults to ./config.yml, then ../config.yml)
    #[arg(long, env = "TG_TURBO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the session file (interactive)
    Login,

    /// Copy every new message of a chat into another chat
    Clone {
        /// Source chat: id, @username or t.me link
        source: String,

        /// Destination chat; a new channel is created when omitted
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Download every new media item of a chat
    DownloadChat {
        /// Chat: id, @username or t.me link
        source: String,
    },

    /// Download the media of a single message link
    DownloadMedia {
        /// https://t.me/c/<chat>/<msg> or https://t.me/<username>/<msg>
        link: String,
    },

    /// Archive, re-encode, split, tag and upload a local folder
    Upload {
        /// Folder to upload
        folder: PathBuf,

        /// Destination chat for a folder with no recorded chat; a new channel is created when omitted
        #[arg(short, long)]
        destination: Option<String>,

        /// Delete corrupted videos without asking
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },

    /// Download each media item of a chat and upload it to another chat
    DownUp {
        /// Source chat: id, @username or t.me link
        source: String,

        /// Destination chat; a new channel is created when omitted
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Convert every video in a folder to h264/aac mp4
    Reencode {
        /// Folder to process
        folder: PathBuf,

        /// Delete corrupted videos without asking
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },

    /// Pick an operation interactively
    Menu,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Login => "login",
            Commands::Clone { .. } => "clone",
            Commands::DownloadChat { .. } => "download_chat",
            Commands::DownloadMedia { .. } => "download_media",
            Commands::Upload { .. } => "upload",
            Commands::DownUp { .. } => "down_up",
            Commands::Reencode { .. } => "reencode",
            Commands::Menu => "menu",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tg_turbo=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path).map_err(anyhow::Error::msg)?,
        None => Config::new(),
    };

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = tokio::select! {
        result = execute_command(cli.command, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!(command = command_name, "Interrupted, progress saved up to the last finished item");
            println!("\n⏹️  Interrupted");
            Ok(())
        }
    };

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Login => {
            commands::login::run(config).await?;
        }
        Commands::Clone {
            source,
            destination,
        } => {
            commands::transfer::clone(config, &source, destination.as_deref()).await?;
        }
        Commands::DownloadChat { source } => {
            commands::transfer::download_chat(config, &source).await?;
        }
        Commands::DownloadMedia { link } => {
            commands::transfer::download_media(config, &link).await?;
        }
        Commands::Upload {
            folder,
            destination,
            yes,
        } => {
            commands::upload::upload(config, &folder, destination.as_deref(), yes).await?;
        }
        Commands::DownUp {
            source,
            destination,
        } => {
            commands::transfer::down_up(config, &source, destination.as_deref()).await?;
        }
        Commands::Reencode { folder, yes } => {
            let report = commands::upload::reencode(&folder, yes).await?;
            println!(
                "✅ Re-encode finished: {} converted, {} failed",
                report.converted, report.failed
            );
        }
        Commands::Menu => {
            commands::menu::run(config).await?;
        }
    }

    Ok(())
}
