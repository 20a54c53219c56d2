//! Session initialization binary.

use tg_turbo::commands::login;
use tg_turbo::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    login::run(&Config::new()).await?;
    Ok(())
}
