//! Interactive menu collecting the same parameters as the subcommands

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};

use crate::config::Config;
use crate::error::Result;

const ACTIONS: &[&str] = &[
    "Clone a chat",
    "Download a whole chat",
    "Download one message",
    "Upload a folder",
    "Download and re-upload a chat",
    "Re-encode a folder",
    "Log in",
    "Quit",
];

fn ask(prompt: &str) -> Result<String> {
    let value: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(value.trim().to_string())
}

fn ask_optional(prompt: &str) -> Result<Option<String>> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn ask_yes(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

pub async fn run(config: &Config) -> Result<()> {
    println!("🚀 tg_turbo");
    let selection = Select::new()
        .with_prompt("What do you want to do?")
        .items(ACTIONS)
        .default(0)
        .interact()?;

    match selection {
        0 => {
            let source = ask("Source chat (id, @username or link)")?;
            let destination = ask_optional("Destination chat (empty creates a channel)")?;
            super::transfer::clone(config, &source, destination.as_deref()).await?;
        }
        1 => {
            let source = ask("Chat (id, @username or link)")?;
            super::transfer::download_chat(config, &source).await?;
        }
        2 => {
            let link = ask("Message link (https://t.me/...)")?;
            super::transfer::download_media(config, &link).await?;
        }
        3 => {
            let folder = PathBuf::from(ask("Folder to upload")?);
            let destination = ask_optional("Destination chat (ignored when resuming, empty creates one)")?;
            let assume_yes = ask_yes("Delete corrupted videos without asking?")?;
            super::upload::upload(config, &folder, destination.as_deref(), assume_yes).await?;
        }
        4 => {
            let source = ask("Source chat (id, @username or link)")?;
            let destination = ask_optional("Destination chat (empty creates a channel)")?;
            super::transfer::down_up(config, &source, destination.as_deref()).await?;
        }
        5 => {
            let folder = PathBuf::from(ask("Folder to re-encode")?);
            super::upload::reencode(&folder, false).await?;
        }
        6 => super::login::run(config).await?,
        _ => println!("👋 Bye"),
    }
    Ok(())
}
