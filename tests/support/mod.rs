//! In-memory Telegram and ffmpeg stand-ins shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tg_turbo::remote::AdminRights;
use tg_turbo::transcode::{StreamKind, TranscodeOutcome, Transcoder};
use tg_turbo::{ChatInfo, ChatRef, Error, OutgoingFile, RemoteMessage, RemoteService, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(i64, String),
    File(i64, String),
    Forward(i32),
    Channel(String),
    Pin(i32),
}

#[derive(Default)]
pub struct MemoryTelegram {
    pub chats: Vec<ChatInfo>,
    pub history: Vec<RemoteMessage>,
    pub log: RefCell<Vec<Sent>>,
    pub downloads: RefCell<Vec<i32>>,
    next_id: RefCell<i32>,
}

impl MemoryTelegram {
    pub fn new(chats: Vec<ChatInfo>, history: Vec<RemoteMessage>) -> Self {
        Self {
            chats,
            history,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<Sent> {
        self.log.borrow().clone()
    }

    pub fn files_sent(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::File(_, caption) => Some(caption),
                _ => None,
            })
            .collect()
    }

    fn next(&self) -> i32 {
        let mut id = self.next_id.borrow_mut();
        *id += 1;
        *id
    }
}

pub fn chat(id: i64, title: &str) -> ChatInfo {
    ChatInfo {
        id,
        title: title.to_string(),
        protected: false,
    }
}

impl RemoteService for MemoryTelegram {
    async fn resolve_chat(&self, chat: &ChatRef) -> Result<ChatInfo> {
        match chat {
            ChatRef::Id(id) => self
                .chats
                .iter()
                .find(|c| c.id == *id)
                .cloned()
                .ok_or_else(|| Error::ChatNotFound(id.to_string())),
            other => Err(Error::ChatNotFound(other.to_string())),
        }
    }

    async fn history_page(
        &self,
        _chat: &ChatInfo,
        offset_id: i32,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>> {
        let mut page: Vec<_> = self
            .history
            .iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .cloned()
            .collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(limit);
        Ok(page)
    }

    async fn message_by_id(&self, _chat: &ChatInfo, id: i32) -> Result<Option<RemoteMessage>> {
        Ok(self.history.iter().find(|m| m.id == id).cloned())
    }

    async fn download_media(
        &self,
        _chat: &ChatInfo,
        message: &RemoteMessage,
        dest: &Path,
    ) -> Result<Option<PathBuf>> {
        self.downloads.borrow_mut().push(message.id);
        if !message.media.is_downloadable() {
            return Ok(None);
        }
        fs::create_dir_all(dest)?;
        let path = dest.join(message.media.file_name(message.id));
        fs::write(&path, b"media")?;
        Ok(Some(path))
    }

    async fn send_text(&self, chat: &ChatInfo, text: &str) -> Result<i32> {
        self.log.borrow_mut().push(Sent::Text(chat.id, text.to_string()));
        Ok(self.next())
    }

    async fn send_file(&self, chat: &ChatInfo, file: &OutgoingFile) -> Result<i32> {
        self.log
            .borrow_mut()
            .push(Sent::File(chat.id, file.caption.clone()));
        Ok(self.next())
    }

    async fn forward(&self, _source: &ChatInfo, _destination: &ChatInfo, id: i32) -> Result<()> {
        self.log.borrow_mut().push(Sent::Forward(id));
        Ok(())
    }

    async fn create_channel(&self, title: &str, _about: &str) -> Result<ChatInfo> {
        self.log.borrow_mut().push(Sent::Channel(title.to_string()));
        Ok(chat(-1_000_000_000_777, title))
    }

    async fn set_description(&self, _chat: &ChatInfo, _about: &str) -> Result<()> {
        Ok(())
    }

    async fn export_invite_link(&self, _chat: &ChatInfo) -> Result<String> {
        Err(Error::TelegramError("CHAT_ADMIN_REQUIRED".into()))
    }

    async fn promote_admin(&self, _chat: &ChatInfo, _user: &str, _rights: AdminRights) -> Result<()> {
        Ok(())
    }

    async fn pin_message(&self, _chat: &ChatInfo, id: i32) -> Result<()> {
        self.log.borrow_mut().push(Sent::Pin(id));
        Ok(())
    }
}

/// Every file probes as given in `codecs` (default h264/aac, 60 s).
#[derive(Default)]
pub struct ScriptedFfmpeg {
    pub codecs: HashMap<String, (String, String)>,
    pub commands: RefCell<Vec<Vec<String>>>,
}

impl ScriptedFfmpeg {
    pub fn with_codecs(mut self, file_name: &str, video: &str, audio: &str) -> Self {
        self.codecs
            .insert(file_name.to_string(), (video.to_string(), audio.to_string()));
        self
    }

    fn codecs_for(&self, path: &Path) -> (String, String) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.codecs
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ("h264".to_string(), "aac".to_string()))
    }
}

impl Transcoder for ScriptedFfmpeg {
    async fn probe_codec(&self, path: &Path, kind: StreamKind) -> Result<String> {
        let (video, audio) = self.codecs_for(path);
        Ok(match kind {
            StreamKind::Video => video,
            StreamKind::Audio => audio,
        })
    }

    async fn probe_duration(&self, _path: &Path) -> Result<Option<f64>> {
        Ok(Some(60.0))
    }

    async fn is_corrupted(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    async fn run(&self, cmd: &[String]) -> Result<TranscodeOutcome> {
        self.commands.borrow_mut().push(cmd.to_vec());
        if let Some(output) = cmd.last() {
            if output.contains("%03d") {
                for i in 1..=2 {
                    fs::write(output.replace("%03d", &format!("{:03}", i)), b"part")?;
                }
            } else {
                fs::write(output, b"converted")?;
            }
        }
        Ok(TranscodeOutcome::ok())
    }
}
