//! grammers-backed implementation of [`RemoteService`]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use grammers_client::types::media::Document;
use grammers_client::types::peer::Peer;
use grammers_client::types::{Attribute, Media, Message};
use grammers_client::{Client, InputMessage};
use grammers_tl_types as tl;
use tracing::{debug, info, warn};

use crate::chat::{
    marked_peer_id, peer_is_protected, peer_name, peer_to_input, peer_to_input_channel,
    peer_to_input_user, resolve_peer, ChatRef,
};
use crate::error::{Error, Result};
use crate::remote::{
    AdminRights, ChatInfo, MediaKind, OutgoingFile, RemoteMessage, RemoteService, SendKind,
};

/// Map any client-side failure through the RPC classifier.
fn telegram_err(err: impl std::fmt::Display) -> Error {
    Error::from_telegram_message(&err.to_string())
}

/// Telegram remote backed by a connected grammers [`Client`].
///
/// Resolved peers are cached by marked id so later calls can reuse their
/// access hashes without another dialog scan.
pub struct TelegramRemote {
    client: Client,
    peers: Mutex<HashMap<i64, Peer>>,
}

impl TelegramRemote {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            peers: Mutex::new(HashMap::new()),
        }
    }

    fn remember(&self, peer: Peer) -> ChatInfo {
        let info = ChatInfo {
            id: marked_peer_id(&peer),
            title: peer_name(&peer),
            protected: peer_is_protected(&peer),
        };
        if let Ok(mut peers) = self.peers.lock() {
            peers.insert(info.id, peer);
        }
        info
    }

    async fn peer(&self, chat: &ChatInfo) -> Result<Peer> {
        let cached = self
            .peers
            .lock()
            .ok()
            .and_then(|peers| peers.get(&chat.id).cloned());
        match cached {
            Some(peer) => Ok(peer),
            None => {
                let peer = resolve_peer(&self.client, &ChatRef::Id(chat.id)).await?;
                self.remember(peer.clone());
                Ok(peer)
            }
        }
    }

    async fn input_channel(&self, chat: &ChatInfo) -> Result<tl::enums::InputChannel> {
        let peer = self.peer(chat).await?;
        peer_to_input_channel(&peer)
            .ok_or_else(|| Error::InvalidArgument(format!("{} is not a channel", chat.title)))
    }

    async fn raw_message(&self, chat: &ChatInfo, id: i32) -> Result<Option<Message>> {
        let peer = self.peer(chat).await?;
        let mut messages = self
            .client
            .get_messages_by_id(&peer, &[id])
            .await
            .map_err(telegram_err)?;
        Ok(messages.pop().flatten())
    }

    async fn resolve_user(&self, user: &str) -> Result<tl::enums::InputUser> {
        let chat = ChatRef::parse(user)?;
        let peer = resolve_peer(&self.client, &chat).await?;
        peer_to_input_user(&peer)
            .ok_or_else(|| Error::InvalidArgument(format!("{} is not a user", user)))
    }
}

fn document_kind(doc: &Document) -> MediaKind {
    let Some(tl::enums::Document::Document(raw)) = &doc.raw.document else {
        return MediaKind::Document {
            file_name: None,
            mime_type: None,
            size: 0,
        };
    };

    let size = raw.size.max(0) as u64;
    let mut file_name = None;
    let mut animated = false;
    let mut video = None;
    let mut audio = None;
    let mut sticker = false;

    for attribute in &raw.attributes {
        match attribute {
            tl::enums::DocumentAttribute::Filename(f) => file_name = Some(f.file_name.clone()),
            tl::enums::DocumentAttribute::Animated => animated = true,
            tl::enums::DocumentAttribute::Sticker(_) => sticker = true,
            tl::enums::DocumentAttribute::Video(v) => {
                video = Some((v.round_message, v.duration as u32));
            }
            tl::enums::DocumentAttribute::Audio(a) => audio = Some((a.voice, a.duration as u32)),
            _ => {}
        }
    }

    if sticker {
        return MediaKind::Sticker;
    }
    if animated {
        return MediaKind::Animation { file_name };
    }
    match (video, audio) {
        (Some((true, duration)), _) => MediaKind::VideoNote { duration },
        (Some((false, duration)), _) => MediaKind::Video {
            file_name,
            duration,
            size,
        },
        (None, Some((true, duration))) => MediaKind::Voice { duration },
        (None, Some((false, _))) => MediaKind::Audio { file_name, size },
        (None, None) => MediaKind::Document {
            file_name,
            mime_type: Some(raw.mime_type.clone()),
            size,
        },
    }
}

fn media_kind(media: Option<Media>) -> MediaKind {
    match media {
        None => MediaKind::Text,
        Some(Media::Photo(_)) => MediaKind::Photo,
        Some(Media::Sticker(_)) => MediaKind::Sticker,
        Some(Media::Document(doc)) => document_kind(&doc),
        Some(Media::Contact(contact)) => MediaKind::Contact {
            phone: contact.phone_number().to_string(),
            name: format!("{} {}", contact.first_name(), contact.last_name())
                .trim()
                .to_string(),
        },
        Some(Media::Geo(geo)) => MediaKind::Location {
            // grammers 0.8 spells the getter this way
            latitude: geo.latitue(),
            longitude: geo.longitude(),
        },
        // Polls, dice, venues and web previews carry nothing to transfer.
        Some(_) => MediaKind::Text,
    }
}

fn to_remote(message: &Message) -> RemoteMessage {
    RemoteMessage {
        id: message.id(),
        text: message.text().to_string(),
        media: media_kind(message.media()),
    }
}

fn admin_rights(rights: AdminRights) -> tl::enums::ChatAdminRights {
    tl::enums::ChatAdminRights::Rights(tl::types::ChatAdminRights {
        change_info: rights.change_info,
        post_messages: rights.post_messages,
        edit_messages: rights.edit_messages,
        delete_messages: rights.delete_messages,
        ban_users: rights.ban_users,
        invite_users: rights.invite_users,
        pin_messages: rights.pin_messages,
        add_admins: rights.add_admins,
        anonymous: false,
        manage_call: rights.manage_call,
        other: rights.manage_chat,
        manage_topics: false,
        post_stories: false,
        edit_stories: false,
        delete_stories: false,
        manage_direct_messages: false,
    })
}

/// First channel found in an `Updates` payload.
fn created_channel_id(updates: &tl::enums::Updates) -> Option<i64> {
    let chats = match updates {
        tl::enums::Updates::Updates(u) => &u.chats,
        tl::enums::Updates::Combined(u) => &u.chats,
        _ => return None,
    };
    chats.iter().find_map(|chat| match chat {
        tl::enums::Chat::Channel(c) => Some(c.id),
        _ => None,
    })
}

impl RemoteService for TelegramRemote {
    async fn resolve_chat(&self, chat: &ChatRef) -> Result<ChatInfo> {
        let peer = resolve_peer(&self.client, chat).await?;
        let info = self.remember(peer);
        debug!(chat = %chat, id = info.id, title = %info.title, "Resolved chat");
        Ok(info)
    }

    async fn history_page(
        &self,
        chat: &ChatInfo,
        offset_id: i32,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>> {
        let peer = self.peer(chat).await?;
        let mut iter = self
            .client
            .iter_messages(&peer)
            .offset_id(offset_id)
            .limit(limit);

        let mut page = Vec::with_capacity(limit);
        while let Some(message) = iter.next().await.map_err(telegram_err)? {
            page.push(to_remote(&message));
        }
        Ok(page)
    }

    async fn message_by_id(&self, chat: &ChatInfo, id: i32) -> Result<Option<RemoteMessage>> {
        Ok(self.raw_message(chat, id).await?.as_ref().map(to_remote))
    }

    async fn download_media(
        &self,
        chat: &ChatInfo,
        message: &RemoteMessage,
        dest: &Path,
    ) -> Result<Option<PathBuf>> {
        if !message.media.is_downloadable() {
            return Ok(None);
        }
        // Refetch so the file reference is fresh.
        let Some(raw) = self.raw_message(chat, message.id).await? else {
            return Err(Error::InvalidReference(format!(
                "message {} no longer exists",
                message.id
            )));
        };
        let Some(media) = raw.media() else {
            return Ok(None);
        };

        std::fs::create_dir_all(dest)?;
        let path = dest.join(message.media.file_name(message.id));
        self.client
            .download_media(&media, &path)
            .await
            .map_err(telegram_err)?;
        Ok(Some(path))
    }

    async fn send_text(&self, chat: &ChatInfo, text: &str) -> Result<i32> {
        let peer = self.peer(chat).await?;
        let sent = self
            .client
            .send_message(&peer, text)
            .await
            .map_err(telegram_err)?;
        Ok(sent.id())
    }

    async fn send_file(&self, chat: &ChatInfo, file: &OutgoingFile) -> Result<i32> {
        let peer = self.peer(chat).await?;
        let uploaded = self
            .client
            .upload_file(&file.path)
            .await
            .map_err(telegram_err)?;
        let mime = mime_guess::from_path(&file.path).first_or_octet_stream();

        let message = InputMessage::from(file.caption.as_str());
        let message = match file.kind {
            SendKind::Photo => message.photo(uploaded),
            SendKind::Video { duration } => message
                .document(uploaded)
                .mime_type(mime.essence_str())
                .attribute(Attribute::Video {
                    round_message: false,
                    supports_streaming: true,
                    duration: Duration::from_secs(u64::from(duration)),
                    w: 0,
                    h: 0,
                }),
            SendKind::Voice => message
                .document(uploaded)
                .mime_type(mime.essence_str())
                .attribute(Attribute::Voice {
                    duration: Duration::ZERO,
                    waveform: None,
                }),
            SendKind::Audio
            | SendKind::Animation
            | SendKind::Sticker
            | SendKind::Document => message.document(uploaded).mime_type(mime.essence_str()),
        };

        let sent = self
            .client
            .send_message(&peer, message)
            .await
            .map_err(telegram_err)?;
        Ok(sent.id())
    }

    async fn forward(&self, source: &ChatInfo, destination: &ChatInfo, id: i32) -> Result<()> {
        let from = self.peer(source).await?;
        let to = self.peer(destination).await?;
        self.client
            .forward_messages(&to, &[id], &from)
            .await
            .map_err(telegram_err)?;
        Ok(())
    }

    async fn create_channel(&self, title: &str, about: &str) -> Result<ChatInfo> {
        let request = tl::functions::channels::CreateChannel {
            broadcast: true,
            megagroup: false,
            for_import: false,
            forum: false,
            title: title.to_string(),
            about: about.to_string(),
            geo_point: None,
            address: None,
            ttl_period: None,
        };
        let updates = self.client.invoke(&request).await?;
        let channel_id = created_channel_id(&updates)
            .ok_or_else(|| Error::TelegramError("channel creation returned no chat".into()))?;

        info!(channel_id, title, "Created channel");
        self.resolve_chat(&ChatRef::Id(crate::chat::channel_marked_id(channel_id)))
            .await
    }

    async fn set_description(&self, chat: &ChatInfo, about: &str) -> Result<()> {
        let peer = self.peer(chat).await?;
        let request = tl::functions::messages::EditChatAbout {
            peer: peer_to_input(&peer),
            about: about.to_string(),
        };
        self.client.invoke(&request).await?;
        Ok(())
    }

    async fn export_invite_link(&self, chat: &ChatInfo) -> Result<String> {
        let peer = self.peer(chat).await?;
        let request = tl::functions::messages::ExportChatInvite {
            legacy_revoke_permanent: false,
            request_needed: false,
            peer: peer_to_input(&peer),
            expire_date: None,
            usage_limit: None,
            title: None,
            subscription_pricing: None,
        };
        match self.client.invoke(&request).await? {
            tl::enums::ExportedChatInvite::ChatInviteExported(invite) => Ok(invite.link),
            tl::enums::ExportedChatInvite::ChatInvitePublicJoinRequests => Err(
                Error::TelegramError(format!("{} only accepts join requests", chat.title)),
            ),
        }
    }

    async fn promote_admin(&self, chat: &ChatInfo, user: &str, rights: AdminRights) -> Result<()> {
        let channel = self.input_channel(chat).await?;
        let user_id = self.resolve_user(user).await?;

        let invite = tl::functions::channels::InviteToChannel {
            channel: channel.clone(),
            users: vec![user_id.clone()],
        };
        if let Err(e) = self.client.invoke(&invite).await {
            // Already-present members are fine; promotion below still applies.
            warn!(user, "Failed to invite admin: {}", e);
        }

        let promote = tl::functions::channels::EditAdmin {
            channel,
            user_id,
            admin_rights: admin_rights(rights),
            rank: String::new(),
        };
        self.client.invoke(&promote).await?;
        info!(user, chat = %chat.title, "Promoted admin");
        Ok(())
    }

    async fn pin_message(&self, chat: &ChatInfo, id: i32) -> Result<()> {
        let peer = self.peer(chat).await?;
        self.client
            .pin_message(&peer, id)
            .await
            .map_err(telegram_err)?;
        Ok(())
    }
}
