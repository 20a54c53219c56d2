//! Chat references and entity resolution

use std::fmt;

use grammers_client::types::peer::Peer;
use grammers_client::Client;
use grammers_tl_types as tl;
use regex::Regex;

use crate::error::{Error, Result};

/// A chat as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    /// Numeric id, either bare or marked (`-100…` channels, negative groups)
    Id(i64),
    /// Public username without `@`
    Username(String),
    /// Private invite hash (`t.me/+hash`, `t.me/joinchat/hash`)
    Invite(String),
}

impl ChatRef {
    /// Parse an id, `@username`, `t.me` link or invite link.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("empty chat reference".into()));
        }

        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(ChatRef::Id(id));
        }

        let path = trimmed
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.");

        if let Some(rest) = path
            .strip_prefix("t.me/")
            .or_else(|| path.strip_prefix("telegram.me/"))
        {
            let rest = rest.trim_end_matches('/');
            if let Some(hash) = rest
                .strip_prefix('+')
                .or_else(|| rest.strip_prefix("joinchat/"))
            {
                return Ok(ChatRef::Invite(hash.to_string()));
            }
            if let Some(id) = rest.strip_prefix("c/") {
                let id = id.split('/').next().unwrap_or_default();
                return id
                    .parse::<i64>()
                    .map(|bare| ChatRef::Id(channel_marked_id(bare)))
                    .map_err(|_| Error::InvalidArgument(format!("invalid chat link: {}", input)));
            }
            let username = rest.split('/').next().unwrap_or_default();
            return Self::username(username, input);
        }

        Self::username(trimmed.trim_start_matches('@'), input)
    }

    fn username(name: &str, input: &str) -> Result<Self> {
        let re = Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$")
            .map_err(|e| Error::Unknown(e.to_string()))?;
        if re.is_match(name) {
            Ok(ChatRef::Username(name.to_string()))
        } else {
            Err(Error::InvalidArgument(format!(
                "not a chat id, username or link: {}",
                input
            )))
        }
    }

    /// Id without the `-100` channel marker or the group minus sign.
    pub fn bare_id(&self) -> Option<i64> {
        match self {
            ChatRef::Id(id) => Some(bare_id(*id)),
            _ => None,
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id),
            ChatRef::Username(name) => write!(f, "@{}", name),
            ChatRef::Invite(hash) => write!(f, "t.me/+{}", hash),
        }
    }
}

/// A link to one message, as copied from the Telegram apps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLink {
    pub chat: ChatRef,
    pub message_id: i32,
}

impl MessageLink {
    /// Parse `https://t.me/c/<chat>/<msg>` or `https://t.me/<username>/<msg>`.
    pub fn parse(link: &str) -> Result<Self> {
        let re = Regex::new(r"t(?:elegram)?\.me/(?:(c)/)?([A-Za-z0-9_]+)/(?:\d+/)?(\d+)/?(?:\?.*)?$")
            .map_err(|e| Error::Unknown(e.to_string()))?;
        let caps = re
            .captures(link.trim())
            .ok_or_else(|| Error::InvalidArgument(format!("not a message link: {}", link)))?;

        let message_id = caps[3]
            .parse::<i32>()
            .map_err(|_| Error::InvalidArgument(format!("invalid message id in {}", link)))?;

        let chat = if caps.get(1).is_some() {
            let bare = caps[2]
                .parse::<i64>()
                .map_err(|_| Error::InvalidArgument(format!("invalid chat id in {}", link)))?;
            ChatRef::Id(channel_marked_id(bare))
        } else {
            ChatRef::Username(caps[2].to_string())
        };

        Ok(Self { chat, message_id })
    }
}

/// Turn a bare channel id into its `-100…` marked form.
pub fn channel_marked_id(bare: i64) -> i64 {
    -1_000_000_000_000 - bare
}

/// Strip channel/group markers from an id.
pub fn bare_id(id: i64) -> i64 {
    if id <= -1_000_000_000_000 {
        -id - 1_000_000_000_000
    } else {
        id.abs()
    }
}

/// Numeric id of a peer as used in the TL layer.
pub fn peer_id(peer: &Peer) -> i64 {
    match peer {
        Peer::User(user) => user.raw.id(),
        Peer::Channel(channel) => channel.raw.id,
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Empty(c) => c.id,
            tl::enums::Chat::Chat(c) => c.id,
            tl::enums::Chat::Forbidden(c) => c.id,
            tl::enums::Chat::Channel(c) => c.id,
            tl::enums::Chat::ChannelForbidden(c) => c.id,
        },
    }
}

/// Id in the form the Telegram apps show it (`-100…` for channels).
pub fn marked_peer_id(peer: &Peer) -> i64 {
    match peer {
        Peer::User(_) => peer_id(peer),
        Peer::Channel(channel) => channel_marked_id(channel.raw.id),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(c) => channel_marked_id(c.id),
            tl::enums::Chat::ChannelForbidden(c) => channel_marked_id(c.id),
            _ => -peer_id(peer),
        },
    }
}

/// Convert a Peer to InputPeer for raw API calls.
pub fn peer_to_input(peer: &Peer) -> tl::enums::InputPeer {
    match peer {
        Peer::User(user) => {
            let (user_id, access_hash) = match &user.raw {
                tl::enums::User::User(u) => (u.id, u.access_hash.unwrap_or(0)),
                tl::enums::User::Empty(u) => (u.id, 0),
            };
            tl::enums::InputPeer::User(tl::types::InputPeerUser {
                user_id,
                access_hash,
            })
        }
        Peer::Channel(channel) => tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
            channel_id: channel.raw.id,
            access_hash: channel.raw.access_hash.unwrap_or(0),
        }),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => {
                tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: c.id })
            }
            tl::enums::Chat::Channel(c) => {
                tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                    channel_id: c.id,
                    access_hash: c.access_hash.unwrap_or(0),
                })
            }
            _ => tl::enums::InputPeer::Empty,
        },
    }
}

/// Channel handle for `channels.*` requests; `None` for users and basic groups.
pub fn peer_to_input_channel(peer: &Peer) -> Option<tl::enums::InputChannel> {
    match peer_to_input(peer) {
        tl::enums::InputPeer::Channel(c) => {
            Some(tl::enums::InputChannel::Channel(tl::types::InputChannel {
                channel_id: c.channel_id,
                access_hash: c.access_hash,
            }))
        }
        _ => None,
    }
}

/// User handle for admin invitations; `None` for chats.
pub fn peer_to_input_user(peer: &Peer) -> Option<tl::enums::InputUser> {
    match peer_to_input(peer) {
        tl::enums::InputPeer::User(u) => Some(tl::enums::InputUser::User(tl::types::InputUser {
            user_id: u.user_id,
            access_hash: u.access_hash,
        })),
        _ => None,
    }
}

/// Whether the chat forbids forwarding and saving content.
pub fn peer_is_protected(peer: &Peer) -> bool {
    match peer {
        Peer::User(_) => false,
        Peer::Channel(channel) => channel.raw.noforwards,
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => c.noforwards,
            tl::enums::Chat::Channel(c) => c.noforwards,
            _ => false,
        },
    }
}

/// Get the display name for a peer
pub fn peer_name(peer: &Peer) -> String {
    peer.name()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Find a peer by bare id among the user's dialogs.
async fn find_in_dialogs(client: &Client, target: i64) -> Result<Peer> {
    let mut dialogs = client.iter_dialogs();

    while let Some(dialog) = dialogs
        .next()
        .await
        .map_err(|e| Error::TelegramError(e.to_string()))?
    {
        if peer_id(&dialog.peer) == target {
            return Ok(dialog.peer);
        }
    }

    Err(Error::ChatNotFound(format!(
        "Chat {} not found in dialogs",
        target
    )))
}

/// Resolve a [`ChatRef`] to an actual Peer
pub async fn resolve_peer(client: &Client, chat: &ChatRef) -> Result<Peer> {
    match chat {
        ChatRef::Id(id) => find_in_dialogs(client, bare_id(*id)).await,
        ChatRef::Username(username) => client
            .resolve_username(username)
            .await
            .map_err(|e| Error::TelegramError(e.to_string()))?
            .ok_or_else(|| Error::ChatNotFound(format!("Username @{} not found", username))),
        ChatRef::Invite(hash) => {
            let request = tl::functions::messages::CheckChatInvite { hash: hash.clone() };
            let invite = client.invoke(&request).await?;
            let chat_id = match invite {
                tl::enums::ChatInvite::Already(already) => match already.chat {
                    tl::enums::Chat::Empty(c) => c.id,
                    tl::enums::Chat::Chat(c) => c.id,
                    tl::enums::Chat::Forbidden(c) => c.id,
                    tl::enums::Chat::Channel(c) => c.id,
                    tl::enums::Chat::ChannelForbidden(c) => c.id,
                },
                _ => {
                    return Err(Error::ChatNotFound(format!(
                        "Join t.me/+{} before using it",
                        hash
                    )))
                }
            };
            find_in_dialogs(client, chat_id).await
        }
    }
}
