//! Chat history reader
//!
//! Pulls history newest-first and stops at the first message already covered
//! by the checkpoint, then hands the gap back oldest-first.

use tracing::debug;

use crate::error::Result;
use crate::remote::{ChatInfo, RemoteMessage, RemoteService};

/// Fetch every message newer than `since_id`, oldest first.
pub async fn fetch_since<R: RemoteService>(
    remote: &R,
    chat: &ChatInfo,
    since_id: i64,
    page_size: usize,
) -> Result<Vec<RemoteMessage>> {
    let page_size = page_size.max(1);
    let mut collected: Vec<RemoteMessage> = Vec::new();
    let mut offset_id = 0;

    'pages: loop {
        let page = remote.history_page(chat, offset_id, page_size).await?;
        let page_len = page.len();
        debug!(chat = chat.id, offset_id, page_len, "Fetched history page");

        for message in page {
            if i64::from(message.id) <= since_id {
                break 'pages;
            }
            offset_id = message.id;
            collected.push(message);
        }

        if page_len < page_size || offset_id <= 1 {
            break;
        }
    }

    collected.reverse();
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRef;
    use crate::error::Error;
    use crate::remote::{AdminRights, OutgoingFile};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    /// History of ids `1..=newest`, served in pages.
    struct PagedHistory {
        newest: i32,
        calls: RefCell<Vec<i32>>,
    }

    impl RemoteService for PagedHistory {
        async fn resolve_chat(&self, _chat: &ChatRef) -> Result<ChatInfo> {
            unreachable!()
        }

        async fn history_page(
            &self,
            _chat: &ChatInfo,
            offset_id: i32,
            limit: usize,
        ) -> Result<Vec<RemoteMessage>> {
            self.calls.borrow_mut().push(offset_id);
            let start = if offset_id == 0 { self.newest } else { offset_id - 1 };
            Ok((1..=start)
                .rev()
                .take(limit)
                .map(|id| RemoteMessage::text(id, format!("m{}", id)))
                .collect())
        }

        async fn message_by_id(&self, _: &ChatInfo, _: i32) -> Result<Option<RemoteMessage>> {
            unreachable!()
        }

        async fn download_media(
            &self,
            _: &ChatInfo,
            _: &RemoteMessage,
            _: &Path,
        ) -> Result<Option<PathBuf>> {
            unreachable!()
        }

        async fn send_text(&self, _: &ChatInfo, _: &str) -> Result<i32> {
            unreachable!()
        }

        async fn send_file(&self, _: &ChatInfo, _: &OutgoingFile) -> Result<i32> {
            unreachable!()
        }

        async fn forward(&self, _: &ChatInfo, _: &ChatInfo, _: i32) -> Result<()> {
            unreachable!()
        }

        async fn create_channel(&self, _: &str, _: &str) -> Result<ChatInfo> {
            unreachable!()
        }

        async fn set_description(&self, _: &ChatInfo, _: &str) -> Result<()> {
            unreachable!()
        }

        async fn export_invite_link(&self, _: &ChatInfo) -> Result<String> {
            Err(Error::Unknown("unused".into()))
        }

        async fn promote_admin(&self, _: &ChatInfo, _: &str, _: AdminRights) -> Result<()> {
            unreachable!()
        }

        async fn pin_message(&self, _: &ChatInfo, _: i32) -> Result<()> {
            unreachable!()
        }
    }

    fn chat() -> ChatInfo {
        ChatInfo {
            id: 1001,
            title: "source".into(),
            protected: false,
        }
    }

    fn ids(messages: &[RemoteMessage]) -> Vec<i32> {
        messages.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn returns_only_newer_messages_oldest_first() {
        let remote = PagedHistory {
            newest: 502,
            calls: RefCell::new(Vec::new()),
        };
        let messages = fetch_since(&remote, &chat(), 500, 100).await.unwrap();
        assert_eq!(ids(&messages), vec![501, 502]);
        assert_eq!(*remote.calls.borrow(), vec![0]);
    }

    #[tokio::test]
    async fn paginates_across_page_boundaries() {
        let remote = PagedHistory {
            newest: 25,
            calls: RefCell::new(Vec::new()),
        };
        let messages = fetch_since(&remote, &chat(), 3, 10).await.unwrap();
        assert_eq!(ids(&messages), (4..=25).collect::<Vec<_>>());
        assert_eq!(*remote.calls.borrow(), vec![0, 16, 6]);
    }

    #[tokio::test]
    async fn zero_checkpoint_reads_entire_history() {
        let remote = PagedHistory {
            newest: 7,
            calls: RefCell::new(Vec::new()),
        };
        let messages = fetch_since(&remote, &chat(), 0, 3).await.unwrap();
        assert_eq!(ids(&messages), (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn up_to_date_checkpoint_yields_nothing() {
        let remote = PagedHistory {
            newest: 40,
            calls: RefCell::new(Vec::new()),
        };
        let messages = fetch_since(&remote, &chat(), 40, 10).await.unwrap();
        assert!(messages.is_empty());
    }
}
