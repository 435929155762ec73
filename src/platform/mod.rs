pub mod telegram;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PipelineError;

/// A photo as the chat platform knows it, before it is downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Photo(PhotoRef),
}

/// A message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub content: MessageContent,
}

impl IncomingMessage {
    pub fn is_photo(&self) -> bool {
        matches!(self.content, MessageContent::Photo(_))
    }
}

/// Where replies to a chat go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

/// Where photo bytes come from.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, PipelineError>;
}

// ── Webhook payload ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WebhookChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPhotoSize {
    pub file_id: String,
}

/// The `message` object of a webhook delivery:
/// `{ chat: { id }, photo?: [...], text?: string }`.
#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub chat: WebhookChat,
    #[serde(default)]
    pub photo: Option<Vec<WebhookPhotoSize>>,
    #[serde(default)]
    pub text: Option<String>,
}

/// An update as Telegram posts it to the webhook; only `message` is used.
#[derive(Debug, Deserialize)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<WebhookMessage>,
}

impl From<WebhookMessage> for IncomingMessage {
    fn from(msg: WebhookMessage) -> Self {
        // Sizes are sent smallest first; keep the largest
        let largest = msg
            .photo
            .and_then(|sizes| sizes.into_iter().last())
            .map(|size| PhotoRef {
                file_id: size.file_id,
            });

        let content = match largest {
            Some(photo) => MessageContent::Photo(photo),
            None => MessageContent::Text(msg.text.unwrap_or_default()),
        };

        IncomingMessage {
            chat_id: msg.chat.id,
            content,
        }
    }
}
