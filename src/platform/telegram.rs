use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use teloxide::net::Download;
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::error::PipelineError;
use crate::pipeline::MessagePipeline;
use crate::platform::{
    IncomingMessage, MessageContent, PhotoRef, PhotoSource, ReplySink, WebhookUpdate,
};

/// Telegram as both the reply channel and the photo source.
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySink for TelegramChannel {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }
}

#[async_trait]
impl PhotoSource for TelegramChannel {
    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, PipelineError> {
        let file = self
            .bot
            .get_file(FileId(photo.file_id.clone()))
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        debug!("Downloaded {} ({} bytes)", file.path, data.len());
        Ok(data)
    }
}

/// Convert a teloxide message into the platform-agnostic form.
fn to_incoming(msg: &Message) -> IncomingMessage {
    let largest = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|size| PhotoRef {
            file_id: size.file.id.0.clone(),
        });

    let content = match largest {
        Some(photo) => MessageContent::Photo(photo),
        None => MessageContent::Text(msg.text().unwrap_or_default().to_string()),
    };

    IncomingMessage {
        chat_id: msg.chat.id.0,
        content,
    }
}

/// Drop any webhook left over from a previous run and log who we are.
pub async fn prepare(bot: &Bot) -> Result<()> {
    bot.delete_webhook()
        .await
        .context("Failed to remove existing webhook")?;

    let me = bot.get_me().await.context("Failed to fetch bot info")?;
    info!(
        "Telegram bot information: @{} (id {})",
        me.username(),
        me.id
    );
    Ok(())
}

/// Run the bot with long polling
pub async fn run_polling(bot: Bot, pipeline: Arc<MessagePipeline>) -> Result<()> {
    info!("Starting Telegram long polling...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pipeline])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, pipeline: Arc<MessagePipeline>) -> ResponseResult<()> {
    let incoming = to_incoming(&msg);
    let outcome = pipeline.handle(&incoming).await;
    debug!("Chat {} run {}", incoming.chat_id, outcome);
    Ok(())
}

/// Register `webhook` with Telegram and serve deliveries on
/// `POST /{bot_token}/`. Each delivery runs on its own task.
pub async fn run_webhook(
    bot: Bot,
    pipeline: Arc<MessagePipeline>,
    config: &TelegramConfig,
    webhook: url::Url,
) -> Result<()> {
    let mut request = bot.set_webhook(webhook);
    if let Some(cert) = &config.certificate {
        request = request.certificate(InputFile::file(cert.clone()));
    }
    request.await.context("Failed to set webhook")?;
    info!("Webhook registered");

    let app = webhook_router(pipeline, &config.bot_token);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    info!("Webhook server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .await
        .context("Webhook server error")?;

    Ok(())
}

/// Routes Telegram webhook deliveries at `POST /{bot_token}/` into the pipeline.
fn webhook_router(pipeline: Arc<MessagePipeline>, bot_token: &str) -> Router {
    Router::new()
        .route(&format!("/{}/", bot_token), post(receive_update))
        .with_state(pipeline)
}

async fn receive_update(
    State(pipeline): State<Arc<MessagePipeline>>,
    Json(update): Json<WebhookUpdate>,
) -> StatusCode {
    match update.message {
        Some(message) => {
            let incoming = IncomingMessage::from(message);
            tokio::spawn(async move {
                let outcome = pipeline.handle(&incoming).await;
                debug!("Chat {} run {}", incoming.chat_id, outcome);
            });
        }
        None => debug!("Ignoring update {} without a message", update.update_id),
    }
    StatusCode::OK
}
