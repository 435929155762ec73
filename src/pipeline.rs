use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::detection::Predictor;
use crate::error::PipelineError;
use crate::formatter::format_result;
use crate::platform::{IncomingMessage, MessageContent, PhotoRef, PhotoSource, ReplySink};
use crate::storage::Uploader;

pub const ACK_TEXT: &str = "Please send me a photo and I will tell you which objects are in it.";
pub const RECEIVED_TEXT: &str = "I received the photo. Let me process it :)";

/// Where a single message is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Downloading,
    Uploading,
    Predicting,
    Formatting,
    Replying,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Downloading => "downloading",
            Stage::Uploading => "uploading",
            Stage::Predicting => "predicting",
            Stage::Formatting => "formatting",
            Stage::Replying => "replying",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a run ended and what the user was told.
#[derive(Debug)]
pub enum Outcome {
    Done {
        reply: String,
    },
    Failed {
        /// Stage that was active when the error happened
        at: Stage,
        error: PipelineError,
        reply: String,
    },
}

impl Outcome {
    pub fn reply(&self) -> &str {
        match self {
            Outcome::Done { reply } | Outcome::Failed { reply, .. } => reply,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Outcome::Done { .. } => Stage::Done,
            Outcome::Failed { .. } => Stage::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done { .. } => write!(f, "done"),
            Outcome::Failed { at, error, .. } => write!(f, "failed while {}: {}", at, error),
        }
    }
}

/// Per-message state carried through one run.
struct Run {
    chat_id: i64,
    stage: Stage,
    /// Every stage entered, starting with `Received`
    trail: Vec<Stage>,
}

impl Run {
    fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            stage: Stage::Received,
            trail: vec![Stage::Received],
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!("chat {}: {} -> {}", self.chat_id, self.stage, next);
        self.stage = next;
        self.trail.push(next);
    }
}

/// Handles one incoming message end to end: download, upload, predict,
/// format, reply. Holds no per-message state, so one instance serves
/// concurrent messages.
pub struct MessagePipeline {
    replies: Arc<dyn ReplySink>,
    photos: Arc<dyn PhotoSource>,
    uploader: Arc<dyn Uploader>,
    predictor: Arc<dyn Predictor>,
    staging_dir: PathBuf,
}

impl MessagePipeline {
    pub fn new(
        replies: Arc<dyn ReplySink>,
        photos: Arc<dyn PhotoSource>,
        uploader: Arc<dyn Uploader>,
        predictor: Arc<dyn Predictor>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            replies,
            photos,
            uploader,
            predictor,
            staging_dir,
        }
    }

    /// Run the message to completion. Never returns an error: failures are
    /// reported to the chat and described in the returned `Outcome`.
    pub async fn handle(&self, msg: &IncomingMessage) -> Outcome {
        self.handle_traced(msg).await.0
    }

    /// `handle`, also returning the stages the run went through.
    async fn handle_traced(&self, msg: &IncomingMessage) -> (Outcome, Vec<Stage>) {
        info!("Incoming message in chat {}: {:?}", msg.chat_id, msg.content);

        let mut run = Run::new(msg.chat_id);

        if !msg.is_photo() {
            run.advance(Stage::Replying);
            self.send(msg.chat_id, ACK_TEXT).await;
            run.advance(Stage::Done);
            let outcome = Outcome::Done {
                reply: ACK_TEXT.to_string(),
            };
            return (outcome, run.trail);
        }

        let staging = self.staging_dir.join(Uuid::new_v4().to_string());
        let result = self.process_photo(msg, &staging, &mut run).await;
        remove_staging(&staging).await;

        let outcome = match result {
            Ok(reply) => {
                run.advance(Stage::Replying);
                self.send(msg.chat_id, &reply).await;
                run.advance(Stage::Done);
                Outcome::Done { reply }
            }
            Err(error) => {
                let at = run.stage;
                error!("chat {}: failed while {}: {}", msg.chat_id, at, error);
                let reply = format!("Error :( : {}", error);
                run.advance(Stage::Replying);
                self.send(msg.chat_id, &reply).await;
                run.advance(Stage::Failed);
                Outcome::Failed { at, error, reply }
            }
        };
        (outcome, run.trail)
    }

    async fn process_photo(
        &self,
        msg: &IncomingMessage,
        staging: &Path,
        run: &mut Run,
    ) -> Result<String, PipelineError> {
        run.advance(Stage::Downloading);
        let photo_path = self.download(msg, staging).await?;
        self.send(msg.chat_id, RECEIVED_TEXT).await;

        run.advance(Stage::Uploading);
        let reference = self.uploader.upload(&photo_path).await?;
        info!("chat {}: photo uploaded as {}", msg.chat_id, reference);

        run.advance(Stage::Predicting);
        let result = self.predictor.predict(&reference).await?;

        run.advance(Stage::Formatting);
        Ok(format_result(&result))
    }

    /// Fetch the photo into `staging` and return the local path.
    async fn download(
        &self,
        msg: &IncomingMessage,
        staging: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let MessageContent::Photo(photo) = &msg.content else {
            return Err(PipelineError::Download(
                "Message content of type 'photo' expected".to_string(),
            ));
        };

        let bytes = self.photos.fetch_photo(photo).await?;

        tokio::fs::create_dir_all(staging)
            .await
            .map_err(|e| PipelineError::Download(format!("{}: {}", staging.display(), e)))?;

        let path = staging.join(staged_file_name(photo));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| PipelineError::Download(format!("{}: {}", path.display(), e)))?;

        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.replies.send_text(chat_id, text).await {
            error!("Failed to send reply to chat {}: {:#}", chat_id, e);
        }
    }
}

/// `<file_id>.jpg`, with anything outside `[A-Za-z0-9_-]` replaced.
fn staged_file_name(photo: &PhotoRef) -> String {
    let stem: String = photo
        .file_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.jpg", stem)
}

async fn remove_staging(staging: &Path) {
    match tokio::fs::remove_dir_all(staging).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staging directory {}: {}", staging.display(), e),
    }
}
