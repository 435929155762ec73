/// Failures that abort a pipeline run. Each one ends up as a single
/// `Error :( : ...` reply to the originating chat.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to download photo: {0}")]
    Download(String),
    #[error("Failed to upload photo: {0}")]
    Upload(String),
    #[error("Failed to get prediction from detection service: {0}")]
    Service(String),
}
