use crate::models::Stage;
use thiserror::Error;

/// Startup configuration problems. These never reach a pipeline run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure of a single structured call to the reasoning service.
///
/// Callers treat every variant the same way; the split only exists so logs
/// say what went wrong.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("reasoning service error: {0}")]
    Remote(String),

    #[error("response did not match the expected schema: {0}")]
    Decoding(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("email request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email service rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A fatal failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}
