use thiserror::Error;

/// Errors raised by the progress core. All of them are local to the call
/// that produced them; the player record is left untouched.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("score delta must be non-negative, got {0}")]
    InvalidScoreDelta(i64),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
