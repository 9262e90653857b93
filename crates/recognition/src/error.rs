use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("recognition service answered {status}: {message}")]
    Service { status: u16, message: String },
    #[error("malformed recognition response: {0}")]
    Malformed(#[from] serde_json::Error),
}
