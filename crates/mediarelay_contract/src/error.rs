use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source file unavailable: {0}")]
    Unavailable(String),
    #[error("access to source file denied: {0}")]
    PermissionDenied(String),
    #[error("source file too large: {0}")]
    TooLarge(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("staging i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("storage rejected upload: {0}")]
    Rejected(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to read staged file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("status message not modified")]
    NotModified,
    #[error("status render rejected: {0}")]
    Rejected(String),
    #[error("status transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("{0}")]
    Unexpected(String),
}

impl TransferError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Upload(_) => "upload",
            Self::Unexpected(_) => "unexpected",
        }
    }
}
