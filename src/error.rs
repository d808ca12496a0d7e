//! Job error taxonomy.
//!
//! Every variant is fatal for the job: nothing is stored and the message is
//! not acknowledged, so the queue redelivers it.

use crate::imaging::BackendError;
use crate::request::RequestError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Malformed request: {0}")]
    MalformedRequest(#[from] RequestError),

    #[error("Failed to fetch source {blob}: {source}")]
    Fetch {
        blob: String,
        #[source]
        source: StorageError,
    },

    #[error("Source is not a valid image: {0}")]
    Decode(String),

    #[error("Unsupported image format: {file_name}")]
    UnsupportedFormat { file_name: String },

    #[error("Output {width}x{height} exceeds the limit of {max_pixels} pixels")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("Failed to store output {blob}: {source}")]
    Store {
        blob: String,
        #[source]
        source: StorageError,
    },

    #[error("Resize task failed: {0}")]
    Internal(String),
}

impl JobError {
    /// Stable label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::MalformedRequest(_) => "malformed_request",
            JobError::Fetch { .. } => "fetch",
            JobError::Decode(_) => "decode",
            JobError::UnsupportedFormat { .. } => "unsupported_format",
            JobError::TooLarge { .. } => "too_large",
            JobError::Encode(_) => "encode",
            JobError::Store { .. } => "store",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<BackendError> for JobError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Decode(message) => JobError::Decode(message),
            // Zero targets are rejected with the request, so a zero here
            // means the decoded source itself was empty.
            e @ BackendError::InvalidDimensions { .. } => JobError::Decode(e.to_string()),
            BackendError::TooLarge {
                width,
                height,
                max_pixels,
            } => JobError::TooLarge {
                width,
                height,
                max_pixels,
            },
            BackendError::UnsupportedFormat(format) => {
                JobError::UnsupportedFormat { file_name: format }
            }
            e @ BackendError::Encode { .. } => JobError::Encode(e.to_string()),
        }
    }
}
