//! Inbound resize request.
//!
//! Queue messages carry a JSON body with PascalCase keys:
//!
//! ```json
//! { "FileName": "cat.png", "Width": 300, "Height": 200 }
//! ```
//!
//! A [`ResizeRequest`] is only ever built through validation, so holding one
//! means the file name is non-empty with an extension and both sizes are
//! positive. Whether the extension maps to an encoder is decided later by
//! the job, so an unsupported format surfaces as its own error.

use crate::imaging::Dimensions;
use crate::naming::file_extension;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("FileName must not be empty")]
    EmptyFileName,
    #[error("FileName has no extension: {0}")]
    MissingExtension(String),
    #[error("Width and Height must be positive, got {width}x{height}")]
    NonPositiveSize { width: i64, height: i64 },
}

/// Wire shape of the message body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResizeMessage {
    file_name: String,
    width: i64,
    height: i64,
}

/// A validated request to resize one stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    source_file_name: String,
    target_width: u32,
    target_height: u32,
}

impl ResizeRequest {
    pub fn new(
        source_file_name: impl Into<String>,
        width: i64,
        height: i64,
    ) -> Result<Self, RequestError> {
        let source_file_name = source_file_name.into();
        if source_file_name.trim().is_empty() {
            return Err(RequestError::EmptyFileName);
        }
        if file_extension(&source_file_name).is_none() {
            return Err(RequestError::MissingExtension(source_file_name));
        }
        let size = |v: i64| u32::try_from(v).ok().filter(|&v| v > 0);
        match (size(width), size(height)) {
            (Some(target_width), Some(target_height)) => Ok(Self {
                source_file_name,
                target_width,
                target_height,
            }),
            _ => Err(RequestError::NonPositiveSize { width, height }),
        }
    }

    /// Parse and validate a queue message body.
    pub fn from_message_body(body: &[u8]) -> Result<Self, RequestError> {
        let message: ResizeMessage = serde_json::from_slice(body)?;
        Self::new(message.file_name, message.width, message.height)
    }

    /// Serialize back to the wire shape.
    pub fn to_message_body(&self) -> Vec<u8> {
        let message = ResizeMessage {
            file_name: self.source_file_name.clone(),
            width: self.target_width.into(),
            height: self.target_height.into(),
        };
        // A struct of a string and two integers always serializes.
        serde_json::to_vec(&message).unwrap_or_default()
    }

    pub fn source_file_name(&self) -> &str {
        &self.source_file_name
    }

    pub fn target(&self) -> Dimensions {
        Dimensions::new(self.target_width, self.target_height)
    }
}
