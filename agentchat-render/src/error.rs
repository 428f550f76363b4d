use thiserror::Error;

use crate::bridge::FrameId;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Maximum nesting depth ({max_depth}) exceeded")]
    MaxNestingDepthExceeded { max_depth: usize },

    // --- bridge errors ---

    #[error("Chart frame {0} is not mounted")]
    UnknownFrame(FrameId),

    #[error("Chart frame {0} already has an export in flight")]
    ExportInFlight(FrameId),

    #[error("Malformed bridge message: {0}")]
    MalformedMessage(String),
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::MalformedMessage(err.to_string())
    }
}
