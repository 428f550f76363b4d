use thiserror::Error;

use agentchat_render::RenderError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Failures talking to the agent backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Could not decode {operation} response: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid embed URL: {0}")]
    InvalidUrl(String),
}

/// Reasons a send is refused before anything is appended.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    #[error("Nothing to send")]
    Empty,

    #[error("A message is already being sent")]
    Busy,

    #[error("Token limit reached for this session")]
    TokenLimitReached,

    #[error("No API base URL configured")]
    MissingApiBase,
}

/// Chart download failures surfaced to the user as a toast.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Chart download is only available on the latest reply")]
    NotLatest,

    #[error("Chart export timed out")]
    TimedOut,

    #[error("Chart export failed: {0}")]
    Failed(String),

    #[error("Chart export returned an invalid image: {0}")]
    InvalidImage(String),

    #[error("Chart frame was removed before the export finished")]
    FrameGone,

    #[error("Could not save chart: {0}")]
    Download(String),

    #[error(transparent)]
    Bridge(#[from] RenderError),
}

/// A browser capability was missing or refused the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{0} is not supported here")]
    Unsupported(&'static str),

    #[error("{capability} failed: {reason}")]
    Failed {
        capability: &'static str,
        reason: String,
    },
}
