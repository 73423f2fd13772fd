//! Error types for the photo frame.

use thiserror::Error;

/// Errors raised while preparing, composing, or showing frames.
///
/// Only [`Error::Init`] and [`Error::Config`] are fatal. Everything else is
/// recoverable: the scheduled action is skipped and the previous frame stays
/// on the panel.
#[derive(Debug, Error)]
pub enum Error {
    /// Startup cannot continue (no displayable images, device or font unavailable)
    #[error("initialization failed: {0}")]
    Init(String),

    /// Network fetch failed (transport error, timeout, non-success status)
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Remote API returned an error status
    #[error("API returned error status {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Source image could not be decoded or resized
    #[error("compose failed: {0}")]
    Compose(String),

    /// Timezone name is not in the tz database
    #[error("unknown timezone '{0}'")]
    Timezone(String),

    /// Settings document could not be read or written
    #[error("settings unavailable: {0}")]
    Settings(String),

    /// Display device rejected an operation
    #[error("device error: {0}")]
    Device(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Response body was not the JSON the API promises
    #[error("JSON serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Init(_) | Error::Config(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Compose(err.to_string())
    }
}
