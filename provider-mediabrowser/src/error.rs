//! Error types for the MediaBrowser provider

use core_playback::{NegotiationError, PlaybackError};
use thiserror::Error;

/// MediaBrowser provider errors
#[derive(Error, Debug)]
pub enum MediaBrowserError {
    /// Server answered with a non-success status
    #[error("MediaBrowser API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// PlaybackInfo succeeded on the wire but carried an `ErrorCode`
    #[error("Playback refused by server: {code}")]
    PlaybackRefused { code: String },

    /// No media source offers a usable stream
    #[error("No playable stream in server response")]
    NoStream,

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Transport failure
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for MediaBrowser operations
pub type Result<T> = std::result::Result<T, MediaBrowserError>;

impl MediaBrowserError {
    /// Classify a failed PlaybackInfo call.
    pub fn negotiation_error(&self) -> NegotiationError {
        match self {
            MediaBrowserError::ApiError {
                status_code: 403, ..
            } => NegotiationError::NotAllowed,
            MediaBrowserError::ApiError {
                status_code: 429, ..
            } => NegotiationError::RateLimited,
            MediaBrowserError::PlaybackRefused { code } => match code.as_str() {
                "NotAllowed" => NegotiationError::NotAllowed,
                "NoCompatibleStream" => NegotiationError::NoCompatibleStream,
                "RateLimitExceeded" => NegotiationError::RateLimited,
                other => NegotiationError::Other(other.to_string()),
            },
            MediaBrowserError::NoStream => NegotiationError::NoCompatibleStream,
            other => NegotiationError::Other(other.to_string()),
        }
    }
}

impl From<MediaBrowserError> for PlaybackError {
    fn from(error: MediaBrowserError) -> Self {
        PlaybackError::Transport(error.to_string())
    }
}
