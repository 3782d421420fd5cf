//! # Playback Error Types
//!
//! Error types for session control, stream negotiation and telemetry.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Pre-flight checks that stop `play()` before anything is negotiated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The item exists in the catalog but its media is gone from disk.
    #[error("Item media is missing on the server")]
    ItemMissing,

    /// The user may not play this item.
    #[error("Playback of this item is not permitted")]
    PlayAccessDenied {
        /// The item is a placeholder (e.g. a disc stub) rather than real media.
        placeholder: bool,
    },
}

/// Reasons the server refused to produce a stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Playback not allowed")]
    NotAllowed,

    #[error("No compatible stream available")]
    NoCompatibleStream,

    #[error("Playback rate limit exceeded")]
    RateLimited,

    #[error("Stream negotiation failed: {0}")]
    Other(String),
}

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // User-facing failures
    // ========================================================================
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    // ========================================================================
    // Collaborator failures
    // ========================================================================
    /// Telemetry or other service call failed on the wire.
    #[error("Transport error: {0}")]
    Transport(String),

    /// External subtitle could not be downloaded or parsed.
    #[error("Subtitle fetch failed: {0}")]
    SubtitleFetch(String),

    /// The player surface rejected a request.
    #[error("Player surface error: {0}")]
    Surface(#[from] BridgeError),

    // ========================================================================
    // Session / queue misuse
    // ========================================================================
    #[error("No next item in queue")]
    QueueExhausted,

    #[error("Play queue is empty")]
    EmptyQueue,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// The session task has shut down.
    #[error("Playback session closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),
}

impl PlaybackError {
    /// Returns `true` if the failure has a message meant for the viewer.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PlaybackError::Validation(_) | PlaybackError::Negotiation(_)
        )
    }

    /// Returns `true` if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::Transport(_)
                | PlaybackError::SubtitleFetch(_)
                | PlaybackError::Negotiation(NegotiationError::RateLimited)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
