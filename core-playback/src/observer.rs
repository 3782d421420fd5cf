//! UI collaborator contract and the user-facing messages the session raises.

use crate::error::{NegotiationError, ValidationError};
use crate::model::{PlayableItem, PlaybackState, SubtitlePayload, Ticks};

/// Reasons and warnings shown to the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    PlaybackNotAllowed,
    IncompatibleStream,
    RateLimited,
    NegotiationFailed(String),
    /// The item's media is gone; the host may offer skipping to the next one.
    ItemMissing { can_skip: bool },
    CannotPlay { placeholder: bool },
    SeekFailed,
    SubtitleLoadFailed,
    SubtitleSelectFailed,
    /// Playback restarts so the server can burn in the chosen subtitle.
    BurnInRestart,
    UnsupportedSubtitle,
    PlaybackError(String),
}

impl UserMessage {
    /// Warnings leave playback running; everything else ended it.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            UserMessage::SeekFailed
                | UserMessage::SubtitleLoadFailed
                | UserMessage::SubtitleSelectFailed
                | UserMessage::BurnInRestart
                | UserMessage::UnsupportedSubtitle
        )
    }

    /// Default English text; hosts usually localise from the variant.
    pub fn text(&self) -> String {
        match self {
            UserMessage::PlaybackNotAllowed => {
                "Playback of this item is not allowed for this user.".to_string()
            }
            UserMessage::IncompatibleStream => {
                "No compatible stream could be found for this device.".to_string()
            }
            UserMessage::RateLimited => {
                "Too many streams are active. Please try again later.".to_string()
            }
            UserMessage::NegotiationFailed(reason) => format!("Unable to start playback: {}", reason),
            UserMessage::ItemMissing { .. } => {
                "This item is missing from the server library.".to_string()
            }
            UserMessage::CannotPlay { placeholder: true } => {
                "This item is a placeholder and cannot be played.".to_string()
            }
            UserMessage::CannotPlay { placeholder: false } => {
                "This item cannot be played.".to_string()
            }
            UserMessage::SeekFailed => "Unable to seek.".to_string(),
            UserMessage::SubtitleLoadFailed => "Unable to load subtitles.".to_string(),
            UserMessage::SubtitleSelectFailed => "Unable to select subtitle track.".to_string(),
            UserMessage::BurnInRestart => {
                "Subtitles will be burned in; playback is restarting.".to_string()
            }
            UserMessage::UnsupportedSubtitle => {
                "This subtitle format is not supported.".to_string()
            }
            UserMessage::PlaybackError(detail) => format!("Playback error: {}", detail),
        }
    }
}

impl From<&NegotiationError> for UserMessage {
    fn from(error: &NegotiationError) -> Self {
        match error {
            NegotiationError::NotAllowed => UserMessage::PlaybackNotAllowed,
            NegotiationError::NoCompatibleStream => UserMessage::IncompatibleStream,
            NegotiationError::RateLimited => UserMessage::RateLimited,
            NegotiationError::Other(reason) => UserMessage::NegotiationFailed(reason.clone()),
        }
    }
}

impl UserMessage {
    pub fn for_validation(error: &ValidationError, has_next: bool) -> Self {
        match error {
            ValidationError::ItemMissing => UserMessage::ItemMissing { can_skip: has_next },
            ValidationError::PlayAccessDenied { placeholder } => UserMessage::CannotPlay {
                placeholder: *placeholder,
            },
        }
    }
}

/// Callbacks into the host UI.
///
/// Called from the session task; implementations must hand work to their UI
/// thread rather than block.
pub trait SessionObserver: Send + Sync {
    /// Item metadata changed (new item started).
    fn update_display(&self);

    /// Position shown on the clock/seek bar.
    fn set_current_time(&self, position: Ticks);

    /// Remaining time until the end of the item.
    fn update_end_time(&self, remaining: Ticks);

    fn set_play_pause_visual_state(&self, state: PlaybackState);

    /// Pre-fetch / "up next" notification, at most once per item.
    fn next_item_threshold_reached(&self, next: &PlayableItem);

    fn remove_head_of_display_queue(&self);

    /// `None` clears the external subtitle overlay.
    fn add_external_subtitle(&self, payload: Option<SubtitlePayload>);

    fn show_subtitle_loading(&self, loading: bool);

    /// The queue is done; the host should leave the player.
    fn finish_session(&self);

    fn show_message(&self, message: UserMessage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_error_messages() {
        assert_eq!(
            UserMessage::from(&NegotiationError::RateLimited),
            UserMessage::RateLimited
        );
        assert_eq!(
            UserMessage::from(&NegotiationError::NotAllowed),
            UserMessage::PlaybackNotAllowed
        );
        assert!(UserMessage::from(&NegotiationError::Other("boom".to_string()))
            .text()
            .contains("boom"));
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            UserMessage::for_validation(&ValidationError::ItemMissing, true),
            UserMessage::ItemMissing { can_skip: true }
        );
        assert_eq!(
            UserMessage::for_validation(
                &ValidationError::PlayAccessDenied { placeholder: true },
                false
            ),
            UserMessage::CannotPlay { placeholder: true }
        );
    }

    #[test]
    fn test_warning_classification() {
        assert!(UserMessage::SeekFailed.is_warning());
        assert!(UserMessage::BurnInRestart.is_warning());
        assert!(!UserMessage::RateLimited.is_warning());
    }
}
