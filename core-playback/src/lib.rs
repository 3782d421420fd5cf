//! # Playback Session Module
//!
//! Drives the playback of a queue of media items against a remote media
//! server and a platform player surface.
//!
//! ## Overview
//!
//! This module handles:
//! - The session state machine (play, pause, seek, skip, stop, queue advance)
//! - Stream negotiation and direct-play eligibility
//! - Subtitle delivery decisions (embedded, external, burn-in)
//! - Playback telemetry and the next-item threshold
//!
//! The server is reached through [`MediaService`]; the UI through
//! [`SessionObserver`]; the decoder through
//! [`PlayerSurface`](bridge_traits::PlayerSurface).

pub mod error;
pub mod model;
pub mod negotiator;
pub mod observer;
pub mod queue;
pub mod reporter;
pub mod service;
pub mod session;
pub mod skip;
pub mod subtitles;

pub use error::{NegotiationError, PlaybackError, Result, ValidationError};
pub use model::{
    DeviceProfile, ItemKind, ItemLocation, MediaSource, MediaStream, NegotiationOptions,
    PlayAccess, PlayMethod, PlayMode, PlayableItem, PlaybackState, ProfileKind, SessionContext,
    SourceKind, StreamDescriptor, StreamInfo, SubtitleCue, SubtitleDelivery, SubtitlePayload,
    SubtitleTrack, Ticks,
};
pub use negotiator::{NegotiationPlan, PlayRequest, StreamNegotiator};
pub use observer::{SessionObserver, UserMessage};
pub use queue::PlayQueue;
pub use reporter::ReportingContext;
pub use service::{MediaService, PlaybackReport};
pub use session::{PlaybackSession, SessionDependencies, SessionHandle, SessionSnapshot};
pub use subtitles::{SubtitleAction, SubtitleCoordinator};
