//! Player surface bridge trait and its event stream.
//!
//! The player surface is the host's actual decoder/renderer. The core session
//! drives it through [`PlayerSurface`] and receives a small closed set of
//! [`SurfaceEvent`]s back through a [`SurfaceEventSender`]. Positions at this
//! boundary are expressed in milliseconds; the core converts to server ticks.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the player surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The source was opened and the decoder is ready to render.
    Prepared,
    /// Periodic position update while rendering.
    Progress {
        /// Current position in milliseconds.
        position_ms: i64,
    },
    /// Unrecoverable decoder/renderer failure for the current source.
    Error {
        /// Host-provided description.
        message: String,
    },
    /// Playback reached the end of the source.
    Completed,
}

/// Sending half handed to the host so its decoder can publish events into the
/// owning session. Cloneable; all clones feed the same session.
#[derive(Debug, Clone)]
pub struct SurfaceEventSender {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
}

impl SurfaceEventSender {
    /// Wrap the sending half of a session's surface channel.
    pub fn new(tx: mpsc::UnboundedSender<SurfaceEvent>) -> Self {
        Self { tx }
    }

    /// Publish an event. Fails once the owning session has shut down.
    pub fn emit(&self, event: SurfaceEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| BridgeError::NotAvailable("playback session has shut down".to_string()))
    }

    pub fn prepared(&self) -> Result<()> {
        self.emit(SurfaceEvent::Prepared)
    }

    pub fn progress(&self, position_ms: i64) -> Result<()> {
        self.emit(SurfaceEvent::Progress { position_ms })
    }

    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.emit(SurfaceEvent::Error {
            message: message.into(),
        })
    }

    pub fn completed(&self) -> Result<()> {
        self.emit(SurfaceEvent::Completed)
    }

    /// Whether the receiving session is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Kind of an elementary stream inside a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

/// Minimal track description passed to the surface for internal subtitle
/// selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceTrack {
    /// Server-side stream index.
    pub index: i32,
    pub kind: TrackKind,
    pub codec: Option<String>,
    pub language: Option<String>,
    /// Whether the stream lives outside the container (sidecar file).
    pub is_external: bool,
}

/// Capability interface the session drives. Implementations wrap the host's
/// native decoder (ExoPlayer, AVPlayer, libmpv, libVLC, ...).
///
/// Query methods are synchronous snapshots; control methods are async and
/// must return once the decoder accepted the request.
#[async_trait]
pub trait PlayerSurface: Send + Sync {
    /// Point the decoder at a new stream URL.
    async fn set_source(&self, url: &str) -> Result<()>;

    /// Begin or resume rendering.
    async fn start(&self) -> Result<()>;

    /// Pause rendering, keeping the source loaded.
    async fn pause(&self) -> Result<()>;

    /// Halt rendering and release the stream. Must not return before the
    /// decoder stopped reading from the network.
    async fn stop_playback(&self) -> Result<()>;

    /// Seek to an absolute position; returns the position actually reached.
    async fn seek_to(&self, position_ms: i64) -> Result<i64>;

    /// Select an audio track by server stream index.
    async fn set_audio_track(&self, index: i32) -> Result<()>;

    /// Select an internally rendered subtitle track. Returns `false` when the
    /// decoder cannot address the track.
    async fn set_subtitle_track(&self, index: i32, tracks: &[SurfaceTrack]) -> Result<bool>;

    /// Turn off internal subtitle rendering.
    async fn disable_subtitles(&self) -> Result<()>;

    /// Change the playback rate (1.0 = normal).
    async fn set_playback_speed(&self, speed: f32) -> Result<()>;

    /// Switch between native-decode mode (container tracks addressable) and
    /// plain stream rendering.
    async fn set_native_mode(&self, native: bool) -> Result<()>;

    /// Session-level audio mute.
    async fn set_muted(&self, muted: bool) -> Result<()> {
        let _ = muted;
        Ok(())
    }

    /// Audio/video sync offset in milliseconds.
    async fn set_audio_delay(&self, delay_ms: i64) -> Result<()> {
        let _ = delay_ms;
        Err(BridgeError::NotAvailable("audio delay".to_string()))
    }

    /// Network buffer hint in milliseconds, applied before `start()`.
    async fn set_network_buffer(&self, buffer_ms: u32) -> Result<()> {
        let _ = buffer_ms;
        Ok(())
    }

    /// Current position in milliseconds.
    fn current_position(&self) -> i64;

    /// Duration of the loaded source in milliseconds (`<= 0` when unknown).
    fn duration(&self) -> i64;

    /// Whether the decoder is currently rendering.
    fn is_playing(&self) -> bool;

    /// Whether native-decode mode is active.
    fn is_native_mode(&self) -> bool;

    /// Current audio delay in milliseconds.
    fn audio_delay(&self) -> i64 {
        0
    }
}
