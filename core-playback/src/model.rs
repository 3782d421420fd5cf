//! # Playback Data Model
//!
//! Items, media sources, negotiation options and the descriptors produced by
//! negotiation.
//!
//! ## Overview
//!
//! Positions exchanged with the server are [`Ticks`] (100 ns units). The
//! player surface works in milliseconds; conversions go through
//! [`Ticks::from_millis`] and [`Ticks::as_millis`] only.

use bridge_traits::surface::{SurfaceTrack, TrackKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Server ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

// ============================================================================
// Ticks
// ============================================================================

/// Position or duration in server ticks (hundred-nanosecond resolution).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ticks(pub i64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    pub const fn from_millis(ms: i64) -> Self {
        Ticks(ms.saturating_mul(TICKS_PER_MILLISECOND))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self::from_millis(secs.saturating_mul(1_000))
    }

    pub const fn from_minutes(minutes: i64) -> Self {
        Self::from_secs(minutes.saturating_mul(60))
    }

    /// Whole milliseconds, truncating sub-millisecond ticks.
    pub const fn as_millis(self) -> i64 {
        self.0 / TICKS_PER_MILLISECOND
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn max(self, other: Ticks) -> Ticks {
        Ticks(self.0.max(other.0))
    }
}

impl Add for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Ticks {
    fn add_assign(&mut self, rhs: Ticks) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Ticks {
    type Output = Ticks;

    fn sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.as_millis() / 1_000;
        write!(
            f,
            "{}:{:02}:{:02}",
            total_secs / 3_600,
            (total_secs / 60) % 60,
            total_secs % 60
        )
    }
}

// ============================================================================
// Items & Sources
// ============================================================================

/// Item categories that change how a stream may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// Movie, episode or any other on-demand video.
    Vod,
    /// Live TV channel.
    LiveChannel,
    /// Video served from a channel plugin; never direct-played.
    ChannelVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemLocation {
    Present,
    /// Catalog entry whose media is gone.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayAccess {
    Full,
    None,
}

/// One elementary stream of a media source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStream {
    pub index: i32,
    pub kind: TrackKind,
    pub codec: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub is_external: bool,
}

impl MediaStream {
    pub fn new(index: i32, kind: TrackKind) -> Self {
        Self {
            index,
            kind,
            codec: None,
            language: None,
            title: None,
            width: None,
            height: None,
            is_external: false,
        }
    }

    pub fn video(index: i32, width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::new(index, TrackKind::Video)
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn external(mut self) -> Self {
        self.is_external = true;
        self
    }

    pub fn to_surface_track(&self) -> SurfaceTrack {
        SurfaceTrack {
            index: self.index,
            kind: self.kind,
            codec: self.codec.clone(),
            language: self.language.clone(),
            is_external: self.is_external,
        }
    }
}

/// A concrete file/stream variant of an item as known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub id: String,
    pub container: Option<String>,
    pub path: Option<String>,
    /// Total bitrate in bps.
    pub bitrate: Option<u64>,
    pub streams: Vec<MediaStream>,
    pub default_audio_index: Option<i32>,
    pub default_subtitle_index: Option<i32>,
}

impl MediaSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            container: None,
            path: None,
            bitrate: None,
            streams: Vec::new(),
            default_audio_index: None,
            default_subtitle_index: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_stream(mut self, stream: MediaStream) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_defaults(mut self, audio: Option<i32>, subtitle: Option<i32>) -> Self {
        self.default_audio_index = audio;
        self.default_subtitle_index = subtitle;
        self
    }

    /// First video stream, if the server probed one.
    pub fn video_stream(&self) -> Option<&MediaStream> {
        self.streams.iter().find(|s| s.kind == TrackKind::Video)
    }

    pub fn stream(&self, index: i32) -> Option<&MediaStream> {
        self.streams.iter().find(|s| s.index == index)
    }

    pub fn surface_tracks(&self) -> Vec<SurfaceTrack> {
        self.streams.iter().map(MediaStream::to_surface_track).collect()
    }
}

/// Something the user asked to play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub media_sources: Vec<MediaSource>,
    pub runtime: Option<Ticks>,
    pub resume_position: Ticks,
    pub location: ItemLocation,
    pub play_access: PlayAccess,
    pub is_placeholder: bool,
}

impl PlayableItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ItemKind::Vod,
            media_sources: Vec::new(),
            runtime: None,
            resume_position: Ticks::ZERO,
            location: ItemLocation::Present,
            play_access: PlayAccess::Full,
            is_placeholder: false,
        }
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_runtime(mut self, runtime: Ticks) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.media_sources.push(source);
        self
    }

    pub fn with_location(mut self, location: ItemLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_play_access(mut self, access: PlayAccess) -> Self {
        self.play_access = access;
        self
    }

    pub fn is_live(&self) -> bool {
        self.kind == ItemKind::LiveChannel
    }

    /// The source the server lists first; used for pre-negotiation checks.
    pub fn primary_source(&self) -> Option<&MediaSource> {
        self.media_sources.first()
    }

    pub fn source(&self, id: &str) -> Option<&MediaSource> {
        self.media_sources.iter().find(|s| s.id == id)
    }
}

// ============================================================================
// Negotiation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// Lightweight profile for a full-featured client-side decoder.
    Direct,
    /// Profile that expects the server to re-encode.
    Transcoding,
}

/// Device capability profile sent with a negotiation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub kind: ProfileKind,
    pub name: String,
    pub max_streaming_bitrate: u64,
    pub containers: Vec<String>,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
}

impl DeviceProfile {
    pub fn direct(max_streaming_bitrate: u64) -> Self {
        Self {
            kind: ProfileKind::Direct,
            name: "Direct".to_string(),
            max_streaming_bitrate,
            containers: strings(&["mkv", "mp4", "m4v", "mov", "ts", "webm", "avi", "flv", "wmv"]),
            video_codecs: strings(&["h264", "hevc", "mpeg2video", "mpeg4", "vc1", "vp8", "vp9"]),
            audio_codecs: strings(&["aac", "mp3", "ac3", "eac3", "dts", "truehd", "flac", "opus"]),
        }
    }

    pub fn transcoding(max_streaming_bitrate: u64) -> Self {
        Self {
            kind: ProfileKind::Transcoding,
            name: "Transcoding".to_string(),
            max_streaming_bitrate,
            containers: strings(&["ts", "mp4"]),
            video_codecs: strings(&["h264"]),
            audio_codecs: strings(&["aac", "mp3", "ac3"]),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ProfileKind::Direct
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Request body for one negotiation attempt. Never mutated once sent;
/// derived requests are built with the `with_*` constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationOptions {
    pub device_id: String,
    pub item_id: String,
    pub media_sources: Vec<MediaSource>,
    pub media_source_id: Option<String>,
    pub max_bitrate: u64,
    pub audio_stream_index: Option<i32>,
    /// Only set when asking the server to burn the subtitle into the video.
    pub subtitle_stream_index: Option<i32>,
    pub start_position: Ticks,
    pub profile: DeviceProfile,
}

impl NegotiationOptions {
    pub fn new(
        device_id: impl Into<String>,
        item: &PlayableItem,
        max_bitrate: u64,
        profile: DeviceProfile,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            item_id: item.id.clone(),
            media_sources: item.media_sources.clone(),
            media_source_id: None,
            max_bitrate,
            audio_stream_index: None,
            subtitle_stream_index: None,
            start_position: Ticks::ZERO,
            profile,
        }
    }

    pub fn with_media_source_id(&self, id: Option<String>) -> Self {
        Self {
            media_source_id: id,
            ..self.clone()
        }
    }

    pub fn with_audio_stream_index(&self, index: Option<i32>) -> Self {
        Self {
            audio_stream_index: index,
            ..self.clone()
        }
    }

    pub fn with_subtitle_stream_index(&self, index: Option<i32>) -> Self {
        Self {
            subtitle_stream_index: index,
            ..self.clone()
        }
    }

    pub fn with_start_position(&self, position: Ticks) -> Self {
        Self {
            start_position: position,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMethod {
    DirectPlay,
    DirectStream,
    Transcode,
}

impl PlayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayMethod::DirectPlay => "DirectPlay",
            PlayMethod::DirectStream => "DirectStream",
            PlayMethod::Transcode => "Transcode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Vod,
    Live,
}

/// How the current stream is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayMode {
    pub method: PlayMethod,
    pub source: SourceKind,
}

impl PlayMode {
    pub fn is_transcoding(&self) -> bool {
        self.method == PlayMethod::Transcode
    }

    pub fn is_live(&self) -> bool {
        self.source == SourceKind::Live
    }

    pub fn can_seek(&self) -> bool {
        self.source == SourceKind::Vod
    }
}

/// Subtitle delivery decided by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtitleDelivery {
    /// Inside the container; the decoder renders it.
    Embedded,
    /// Fetched separately and drawn by the host overlay.
    External,
    /// Burned into the video by the transcoder.
    Encode,
    /// Delivered alongside HLS segments.
    SegmentedText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub index: i32,
    pub delivery: SubtitleDelivery,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub display_title: Option<String>,
    pub delivery_url: Option<String>,
}

impl SubtitleTrack {
    pub fn new(index: i32, delivery: SubtitleDelivery) -> Self {
        Self {
            index,
            delivery,
            language: None,
            codec: None,
            display_title: None,
            delivery_url: None,
        }
    }
}

/// What the service returns for a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub media_source: MediaSource,
    pub play_method: PlayMethod,
    pub url: String,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub play_session_id: Option<String>,
}

/// The session's view of the negotiated stream. Replaced wholesale on every
/// negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub play_mode: PlayMode,
    pub media_source: MediaSource,
    pub url: String,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    /// Only populated when the server is not transcoding.
    pub default_audio_index: Option<i32>,
    /// Only populated when the server is not transcoding.
    pub default_subtitle_index: Option<i32>,
    pub play_session_id: Option<String>,
    /// The decoder addresses container tracks directly.
    pub native_decode: bool,
}

impl StreamDescriptor {
    pub fn subtitle_track(&self, index: i32) -> Option<&SubtitleTrack> {
        self.subtitle_tracks.iter().find(|t| t.index == index)
    }
}

// ============================================================================
// Subtitles
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub id: String,
    pub text: String,
    pub start: Ticks,
    pub end: Ticks,
}

/// Parsed external subtitle handed to the UI overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitlePayload {
    pub cues: Vec<SubtitleCue>,
}

impl SubtitlePayload {
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Paused,
    Seeking,
    Error,
    /// The session has shut down.
    Undefined,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Buffering => "Buffering",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Seeking => "Seeking",
            PlaybackState::Error => "Error",
            PlaybackState::Undefined => "Undefined",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session ambient dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub device_id: String,
    /// Low-power streaming stick with a weak decoder.
    pub is_constrained_device: bool,
    pub server_url: String,
}

impl SessionContext {
    pub fn new(device_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            is_constrained_device: false,
            server_url: server_url.into(),
        }
    }

    pub fn constrained(mut self, constrained: bool) -> Self {
        self.is_constrained_device = constrained;
        self
    }
}
