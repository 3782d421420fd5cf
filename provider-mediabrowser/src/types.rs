//! MediaBrowser API request/response types
//!
//! Wire structures for the PlaybackInfo, session reporting and subtitle
//! endpoints. Field names follow the server's PascalCase JSON.

use serde::{Deserialize, Serialize};

// ============================================================================
// PlaybackInfo
// ============================================================================

/// Body of `POST /Items/{id}/PlaybackInfo`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackInfoRequest {
    pub device_id: String,
    pub max_streaming_bitrate: u64,
    pub start_time_ticks: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_stream_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_source_id: Option<String>,
    pub device_profile: DeviceProfileDto,
    pub auto_open_live_stream: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceProfileDto {
    pub name: String,
    pub max_streaming_bitrate: u64,
    pub direct_play_profiles: Vec<DirectPlayProfileDto>,
    pub transcoding_profiles: Vec<TranscodingProfileDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectPlayProfileDto {
    /// Comma separated container list
    pub container: String,
    pub video_codec: String,
    pub audio_codec: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscodingProfileDto {
    pub container: String,
    pub video_codec: String,
    pub audio_codec: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub protocol: String,
    pub context: String,
}

/// Response of `POST /Items/{id}/PlaybackInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackInfoResponse {
    #[serde(default)]
    pub media_sources: Vec<MediaSourceInfo>,

    pub play_session_id: Option<String>,

    /// `NotAllowed`, `NoCompatibleStream`, `RateLimitExceeded`
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaSourceInfo {
    pub id: String,
    pub path: Option<String>,
    pub container: Option<String>,
    pub bitrate: Option<u64>,

    #[serde(default)]
    pub supports_direct_play: bool,

    #[serde(default)]
    pub supports_direct_stream: bool,

    #[serde(default)]
    pub supports_transcoding: bool,

    pub direct_stream_url: Option<String>,
    pub transcoding_url: Option<String>,

    #[serde(default)]
    pub media_streams: Vec<MediaStreamInfo>,

    pub default_audio_stream_index: Option<i32>,
    pub default_subtitle_stream_index: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaStreamInfo {
    pub index: i32,

    /// `Video`, `Audio`, `Subtitle`, `EmbeddedImage`
    #[serde(rename = "Type")]
    pub kind: String,

    pub codec: Option<String>,
    pub language: Option<String>,
    pub display_title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,

    #[serde(default)]
    pub is_external: bool,

    /// `Encode`, `Embed`, `External`, `Hls`
    pub delivery_method: Option<String>,
    pub delivery_url: Option<String>,
}

// ============================================================================
// Session Reporting
// ============================================================================

/// Body shared by the start, progress and stopped reports
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackProgressInfo {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_session_id: Option<String>,
    pub position_ticks: i64,
    pub is_paused: bool,
    pub is_muted: bool,
    pub can_seek: bool,
    pub play_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_stream_index: Option<i32>,
    pub playback_rate: f32,
}

// ============================================================================
// Subtitles
// ============================================================================

/// `Stream.JSON` subtitle rendition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubtitleTrackInfo {
    #[serde(default)]
    pub track_events: Vec<SubtitleTrackEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubtitleTrackEvent {
    pub id: String,
    pub text: String,
    pub start_position_ticks: i64,
    pub end_position_ticks: i64,
}
