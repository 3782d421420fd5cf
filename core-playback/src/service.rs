//! # Media Service Contract
//!
//! The remote media server as seen by the session: stream negotiation,
//! playback telemetry and subtitle retrieval.
//!
//! Implementations live in provider crates (`provider-mediabrowser`). The
//! session never retries calls made through this trait; transport retries
//! belong to the provider's HTTP layer.

use crate::error::Result;
use crate::model::{
    NegotiationOptions, PlayMethod, StreamInfo, SubtitlePayload, Ticks,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Snapshot sent with start, progress and stopped reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReport {
    pub item_id: String,
    pub media_source_id: Option<String>,
    pub play_session_id: Option<String>,
    pub position: Ticks,
    pub is_paused: bool,
    pub is_muted: bool,
    pub can_seek: bool,
    pub play_method: PlayMethod,
    pub audio_stream_index: Option<i32>,
    pub subtitle_stream_index: Option<i32>,
    pub playback_rate: f32,
}

/// Remote media service operations used by a playback session.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Ask the server how the item should be streamed.
    ///
    /// # Errors
    ///
    /// Refusals map to [`NegotiationError`](crate::error::NegotiationError)
    /// variants wrapped in `PlaybackError::Negotiation`.
    async fn negotiate(&self, options: &NegotiationOptions) -> Result<StreamInfo>;

    async fn report_start(&self, report: &PlaybackReport) -> Result<()>;

    async fn report_progress(&self, report: &PlaybackReport) -> Result<()>;

    async fn report_stopped(&self, report: &PlaybackReport) -> Result<()>;

    /// Delivery URL of an external subtitle rendered as JSON cues.
    fn subtitle_url(&self, item_id: &str, media_source_id: &str, stream_index: i32) -> String;

    async fn fetch_external_subtitle(&self, url: &str) -> Result<SubtitlePayload>;

    /// Measure the achievable streaming bitrate in bps.
    async fn detect_bitrate(&self) -> Result<u64>;
}
