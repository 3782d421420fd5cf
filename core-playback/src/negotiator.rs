//! # Stream Negotiator
//!
//! Decides which device profile to offer the server and turns the server's
//! answer into a [`StreamDescriptor`].
//!
//! ## Overview
//!
//! 1. [`StreamNegotiator::plan`] checks direct-play eligibility, resolves the
//!    bitrate ceiling and builds fresh [`NegotiationOptions`].
//! 2. [`StreamNegotiator::negotiate`] submits the plan. The play method in
//!    the server's answer is authoritative.
//!
//! The negotiator holds no per-attempt state, so the session can run it on a
//! spawned task and discard stale results by attempt id.

use crate::error::Result;
use crate::model::{
    DeviceProfile, ItemKind, MediaSource, NegotiationOptions, PlayMethod, PlayMode,
    PlayableItem, SessionContext, SourceKind, StreamDescriptor, Ticks,
};
use crate::service::MediaService;
use core_runtime::config::PlaybackConfig;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// What the session wants from a negotiation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayRequest {
    pub start_position: Ticks,
    pub media_source_id: Option<String>,
    pub audio_stream_index: Option<i32>,
    /// Burn-in subtitle; forces the transcoding profile.
    pub subtitle_stream_index: Option<i32>,
}

impl PlayRequest {
    pub fn at(start_position: Ticks) -> Self {
        Self {
            start_position,
            ..Self::default()
        }
    }
}

/// Options for one attempt plus the eligibility verdict they were built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationPlan {
    pub options: NegotiationOptions,
    pub direct_eligible: bool,
    pub source_kind: SourceKind,
}

pub struct StreamNegotiator {
    config: Arc<PlaybackConfig>,
    context: SessionContext,
    auto_bitrate: OnceCell<u64>,
}

impl StreamNegotiator {
    pub fn new(config: Arc<PlaybackConfig>, context: SessionContext) -> Self {
        Self {
            config,
            context,
            auto_bitrate: OnceCell::new(),
        }
    }

    /// Width ceiling for direct play on this device.
    fn width_ceiling(&self) -> u32 {
        if self.context.is_constrained_device {
            self.config.constrained_max_width
        } else {
            self.config.max_direct_width
        }
    }

    /// Whether the item may be offered with the direct-play profile.
    pub fn is_direct_eligible(&self, item: &PlayableItem, source: Option<&MediaSource>) -> bool {
        if item.is_live() || item.kind == ItemKind::ChannelVideo {
            return false;
        }
        if !self.config.prefer_direct_profile {
            return false;
        }

        let is_avi = source
            .and_then(|s| s.path.as_deref())
            .map(|p| p.to_ascii_lowercase().ends_with(".avi"))
            .unwrap_or(false);
        if is_avi {
            return false;
        }

        match source.and_then(MediaSource::video_stream) {
            Some(video) => {
                let ceiling = self.width_ceiling();
                match video.width {
                    Some(width) if width > ceiling => {
                        debug!(width, ceiling, "Video wider than direct play ceiling");
                        false
                    }
                    _ => true,
                }
            }
            None => !self.context.is_constrained_device,
        }
    }

    /// Bitrate ceiling in bps: configured value, or the measured one.
    ///
    /// Measurement runs at most once per negotiator and falls back to the
    /// configured default when the service cannot measure.
    pub async fn resolve_max_bitrate(&self, service: &dyn MediaService) -> u64 {
        if let Some(bps) = self.config.max_bitrate_bps() {
            return bps;
        }

        let fallback = self.config.fallback_bitrate_bps;
        *self
            .auto_bitrate
            .get_or_init(|| async move {
                match service.detect_bitrate().await {
                    Ok(bps) if bps > 0 => {
                        info!(bitrate = bps, "Detected streaming bitrate");
                        bps
                    }
                    Ok(_) => fallback,
                    Err(e) => {
                        warn!(error = %e, fallback, "Bitrate detection failed, using fallback");
                        fallback
                    }
                }
            })
            .await
    }

    /// Network buffer hint for the surface.
    pub fn buffer_amount_ms(&self, item: &PlayableItem) -> u32 {
        if item.is_live() {
            self.config.live_buffer_ms
        } else {
            self.config.network_buffer_ms
        }
    }

    /// Build fresh options for one attempt.
    pub async fn plan(
        &self,
        service: &dyn MediaService,
        item: &PlayableItem,
        request: &PlayRequest,
    ) -> NegotiationPlan {
        let source = request
            .media_source_id
            .as_deref()
            .and_then(|id| item.source(id))
            .or_else(|| item.primary_source());

        let direct_eligible =
            request.subtitle_stream_index.is_none() && self.is_direct_eligible(item, source);
        let max_bitrate = self.resolve_max_bitrate(service).await;
        let profile = if direct_eligible {
            DeviceProfile::direct(max_bitrate)
        } else {
            DeviceProfile::transcoding(max_bitrate)
        };

        let options = NegotiationOptions::new(self.context.device_id.clone(), item, max_bitrate, profile)
            .with_media_source_id(request.media_source_id.clone())
            .with_audio_stream_index(request.audio_stream_index)
            .with_subtitle_stream_index(request.subtitle_stream_index)
            .with_start_position(request.start_position);

        NegotiationPlan {
            options,
            direct_eligible,
            source_kind: if item.is_live() {
                SourceKind::Live
            } else {
                SourceKind::Vod
            },
        }
    }

    /// Submit a plan and describe the resulting stream.
    #[instrument(skip(self, service, plan), fields(item_id = %plan.options.item_id, direct = plan.direct_eligible))]
    pub async fn negotiate(
        &self,
        service: &dyn MediaService,
        plan: &NegotiationPlan,
    ) -> Result<StreamDescriptor> {
        let info = service.negotiate(&plan.options).await?;
        let transcoding = info.play_method == PlayMethod::Transcode;

        info!(
            play_method = info.play_method.as_str(),
            media_source_id = %info.media_source.id,
            "Stream negotiated"
        );

        let (default_audio_index, default_subtitle_index) = if transcoding {
            (None, None)
        } else {
            (
                info.media_source.default_audio_index,
                info.media_source.default_subtitle_index,
            )
        };

        Ok(StreamDescriptor {
            play_mode: PlayMode {
                method: info.play_method,
                source: plan.source_kind,
            },
            native_decode: plan.direct_eligible && !transcoding,
            media_source: info.media_source,
            url: info.url,
            subtitle_tracks: info.subtitle_tracks,
            default_audio_index,
            default_subtitle_index,
            play_session_id: info.play_session_id,
        })
    }
}
