//! MediaBrowser API connector implementation
//!
//! Implements the `MediaService` trait on top of an injected `HttpClient`.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::surface::TrackKind;
use core_playback::{
    DeviceProfile, MediaService, MediaSource, MediaStream, NegotiationOptions, PlayMethod,
    PlaybackError, PlaybackReport, StreamInfo, SubtitleCue, SubtitleDelivery, SubtitlePayload,
    SubtitleTrack, Ticks,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::{MediaBrowserError, Result};
use crate::types::{
    DeviceProfileDto, DirectPlayProfileDto, MediaSourceInfo, MediaStreamInfo,
    PlaybackInfoRequest, PlaybackInfoResponse, PlaybackProgressInfo, SubtitleTrackInfo,
    TranscodingProfileDto,
};

/// Timeout for negotiation and subtitle downloads
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telemetry must not hold the report worker for long
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload size requested from the bitrate test endpoint
const BITRATE_TEST_BYTES: u64 = 1_000_000;

/// MediaBrowser (Emby) REST connector
///
/// # Example
///
/// ```ignore
/// use provider_mediabrowser::MediaBrowserConnector;
///
/// let service = MediaBrowserConnector::new(http_client, "https://media.local:8096", token, device_id);
/// let info = service.negotiate(&options).await?;
/// ```
pub struct MediaBrowserConnector {
    http_client: Arc<dyn HttpClient>,
    server_url: String,
    access_token: String,
    device_id: String,
}

impl MediaBrowserConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        server_url: impl Into<String>,
        access_token: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            server_url,
            access_token: access_token.into(),
            device_id: device_id.into(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    /// Server-relative URLs in responses become absolute.
    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            self.url(url)
        } else {
            format!("{}/{}", self.server_url, url)
        }
    }

    fn check_status(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(MediaBrowserError::ApiError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            })
        }
    }

    // ===== Negotiation =====

    fn device_profile_dto(profile: &DeviceProfile) -> DeviceProfileDto {
        let direct_play_profiles = if profile.is_direct() {
            vec![DirectPlayProfileDto {
                container: profile.containers.join(","),
                video_codec: profile.video_codecs.join(","),
                audio_codec: profile.audio_codecs.join(","),
                kind: "Video".to_string(),
            }]
        } else {
            Vec::new()
        };

        DeviceProfileDto {
            name: profile.name.clone(),
            max_streaming_bitrate: profile.max_streaming_bitrate,
            direct_play_profiles,
            transcoding_profiles: vec![TranscodingProfileDto {
                container: "ts".to_string(),
                video_codec: "h264".to_string(),
                audio_codec: "aac,mp3,ac3".to_string(),
                kind: "Video".to_string(),
                protocol: "hls".to_string(),
                context: "Streaming".to_string(),
            }],
        }
    }

    fn playback_info_request(&self, options: &NegotiationOptions) -> PlaybackInfoRequest {
        PlaybackInfoRequest {
            device_id: options.device_id.clone(),
            max_streaming_bitrate: options.max_bitrate,
            start_time_ticks: options.start_position.0,
            audio_stream_index: options.audio_stream_index,
            subtitle_stream_index: options.subtitle_stream_index,
            media_source_id: options.media_source_id.clone(),
            device_profile: Self::device_profile_dto(&options.profile),
            auto_open_live_stream: true,
        }
    }

    fn convert_stream(dto: &MediaStreamInfo) -> Option<MediaStream> {
        let kind = match dto.kind.as_str() {
            "Video" => TrackKind::Video,
            "Audio" => TrackKind::Audio,
            "Subtitle" => TrackKind::Subtitle,
            _ => return None,
        };

        Some(MediaStream {
            index: dto.index,
            kind,
            codec: dto.codec.clone(),
            language: dto.language.clone(),
            title: dto.display_title.clone(),
            width: dto.width,
            height: dto.height,
            is_external: dto.is_external,
        })
    }

    fn convert_source(dto: &MediaSourceInfo) -> MediaSource {
        MediaSource {
            id: dto.id.clone(),
            container: dto.container.clone(),
            path: dto.path.clone(),
            bitrate: dto.bitrate,
            streams: dto.media_streams.iter().filter_map(Self::convert_stream).collect(),
            default_audio_index: dto.default_audio_stream_index,
            default_subtitle_index: dto.default_subtitle_stream_index,
        }
    }

    fn convert_subtitles(&self, dto: &MediaSourceInfo) -> Vec<SubtitleTrack> {
        dto.media_streams
            .iter()
            .filter(|s| s.kind == "Subtitle")
            .map(|s| {
                let delivery = match s.delivery_method.as_deref() {
                    Some("Encode") => SubtitleDelivery::Encode,
                    Some("External") => SubtitleDelivery::External,
                    Some("Hls") => SubtitleDelivery::SegmentedText,
                    Some("Embed") => SubtitleDelivery::Embedded,
                    _ if s.is_external => SubtitleDelivery::External,
                    _ => SubtitleDelivery::Embedded,
                };
                SubtitleTrack {
                    index: s.index,
                    delivery,
                    language: s.language.clone(),
                    codec: s.codec.clone(),
                    display_title: s.display_title.clone(),
                    delivery_url: s.delivery_url.as_deref().map(|u| self.absolute(u)),
                }
            })
            .collect()
    }

    fn static_stream_url(&self, item_id: &str, source: &MediaSourceInfo, play_session_id: Option<&str>) -> String {
        let mut url = format!(
            "{}/Videos/{}/stream?static=true&MediaSourceId={}&DeviceId={}",
            self.server_url,
            urlencoding::encode(item_id),
            urlencoding::encode(&source.id),
            urlencoding::encode(&self.device_id),
        );
        if let Some(play_session_id) = play_session_id {
            url.push_str(&format!("&PlaySessionId={}", urlencoding::encode(play_session_id)));
        }
        url.push_str(&format!("&api_key={}", urlencoding::encode(&self.access_token)));
        url
    }

    /// Pick the source and delivery the server offered.
    fn stream_info(&self, options: &NegotiationOptions, response: PlaybackInfoResponse) -> Result<StreamInfo> {
        let source = options
            .media_source_id
            .as_deref()
            .and_then(|id| response.media_sources.iter().find(|s| s.id == id))
            .or_else(|| response.media_sources.first())
            .ok_or(MediaBrowserError::NoStream)?;

        let play_session_id = response.play_session_id.as_deref();
        let burn_in = options.subtitle_stream_index.is_some();

        let (play_method, url) = if source.supports_direct_play && !burn_in {
            (
                PlayMethod::DirectPlay,
                self.static_stream_url(&options.item_id, source, play_session_id),
            )
        } else if let (true, Some(url), false) =
            (source.supports_direct_stream, source.direct_stream_url.as_deref(), burn_in)
        {
            (PlayMethod::DirectStream, self.absolute(url))
        } else if let Some(url) = source.transcoding_url.as_deref() {
            (PlayMethod::Transcode, self.absolute(url))
        } else {
            return Err(MediaBrowserError::NoStream);
        };

        Ok(StreamInfo {
            media_source: Self::convert_source(source),
            play_method,
            url,
            subtitle_tracks: self.convert_subtitles(source),
            play_session_id: response.play_session_id.clone(),
        })
    }

    async fn request_playback_info(&self, options: &NegotiationOptions) -> Result<StreamInfo> {
        let url = self.url(&format!(
            "/Items/{}/PlaybackInfo",
            urlencoding::encode(&options.item_id)
        ));
        let request = HttpRequest::post(url)
            .access_token(&self.access_token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&self.playback_info_request(options))?;

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::default())
            .await?;
        let response = Self::check_status(response)?;

        let info: PlaybackInfoResponse = response
            .json()
            .map_err(|e| MediaBrowserError::ParseError(e.to_string()))?;
        if let Some(code) = info.error_code.clone() {
            return Err(MediaBrowserError::PlaybackRefused { code });
        }

        self.stream_info(options, info)
    }

    // ===== Reporting =====

    fn progress_info(report: &PlaybackReport) -> PlaybackProgressInfo {
        PlaybackProgressInfo {
            item_id: report.item_id.clone(),
            media_source_id: report.media_source_id.clone(),
            play_session_id: report.play_session_id.clone(),
            position_ticks: report.position.0,
            is_paused: report.is_paused,
            is_muted: report.is_muted,
            can_seek: report.can_seek,
            play_method: report.play_method.as_str().to_string(),
            audio_stream_index: report.audio_stream_index,
            subtitle_stream_index: report.subtitle_stream_index,
            playback_rate: report.playback_rate,
        }
    }

    async fn send_report(&self, path: &str, report: &PlaybackReport) -> Result<()> {
        let request = HttpRequest::post(self.url(path))
            .access_token(&self.access_token)
            .timeout(TELEMETRY_TIMEOUT)
            .json(&Self::progress_info(report))?;

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        Self::check_status(response)?;
        Ok(())
    }
}

#[async_trait]
impl MediaService for MediaBrowserConnector {
    #[instrument(skip(self, options), fields(item_id = %options.item_id, max_bitrate = options.max_bitrate))]
    async fn negotiate(&self, options: &NegotiationOptions) -> core_playback::Result<StreamInfo> {
        match self.request_playback_info(options).await {
            Ok(info) => {
                info!(play_method = info.play_method.as_str(), "PlaybackInfo resolved");
                Ok(info)
            }
            Err(e) => {
                warn!(error = %e, "PlaybackInfo failed");
                Err(PlaybackError::from(e.negotiation_error()))
            }
        }
    }

    #[instrument(skip(self, report), fields(item_id = %report.item_id))]
    async fn report_start(&self, report: &PlaybackReport) -> core_playback::Result<()> {
        self.send_report("/Sessions/Playing", report).await?;
        debug!("Reported playback start");
        Ok(())
    }

    #[instrument(skip(self, report), fields(item_id = %report.item_id, position = report.position.0))]
    async fn report_progress(&self, report: &PlaybackReport) -> core_playback::Result<()> {
        self.send_report("/Sessions/Playing/Progress", report).await?;
        Ok(())
    }

    #[instrument(skip(self, report), fields(item_id = %report.item_id, position = report.position.0))]
    async fn report_stopped(&self, report: &PlaybackReport) -> core_playback::Result<()> {
        self.send_report("/Sessions/Playing/Stopped", report).await?;
        debug!("Reported playback stopped");
        Ok(())
    }

    fn subtitle_url(&self, item_id: &str, media_source_id: &str, stream_index: i32) -> String {
        format!(
            "{}/Videos/{}/{}/Subtitles/{}/0/Stream.JSON",
            self.server_url,
            urlencoding::encode(item_id),
            urlencoding::encode(media_source_id),
            stream_index
        )
    }

    #[instrument(skip(self, url))]
    async fn fetch_external_subtitle(&self, url: &str) -> core_playback::Result<SubtitlePayload> {
        let request = HttpRequest::get(url)
            .access_token(&self.access_token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| PlaybackError::SubtitleFetch(e.to_string()))?;
        if !response.is_success() {
            return Err(PlaybackError::SubtitleFetch(format!(
                "HTTP {}",
                response.status
            )));
        }

        let info: SubtitleTrackInfo = response
            .json()
            .map_err(|e| PlaybackError::SubtitleFetch(e.to_string()))?;
        debug!(cues = info.track_events.len(), "Subtitle track downloaded");

        Ok(SubtitlePayload {
            cues: info
                .track_events
                .into_iter()
                .map(|e| SubtitleCue {
                    id: e.id,
                    text: e.text,
                    start: Ticks(e.start_position_ticks),
                    end: Ticks(e.end_position_ticks),
                })
                .collect(),
        })
    }

    #[instrument(skip(self))]
    async fn detect_bitrate(&self) -> core_playback::Result<u64> {
        let url = self.url(&format!("/Playback/BitrateTest?Size={}", BITRATE_TEST_BYTES));
        let request = HttpRequest::get(url)
            .access_token(&self.access_token)
            .timeout(REQUEST_TIMEOUT);

        let started = Instant::now();
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(MediaBrowserError::from)?;
        let response = Self::check_status(response)?;
        let elapsed = started.elapsed().as_secs_f64().max(0.001);

        if response.body.is_empty() {
            return Err(MediaBrowserError::ParseError("empty bitrate test response".to_string()).into());
        }

        let bps = (response.body.len() as f64 * 8.0 / elapsed) as u64;
        info!(bitrate = bps, bytes = response.body.len(), "Measured bitrate");
        Ok(bps)
    }
}
