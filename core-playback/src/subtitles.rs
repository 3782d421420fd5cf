//! # Subtitle Coordinator
//!
//! Maps a subtitle request onto what the session has to do for it, based on
//! how the server delivers the selected track.
//!
//! Resolution is pure: the session executes the returned [`SubtitleAction`]
//! against the surface, the observer and the negotiator.

use crate::model::{StreamDescriptor, SubtitleDelivery};
use crate::service::MediaService;
use bridge_traits::surface::TrackKind;
use core_runtime::config::SegmentedSubtitlePolicy;
use tracing::debug;

/// What the session must do to honour a subtitle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleAction {
    /// Clear the overlay and turn off decoder rendering.
    Disable,
    /// The current subtitle is burned into the video; a clean stream is needed.
    RenegotiateWithout,
    /// Let the decoder render a container track.
    SelectInternal { index: i32 },
    /// Download JSON cues and hand them to the overlay.
    FetchExternal { index: i32, url: String },
    /// Restart so the transcoder burns the subtitle in.
    BurnIn { index: i32 },
    /// The requested subtitle is already burned in.
    AlreadyActive,
    Unsupported { index: i32 },
    /// Not among the negotiated tracks or the source's streams.
    Unknown { index: i32 },
}

/// Where the session currently stands with respect to subtitles.
#[derive(Debug, Clone, Copy)]
pub struct SubtitleContext<'a> {
    pub item_id: &'a str,
    pub descriptor: &'a StreamDescriptor,
    pub native_mode: bool,
    pub burned_in: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubtitleCoordinator {
    policy: SegmentedSubtitlePolicy,
}

impl SubtitleCoordinator {
    pub fn new(policy: SegmentedSubtitlePolicy) -> Self {
        Self { policy }
    }

    /// Delivery of a track: negotiated tracks first, then the source's own
    /// subtitle streams.
    pub fn delivery_of(&self, descriptor: &StreamDescriptor, index: i32) -> Option<SubtitleDelivery> {
        if let Some(track) = descriptor.subtitle_track(index) {
            return Some(track.delivery);
        }

        descriptor
            .media_source
            .stream(index)
            .filter(|s| s.kind == TrackKind::Subtitle)
            .map(|s| {
                if s.is_external {
                    SubtitleDelivery::External
                } else {
                    SubtitleDelivery::Embedded
                }
            })
    }

    pub fn resolve(
        &self,
        request: Option<i32>,
        ctx: SubtitleContext<'_>,
        service: &dyn MediaService,
    ) -> SubtitleAction {
        let index = match request {
            None if ctx.burned_in.is_some() => return SubtitleAction::RenegotiateWithout,
            None => return SubtitleAction::Disable,
            Some(index) => index,
        };

        let delivery = match self.delivery_of(ctx.descriptor, index) {
            Some(delivery) => delivery,
            None => {
                debug!(index, "Subtitle stream not found");
                return SubtitleAction::Unknown { index };
            }
        };

        let external = || SubtitleAction::FetchExternal {
            index,
            url: service.subtitle_url(ctx.item_id, &ctx.descriptor.media_source.id, index),
        };

        match delivery {
            SubtitleDelivery::Embedded if ctx.native_mode => SubtitleAction::SelectInternal { index },
            SubtitleDelivery::Embedded | SubtitleDelivery::External => external(),
            SubtitleDelivery::Encode if ctx.burned_in == Some(index) => SubtitleAction::AlreadyActive,
            SubtitleDelivery::Encode => SubtitleAction::BurnIn { index },
            SubtitleDelivery::SegmentedText => match self.policy {
                SegmentedSubtitlePolicy::Unsupported => SubtitleAction::Unsupported { index },
                SegmentedSubtitlePolicy::TreatAsExternal => external(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::{
        MediaSource, MediaStream, NegotiationOptions, PlayMethod, PlayMode, SourceKind,
        StreamInfo, SubtitlePayload, SubtitleTrack,
    };
    use crate::service::PlaybackReport;
    use async_trait::async_trait;

    struct UrlOnly;

    #[async_trait]
    impl MediaService for UrlOnly {
        async fn negotiate(&self, _options: &NegotiationOptions) -> Result<StreamInfo> {
            unreachable!()
        }
        async fn report_start(&self, _report: &PlaybackReport) -> Result<()> {
            Ok(())
        }
        async fn report_progress(&self, _report: &PlaybackReport) -> Result<()> {
            Ok(())
        }
        async fn report_stopped(&self, _report: &PlaybackReport) -> Result<()> {
            Ok(())
        }
        fn subtitle_url(&self, item_id: &str, source_id: &str, index: i32) -> String {
            format!("http://server/Videos/{}/{}/Subtitles/{}/0/Stream.JSON", item_id, source_id, index)
        }
        async fn fetch_external_subtitle(&self, _url: &str) -> Result<SubtitlePayload> {
            Ok(SubtitlePayload::default())
        }
        async fn detect_bitrate(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor {
            play_mode: PlayMode {
                method: PlayMethod::DirectPlay,
                source: SourceKind::Vod,
            },
            media_source: MediaSource::new("src")
                .with_stream(MediaStream::new(2, TrackKind::Subtitle))
                .with_stream(MediaStream::new(3, TrackKind::Subtitle).external())
                .with_stream(MediaStream::new(1, TrackKind::Audio)),
            url: "http://server/stream".to_string(),
            subtitle_tracks: vec![
                SubtitleTrack::new(4, SubtitleDelivery::Encode),
                SubtitleTrack::new(5, SubtitleDelivery::SegmentedText),
                SubtitleTrack::new(6, SubtitleDelivery::Embedded),
            ],
            default_audio_index: None,
            default_subtitle_index: None,
            play_session_id: None,
            native_decode: true,
        }
    }

    fn ctx(descriptor: &StreamDescriptor, native_mode: bool, burned_in: Option<i32>) -> SubtitleContext<'_> {
        SubtitleContext {
            item_id: "item",
            descriptor,
            native_mode,
            burned_in,
        }
    }

    #[test]
    fn test_disable_and_unburn() {
        let d = descriptor();
        let coordinator = SubtitleCoordinator::default();
        assert_eq!(coordinator.resolve(None, ctx(&d, true, None), &UrlOnly), SubtitleAction::Disable);
        assert_eq!(
            coordinator.resolve(None, ctx(&d, true, Some(4)), &UrlOnly),
            SubtitleAction::RenegotiateWithout
        );
    }

    #[test]
    fn test_embedded_depends_on_native_mode() {
        let d = descriptor();
        let coordinator = SubtitleCoordinator::default();

        assert_eq!(
            coordinator.resolve(Some(2), ctx(&d, true, None), &UrlOnly),
            SubtitleAction::SelectInternal { index: 2 }
        );
        assert_eq!(
            coordinator.resolve(Some(6), ctx(&d, false, None), &UrlOnly),
            SubtitleAction::FetchExternal {
                index: 6,
                url: "http://server/Videos/item/src/Subtitles/6/0/Stream.JSON".to_string()
            }
        );
    }

    #[test]
    fn test_external_source_stream() {
        let d = descriptor();
        let action = SubtitleCoordinator::default().resolve(Some(3), ctx(&d, true, None), &UrlOnly);
        assert!(matches!(action, SubtitleAction::FetchExternal { index: 3, .. }));
    }

    #[test]
    fn test_encode_burns_in_once() {
        let d = descriptor();
        let coordinator = SubtitleCoordinator::default();
        assert_eq!(
            coordinator.resolve(Some(4), ctx(&d, true, None), &UrlOnly),
            SubtitleAction::BurnIn { index: 4 }
        );
        assert_eq!(
            coordinator.resolve(Some(4), ctx(&d, true, Some(4)), &UrlOnly),
            SubtitleAction::AlreadyActive
        );
    }

    #[test]
    fn test_segmented_text_policy() {
        let d = descriptor();
        assert_eq!(
            SubtitleCoordinator::default().resolve(Some(5), ctx(&d, true, None), &UrlOnly),
            SubtitleAction::Unsupported { index: 5 }
        );
        let lenient = SubtitleCoordinator::new(SegmentedSubtitlePolicy::TreatAsExternal);
        assert!(matches!(
            lenient.resolve(Some(5), ctx(&d, true, None), &UrlOnly),
            SubtitleAction::FetchExternal { index: 5, .. }
        ));
    }

    #[test]
    fn test_unknown_index() {
        let d = descriptor();
        let coordinator = SubtitleCoordinator::default();
        assert_eq!(
            coordinator.resolve(Some(42), ctx(&d, true, None), &UrlOnly),
            SubtitleAction::Unknown { index: 42 }
        );
        // audio stream index is not a subtitle
        assert_eq!(
            coordinator.resolve(Some(1), ctx(&d, true, None), &UrlOnly),
            SubtitleAction::Unknown { index: 1 }
        );
    }
}
