//! Recording fakes shared by the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::surface::{PlayerSurface, SurfaceEventSender, SurfaceTrack};
use core_playback::{
    MediaService, NegotiationError, NegotiationOptions, PlayMethod, PlayQueue, PlayableItem,
    PlaybackError, PlaybackReport, PlaybackSession, PlaybackState, Result, SessionContext,
    SessionDependencies, SessionHandle, SessionObserver, StreamInfo, SubtitleCue,
    SubtitlePayload, SubtitleTrack, Ticks, UserMessage,
};
use core_runtime::config::PlaybackConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

// ============================================================================
// Player Surface
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    SetSource(String),
    Start,
    Pause,
    Stop,
    SeekTo(i64),
    SetAudioTrack(i32),
    SetSubtitleTrack(i32),
    DisableSubtitles,
    SetSpeed(f32),
    SetNativeMode(bool),
    SetMuted(bool),
    SetAudioDelay(i64),
    SetNetworkBuffer(u32),
}

#[derive(Default)]
pub struct FakeSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    position_ms: AtomicI64,
    duration_ms: AtomicI64,
    audio_delay_ms: AtomicI64,
    playing: AtomicBool,
    native: AtomicBool,
    pub fail_seek: AtomicBool,
    pub reject_subtitles: AtomicBool,
}

impl FakeSurface {
    pub fn set_position(&self, ms: i64) {
        self.position_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_duration(&self, ms: i64) {
        self.duration_ms.store(ms, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::SeekTo(ms) => Some(ms),
                _ => None,
            })
            .collect()
    }

    pub fn sources(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::SetSource(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &SurfaceCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PlayerSurface for FakeSurface {
    async fn set_source(&self, url: &str) -> BridgeResult<()> {
        self.record(SurfaceCall::SetSource(url.to_string()));
        Ok(())
    }

    async fn start(&self) -> BridgeResult<()> {
        self.record(SurfaceCall::Start);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record(SurfaceCall::Pause);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_playback(&self) -> BridgeResult<()> {
        self.record(SurfaceCall::Stop);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn seek_to(&self, position_ms: i64) -> BridgeResult<i64> {
        self.record(SurfaceCall::SeekTo(position_ms));
        if self.fail_seek.load(Ordering::SeqCst) {
            return Err(BridgeError::SurfaceRejected("seek".to_string()));
        }
        self.position_ms.store(position_ms, Ordering::SeqCst);
        Ok(position_ms)
    }

    async fn set_audio_track(&self, index: i32) -> BridgeResult<()> {
        self.record(SurfaceCall::SetAudioTrack(index));
        Ok(())
    }

    async fn set_subtitle_track(&self, index: i32, _tracks: &[SurfaceTrack]) -> BridgeResult<bool> {
        self.record(SurfaceCall::SetSubtitleTrack(index));
        Ok(!self.reject_subtitles.load(Ordering::SeqCst))
    }

    async fn disable_subtitles(&self) -> BridgeResult<()> {
        self.record(SurfaceCall::DisableSubtitles);
        Ok(())
    }

    async fn set_playback_speed(&self, speed: f32) -> BridgeResult<()> {
        self.record(SurfaceCall::SetSpeed(speed));
        Ok(())
    }

    async fn set_native_mode(&self, native: bool) -> BridgeResult<()> {
        self.record(SurfaceCall::SetNativeMode(native));
        self.native.store(native, Ordering::SeqCst);
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> BridgeResult<()> {
        self.record(SurfaceCall::SetMuted(muted));
        Ok(())
    }

    async fn set_audio_delay(&self, delay_ms: i64) -> BridgeResult<()> {
        self.record(SurfaceCall::SetAudioDelay(delay_ms));
        self.audio_delay_ms.store(delay_ms, Ordering::SeqCst);
        Ok(())
    }

    async fn set_network_buffer(&self, buffer_ms: u32) -> BridgeResult<()> {
        self.record(SurfaceCall::SetNetworkBuffer(buffer_ms));
        Ok(())
    }

    fn current_position(&self) -> i64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn duration(&self) -> i64 {
        self.duration_ms.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_native_mode(&self) -> bool {
        self.native.load(Ordering::SeqCst)
    }

    fn audio_delay(&self) -> i64 {
        self.audio_delay_ms.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Media Service
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Start,
    Progress,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleOutcome {
    Cues,
    Empty,
    Fail,
}

pub struct FakeService {
    negotiations: Mutex<Vec<NegotiationOptions>>,
    reports: Mutex<Vec<(ReportKind, PlaybackReport)>>,
    fetched_urls: Mutex<Vec<String>>,
    pub method: Mutex<PlayMethod>,
    pub subtitle_tracks: Mutex<Vec<SubtitleTrack>>,
    pub failure: Mutex<Option<NegotiationError>>,
    pub subtitle_outcome: Mutex<SubtitleOutcome>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    fetch_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            negotiations: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
            fetched_urls: Mutex::new(Vec::new()),
            method: Mutex::new(PlayMethod::DirectPlay),
            subtitle_tracks: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            subtitle_outcome: Mutex::new(SubtitleOutcome::Cues),
            gate: Mutex::new(None),
            fetch_gate: Mutex::new(None),
        }
    }
}

impl FakeService {
    pub fn with_method(method: PlayMethod) -> Self {
        let service = Self::default();
        *service.method.lock() = method;
        service
    }

    /// Hold the next negotiation until the returned sender fires.
    pub fn gate_next_negotiation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    /// Hold the next subtitle download until the returned sender fires.
    pub fn gate_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.fetch_gate.lock() = Some(rx);
        tx
    }

    pub fn negotiations(&self) -> Vec<NegotiationOptions> {
        self.negotiations.lock().clone()
    }

    pub fn reports(&self) -> Vec<(ReportKind, PlaybackReport)> {
        self.reports.lock().clone()
    }

    pub fn report_count(&self, kind: ReportKind) -> usize {
        self.reports.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched_urls.lock().clone()
    }
}

#[async_trait]
impl MediaService for FakeService {
    async fn negotiate(&self, options: &NegotiationOptions) -> Result<StreamInfo> {
        let attempt = {
            let mut negotiations = self.negotiations.lock();
            negotiations.push(options.clone());
            negotiations.len()
        };

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if let Some(error) = self.failure.lock().clone() {
            return Err(error.into());
        }

        let media_source = options
            .media_source_id
            .as_deref()
            .and_then(|id| options.media_sources.iter().find(|s| s.id == id))
            .or_else(|| options.media_sources.first())
            .cloned()
            .ok_or_else(|| PlaybackError::from(NegotiationError::NoCompatibleStream))?;

        Ok(StreamInfo {
            media_source,
            play_method: *self.method.lock(),
            url: format!("http://server/{}/stream/{}", options.item_id, attempt),
            subtitle_tracks: self.subtitle_tracks.lock().clone(),
            play_session_id: Some(format!("ps-{}", attempt)),
        })
    }

    async fn report_start(&self, report: &PlaybackReport) -> Result<()> {
        self.reports.lock().push((ReportKind::Start, report.clone()));
        Ok(())
    }

    async fn report_progress(&self, report: &PlaybackReport) -> Result<()> {
        self.reports.lock().push((ReportKind::Progress, report.clone()));
        Ok(())
    }

    async fn report_stopped(&self, report: &PlaybackReport) -> Result<()> {
        self.reports.lock().push((ReportKind::Stopped, report.clone()));
        Ok(())
    }

    fn subtitle_url(&self, item_id: &str, media_source_id: &str, stream_index: i32) -> String {
        format!(
            "http://server/Videos/{}/{}/Subtitles/{}/0/Stream.JSON",
            item_id, media_source_id, stream_index
        )
    }

    async fn fetch_external_subtitle(&self, url: &str) -> Result<SubtitlePayload> {
        self.fetched_urls.lock().push(url.to_string());

        let gate = self.fetch_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        match *self.subtitle_outcome.lock() {
            SubtitleOutcome::Cues => Ok(SubtitlePayload {
                cues: vec![SubtitleCue {
                    id: "1".to_string(),
                    text: "Hello".to_string(),
                    start: Ticks::from_secs(1),
                    end: Ticks::from_secs(2),
                }],
            }),
            SubtitleOutcome::Empty => Ok(SubtitlePayload::default()),
            SubtitleOutcome::Fail => Err(PlaybackError::SubtitleFetch("HTTP 404".to_string())),
        }
    }

    async fn detect_bitrate(&self) -> Result<u64> {
        Ok(20_000_000)
    }
}

// ============================================================================
// Observer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverCall {
    UpdateDisplay,
    CurrentTime(Ticks),
    EndTime(Ticks),
    VisualState(PlaybackState),
    ThresholdReached(String),
    RemoveHead,
    ExternalSubtitle(Option<usize>),
    SubtitleLoading(bool),
    FinishSession,
    Message(UserMessage),
}

#[derive(Default)]
pub struct FakeObserver {
    calls: Mutex<Vec<ObserverCall>>,
}

impl FakeObserver {
    pub fn calls(&self) -> Vec<ObserverCall> {
        self.calls.lock().clone()
    }

    pub fn messages(&self) -> Vec<UserMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ObserverCall::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &ObserverCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: ObserverCall) {
        self.calls.lock().push(call);
    }
}

impl SessionObserver for FakeObserver {
    fn update_display(&self) {
        self.record(ObserverCall::UpdateDisplay);
    }

    fn set_current_time(&self, position: Ticks) {
        self.record(ObserverCall::CurrentTime(position));
    }

    fn update_end_time(&self, remaining: Ticks) {
        self.record(ObserverCall::EndTime(remaining));
    }

    fn set_play_pause_visual_state(&self, state: PlaybackState) {
        self.record(ObserverCall::VisualState(state));
    }

    fn next_item_threshold_reached(&self, next: &PlayableItem) {
        self.record(ObserverCall::ThresholdReached(next.id.clone()));
    }

    fn remove_head_of_display_queue(&self) {
        self.record(ObserverCall::RemoveHead);
    }

    fn add_external_subtitle(&self, payload: Option<SubtitlePayload>) {
        self.record(ObserverCall::ExternalSubtitle(payload.map(|p| p.cues.len())));
    }

    fn show_subtitle_loading(&self, loading: bool) {
        self.record(ObserverCall::SubtitleLoading(loading));
    }

    fn finish_session(&self) {
        self.record(ObserverCall::FinishSession);
    }

    fn show_message(&self, message: UserMessage) {
        self.record(ObserverCall::Message(message));
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub handle: SessionHandle,
    pub surface_events: SurfaceEventSender,
    pub surface: Arc<FakeSurface>,
    pub service: Arc<FakeService>,
    pub observer: Arc<FakeObserver>,
}

impl Harness {
    pub fn spawn(items: Vec<PlayableItem>) -> Self {
        Self::spawn_with(
            items,
            FakeService::default(),
            PlaybackConfig::default(),
            SessionContext::new("device-1", "http://server"),
        )
    }

    pub fn spawn_with(
        items: Vec<PlayableItem>,
        service: FakeService,
        config: PlaybackConfig,
        context: SessionContext,
    ) -> Self {
        let surface = Arc::new(FakeSurface::default());
        let service = Arc::new(service);
        let observer = Arc::new(FakeObserver::default());

        let deps = SessionDependencies {
            context,
            config: Arc::new(config),
            service: service.clone(),
            surface: surface.clone(),
            observer: observer.clone(),
        };
        let queue = PlayQueue::new(items, 0).expect("non-empty queue");
        let (handle, surface_events) = PlaybackSession::spawn(deps, queue).expect("valid config");

        Self {
            handle,
            surface_events,
            surface,
            service,
            observer,
        }
    }

    /// Play from `position` and drive the surface to `Playing`.
    pub async fn start_playing(&self, position: Ticks) {
        self.handle.play(position).await.expect("play accepted");
        settle().await;
        self.surface_events.prepared().expect("session alive");
        settle().await;
    }

    pub fn state(&self) -> PlaybackState {
        self.handle.state()
    }
}

/// Let spawned work and the stop grace period run to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

pub fn movie(id: &str, width: u32) -> PlayableItem {
    use core_playback::{MediaSource, MediaStream};

    PlayableItem::new(id, format!("Movie {}", id))
        .with_runtime(Ticks::from_minutes(100))
        .with_source(
            MediaSource::new(format!("{}-src", id))
                .with_path(format!("/media/{}.mkv", id))
                .with_stream(MediaStream::video(0, width, width * 9 / 16)),
        )
}
