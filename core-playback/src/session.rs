//! # Playback Session
//!
//! The session state machine, run as an actor.
//!
//! ## Overview
//!
//! One task owns all session state. It serialises three inputs:
//!
//! - commands from any number of [`SessionHandle`] clones (mpsc + oneshot ack)
//! - events from the player surface ([`SurfaceEventSender`])
//! - completions of its own background work: negotiation, subtitle fetches,
//!   report ticks and skip timers
//!
//! Background completions carry the attempt/selection/generation they were
//! started for. Anything older than the session's current counter is dropped
//! at the point it is received.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = PlayQueue::new(items, 0)?;
//! let (session, surface_events) = PlaybackSession::spawn(deps, queue)?;
//! player.attach(surface_events);
//!
//! session.play(Ticks::ZERO).await?;
//! session.skip(Ticks::from_secs(30)).await?;
//! session.stop().await?;
//! ```

use crate::error::{PlaybackError, Result, ValidationError};
use crate::model::{
    ItemLocation, PlayAccess, PlayMode, PlayableItem, PlaybackState, SessionContext,
    StreamDescriptor, SubtitlePayload, Ticks,
};
use crate::negotiator::{NegotiationPlan, PlayRequest, StreamNegotiator};
use crate::observer::{SessionObserver, UserMessage};
use crate::queue::PlayQueue;
use crate::reporter::{ProgressReporter, ReportQueue, ReportingContext};
use crate::service::{MediaService, PlaybackReport};
use crate::skip::SkipDebouncer;
use crate::subtitles::{SubtitleAction, SubtitleContext, SubtitleCoordinator};
use bridge_traits::surface::{PlayerSurface, SurfaceEvent, SurfaceEventSender};
use core_runtime::config::PlaybackConfig;
use core_runtime::events::{EventBus, EventStream, SessionEvent};
use core_runtime::logging::redact_url;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 32;

/// Speeds cycled by [`SessionHandle::toggle_play_speed`].
const SPEED_STEPS: [f32; 4] = [1.0, 2.0, 3.0, 4.0];

/// Collaborators a session is constructed with.
pub struct SessionDependencies {
    pub context: SessionContext,
    pub config: Arc<PlaybackConfig>,
    pub service: Arc<dyn MediaService>,
    pub surface: Arc<dyn PlayerSurface>,
    pub observer: Arc<dyn SessionObserver>,
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: PlaybackState,
    pub queue_index: usize,
    pub queue_len: usize,
    pub item_id: String,
    /// Latest negotiation attempt id.
    pub attempt: u64,
    pub play_mode: Option<PlayMode>,
    pub position: Ticks,
    pub native_mode: bool,
    pub speed: f32,
    pub muted: bool,
    pub audio_delay_ms: i64,
    pub can_seek: bool,
    pub audio_index: Option<i32>,
    pub subtitle_index: Option<i32>,
    pub threshold: Option<Ticks>,
    pub threshold_fired: bool,
}

// ============================================================================
// Messages
// ============================================================================

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Play { position: Ticks, reply: Reply<()> },
    Pause { reply: Reply<()> },
    PlayPause { reply: Reply<()> },
    Seek { position: Ticks, reply: Reply<()> },
    Skip { delta: Ticks, reply: Reply<()> },
    Stop { reply: Reply<()> },
    Next { reply: Reply<()> },
    SwitchAudio { index: i32, reply: Reply<()> },
    SwitchSubtitle { index: Option<i32>, reply: Reply<()> },
    SetSpeed { speed: f32, reply: Reply<()> },
    ToggleSpeed { reply: Reply<f32> },
    SetMuted { muted: bool, reply: Reply<()> },
    SetAudioDelay { delay_ms: i64, reply: Reply<()> },
    Snapshot { reply: Reply<SessionSnapshot> },
    Shutdown { reply: Reply<()> },
}

enum Internal {
    Negotiated {
        attempt: u64,
        result: Result<(NegotiationPlan, StreamDescriptor)>,
    },
    SubtitleFetched {
        selection: u64,
        result: Result<SubtitlePayload>,
    },
    ReportTick {
        generation: u64,
    },
    SkipElapsed {
        generation: u64,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable control handle for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PlaybackState>,
    events: EventBus,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest state without a round trip to the session task.
    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.events.stream()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| PlaybackError::SessionClosed)?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)?
    }

    /// Start the current item at `position`, or resume when paused.
    pub async fn play(&self, position: Ticks) -> Result<()> {
        self.request(|reply| Command::Play { position, reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn play_pause(&self) -> Result<()> {
        self.request(|reply| Command::PlayPause { reply }).await
    }

    pub async fn seek(&self, position: Ticks) -> Result<()> {
        self.request(|reply| Command::Seek { position, reply }).await
    }

    /// Relative seek; rapid calls are merged.
    pub async fn skip(&self, delta: Ticks) -> Result<()> {
        self.request(|reply| Command::Skip { delta, reply }).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Jump to the next queued item. No-op on the last item.
    pub async fn next(&self) -> Result<()> {
        self.request(|reply| Command::Next { reply }).await
    }

    pub async fn switch_audio_track(&self, index: i32) -> Result<()> {
        self.request(|reply| Command::SwitchAudio { index, reply }).await
    }

    /// `None` turns subtitles off.
    pub async fn switch_subtitle_track(&self, index: Option<i32>) -> Result<()> {
        self.request(|reply| Command::SwitchSubtitle { index, reply })
            .await
    }

    pub async fn set_playback_speed(&self, speed: f32) -> Result<()> {
        self.request(|reply| Command::SetSpeed { speed, reply }).await
    }

    /// Cycle 1x, 2x, 3x, 4x. Returns the new speed.
    pub async fn toggle_play_speed(&self) -> Result<f32> {
        self.request(|reply| Command::ToggleSpeed { reply }).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.request(|reply| Command::SetMuted { muted, reply }).await
    }

    pub async fn set_audio_delay(&self, delay_ms: i64) -> Result<()> {
        self.request(|reply| Command::SetAudioDelay { delay_ms, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop playback, flush telemetry and end the session task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

// ============================================================================
// Session Actor
// ============================================================================

pub struct PlaybackSession {
    id: Uuid,
    config: Arc<PlaybackConfig>,
    service: Arc<dyn MediaService>,
    surface: Arc<dyn PlayerSurface>,
    observer: Arc<dyn SessionObserver>,
    negotiator: Arc<StreamNegotiator>,
    subtitles: SubtitleCoordinator,
    events: EventBus,
    state_tx: watch::Sender<PlaybackState>,
    internal_tx: mpsc::UnboundedSender<Internal>,

    state: PlaybackState,
    queue: PlayQueue,
    attempt: u64,
    subtitle_selection: u64,
    subtitle_fetch_pending: bool,
    plan: Option<NegotiationPlan>,
    descriptor: Option<StreamDescriptor>,
    pending_start: Option<Ticks>,
    first_progress_seen: bool,
    last_position: Ticks,
    reporting: ReportingContext,
    reporter: ProgressReporter,
    reports: ReportQueue,
    skip: SkipDebouncer,

    speed: f32,
    muted: bool,
    audio_index: Option<i32>,
    subtitle_index: Option<i32>,
    burned_in_subtitle: Option<i32>,
}

impl PlaybackSession {
    /// Spawn the session task. Must be called inside a tokio runtime.
    ///
    /// Returns the control handle and the sender the player surface reports
    /// its events through.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::Config`] when the configuration is invalid.
    pub fn spawn(
        deps: SessionDependencies,
        queue: PlayQueue,
    ) -> Result<(SessionHandle, SurfaceEventSender)> {
        deps.config.validate()?;

        let id = Uuid::new_v4();
        let events = EventBus::new(deps.config.event_buffer_size);
        let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let session = Self {
            id,
            negotiator: Arc::new(StreamNegotiator::new(deps.config.clone(), deps.context)),
            subtitles: SubtitleCoordinator::new(deps.config.segmented_subtitle_policy),
            reports: ReportQueue::new(deps.service.clone()),
            config: deps.config,
            service: deps.service,
            surface: deps.surface,
            observer: deps.observer,
            events: events.clone(),
            state_tx,
            internal_tx,
            state: PlaybackState::Idle,
            queue,
            attempt: 0,
            subtitle_selection: 0,
            subtitle_fetch_pending: false,
            plan: None,
            descriptor: None,
            pending_start: None,
            first_progress_seen: false,
            last_position: Ticks::ZERO,
            reporting: ReportingContext::default(),
            reporter: ProgressReporter::new(),
            skip: SkipDebouncer::new(),
            speed: 1.0,
            muted: false,
            audio_index: None,
            subtitle_index: None,
            burned_in_subtitle: None,
        };

        info!(session_id = %id, items = session.queue.len(), "Playback session created");
        tokio::spawn(session.run(command_rx, surface_rx, internal_rx));

        let handle = SessionHandle {
            id,
            commands: command_tx,
            state: state_rx,
            events,
        };
        Ok((handle, SurfaceEventSender::new(surface_tx)))
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut surface_events: mpsc::UnboundedReceiver<SurfaceEvent>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some(message) = internal.recv() => self.handle_internal(message).await,

                Some(event) = surface_events.recv() => self.handle_surface_event(event).await,

                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!(session_id = %self.id, "All handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }
        info!(session_id = %self.id, "Playback session ended");
    }

    // ===== Dispatch =====

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Play { position, reply } => {
                let _ = reply.send(self.play(position).await);
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            Command::PlayPause { reply } => {
                let result = match self.state {
                    PlaybackState::Playing => self.pause().await,
                    PlaybackState::Paused | PlaybackState::Idle => {
                        let position = self.last_position;
                        self.play(position).await
                    }
                    _ => Ok(()),
                };
                let _ = reply.send(result);
            }
            Command::Seek { position, reply } => {
                let _ = reply.send(self.seek(position).await);
            }
            Command::Skip { delta, reply } => {
                let _ = reply.send(self.queue_skip(delta));
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            Command::Next { reply } => {
                let _ = reply.send(self.next().await);
            }
            Command::SwitchAudio { index, reply } => {
                let _ = reply.send(self.switch_audio_track(index).await);
            }
            Command::SwitchSubtitle { index, reply } => {
                let _ = reply.send(self.switch_subtitle_track(index).await);
            }
            Command::SetSpeed { speed, reply } => {
                let _ = reply.send(self.set_playback_speed(speed).await);
            }
            Command::ToggleSpeed { reply } => {
                let next = SPEED_STEPS
                    .iter()
                    .position(|s| (*s - self.speed).abs() < f32::EPSILON)
                    .map(|i| SPEED_STEPS[(i + 1) % SPEED_STEPS.len()])
                    .unwrap_or(SPEED_STEPS[0]);
                let result = self.set_playback_speed(next).await.map(|_| next);
                let _ = reply.send(result);
            }
            Command::SetMuted { muted, reply } => {
                let result = self.surface.set_muted(muted).await.map_err(PlaybackError::from);
                if result.is_ok() {
                    self.muted = muted;
                }
                let _ = reply.send(result);
            }
            Command::SetAudioDelay { delay_ms, reply } => {
                let result = self
                    .surface
                    .set_audio_delay(delay_ms)
                    .await
                    .map_err(PlaybackError::from);
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Negotiated { attempt, result } => {
                if attempt != self.attempt || self.state != PlaybackState::Buffering {
                    debug!(attempt, current = self.attempt, "Discarding stale negotiation result");
                    return;
                }
                match result {
                    Ok((plan, descriptor)) => self.begin_stream(plan, descriptor).await,
                    Err(e) => self.negotiation_failed(e).await,
                }
            }
            Internal::SubtitleFetched { selection, result } => {
                if selection != self.subtitle_selection {
                    debug!(selection, "Discarding stale subtitle fetch");
                    return;
                }
                self.subtitle_fetch_pending = false;
                self.observer.show_subtitle_loading(false);
                match result {
                    Ok(payload) if !payload.is_empty() => {
                        self.observer.add_external_subtitle(Some(payload));
                    }
                    Ok(_) => {
                        warn!("External subtitle is empty");
                        self.warn_user(UserMessage::SubtitleLoadFailed);
                    }
                    Err(e) => {
                        warn!(error = %e, "External subtitle fetch failed");
                        self.warn_user(UserMessage::SubtitleLoadFailed);
                    }
                }
            }
            Internal::ReportTick { generation } => {
                if !self.reporter.is_current(generation) || self.state != PlaybackState::Playing {
                    return;
                }
                self.report_progress();
            }
            Internal::SkipElapsed { generation } => {
                if let Some(delta) = self.skip.take(generation) {
                    self.apply_skip(delta).await;
                }
            }
        }
    }

    async fn handle_surface_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Prepared => {
                if self.state == PlaybackState::Buffering && self.descriptor.is_some() {
                    self.on_prepared().await;
                }
            }
            SurfaceEvent::Progress { position_ms } => {
                if self.state == PlaybackState::Playing {
                    self.on_progress(Ticks::from_millis(position_ms)).await;
                }
            }
            SurfaceEvent::Error { message } => {
                if !matches!(self.state, PlaybackState::Idle | PlaybackState::Undefined) {
                    self.on_playback_error(message).await;
                }
            }
            SurfaceEvent::Completed => {
                if !matches!(self.state, PlaybackState::Idle | PlaybackState::Undefined) {
                    self.on_completed().await;
                }
            }
        }
    }

    // ===== State =====

    fn transition(&mut self, to: PlaybackState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!(session_id = %self.id, %from, %to, "State transition");

        self.state_tx.send_replace(to);
        let _ = self.events.emit(SessionEvent::StateChanged {
            from: from.to_string(),
            to: to.to_string(),
        });
        self.observer.set_play_pause_visual_state(to);
    }

    fn warn_user(&self, message: UserMessage) {
        let _ = self.events.emit(SessionEvent::Warning {
            message: message.text(),
        });
        self.observer.show_message(message);
    }

    fn current_item(&self) -> &PlayableItem {
        self.queue.current()
    }

    fn surface_position(&self) -> Ticks {
        Ticks::from_millis(self.surface.current_position())
    }

    fn can_seek(&self) -> bool {
        self.descriptor
            .as_ref()
            .map(|d| d.play_mode.can_seek())
            .unwrap_or(false)
    }

    fn is_transcoding(&self) -> bool {
        self.descriptor
            .as_ref()
            .map(|d| d.play_mode.is_transcoding())
            .unwrap_or(false)
    }

    fn update_end_time(&self, position: Ticks) {
        let duration = match self.surface.duration() {
            ms if ms > 0 => Some(Ticks::from_millis(ms)),
            _ => self.current_item().runtime,
        };
        if let Some(duration) = duration {
            self.observer.update_end_time(duration - position);
        }
    }

    fn build_report(&self, position: Ticks, is_paused: bool) -> Option<PlaybackReport> {
        let descriptor = self.descriptor.as_ref()?;
        Some(PlaybackReport {
            item_id: self.current_item().id.clone(),
            media_source_id: Some(descriptor.media_source.id.clone()),
            play_session_id: descriptor.play_session_id.clone(),
            position,
            is_paused,
            is_muted: self.muted,
            can_seek: descriptor.play_mode.can_seek(),
            play_method: descriptor.play_mode.method,
            audio_stream_index: self.audio_index,
            subtitle_stream_index: self.subtitle_index,
            playback_rate: self.speed,
        })
    }

    fn start_reporter(&mut self) {
        let interval = self.config.report_interval();
        self.reporter.start(interval, self.internal_tx.clone(), |generation| {
            Internal::ReportTick { generation }
        });
    }

    fn report_progress(&mut self) {
        let position = self.surface_position();
        self.last_position = position;

        if let Some(report) = self.build_report(position, false) {
            self.reports.progress(report);
        }

        if let Some(next) = self.queue.peek_next() {
            if self.reporting.should_fire(position, true) {
                info!(item_id = %self.current_item().id, next_item_id = %next.id, %position, "Next item threshold reached");
                self.observer.next_item_threshold_reached(next);
                let _ = self.events.emit(SessionEvent::ThresholdReached {
                    item_id: self.current_item().id.clone(),
                    next_item_id: next.id.clone(),
                    position_ticks: position.0,
                });
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            queue_index: self.queue.index(),
            queue_len: self.queue.len(),
            item_id: self.current_item().id.clone(),
            attempt: self.attempt,
            play_mode: self.descriptor.as_ref().map(|d| d.play_mode),
            position: self.last_position,
            native_mode: self.surface.is_native_mode(),
            speed: self.speed,
            muted: self.muted,
            audio_delay_ms: self.surface.audio_delay(),
            can_seek: self.can_seek(),
            audio_index: self.audio_index,
            subtitle_index: self.subtitle_index,
            threshold: self.reporting.threshold(),
            threshold_fired: self.reporting.has_fired(),
        }
    }

    // ===== Play / Pause =====

    async fn play(&mut self, position: Ticks) -> Result<()> {
        match self.state {
            PlaybackState::Idle => self.start_item(PlayRequest::at(position), true),
            PlaybackState::Paused => self.resume().await,
            _ => Ok(()),
        }
    }

    async fn resume(&mut self) -> Result<()> {
        self.surface.start().await?;
        self.transition(PlaybackState::Playing);
        self.start_reporter();
        Ok(())
    }

    /// Validate the current item and send a negotiation attempt.
    fn start_item(&mut self, request: PlayRequest, fresh_item: bool) -> Result<()> {
        let item = self.current_item().clone();

        if item.location == ItemLocation::Missing {
            warn!(item_id = %item.id, "Item media is missing");
            self.observer.show_message(UserMessage::for_validation(
                &ValidationError::ItemMissing,
                self.queue.has_next(),
            ));
            return Err(ValidationError::ItemMissing.into());
        }
        if item.play_access != PlayAccess::Full || item.is_placeholder {
            let error = ValidationError::PlayAccessDenied {
                placeholder: item.is_placeholder,
            };
            warn!(item_id = %item.id, "Play access denied");
            self.observer
                .show_message(UserMessage::for_validation(&error, self.queue.has_next()));
            return Err(error.into());
        }

        if fresh_item {
            self.reporting = ReportingContext::for_item(&item, &self.config);
        }
        self.attempt += 1;
        self.pending_start = (!request.start_position.is_zero()).then_some(request.start_position);
        self.first_progress_seen = false;
        self.last_position = request.start_position;
        self.audio_index = request.audio_stream_index;
        self.subtitle_index = request.subtitle_stream_index;

        info!(
            item_id = %item.id,
            attempt = self.attempt,
            start = %request.start_position,
            "Starting playback"
        );
        self.transition(PlaybackState::Buffering);
        self.spawn_negotiation(item, request);
        Ok(())
    }

    fn spawn_negotiation(&self, item: PlayableItem, request: PlayRequest) {
        let attempt = self.attempt;
        let negotiator = self.negotiator.clone();
        let service = self.service.clone();
        let tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let plan = negotiator.plan(service.as_ref(), &item, &request).await;
            let result = negotiator
                .negotiate(service.as_ref(), &plan)
                .await
                .map(|descriptor| (plan, descriptor));
            let _ = tx.send(Internal::Negotiated { attempt, result });
        });
    }

    async fn negotiation_failed(&mut self, error: PlaybackError) {
        let item_id = self.current_item().id.clone();
        error!(%item_id, error = %error, "Stream negotiation failed");

        let message = match &error {
            PlaybackError::Negotiation(reason) => UserMessage::from(reason),
            other => UserMessage::NegotiationFailed(other.to_string()),
        };
        self.observer.show_message(message);
        let _ = self.events.emit(SessionEvent::NegotiationFailed {
            item_id,
            reason: error.to_string(),
        });

        self.transition(PlaybackState::Error);
        self.stop().await;
    }

    /// Point the surface at a freshly negotiated stream.
    #[instrument(skip_all, fields(session_id = %self.id, attempt = self.attempt))]
    async fn begin_stream(&mut self, plan: NegotiationPlan, descriptor: StreamDescriptor) {
        let item = self.current_item().clone();
        let start_position = plan.options.start_position;

        if !descriptor.play_mode.is_transcoding() {
            self.audio_index = self.audio_index.or(descriptor.default_audio_index);
        }
        self.burned_in_subtitle = plan
            .options
            .subtitle_stream_index
            .filter(|_| descriptor.play_mode.is_transcoding());

        if let Err(e) = self.attach_surface(&item, &descriptor).await {
            self.plan = Some(plan);
            self.descriptor = Some(descriptor);
            self.on_playback_error(e.to_string()).await;
            return;
        }

        let _ = self.events.emit(SessionEvent::ItemStarted {
            item_id: item.id.clone(),
            play_method: descriptor.play_mode.method.as_str().to_string(),
            start_position_ticks: start_position.0,
        });
        self.plan = Some(plan);
        self.descriptor = Some(descriptor);

        if let Some(report) = self.build_report(start_position, false) {
            self.reports.start(report);
        }
        self.observer.update_display();
    }

    async fn attach_surface(
        &self,
        item: &PlayableItem,
        descriptor: &StreamDescriptor,
    ) -> bridge_traits::error::Result<()> {
        self.surface.set_native_mode(descriptor.native_decode).await?;
        self.surface
            .set_network_buffer(self.negotiator.buffer_amount_ms(item))
            .await?;
        debug!(url = %redact_url(&descriptor.url), native = descriptor.native_decode, "Attaching stream");
        self.surface.set_source(&descriptor.url).await?;
        self.surface.start().await
    }

    async fn on_prepared(&mut self) {
        self.transition(PlaybackState::Playing);
        self.start_reporter();
        self.update_end_time(self.last_position);

        let (default_audio, default_subtitle) = match &self.descriptor {
            Some(d) => (d.default_audio_index, d.default_subtitle_index),
            None => (None, None),
        };

        if self.burned_in_subtitle.is_none() {
            let requested = self.subtitle_index.or(default_subtitle);
            if let Err(e) = self.apply_subtitle(requested).await {
                warn!(error = %e, "Default subtitle selection failed");
            }
        }

        if let Some(index) = default_audio {
            if let Err(e) = self.surface.set_audio_track(index).await {
                warn!(index, error = %e, "Default audio selection failed");
            }
        }
    }

    async fn on_progress(&mut self, position: Ticks) {
        if !self.first_progress_seen {
            self.first_progress_seen = true;

            if let Some(start) = self.pending_start.take() {
                self.transition(PlaybackState::Seeking);
                match self.surface.seek_to(start.as_millis()).await {
                    Ok(ms) => self.last_position = Ticks::from_millis(ms),
                    Err(e) => {
                        warn!(error = %e, "Resume seek failed");
                        self.warn_user(UserMessage::SeekFailed);
                    }
                }
                self.transition(PlaybackState::Playing);
            } else {
                self.last_position = position;
            }

            let requested_audio = self
                .plan
                .as_ref()
                .and_then(|p| p.options.audio_stream_index);
            if let (Some(index), false) = (requested_audio, self.is_transcoding()) {
                if let Err(e) = self.surface.set_audio_track(index).await {
                    warn!(index, error = %e, "Requested audio track not applied");
                }
            }
        } else {
            self.last_position = position;
        }

        if !self.skip.is_pending() {
            self.observer.set_current_time(self.last_position);
        }
    }

    async fn pause(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Ok(());
        }

        self.surface.pause().await?;
        self.skip.cancel();
        self.reporter.stop();

        let position = self.surface_position();
        self.last_position = position;
        if let Some(report) = self.build_report(position, true) {
            self.reports.progress(report);
        }
        self.transition(PlaybackState::Paused);
        Ok(())
    }

    // ===== Seek / Skip =====

    async fn seek(&mut self, position: Ticks) -> Result<()> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Ok(());
        }

        let had_skip = self.skip.is_pending();
        self.skip.cancel();
        self.seek_to(position).await;

        if had_skip && self.state == PlaybackState::Playing {
            self.start_reporter();
        }
        Ok(())
    }

    /// Seek on the surface. Failures are warnings; state does not change.
    async fn seek_to(&mut self, position: Ticks) {
        if !self.can_seek() {
            debug!("Source does not support seeking");
            self.warn_user(UserMessage::SeekFailed);
            return;
        }

        let mut target = position.max(Ticks::ZERO);
        let duration = self.surface.duration();
        if duration > 0 {
            target = Ticks(target.0.min(Ticks::from_millis(duration).0));
        }

        match self.surface.seek_to(target.as_millis()).await {
            Ok(ms) => {
                let landed = Ticks::from_millis(ms);
                self.last_position = landed;
                self.observer.set_current_time(landed);
                self.update_end_time(landed);
            }
            Err(e) => {
                warn!(error = %e, target = %target, "Seek failed");
                self.warn_user(UserMessage::SeekFailed);
            }
        }
    }

    fn queue_skip(&mut self, delta: Ticks) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Ok(());
        }
        if !self.can_seek() {
            self.warn_user(UserMessage::SeekFailed);
            return Ok(());
        }

        self.reporter.stop();
        let accumulated = self.skip.push(
            delta,
            self.config.skip_quiet_period(),
            self.internal_tx.clone(),
            |generation| Internal::SkipElapsed { generation },
        );

        let prospective = (self.surface_position() + accumulated).max(Ticks::ZERO);
        debug!(accumulated = accumulated.0, %prospective, "Skip queued");
        self.observer.set_current_time(prospective);
        Ok(())
    }

    async fn apply_skip(&mut self, delta: Ticks) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let target = self.surface_position() + delta;
        self.seek_to(target).await;
        self.start_reporter();
    }

    // ===== Stop / Queue =====

    async fn stop(&mut self) {
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Undefined) {
            return;
        }

        self.skip.cancel();
        self.reporter.stop();
        // supersede in-flight negotiation and subtitle work
        self.attempt += 1;
        self.subtitle_selection += 1;
        if self.subtitle_fetch_pending {
            self.subtitle_fetch_pending = false;
            self.observer.show_subtitle_loading(false);
        }

        let position = if self.descriptor.is_some() {
            match self.surface_position() {
                p if p > Ticks::ZERO => p,
                _ => self.last_position,
            }
        } else {
            self.last_position
        };

        // a paused surface still holds the stream
        if self.descriptor.is_some() || self.surface.is_playing() {
            if let Err(e) = self.surface.stop_playback().await {
                warn!(error = %e, "Surface failed to stop");
            }
        }
        tokio::time::sleep(self.config.stop_grace()).await;

        if let Some(report) = self.build_report(position, false) {
            self.reports.stopped(report);
        }

        if self.muted {
            if let Err(e) = self.surface.set_muted(false).await {
                warn!(error = %e, "Failed to clear mute");
            }
            self.muted = false;
        }

        self.last_position = position;
        self.plan = None;
        self.descriptor = None;
        self.pending_start = None;
        self.burned_in_subtitle = None;
        self.transition(PlaybackState::Idle);
    }

    async fn on_playback_error(&mut self, message: String) {
        error!(session_id = %self.id, item_id = %self.current_item().id, %message, "Playback error");
        self.observer.show_message(UserMessage::PlaybackError(message));
        self.transition(PlaybackState::Error);
        self.stop().await;

        if !self.config.advance_on_error {
            return;
        }
        if self.queue.has_next() {
            if let Err(e) = self.advance_and_play().await {
                warn!(error = %e, "Could not continue with next item");
            }
        } else {
            self.finish_session();
        }
    }

    async fn on_completed(&mut self) {
        info!(item_id = %self.current_item().id, "Item completed");
        self.stop().await;

        if self.queue.has_next() {
            if let Err(e) = self.advance_and_play().await {
                warn!(error = %e, "Could not continue with next item");
            }
        } else {
            self.finish_session();
        }
    }

    fn finish_session(&self) {
        info!(session_id = %self.id, "Queue finished");
        let _ = self.events.emit(SessionEvent::QueueFinished);
        self.observer.finish_session();
    }

    async fn next(&mut self) -> Result<()> {
        if !self.queue.has_next() {
            return Ok(());
        }
        self.stop().await;
        self.advance_and_play().await
    }

    async fn advance_and_play(&mut self) -> Result<()> {
        let item_id = self.queue.advance()?.id.clone();
        self.observer.remove_head_of_display_queue();
        let _ = self.events.emit(SessionEvent::QueueAdvanced {
            index: self.queue.index(),
            item_id,
        });
        self.start_item(PlayRequest::at(Ticks::ZERO), true)
    }

    /// Stop and negotiate the current item again at the current position.
    async fn renegotiate(&mut self, audio: Option<i32>, subtitle: Option<i32>) -> Result<()> {
        let position = match self.surface_position() {
            p if p > Ticks::ZERO => p,
            _ => self.last_position,
        };
        let media_source_id = self.descriptor.as_ref().map(|d| d.media_source.id.clone());
        // non burned-in selections are re-applied once the new stream is prepared
        let selected_subtitle = match subtitle {
            Some(_) => subtitle,
            None if self.burned_in_subtitle.is_none() => self.subtitle_index,
            None => None,
        };

        self.stop().await;
        self.start_item(
            PlayRequest {
                start_position: position,
                media_source_id,
                audio_stream_index: audio,
                subtitle_stream_index: subtitle,
            },
            false,
        )?;
        self.subtitle_index = selected_subtitle;
        Ok(())
    }

    // ===== Tracks =====

    async fn switch_audio_track(&mut self, index: i32) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Ok(());
        }

        if self.is_transcoding() {
            info!(index, "Renegotiating for audio track change");
            let subtitle = self.burned_in_subtitle;
            return self.renegotiate(Some(index), subtitle).await;
        }

        self.surface.set_audio_track(index).await?;
        self.audio_index = Some(index);
        Ok(())
    }

    async fn switch_subtitle_track(&mut self, index: Option<i32>) -> Result<()> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Ok(());
        }
        self.apply_subtitle(index).await
    }

    async fn apply_subtitle(&mut self, index: Option<i32>) -> Result<()> {
        let action = match &self.descriptor {
            Some(descriptor) => self.subtitles.resolve(
                index,
                SubtitleContext {
                    item_id: &self.queue.current().id,
                    descriptor,
                    native_mode: self.surface.is_native_mode(),
                    burned_in: self.burned_in_subtitle,
                },
                self.service.as_ref(),
            ),
            None => return Ok(()),
        };
        debug!(?index, ?action, "Subtitle request resolved");

        self.subtitle_selection += 1;
        if self.subtitle_fetch_pending {
            self.subtitle_fetch_pending = false;
            self.observer.show_subtitle_loading(false);
        }

        match action {
            SubtitleAction::Disable => {
                self.observer.add_external_subtitle(None);
                self.surface.disable_subtitles().await?;
                self.subtitle_index = None;
            }
            SubtitleAction::RenegotiateWithout => {
                let audio = self.audio_index;
                self.renegotiate(audio, None).await?;
            }
            SubtitleAction::SelectInternal { index } => {
                self.observer.add_external_subtitle(None);
                let tracks = self
                    .descriptor
                    .as_ref()
                    .map(|d| d.media_source.surface_tracks())
                    .unwrap_or_default();
                match self.surface.set_subtitle_track(index, &tracks).await {
                    Ok(true) => self.subtitle_index = Some(index),
                    Ok(false) => self.warn_user(UserMessage::SubtitleSelectFailed),
                    Err(e) => {
                        warn!(index, error = %e, "Surface rejected subtitle track");
                        self.warn_user(UserMessage::SubtitleSelectFailed);
                    }
                }
            }
            SubtitleAction::FetchExternal { index, url } => {
                self.observer.add_external_subtitle(None);
                self.surface.disable_subtitles().await?;
                self.observer.show_subtitle_loading(true);
                self.subtitle_index = Some(index);
                self.subtitle_fetch_pending = true;

                let selection = self.subtitle_selection;
                let service = self.service.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = service.fetch_external_subtitle(&url).await;
                    let _ = tx.send(Internal::SubtitleFetched { selection, result });
                });
            }
            SubtitleAction::BurnIn { index } => {
                info!(index, "Renegotiating to burn in subtitle");
                self.warn_user(UserMessage::BurnInRestart);
                let audio = self.audio_index;
                self.renegotiate(audio, Some(index)).await?;
            }
            SubtitleAction::AlreadyActive => {}
            SubtitleAction::Unsupported { index } => {
                warn!(index, "Segmented text subtitles are not supported");
                self.warn_user(UserMessage::UnsupportedSubtitle);
            }
            SubtitleAction::Unknown { index } => {
                warn!(index, "Unknown subtitle stream");
                self.warn_user(UserMessage::SubtitleSelectFailed);
            }
        }
        Ok(())
    }

    async fn set_playback_speed(&mut self, speed: f32) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlaybackError::InvalidState(format!(
                "invalid playback speed {}",
                speed
            )));
        }
        self.surface.set_playback_speed(speed).await?;
        self.speed = speed;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.stop().await;
        self.reporter.stop();
        self.skip.cancel();
        self.reports.close().await;
        self.transition(PlaybackState::Undefined);
    }
}
