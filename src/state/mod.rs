//! State management for the ConnecTUM kiosk client.
//!
//! This module provides the core state types and the hub that ties them
//! together:
//!
//! - `connection` - Feed sockets with backoff-governed reconnection
//! - `game` - Validated game snapshots
//! - `store` - Latest snapshot and magazine status
//! - `session` - Screen state machine and the in-flight request marker
//! - `gate` - Move validation against the current snapshot
//! - `prompt` - Timed move message / idle prompt switching
//! - `notice` - Failure classification and error surfaces
//! - `leaderboard` - Ranking view with its own fetch marker
//! - `hardware` - Magazine status and the camera carousel
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            KioskState                                │
//! │                                                                      │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────┐          │
//! │  │ FeedConnection │  │ FeedConnection │  │ FeedConnection │          │
//! │  │   game_state   │  │ magazine_status│  │     camera     │          │
//! │  └───────┬────────┘  └───────┬────────┘  └───────┬────────┘          │
//! │          │ frames            │ frames            │ images            │
//! │  ┌───────▼───────────────────▼──────┐    ┌───────▼────────┐          │
//! │  │            StateStore            │    │   CameraView   │          │
//! │  └───────┬──────────────────────────┘    └────────────────┘          │
//! │          │ snapshot                                                  │
//! │  ┌───────▼────────┐  ┌────────────────┐  ┌────────────────┐          │
//! │  │PromptScheduler │  │    Session     │──▶    MoveGate    │          │
//! │  └────────────────┘  │ Start/Playing/ │  └───────┬────────┘          │
//! │                      │  Leaderboard   │          │ accepted moves    │
//! │                      └────────────────┘  ┌───────▼────────┐          │
//! │                                          │ RequestGateway │          │
//! │                                          └────────────────┘          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here performs IO. The host owns the sockets and the HTTP
//! client, reports socket signals through [`KioskState::on_socket`] and
//! request results through [`KioskState::complete_request`], and calls
//! [`KioskState::tick`] no later than [`KioskState::next_deadline`].

pub mod connection;
pub mod game;
pub mod gate;
pub mod hardware;
pub mod leaderboard;
pub mod notice;
pub mod prompt;
pub mod session;
pub mod store;

use std::time::Instant;

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError, NicknameCache};
use crate::protocol::{Difficulty, Endpoints, OutboundRequest, RequestOutcome};

// Re-export commonly used types
pub use connection::{
    BackoffPolicy, ConnectionState, FeedConnection, FeedEvent, FeedKind, Frame, SocketId,
    SocketSignal, Transport, TransportError,
};
pub use game::{Cell, FrameError, GameSnapshot, Outcome, Side};
pub use gate::{MoveGate, MoveRejection};
pub use hardware::{CameraOptions, CameraView, MagazineStatus};
pub use leaderboard::LeaderboardView;
pub use notice::{Action, Dialog, InlineNotice, Notices, RequestFailure, Surface};
pub use prompt::{Prompt, PromptScheduler};
pub use session::{
    GameSetup, InvalidTransition, PendingKind, PendingRequest, ScreenEvent, Session, SessionScreen,
};
pub use store::StateStore;

/// Hands outbound HTTP requests to the host.
///
/// The host performs the request and reports back through
/// [`KioskState::complete_request`] with the same `seq`.
pub trait RequestGateway {
    fn dispatch(&mut self, request: OutboundRequest);
}

/// Collects requests for the host to drain.
impl RequestGateway for Vec<OutboundRequest> {
    fn dispatch(&mut self, request: OutboundRequest) {
        self.push(request);
    }
}

/// One transport per feed.
#[derive(Debug, Default)]
pub struct FeedTransports<T> {
    pub game_state: T,
    pub magazine_status: T,
    pub camera: T,
}

/// Combined kiosk state.
///
/// Every handler runs to completion; the host calls them one at a time
/// from its event loop.
#[derive(Debug)]
pub struct KioskState<T: Transport, G: RequestGateway> {
    config: ClientConfig,
    endpoints: Endpoints,
    gateway: G,

    game_feed: FeedConnection<T>,
    magazine_feed: FeedConnection<T>,
    camera_feed: FeedConnection<T>,

    store: StateStore,
    session: Session,
    prompts: PromptScheduler,
    leaderboard: LeaderboardView,
    camera: CameraView,
    camera_options: CameraOptions,
    nickname_cache: Option<NicknameCache>,

    /// The one-time `GET /status` issued after a start
    seed_seq: Option<u64>,

    /// `POST /reset` waiting for the in-flight request to settle
    deferred_reset: Option<u64>,

    next_seq: u64,
}

impl<T: Transport, G: RequestGateway> KioskState<T, G> {
    pub fn new(
        config: ClientConfig,
        transports: FeedTransports<T>,
        gateway: G,
    ) -> Result<Self, ConfigError> {
        let endpoints = config.endpoints()?;
        let policy = config.backoff.policy();
        let nickname_cache = config.nickname_cache.clone().map(NicknameCache::new);

        let mut setup = GameSetup::default();
        if let Some(nickname) = nickname_cache.as_ref().and_then(NicknameCache::load) {
            debug!(%nickname, "restored cached nickname");
            setup.nickname = nickname;
        }

        Ok(Self {
            endpoints,
            gateway,
            game_feed: FeedConnection::new(FeedKind::GameState, transports.game_state, policy),
            magazine_feed: FeedConnection::new(
                FeedKind::MagazineStatus,
                transports.magazine_status,
                policy,
            ),
            camera_feed: FeedConnection::new(FeedKind::Camera, transports.camera, policy),
            store: StateStore::new(),
            session: Session::new(setup),
            prompts: PromptScheduler::new(config.prompt_window()),
            leaderboard: LeaderboardView::default(),
            camera: CameraView::new(config.carousel_len),
            camera_options: CameraOptions::new(),
            nickname_cache,
            seed_seq: None,
            deferred_reset: None,
            next_seq: 0,
            config,
        })
    }

    /// Replace the prompt randomness, e.g. with a seeded generator.
    pub fn seed_prompts(&mut self, rng: StdRng) {
        self.prompts = PromptScheduler::with_rng(self.config.prompt_window(), rng);
    }

    // ---- accessors ----

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn screen(&self) -> SessionScreen {
        self.session.screen()
    }

    /// Start screen choices; only takes effect on the next start.
    pub fn setup_mut(&mut self) -> &mut GameSetup {
        &mut self.session.setup
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.store.current_snapshot()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn magazines(&self) -> Option<&MagazineStatus> {
        self.store.magazines()
    }

    pub fn prompt(&self) -> &Prompt {
        self.prompts.current()
    }

    /// Per-column evaluation, only for games started in training mode.
    pub fn training_scores(&self) -> Option<&[f64]> {
        if !self.session.training_mode() {
            return None;
        }
        self.snapshot()?.scores.as_deref()
    }

    pub fn gate(&self) -> MoveGate<'_> {
        self.session.gate(self.store.current_snapshot())
    }

    pub fn visible_notice(&self) -> Option<Surface<'_>> {
        self.session.notices().visible()
    }

    pub fn leaderboard(&self) -> &LeaderboardView {
        &self.leaderboard
    }

    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    pub fn camera_options(&self) -> &CameraOptions {
        &self.camera_options
    }

    pub fn feed(&self, kind: FeedKind) -> &FeedConnection<T> {
        match kind {
            FeedKind::GameState => &self.game_feed,
            FeedKind::MagazineStatus => &self.magazine_feed,
            FeedKind::Camera => &self.camera_feed,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    // ---- user actions ----

    /// Open the kiosk-wide magazine status feed.
    pub fn open_status_feeds(&mut self, now: Instant) {
        let url = self.endpoints.magazine_status_feed().clone();
        let events = self.magazine_feed.connect(url, now);
        self.route(FeedKind::MagazineStatus, events, now);
    }

    /// Send `POST /new_game` with the current setup. Returns the request
    /// `seq`, or `None` when not on the start screen or a request is in flight.
    pub fn start_game(&mut self, now: Instant) -> Option<u64> {
        if self.session.screen() != SessionScreen::Start {
            debug!(screen = %self.session.screen(), "start ignored outside the start screen");
            return None;
        }
        if self.session.has_pending() {
            debug!("start ignored while a request is in flight");
            return None;
        }

        let request = self.session.setup.to_request();
        if let (Some(cache), Some(nickname)) = (&self.nickname_cache, request.nickname.as_deref()) {
            if let Err(err) = cache.store(nickname) {
                warn!(error = %err, "could not cache nickname");
            }
        }

        let seq = self.next_seq();
        self.session.begin(PendingKind::Start, seq, now);
        info!(
            seq,
            difficulty = %request.difficulty,
            training_mode = request.training_mode,
            "starting game"
        );
        self.gateway.dispatch(self.endpoints.new_game(seq, &request));
        Some(seq)
    }

    /// Send `POST /move` if the gate allows it. A rejected move sends
    /// nothing and leaves all state untouched.
    pub fn submit_move(&mut self, column: usize, now: Instant) -> Result<u64, MoveRejection> {
        if let Err(rejection) = self.gate().check(column) {
            debug!(column, %rejection, "move rejected locally");
            return Err(rejection);
        }

        let seq = self.next_seq();
        self.session.begin(PendingKind::Move { column }, seq, now);
        debug!(seq, column, "submitting move");
        self.gateway.dispatch(self.endpoints.make_move(seq, column));
        Ok(seq)
    }

    /// Leave the board for the leaderboard. Returns the fetch `seq`.
    pub fn show_leaderboard(&mut self, now: Instant) -> Result<u64, InvalidTransition> {
        self.session.show_leaderboard()?;
        self.teardown_playing(now);

        let difficulty = self
            .session
            .active_setup()
            .map_or(self.session.setup.difficulty, |s| s.difficulty);
        self.leaderboard.clear();
        self.leaderboard.select(difficulty);
        Ok(self.fetch_leaderboard())
    }

    /// Change the leaderboard filter. Returns the fetch `seq` if one was sent.
    pub fn select_leaderboard_difficulty(&mut self, difficulty: Difficulty) -> Option<u64> {
        if self.session.screen() != SessionScreen::Leaderboard {
            return None;
        }
        if !self.leaderboard.select(difficulty) {
            return None;
        }
        Some(self.fetch_leaderboard())
    }

    /// Back to the start screen. Local state clears at once; the
    /// `POST /reset` is best-effort and is held back while another session
    /// request is in flight. Returns its `seq`.
    pub fn reset(&mut self, now: Instant) -> Result<u64, InvalidTransition> {
        self.session.reset()?;
        self.teardown_playing(now);
        self.store.clear();
        self.leaderboard.clear();

        let seq = self.next_seq();
        if let Some(pending) = self.session.pending() {
            info!(seq, waiting_on = pending.seq, "session reset; request deferred");
            self.deferred_reset = Some(seq);
        } else {
            info!(seq, "session reset");
            self.send_reset(seq, now);
        }
        Ok(seq)
    }

    pub fn dismiss_dialog(&mut self) -> Option<Dialog> {
        self.session.notices_mut().dismiss_dialog()
    }

    pub fn open_camera(&mut self, now: Instant) {
        let url = self.endpoints.camera_feed().clone();
        let events = self.camera_feed.connect(url, now);
        self.route(FeedKind::Camera, events, now);
    }

    pub fn close_camera(&mut self, now: Instant) {
        let events = self.camera_feed.close();
        self.route(FeedKind::Camera, events, now);
        self.camera.clear();
    }

    pub fn carousel_next(&mut self) -> usize {
        let index = self.camera.next();
        self.send_carousel_index();
        index
    }

    pub fn carousel_prev(&mut self) -> usize {
        let index = self.camera.prev();
        self.send_carousel_index();
        index
    }

    /// Request `GET /options_list`. Returns the fetch `seq`.
    pub fn fetch_camera_options(&mut self) -> u64 {
        let seq = self.next_seq();
        self.camera_options.begin_fetch(seq);
        self.gateway.dispatch(self.endpoints.options_list(seq));
        seq
    }

    /// Flip a camera option locally and send `POST /option`. Unknown
    /// labels send nothing.
    pub fn toggle_camera_option(&mut self, label: &str) -> Option<u64> {
        let seq = self.next_seq();
        let value = self.camera_options.begin_toggle(seq, label)?;
        self.gateway
            .dispatch(self.endpoints.set_option(seq, label, value));
        Some(seq)
    }

    // ---- host events ----

    /// Feed a socket signal from the host.
    pub fn on_socket(&mut self, kind: FeedKind, socket: SocketId, signal: SocketSignal, now: Instant) {
        let events = self.feed_mut(kind).handle(socket, signal, now);
        self.route(kind, events, now);
    }

    /// Feed the result of a request handed out through the gateway.
    /// Completions that no longer match a tracked `seq` are ignored.
    pub fn complete_request(&mut self, seq: u64, outcome: RequestOutcome, now: Instant) {
        if let Some(pending) = self.session.take_completed(seq) {
            self.finish_session_request(pending, &outcome, now);
        } else if self.seed_seq == Some(seq) {
            self.seed_seq = None;
            self.apply_seed(&outcome, now);
        } else if self.leaderboard.owns(seq) {
            if self.leaderboard.complete(seq, &outcome).is_err() {
                self.session
                    .notices_mut()
                    .raise_inline(leaderboard::LEADERBOARD_ERROR_TEXT);
            }
        } else if self.camera_options.owns(seq) {
            self.camera_options.complete(seq, &outcome);
        } else {
            debug!(seq, "ignoring stale completion");
        }
    }

    /// Fire every due timer: feed retries, request timeouts and the prompt switch.
    pub fn tick(&mut self, now: Instant) {
        for kind in FeedKind::ALL {
            let events = self.feed_mut(kind).poll(now);
            self.route(kind, events, now);
        }

        if let Some(pending) = self
            .session
            .expire_pending(now, self.config.request_timeout())
        {
            warn!(seq = pending.seq, kind = ?pending.kind, "request timed out");
            self.finish_session_request(pending, &RequestOutcome::TimedOut, now);
        }

        self.prompts.tick(now);
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.game_feed.next_deadline(),
            self.magazine_feed.next_deadline(),
            self.camera_feed.next_deadline(),
            self.session.pending_deadline(self.config.request_timeout()),
            self.prompts.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Close every feed and drop every timer.
    pub fn shutdown(&mut self) {
        for kind in FeedKind::ALL {
            self.feed_mut(kind).close();
        }
        self.prompts.cancel();
        self.camera.clear();
        self.seed_seq = None;
        self.deferred_reset = None;
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "session": self.session.to_json(),
            "snapshot": self.snapshot().map(GameSnapshot::to_json),
            "prompt": self.prompt().text(),
            "feeds": {
                "game_state": self.game_feed.state().as_str(),
                "magazine_status": self.magazine_feed.state().as_str(),
                "camera": self.camera_feed.state().as_str()
            },
            "magazines_empty": self
                .magazines()
                .map(|m| m.empty_magazines().collect::<Vec<_>>()),
            "frames_dropped": self.store.dropped
        })
    }

    // ---- internals ----

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn feed_mut(&mut self, kind: FeedKind) -> &mut FeedConnection<T> {
        match kind {
            FeedKind::GameState => &mut self.game_feed,
            FeedKind::MagazineStatus => &mut self.magazine_feed,
            FeedKind::Camera => &mut self.camera_feed,
        }
    }

    fn route(&mut self, kind: FeedKind, events: Vec<FeedEvent>, now: Instant) {
        for event in events {
            match event {
                FeedEvent::StatusChanged(state) => self.on_feed_status(kind, state),
                FeedEvent::Message(frame) => self.on_feed_frame(kind, frame, now),
            }
        }
    }

    fn on_feed_status(&mut self, kind: FeedKind, state: ConnectionState) {
        debug!(feed = %kind, state = state.as_str(), "feed status changed");
        match kind {
            FeedKind::GameState if state.is_failed() => {
                self.session.mark_lost();
                self.prompts.cancel();
            }
            FeedKind::Camera if state.is_open() => self.send_carousel_index(),
            _ => {}
        }
    }

    fn on_feed_frame(&mut self, kind: FeedKind, frame: Frame, now: Instant) {
        match (kind, frame) {
            (FeedKind::Camera, frame) => self.camera.on_frame(frame),
            (FeedKind::GameState, Frame::Text(text)) => {
                if !self.session.screen().is_playing() {
                    debug!("game_state frame outside a game; dropping");
                    return;
                }
                match self.store.apply_frame(&text) {
                    Ok(snapshot) => self.prompts.on_snapshot(snapshot, now),
                    Err(err) => debug!(error = %err, "game_state frame not applied"),
                }
            }
            (FeedKind::MagazineStatus, Frame::Text(text)) => {
                if let Ok(status) = self.store.apply_magazine_frame(&text) {
                    debug!(empty = ?status.empty_magazines().collect::<Vec<_>>(), "magazine status");
                }
            }
            (kind, Frame::Binary(bytes)) => {
                warn!(feed = %kind, len = bytes.len(), error = %FrameError::UnexpectedBinary, "dropping frame");
            }
        }
    }

    fn finish_session_request(&mut self, pending: PendingRequest, outcome: &RequestOutcome, now: Instant) {
        let result = RequestFailure::classify(outcome);
        let on_board = self.session.screen().is_playing();
        match (pending.kind, result) {
            (PendingKind::Start, Ok(_)) => self.enter_playing(now),
            (PendingKind::Move { column }, Ok(_)) => {
                debug!(seq = pending.seq, column, on_board, "move accepted");
                if on_board {
                    self.session.notices_mut().clear_transient();
                }
            }
            (PendingKind::Reset, Ok(_)) => debug!(seq = pending.seq, "reset acknowledged"),

            (PendingKind::Start, Err(failure)) => {
                warn!(seq = pending.seq, %failure, "start failed");
                self.session.notices_mut().report(Action::StartGame, &failure);
            }
            (PendingKind::Move { column }, Err(failure)) => {
                warn!(seq = pending.seq, column, %failure, on_board, "move failed");
                // the board is gone; nothing to attach the failure to
                if on_board {
                    self.session.notices_mut().report(Action::MakeMove, &failure);
                }
            }
            (PendingKind::Reset, Err(failure)) => {
                warn!(seq = pending.seq, %failure, "reset not acknowledged; local state already cleared");
            }
        }

        if let Some(seq) = self.deferred_reset.take() {
            debug!(seq, after = pending.seq, "sending deferred reset");
            self.send_reset(seq, now);
        }
    }

    fn send_reset(&mut self, seq: u64, now: Instant) {
        self.session.begin(PendingKind::Reset, seq, now);
        self.gateway.dispatch(self.endpoints.reset(seq));
    }

    fn enter_playing(&mut self, now: Instant) {
        if let Err(err) = self.session.game_started() {
            warn!(error = %err, "start completed on the wrong screen");
            return;
        }
        self.store.clear();
        self.prompts.cancel();

        let url = self.endpoints.game_state_feed().clone();
        let events = self.game_feed.connect(url, now);
        self.route(FeedKind::GameState, events, now);

        let seq = self.next_seq();
        self.seed_seq = Some(seq);
        self.gateway.dispatch(self.endpoints.status(seq));
    }

    fn apply_seed(&mut self, outcome: &RequestOutcome, now: Instant) {
        if !self.session.screen().is_playing() {
            return;
        }
        let parsed = RequestFailure::classify(outcome)
            .map_err(|f| f.to_string())
            .and_then(|body| GameSnapshot::parse(&body).map_err(|e| e.to_string()));
        match parsed {
            Ok(snapshot) => match self.store.seed(snapshot) {
                Ok(true) => {
                    if let Some(snapshot) = self.store.current_snapshot() {
                        self.prompts.on_snapshot(snapshot, now);
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(error = %err, "status snapshot rejected"),
            },
            Err(reason) => warn!(%reason, "could not seed game state; waiting for the live feed"),
        }
    }

    /// Release everything owned by the playing screen.
    fn teardown_playing(&mut self, now: Instant) {
        let events = self.game_feed.close();
        self.route(FeedKind::GameState, events, now);
        self.prompts.cancel();
        self.seed_seq = None;
    }

    fn send_carousel_index(&mut self) {
        if !self.camera_feed.state().is_open() {
            return;
        }
        let frame = self.camera.control_frame();
        if let Err(err) = self.camera_feed.send(&frame) {
            warn!(error = %err, "could not send carousel index");
        }
    }

    fn fetch_leaderboard(&mut self) -> u64 {
        let seq = self.next_seq();
        self.leaderboard.begin_fetch(seq);
        // an earlier failure no longer describes what is on screen
        self.session.notices_mut().clear_transient();
        let nickname = self
            .session
            .active_setup()
            .unwrap_or(&self.session.setup)
            .nickname()
            .map(str::to_string);
        self.gateway.dispatch(self.endpoints.leaderboard(
            seq,
            self.leaderboard.filter(),
            nickname.as_deref(),
        ));
        seq
    }
}
