//! Session screen state machine.
//!
//! Tracks which screen the kiosk shows and validates transitions between
//! them. The session also owns the single in-flight request marker and the
//! error surfaces.
//!
//! # State Diagram
//!
//! ```text
//!                 game_started
//! ┌───────────┐ ───────────────▶ ┌───────────┐
//! │   Start   │                  │  Playing  │
//! └───────────┘ ◀─────────────── └─────┬─────┘
//!       ▲           reset              │
//!       │                              │ show_leaderboard
//!       │          reset         ┌─────▼───────┐
//!       └─────────────────────── │ Leaderboard │
//!                                └─────────────┘
//! ```
//!
//! Background data never moves the screen. A lost game feed only raises a
//! persistent notice; the player resets explicitly.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::protocol::{Difficulty, NewGameRequest, Starter};

use super::gate::MoveGate;
use super::game::GameSnapshot;
use super::notice::{Notices, SESSION_LOST_TEXT};

/// Which screen is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionScreen {
    /// Configuring difficulty, starter, training mode and nickname
    #[default]
    Start,

    /// Snapshot-driven board interaction
    Playing,

    /// Read-only ranking view
    Leaderboard,
}

impl SessionScreen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Playing => "playing",
            Self::Leaderboard => "leaderboard",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for SessionScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    /// The controller accepted a start request
    GameStarted,
    ShowLeaderboard,
    Reset,
}

/// Error when a screen transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} via {event:?}: {reason}")]
pub struct InvalidTransition {
    pub from: SessionScreen,
    pub event: ScreenEvent,
    pub reason: &'static str,
}

/// Screen state machine.
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    screen: SessionScreen,
}

impl ScreenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> SessionScreen {
        self.screen
    }

    /// Apply an event, returning the new state or an error.
    pub fn apply(&self, event: ScreenEvent) -> Result<Self, InvalidTransition> {
        Ok(Self {
            screen: self.transition(event)?,
        })
    }

    /// Apply an event in place.
    pub fn apply_mut(&mut self, event: ScreenEvent) -> Result<(), InvalidTransition> {
        self.screen = self.transition(event)?;
        Ok(())
    }

    fn transition(&self, event: ScreenEvent) -> Result<SessionScreen, InvalidTransition> {
        use ScreenEvent::*;
        use SessionScreen::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.screen,
            event,
            reason,
        };

        match (self.screen, event) {
            (Start, GameStarted) => Ok(Playing),
            (_, GameStarted) => Err(invalid("A game is already running")),

            (Playing, ShowLeaderboard) => Ok(Leaderboard),
            (Leaderboard, ShowLeaderboard) => Err(invalid("Already showing the leaderboard")),
            (Start, ShowLeaderboard) => Err(invalid("No game to leave")),

            (Playing | Leaderboard, Reset) => Ok(Start),
            (Start, Reset) => Err(invalid("Already on the start screen")),
        }
    }
}

/// Start screen choices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameSetup {
    pub difficulty: Difficulty,
    pub who_starts: Starter,
    pub training_mode: bool,
    pub nickname: String,
}

impl GameSetup {
    /// Trimmed nickname, if any.
    pub fn nickname(&self) -> Option<&str> {
        Some(self.nickname.trim()).filter(|n| !n.is_empty())
    }

    pub fn to_request(&self) -> NewGameRequest {
        NewGameRequest {
            difficulty: self.difficulty,
            who_starts: self.who_starts,
            training_mode: self.training_mode,
            nickname: self.nickname().map(str::to_string),
        }
    }
}

/// Outbound actions that write shared session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Start,
    Move { column: usize },
    Reset,
}

/// The one in-flight session write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub seq: u64,
    pub kind: PendingKind,
    pub issued_at: Instant,
}

/// One kiosk session: screen, in-flight marker and error surfaces.
#[derive(Debug, Default)]
pub struct Session {
    screen: ScreenState,

    /// Choices for the next game
    pub setup: GameSetup,

    /// Choices the running game was started with
    active: Option<GameSetup>,

    pending: Option<PendingRequest>,
    notices: Notices,

    /// The game feed failed for good while playing
    lost: bool,

    started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(setup: GameSetup) -> Self {
        Self {
            setup,
            ..Self::default()
        }
    }

    pub fn screen(&self) -> SessionScreen {
        self.screen.screen()
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn active_setup(&self) -> Option<&GameSetup> {
        self.active.as_ref()
    }

    /// Training scores are only shown for games started in training mode.
    pub fn training_mode(&self) -> bool {
        self.active.as_ref().is_some_and(|s| s.training_mode)
    }

    /// Mark a request as in flight. A second request while one is pending
    /// is a no-op and returns `false`.
    pub fn begin(&mut self, kind: PendingKind, seq: u64, now: Instant) -> bool {
        if let Some(pending) = &self.pending {
            debug!(?kind, pending = ?pending.kind, "request already in flight; ignoring");
            return false;
        }
        self.pending = Some(PendingRequest {
            seq,
            kind,
            issued_at: now,
        });
        true
    }

    /// Take the pending marker if `seq` completes it.
    pub fn take_completed(&mut self, seq: u64) -> Option<PendingRequest> {
        if self.pending.is_some_and(|p| p.seq == seq) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Take the pending marker if it has waited longer than `timeout`.
    pub fn expire_pending(&mut self, now: Instant, timeout: Duration) -> Option<PendingRequest> {
        if self
            .pending
            .is_some_and(|p| now.saturating_duration_since(p.issued_at) >= timeout)
        {
            self.pending.take()
        } else {
            None
        }
    }

    pub fn pending_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.pending.map(|p| p.issued_at + timeout)
    }

    /// Gate for a move against `snapshot`.
    pub fn gate<'a>(&'a self, snapshot: Option<&'a GameSnapshot>) -> MoveGate<'a> {
        MoveGate {
            screen: self.screen(),
            snapshot,
            pending: self.pending.as_ref(),
            session_lost: self.lost,
        }
    }

    /// The controller accepted the start request.
    pub fn game_started(&mut self) -> Result<(), InvalidTransition> {
        self.screen.apply_mut(ScreenEvent::GameStarted)?;
        info!(difficulty = %self.setup.difficulty, "game started");
        self.active = Some(self.setup.clone());
        self.lost = false;
        self.started_at = Some(Utc::now());
        self.notices.clear_transient();
        Ok(())
    }

    /// Leave the board. An in-flight move stays pending until it completes
    /// or times out.
    pub fn show_leaderboard(&mut self) -> Result<(), InvalidTransition> {
        self.screen.apply_mut(ScreenEvent::ShowLeaderboard)?;
        if let Some(pending) = &self.pending {
            debug!(seq = pending.seq, kind = ?pending.kind, "leaving the board with a request in flight");
        }
        Ok(())
    }

    /// Back to the start screen, clearing the game. An in-flight request
    /// keeps its marker; nothing else may be sent until it settles.
    pub fn reset(&mut self) -> Result<(), InvalidTransition> {
        self.screen.apply_mut(ScreenEvent::Reset)?;
        self.active = None;
        self.lost = false;
        self.started_at = None;
        self.notices.clear_all();
        Ok(())
    }

    /// The game feed is gone for good. Only meaningful while playing.
    pub fn mark_lost(&mut self) {
        if !self.screen().is_playing() || self.lost {
            return;
        }
        warn!("game feed lost; waiting for an explicit reset");
        self.lost = true;
        self.notices.raise_persistent(SESSION_LOST_TEXT);
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "screen": self.screen().as_str(),
            "difficulty": self.active.as_ref().map(|s| s.difficulty.as_str()),
            "training_mode": self.training_mode(),
            "nickname": self.active.as_ref().and_then(|s| s.nickname()),
            "pending": self.pending.map(|p| p.seq),
            "lost": self.lost,
            "started_at": self.started_at
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn playing() -> Session {
        let mut session = Session::new(GameSetup::default());
        session.game_started().unwrap();
        session
    }

    #[test]
    fn test_initial_screen() {
        let session = Session::new(GameSetup::default());
        assert_eq!(session.screen(), SessionScreen::Start);
        assert!(!session.has_pending());
        assert!(session.started_at().is_none());
    }

    #[test]
    fn test_screen_flow() {
        let mut state = ScreenState::new();

        state.apply_mut(ScreenEvent::GameStarted).unwrap();
        assert_eq!(state.screen(), SessionScreen::Playing);

        state.apply_mut(ScreenEvent::ShowLeaderboard).unwrap();
        assert_eq!(state.screen(), SessionScreen::Leaderboard);

        state.apply_mut(ScreenEvent::Reset).unwrap();
        assert_eq!(state.screen(), SessionScreen::Start);
    }

    #[test]
    fn test_invalid_transitions() {
        let start = ScreenState::new();
        assert!(start.apply(ScreenEvent::Reset).is_err());
        assert!(start.apply(ScreenEvent::ShowLeaderboard).is_err());

        let playing = start.apply(ScreenEvent::GameStarted).unwrap();
        let err = playing.apply(ScreenEvent::GameStarted).unwrap_err();
        assert_eq!(err.from, SessionScreen::Playing);
        assert_eq!(err.reason, "A game is already running");

        let board = playing.apply(ScreenEvent::ShowLeaderboard).unwrap();
        assert!(board.apply(ScreenEvent::ShowLeaderboard).is_err());
        assert!(board.apply(ScreenEvent::GameStarted).is_err());
    }

    #[test]
    fn test_transition_error_display() {
        let err = ScreenState::new().apply(ScreenEvent::Reset).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition from start via Reset: Already on the start screen"
        );
    }

    #[test]
    fn test_single_pending_request() {
        let mut session = Session::new(GameSetup::default());
        let now = Instant::now();

        assert!(session.begin(PendingKind::Start, 1, now));
        assert!(!session.begin(PendingKind::Start, 2, now));
        assert_eq!(session.pending().unwrap().seq, 1);

        assert!(session.take_completed(2).is_none());
        assert_eq!(session.take_completed(1).unwrap().kind, PendingKind::Start);
        assert!(!session.has_pending());
    }

    #[test]
    fn test_pending_expiry() {
        let mut session = playing();
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        session.begin(PendingKind::Move { column: 3 }, 7, now);

        assert_eq!(session.pending_deadline(timeout), Some(now + timeout));
        assert!(session.expire_pending(now + Duration::from_secs(9), timeout).is_none());

        let expired = session.expire_pending(now + timeout, timeout).unwrap();
        assert_eq!(expired.kind, PendingKind::Move { column: 3 });
        assert!(!session.has_pending());
    }

    #[test]
    fn test_reset_clears_session() {
        let mut session = playing();
        session.begin(PendingKind::Move { column: 0 }, 3, Instant::now());
        session.mark_lost();

        session.reset().unwrap();

        assert_eq!(session.screen(), SessionScreen::Start);
        assert_eq!(session.pending().unwrap().seq, 3);
        assert!(!session.begin(PendingKind::Reset, 4, Instant::now()));
        assert!(!session.is_lost());
        assert!(session.notices().visible().is_none());
        assert!(session.active_setup().is_none());
    }

    #[test]
    fn test_leaderboard_keeps_in_flight_move() {
        let mut session = playing();
        let now = Instant::now();
        session.begin(PendingKind::Move { column: 2 }, 5, now);

        session.show_leaderboard().unwrap();

        assert_eq!(session.screen(), SessionScreen::Leaderboard);
        assert_eq!(session.pending().unwrap().kind, PendingKind::Move { column: 2 });
        assert_eq!(session.take_completed(5).unwrap().seq, 5);
        assert!(session.begin(PendingKind::Reset, 6, now));
    }

    #[test]
    fn test_lost_only_while_playing() {
        let mut session = Session::new(GameSetup::default());
        session.mark_lost();
        assert!(!session.is_lost());

        let mut session = playing();
        session.mark_lost();
        assert!(session.is_lost());
        assert_eq!(session.screen(), SessionScreen::Playing);
        assert_eq!(session.notices().inline().unwrap().text, SESSION_LOST_TEXT);
    }

    #[test]
    fn test_setup_request() {
        let setup = GameSetup {
            difficulty: Difficulty::Easy,
            who_starts: Starter::Bot,
            training_mode: true,
            nickname: "  ".to_string(),
        };
        assert_eq!(setup.to_request().nickname, None);

        let setup = GameSetup {
            nickname: " Ada ".to_string(),
            ..setup
        };
        assert_eq!(setup.to_request().nickname.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_training_mode_follows_started_setup() {
        let mut session = Session::new(GameSetup {
            training_mode: true,
            ..GameSetup::default()
        });
        assert!(!session.training_mode());

        session.game_started().unwrap();
        session.setup.training_mode = false;
        assert!(session.training_mode());
    }

    #[test]
    fn test_to_json() {
        let session = playing();
        let json = session.to_json();
        assert_eq!(json["screen"], "playing");
        assert_eq!(json["difficulty"], "impossible");
        assert_eq!(json["lost"], false);
        assert!(json["started_at"].is_string());
    }
}
