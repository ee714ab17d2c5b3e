//! Move gate.
//!
//! Decides whether a column tap may become a move request. The gate reads
//! only the current snapshot and session flags; it never asks the
//! controller. A rejected move sends nothing and changes nothing.

use super::game::GameSnapshot;
use super::session::{PendingRequest, SessionScreen};

/// Why a column tap did not produce a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejection {
    #[error("not on the playing screen")]
    NotPlaying,

    #[error("no snapshot received yet")]
    NoSnapshot,

    #[error("game is over")]
    GameOver,

    #[error("column {0} is not a valid move")]
    InvalidColumn(usize),

    #[error("another request is in flight")]
    RequestPending,

    #[error("not the player's turn")]
    NotYourTurn,

    #[error("connection to the game was lost")]
    SessionLost,
}

/// Everything a move decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct MoveGate<'a> {
    pub screen: SessionScreen,
    pub snapshot: Option<&'a GameSnapshot>,
    pub pending: Option<&'a PendingRequest>,
    pub session_lost: bool,
}

impl MoveGate<'_> {
    /// Check a tap on `column`.
    pub fn check(&self, column: usize) -> Result<(), MoveRejection> {
        if !self.screen.is_playing() {
            return Err(MoveRejection::NotPlaying);
        }
        if self.session_lost {
            return Err(MoveRejection::SessionLost);
        }
        let snapshot = self.snapshot.ok_or(MoveRejection::NoSnapshot)?;
        if snapshot.is_terminal() {
            return Err(MoveRejection::GameOver);
        }
        if self.pending.is_some() {
            return Err(MoveRejection::RequestPending);
        }
        // A missing turn field leaves the decision to the valid-move set.
        if snapshot.turn.is_some() && !snapshot.is_human_turn() {
            return Err(MoveRejection::NotYourTurn);
        }
        if !snapshot.is_valid_move(column) {
            return Err(MoveRejection::InvalidColumn(column));
        }
        Ok(())
    }

    /// Columns a tap would currently be accepted on.
    pub fn open_columns(&self) -> Vec<usize> {
        match self.snapshot {
            Some(snapshot) => snapshot
                .valid_moves()
                .iter()
                .copied()
                .filter(|&c| self.check(c).is_ok())
                .collect(),
            None => Vec::new(),
        }
    }
}
