//! Latest authoritative state.
//!
//! The store holds the newest [`GameSnapshot`] and [`MagazineStatus`].
//! Updates are parsed and validated in full before they replace anything,
//! so readers only ever see a complete snapshot or the previous one.
//!
//! Frames are applied in arrival order. A frame that arrives late (for
//! example one in flight across a reconnect) still wins; nothing here
//! reorders or rejects by age.

use tracing::{debug, warn};

use super::game::{FrameError, GameSnapshot};
use super::hardware::MagazineStatus;

/// Holds the current snapshot for one session.
#[derive(Debug, Default)]
pub struct StateStore {
    snapshot: Option<GameSnapshot>,

    /// Board size fixed by the first snapshot of the session
    dimensions: Option<(usize, usize)>,

    magazines: Option<MagazineStatus>,

    /// Snapshots applied since the last clear
    pub applied: u64,

    /// Frames dropped as malformed since construction
    pub dropped: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot. `None` before the first update: a loading state.
    pub fn current_snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn magazines(&self) -> Option<&MagazineStatus> {
        self.magazines.as_ref()
    }

    /// Replace the current snapshot.
    pub fn apply_snapshot(&mut self, update: GameSnapshot) -> Result<&GameSnapshot, FrameError> {
        let found = update.dimensions();
        if let Some(expected) = self.dimensions {
            if expected != found {
                self.dropped += 1;
                return Err(FrameError::DimensionsChanged { expected, found });
            }
        }

        self.dimensions = Some(found);
        self.applied += 1;
        Ok(&*self.snapshot.insert(update))
    }

    /// Parse and apply a `game_state` frame. A malformed frame is dropped
    /// and the last good snapshot stays current.
    pub fn apply_frame(&mut self, text: &str) -> Result<&GameSnapshot, FrameError> {
        match GameSnapshot::parse(text) {
            Ok(update) => self.apply_snapshot(update),
            Err(err) => {
                self.dropped += 1;
                warn!(error = %err, "dropping malformed game_state frame");
                Err(err)
            }
        }
    }

    /// Prime the store from the one-time status fetch. Ignored once a push
    /// frame has already landed, since that frame is newer.
    pub fn seed(&mut self, update: GameSnapshot) -> Result<bool, FrameError> {
        if self.snapshot.is_some() {
            debug!("live feed already delivered a snapshot; discarding seed");
            return Ok(false);
        }
        self.apply_snapshot(update)?;
        Ok(true)
    }

    /// Parse and apply a `magazine_status` frame.
    pub fn apply_magazine_frame(&mut self, text: &str) -> Result<&MagazineStatus, FrameError> {
        match MagazineStatus::parse(text) {
            Ok(status) => Ok(&*self.magazines.insert(status)),
            Err(err) => {
                self.dropped += 1;
                warn!(error = %err, "dropping malformed magazine_status frame");
                Err(err)
            }
        }
    }

    /// Discard the session's snapshot. Magazine status is kiosk-wide and stays.
    pub fn clear(&mut self) {
        self.snapshot = None;
        self.dimensions = None;
        self.applied = 0;
    }
}
