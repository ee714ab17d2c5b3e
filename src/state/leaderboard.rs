//! Leaderboard view.
//!
//! Read-only ranking for one difficulty at a time. Each fetch carries its
//! own `seq`; a response for a filter the player has already moved away
//! from is dropped. A failed fetch is handed back to the caller, which shows
//! it on the session's notice surface.

use tracing::{debug, warn};

use crate::protocol::{Difficulty, LeaderboardEntry, LeaderboardResponse, PlayerRank, RequestOutcome};

use super::notice::RequestFailure;

/// Text shown when the ranking cannot be loaded.
pub const LEADERBOARD_ERROR_TEXT: &str = "Could not load leaderboard";

#[derive(Debug, Default)]
pub struct LeaderboardView {
    filter: Difficulty,
    board: Option<LeaderboardResponse>,
    fetch_seq: Option<u64>,
}

impl LeaderboardView {
    pub fn new(filter: Difficulty) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn filter(&self) -> Difficulty {
        self.filter
    }

    /// Change the filter. Returns `true` if a refetch is needed.
    pub fn select(&mut self, difficulty: Difficulty) -> bool {
        if difficulty == self.filter && (self.board.is_some() || self.fetch_seq.is_some()) {
            return false;
        }
        self.filter = difficulty;
        self.board = None;
        true
    }

    /// Record the fetch for the current filter, superseding any earlier one.
    pub fn begin_fetch(&mut self, seq: u64) {
        self.fetch_seq = Some(seq);
    }

    pub fn owns(&self, seq: u64) -> bool {
        self.fetch_seq == Some(seq)
    }

    pub fn is_loading(&self) -> bool {
        self.fetch_seq.is_some()
    }

    /// Apply a fetch result. Returns `Ok(false)` for a superseded fetch and
    /// the classified failure when the current fetch did not produce a
    /// ranking.
    pub fn complete(&mut self, seq: u64, outcome: &RequestOutcome) -> Result<bool, RequestFailure> {
        if !self.owns(seq) {
            debug!(seq, "dropping superseded leaderboard response");
            return Ok(false);
        }
        self.fetch_seq = None;

        let parsed = RequestFailure::classify(outcome).and_then(|body| {
            serde_json::from_str::<LeaderboardResponse>(&body).map_err(|err| RequestFailure::Network {
                reason: format!("unreadable leaderboard: {err}"),
            })
        });
        match parsed {
            Ok(board) => {
                if board.difficulty != self.filter.as_str() {
                    debug!(got = %board.difficulty, want = %self.filter, "leaderboard for another filter");
                }
                self.board = Some(board);
                Ok(true)
            }
            Err(failure) => {
                warn!(%failure, filter = %self.filter, "leaderboard fetch failed");
                Err(failure)
            }
        }
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        self.board
            .as_ref()
            .map(|b| b.top_10.as_slice())
            .unwrap_or_default()
    }

    pub fn current_player(&self) -> Option<&PlayerRank> {
        self.board.as_ref().and_then(|b| b.current_player.as_ref())
    }

    /// Difficulties the server has rankings for, in server order. Unknown
    /// names are skipped; falls back to every difficulty before the first load.
    pub fn available_difficulties(&self) -> Vec<Difficulty> {
        match &self.board {
            Some(board) if !board.available_difficulties.is_empty() => board
                .available_difficulties
                .iter()
                .filter_map(|name| Difficulty::from_wire(name))
                .collect(),
            _ => Difficulty::ALL.to_vec(),
        }
    }

    pub fn clear(&mut self) {
        self.board = None;
        self.fetch_seq = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(difficulty: &str) -> RequestOutcome {
        RequestOutcome::ok(
            serde_json::json!({
                "difficulty": difficulty,
                "top_10": [
                    {"nickname": "Ada", "score": 120},
                    {"nickname": "Linus", "score": 95}
                ],
                "current_player": {"rank": 14, "nickname": "Grace", "score": 30},
                "available_difficulties": ["easy", "hard", "legendary"]
            })
            .to_string(),
        )
    }

    #[test]
    fn test_fetch_and_read() {
        let mut view = LeaderboardView::new(Difficulty::Easy);
        view.begin_fetch(4);
        assert!(view.is_loading());

        assert_eq!(view.complete(4, &response("easy")), Ok(true));
        assert!(!view.is_loading());
        assert_eq!(view.entries().len(), 2);
        assert_eq!(view.entries()[0].nickname, "Ada");
        assert_eq!(view.current_player().unwrap().rank, 14);
        assert_eq!(
            view.available_difficulties(),
            vec![Difficulty::Easy, Difficulty::Hard]
        );
    }

    #[test]
    fn test_superseded_filter_is_dropped() {
        let mut view = LeaderboardView::new(Difficulty::Easy);
        view.begin_fetch(1);

        assert!(view.select(Difficulty::Hard));
        view.begin_fetch(2);

        assert_eq!(view.complete(1, &response("easy")), Ok(false));
        assert!(view.entries().is_empty());

        assert_eq!(view.complete(2, &response("hard")), Ok(true));
        assert_eq!(view.entries().len(), 2);
    }

    #[test]
    fn test_same_filter_does_not_refetch() {
        let mut view = LeaderboardView::new(Difficulty::Medium);
        assert!(view.select(Difficulty::Medium));
        view.begin_fetch(1);
        assert!(!view.select(Difficulty::Medium));
    }

    #[test]
    fn test_failure_is_returned() {
        let mut view = LeaderboardView::new(Difficulty::Impossible);
        view.begin_fetch(9);

        assert!(matches!(
            view.complete(9, &RequestOutcome::TimedOut),
            Err(RequestFailure::Network { .. })
        ));
        assert!(!view.is_loading());
        assert_eq!(view.available_difficulties(), Difficulty::ALL.to_vec());

        view.begin_fetch(10);
        assert!(matches!(
            view.complete(10, &RequestOutcome::ok("not json")),
            Err(RequestFailure::Network { .. })
        ));
        assert!(view.entries().is_empty());
    }

    #[test]
    fn test_superseded_failure_is_dropped() {
        let mut view = LeaderboardView::new(Difficulty::Easy);
        view.begin_fetch(1);
        view.begin_fetch(2);

        assert_eq!(view.complete(1, &RequestOutcome::TimedOut), Ok(false));
        assert!(view.is_loading());
    }
}
