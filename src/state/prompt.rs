//! Prompt scheduler.
//!
//! Chooses the line of text shown above the board. When the human's turn
//! begins with a bot annotation, the annotation stays up for a fixed window
//! and is then replaced by an idle prompt picked at random from a fixed
//! pool. The pending switch is a deadline owned by the scheduler; the
//! caller drives it with [`PromptScheduler::tick`]. Cancelling drops the
//! deadline, so nothing fires after the turn flips or the screen goes away.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::trace;

use super::game::GameSnapshot;

/// Default time a move annotation stays visible.
pub const DEFAULT_PROMPT_WINDOW: Duration = Duration::from_secs(6);

/// Idle prompts shown while waiting for the human.
pub const IDLE_PROMPTS: &[&str] = &[
    "Your turn!",
    "Your move. Pick a column.",
    "Drop a coin when you're ready.",
    "Which column will it be?",
    "The robot is waiting for you.",
];

/// What the prompt line shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Prompt {
    #[default]
    None,

    /// The bot's annotation of its last move
    MoveMessage(String),

    YourTurn(&'static str),
}

impl Prompt {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::MoveMessage(text) => Some(text),
            Self::YourTurn(text) => Some(text),
        }
    }
}

#[derive(Debug)]
pub struct PromptScheduler {
    window: Duration,
    pool: &'static [&'static str],
    rng: StdRng,
    current: Prompt,

    /// When the move message gives way to an idle prompt
    switch_at: Option<Instant>,

    /// Whether the last snapshot had the human to move
    human_turn: bool,

    /// Move message of the last human-turn snapshot
    last_message: Option<String>,
}

impl PromptScheduler {
    pub fn new(window: Duration) -> Self {
        Self::with_rng(window, StdRng::from_entropy())
    }

    pub fn with_rng(window: Duration, rng: StdRng) -> Self {
        Self {
            window,
            pool: IDLE_PROMPTS,
            rng,
            current: Prompt::None,
            switch_at: None,
            human_turn: false,
            last_message: None,
        }
    }

    pub fn current(&self) -> &Prompt {
        &self.current
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.switch_at
    }

    /// Feed the newest snapshot.
    ///
    /// A repeated human-turn snapshot keeps the running schedule unless it
    /// carries a new move message, which restarts the window.
    pub fn on_snapshot(&mut self, snapshot: &GameSnapshot, now: Instant) {
        let human_turn = snapshot.is_human_turn() && !snapshot.is_terminal();
        if !human_turn {
            self.cancel();
            return;
        }

        let message = snapshot.move_message.as_deref().filter(|m| !m.is_empty());
        let first = !self.human_turn;
        self.human_turn = true;

        match message {
            Some(message) if first || self.last_message.as_deref() != Some(message) => {
                trace!(%message, "showing move message");
                self.last_message = Some(message.to_string());
                self.current = Prompt::MoveMessage(message.to_string());
                self.switch_at = Some(now + self.window);
            }
            None if first => {
                self.last_message = None;
                self.show_idle();
            }
            _ => {}
        }
    }

    /// Fire the switch if its deadline has passed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.switch_at {
            Some(at) if now >= at => {
                self.show_idle();
                true
            }
            _ => false,
        }
    }

    /// Drop any pending switch and clear the prompt.
    pub fn cancel(&mut self) {
        self.switch_at = None;
        self.human_turn = false;
        self.last_message = None;
        self.current = Prompt::None;
    }

    fn show_idle(&mut self) {
        self.switch_at = None;
        self.current = self
            .pool
            .choose(&mut self.rng)
            .map_or(Prompt::None, |&p| Prompt::YourTurn(p));
    }
}
