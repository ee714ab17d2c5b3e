//! Game snapshot model.
//!
//! A [`GameSnapshot`] is one complete, validated view of the board as the
//! controller last reported it. Snapshots are built in one go from a wire
//! frame and never patched afterwards.

use std::collections::BTreeSet;

use crate::protocol::SnapshotFrame;

/// Wire value of an empty cell (and of a drawn game in `winner`).
const WIRE_EMPTY: i64 = 0;
const WIRE_PLAYER: i64 = -1;
const WIRE_BOT: i64 = 1;

/// The two sides of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The human at the kiosk
    Player,
    Bot,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Bot => "bot",
        }
    }
}

/// A single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Player,
    Bot,
}

impl Cell {
    fn from_wire(value: i64) -> Result<Self, FrameError> {
        match value {
            WIRE_EMPTY => Ok(Self::Empty),
            WIRE_PLAYER => Ok(Self::Player),
            WIRE_BOT => Ok(Self::Bot),
            other => Err(FrameError::Cell(other)),
        }
    }

    fn to_wire(self) -> i64 {
        match self {
            Self::Empty => WIRE_EMPTY,
            Self::Player => WIRE_PLAYER,
            Self::Bot => WIRE_BOT,
        }
    }
}

/// Terminal result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won(Side),
    Draw,
}

impl Outcome {
    fn from_wire(value: i64) -> Result<Self, FrameError> {
        match value {
            WIRE_EMPTY => Ok(Self::Draw),
            WIRE_PLAYER => Ok(Self::Won(Side::Player)),
            WIRE_BOT => Ok(Self::Won(Side::Bot)),
            other => Err(FrameError::Winner(other)),
        }
    }

    fn to_wire(self) -> i64 {
        match self {
            Self::Draw => WIRE_EMPTY,
            Self::Won(Side::Player) => WIRE_PLAYER,
            Self::Won(Side::Bot) => WIRE_BOT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Won(Side::Player) => "player",
            Self::Won(Side::Bot) => "bot",
            Self::Draw => "draw",
        }
    }
}

fn turn_from_wire(value: i64) -> Result<Side, FrameError> {
    match value {
        0 => Ok(Side::Player),
        1 => Ok(Side::Bot),
        other => Err(FrameError::Turn(other)),
    }
}

fn turn_to_wire(side: Side) -> i64 {
    match side {
        Side::Player => 0,
        Side::Bot => 1,
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary frame on a text feed")]
    UnexpectedBinary,

    #[error("board has no cells")]
    EmptyBoard,

    #[error("board row {row} has {found} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown cell value {0}")]
    Cell(i64),

    #[error("unknown winner value {0}")]
    Winner(i64),

    #[error("unknown turn value {0}")]
    Turn(i64),

    #[error("valid move {column} is outside a {columns}-column board")]
    MoveOutOfRange { column: usize, columns: usize },

    #[error("board is {found:?} but this session's board is {expected:?}")]
    DimensionsChanged {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Rows of cells, top row first.
pub type Board = Vec<Vec<Cell>>;

/// Authoritative game state at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    board: Board,

    /// Side to move; absent when the controller did not say
    pub turn: Option<Side>,

    pub winner: Option<Outcome>,

    /// Always empty once `winner` is set
    valid_moves: BTreeSet<usize>,

    /// Per-column evaluation (training mode only)
    pub scores: Option<Vec<f64>>,

    pub final_score: Option<i64>,

    /// Annotation of the bot's last move
    pub move_message: Option<String>,
}

impl GameSnapshot {
    /// Parse a JSON frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: SnapshotFrame = serde_json::from_str(text)?;
        Self::try_from(frame)
    }

    /// Encode back to the wire JSON.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(&self.to_frame())?)
    }

    pub fn to_frame(&self) -> SnapshotFrame {
        SnapshotFrame {
            board: self
                .board
                .iter()
                .map(|row| row.iter().map(|c| c.to_wire()).collect())
                .collect(),
            winner: self.winner.map(Outcome::to_wire),
            turn: self.turn.map(turn_to_wire),
            valid_moves: self.valid_moves.iter().copied().collect(),
            scores: self.scores.clone(),
            final_score: self.final_score,
            move_message: self.move_message.clone(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// `(rows, columns)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.board.len(), self.board.first().map_or(0, Vec::len))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        self.board.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn valid_moves(&self) -> &BTreeSet<usize> {
        &self.valid_moves
    }

    pub fn is_valid_move(&self, column: usize) -> bool {
        self.valid_moves.contains(&column)
    }

    pub fn is_terminal(&self) -> bool {
        self.winner.is_some()
    }

    /// True when the controller says the human moves next.
    pub fn is_human_turn(&self) -> bool {
        self.turn == Some(Side::Player)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "dimensions": self.dimensions(),
            "turn": self.turn.map(|s| s.as_str()),
            "winner": self.winner.map(|w| w.as_str()),
            "valid_moves": self.valid_moves,
            "final_score": self.final_score,
            "move_message": self.move_message
        })
    }
}

impl TryFrom<SnapshotFrame> for GameSnapshot {
    type Error = FrameError;

    fn try_from(frame: SnapshotFrame) -> Result<Self, Self::Error> {
        let columns = frame.board.first().map_or(0, Vec::len);
        if columns == 0 {
            return Err(FrameError::EmptyBoard);
        }

        let board = frame
            .board
            .into_iter()
            .enumerate()
            .map(|(row, cells)| {
                if cells.len() != columns {
                    return Err(FrameError::Ragged {
                        row,
                        expected: columns,
                        found: cells.len(),
                    });
                }
                cells
                    .into_iter()
                    .map(Cell::from_wire)
                    .collect::<Result<Vec<Cell>, _>>()
            })
            .collect::<Result<Board, _>>()?;

        let winner = frame.winner.map(Outcome::from_wire).transpose()?;
        let turn = frame.turn.map(turn_from_wire).transpose()?;

        if let Some(&column) = frame.valid_moves.iter().find(|&&c| c >= columns) {
            return Err(FrameError::MoveOutOfRange { column, columns });
        }
        let valid_moves = if winner.is_some() {
            BTreeSet::new()
        } else {
            frame.valid_moves.into_iter().collect()
        };

        Ok(Self {
            board,
            turn,
            winner,
            valid_moves,
            scores: frame.scores,
            final_score: frame.final_score,
            move_message: frame.move_message,
        })
    }
}
