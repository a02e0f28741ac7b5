//! Board reconstruction from SAN history.

use std::collections::BTreeSet;

use cozy_chess::{Board, Color, Move};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::san::{has_legal_move, legal_moves, normalize_san, san, san_core};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// `ply` is the 0-based index into the history.
    #[error("illegal move {san:?} at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    Checkmate,
    Stalemate,
}

impl TerminalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalKind::Checkmate => "checkmate",
            TerminalKind::Stalemate => "stalemate",
        }
    }
}

/// A position reached by replaying SAN moves from the standard start.
#[derive(Debug, Clone)]
pub struct BoardState {
    board: Board,
    ply: usize,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    pub fn new() -> Self {
        Self {
            board: Board::default(),
            ply: 0,
        }
    }

    pub fn from_history<S: AsRef<str>>(history: &[S]) -> Result<Self, OracleError> {
        let mut st = Self::new();
        for mv in history {
            st.apply(mv.as_ref())?;
        }
        Ok(st)
    }

    /// Plies played so far.
    pub fn ply(&self) -> usize {
        self.ply
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    fn find(&self, input: &str) -> Option<Move> {
        let want = normalize_san(input);
        if want.is_empty() {
            return None;
        }
        let legal = legal_moves(&self.board);
        legal
            .iter()
            .copied()
            .find(|&m| san_core(&self.board, m, &legal) == want)
    }

    /// Play one SAN move. Check suffixes and `!`/`?` annotations are ignored.
    pub fn apply(&mut self, input: &str) -> Result<(), OracleError> {
        let mv = self.find(input).ok_or_else(|| OracleError::IllegalMove {
            ply: self.ply,
            san: input.to_string(),
        })?;
        self.board.play_unchecked(mv);
        self.ply += 1;
        Ok(())
    }

    /// Every legal move in SAN, with `+`/`#` suffixes.
    pub fn legal_moves(&self) -> BTreeSet<String> {
        let legal = legal_moves(&self.board);
        legal.iter().map(|&m| san(&self.board, m, &legal)).collect()
    }

    pub fn is_terminal(&self) -> bool {
        !has_legal_move(&self.board)
    }

    pub fn in_check(&self) -> bool {
        !self.board.checkers().is_empty()
    }

    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        if has_legal_move(&self.board) {
            None
        } else if self.in_check() {
            Some(TerminalKind::Checkmate)
        } else {
            Some(TerminalKind::Stalemate)
        }
    }
}

/// Legal-move set plus terminal status for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub legal: BTreeSet<String>,
    pub terminal: Option<TerminalKind>,
    pub ply: usize,
}

/// Chess rules as seen by the inference engine.
pub trait LegalMoveOracle: Send + Sync {
    fn position(&self, history: &[String]) -> Result<Position, OracleError>;

    fn legal_moves(&self, history: &[String]) -> Result<BTreeSet<String>, OracleError> {
        Ok(self.position(history)?.legal)
    }

    fn is_terminal(&self, history: &[String]) -> Result<bool, OracleError> {
        Ok(self.position(history)?.terminal.is_some())
    }
}

/// Standard chess from the initial position.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardChess;

impl LegalMoveOracle for StandardChess {
    fn position(&self, history: &[String]) -> Result<Position, OracleError> {
        let st = BoardState::from_history(history)?;
        let legal = st.legal_moves();
        let terminal = if legal.is_empty() {
            st.terminal_kind()
        } else {
            None
        };
        Ok(Position {
            legal,
            terminal,
            ply: st.ply(),
        })
    }
}
