//! PGN games: tag pairs, movetext with clock comments, mainline walking.

pub mod parser;

pub use parser::{parse_game, parse_games};

use std::collections::HashMap;

use cozy_chess::Move;

use crate::fen::STARTPOS_FEN;

/// A parsed PGN game.
#[derive(Debug, Clone)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub moves: Vec<PgnMove>,
}

/// One mainline half-move with everything derived while parsing.
#[derive(Debug, Clone)]
pub struct PgnMove {
    pub mv: Move,
    pub san: String,
    pub uci: String,
    /// Remaining clock of the mover, in seconds, from a `[%clk]` comment.
    pub clock: Option<u64>,
    pub fen_after: String,
}

impl PgnGame {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// The `Result` header; `*` when absent (game still running).
    pub fn result(&self) -> &str {
        self.tag("Result").unwrap_or("*")
    }

    pub fn is_ongoing(&self) -> bool {
        self.result() == "*"
    }

    /// FEN the game starts from (the `FEN` tag, or the standard position).
    pub fn starting_fen(&self) -> &str {
        self.tag("FEN").unwrap_or(STARTPOS_FEN)
    }

    /// FEN after the last mainline move.
    pub fn leaf_fen(&self) -> &str {
        self.moves
            .last()
            .map(|m| m.fen_after.as_str())
            .unwrap_or_else(|| self.starting_fen())
    }

    /// Mainline as `(ply, move)` pairs; White's first move is ply 1.
    pub fn mainline(&self) -> impl Iterator<Item = (u32, &PgnMove)> {
        self.moves
            .iter()
            .enumerate()
            .map(|(i, m)| (i as u32 + 1, m))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("Malformed tag pair: {0}")]
    InvalidTag(String),
    #[error("Bad starting FEN: {0}")]
    Fen(#[from] crate::FenError),
    #[error("Unplayable movetext token {token:?}: {source}")]
    BadMove {
        token: String,
        source: crate::SanError,
    },
    #[error("Unbalanced comment or variation")]
    Unbalanced,
}
