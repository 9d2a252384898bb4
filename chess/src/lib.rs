pub mod fen;
pub mod pgn;
pub mod san;
pub mod uci;

pub use fen::{format_fen, parse_fen, FenError, STARTPOS_FEN};
pub use pgn::{parse_game, parse_games, PgnError, PgnGame, PgnMove};
pub use san::{format_san, parse_san, SanError};
pub use uci::{format_uci_move, parse_uci_move, MoveError};

use cozy_chess::{Board, Move};

/// Collect all legal moves for a position.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

/// Number of legal moves without allocating.
pub fn count_legal_moves(board: &Board) -> usize {
    let mut count = 0;
    board.generate_moves(|mvs| {
        count += mvs.into_iter().count();
        false
    });
    count
}
