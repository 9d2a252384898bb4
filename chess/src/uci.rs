//! UCI (long algebraic) move notation.
//!
//! The wire format is "e2e4" / "e7e8q". Castling needs care: UCI encodes it
//! as the king's two-square hop (e1g1) while cozy-chess encodes it as
//! king-takes-own-rook (e1h1). Both directions of the mapping live here.

use cozy_chess::{Board, Color, File, Move, Piece, Rank, Square};

use crate::legal_moves;

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("Invalid move syntax: {0}")]
    InvalidSyntax(String),
    #[error("Illegal move in this position: {0}")]
    IllegalMove(String),
}

/// Format a move in UCI notation relative to a position.
///
/// Castling moves are rendered in the standard king-destination form
/// ("e1g1"), not cozy-chess's king-takes-rook internal form.
pub fn format_uci_move(board: &Board, mv: Move) -> String {
    let mv = convert_castling_to_standard(board, mv);
    let mut s = format!("{}{}", mv.from, mv.to);
    if let Some(promo) = mv.promotion {
        s.push(piece_char(promo));
    }
    s
}

/// Parse a UCI move string and resolve it to a legal move of `board`.
///
/// Accepts both the standard castling encoding ("e1g1") and the
/// king-takes-rook encoding ("e1h1").
pub fn parse_uci_move(board: &Board, s: &str) -> Result<Move, MoveError> {
    let raw: Move = s
        .parse()
        .map_err(|_| MoveError::InvalidSyntax(s.to_string()))?;
    let legal = legal_moves(board);
    if legal.contains(&raw) {
        return Ok(raw);
    }
    let converted = convert_castling_to_cozy(raw, &legal);
    if legal.contains(&converted) {
        return Ok(converted);
    }
    Err(MoveError::IllegalMove(s.to_string()))
}

/// Convert UCI castling notation to cozy-chess notation.
///
/// UCI uses king-destination notation (e1g1, e1c1, e8g8, e8c8); cozy-chess
/// uses king-to-rook notation (e1h1, e1a1, e8h8, e8a8). Non-castling moves
/// pass through unchanged.
pub fn convert_castling_to_cozy(mv: Move, legal: &[Move]) -> Move {
    let is_back_rank = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let from_e_file = matches!(mv.from.file(), File::E);
    let to_g_or_c = matches!(mv.to.file(), File::G | File::C);

    if is_back_rank && from_e_file && to_g_or_c && mv.promotion.is_none() {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            _ => File::A,
        };
        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };
        if legal.contains(&converted) {
            return converted;
        }
    }
    mv
}

/// Convert a cozy-chess castling move back to the standard UCI encoding.
fn convert_castling_to_standard(board: &Board, mv: Move) -> Move {
    let stm = board.side_to_move();
    let is_castle = board.piece_on(mv.from) == Some(Piece::King)
        && board.piece_on(mv.to) == Some(Piece::Rook)
        && board.color_on(mv.to) == Some(stm);
    if !is_castle {
        return mv;
    }
    let rank = match stm {
        Color::White => Rank::First,
        Color::Black => Rank::Eighth,
    };
    let king_file = if (mv.to.file() as u8) > (mv.from.file() as u8) {
        File::G
    } else {
        File::C
    };
    Move {
        from: mv.from,
        to: Square::new(king_file, rank),
        promotion: None,
    }
}

pub(crate) fn piece_char(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    }
}
