//! Standard Algebraic Notation.

use cozy_chess::{Board, File, GameStatus, Move, Piece, Rank, Square};

use crate::legal_moves;

#[derive(Debug, thiserror::Error)]
pub enum SanError {
    #[error("No legal move matches: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Format a legal move as SAN relative to `board`, including disambiguation,
/// castling, promotion and check/checkmate suffixes.
pub fn format_san(board: &Board, mv: Move) -> String {
    let mut san = bare_san(board, mv);
    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }
    san
}

fn bare_san(board: &Board, mv: Move) -> String {
    let stm = board.side_to_move();
    let piece = match board.piece_on(mv.from) {
        Some(p) => p,
        // Not reachable for legal moves; degrade to coordinates.
        None => return format!("{}{}", mv.from, mv.to),
    };

    // cozy-chess encodes castling as king-takes-own-rook.
    if piece == Piece::King
        && board.piece_on(mv.to) == Some(Piece::Rook)
        && board.color_on(mv.to) == Some(stm)
    {
        return if (mv.to.file() as u8) > (mv.from.file() as u8) {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        };
    }

    // En passant lands on an empty square but still captures.
    let is_capture = board.piece_on(mv.to).is_some()
        || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

    let mut san = String::new();
    match piece {
        Piece::Pawn => {
            if is_capture {
                san.push(file_char(mv.from.file()));
            }
        }
        _ => {
            san.push(piece_letter(piece));
            san.push_str(&disambiguation(board, mv, piece));
        }
    }
    if is_capture {
        san.push('x');
    }
    san.push(file_char(mv.to.file()));
    san.push(rank_char(mv.to.rank()));
    if let Some(promo) = mv.promotion {
        san.push('=');
        san.push(piece_letter(promo));
    }
    san
}

/// The from-square qualifier needed to make the move unique: file if that
/// suffices, else rank, else both.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let rivals: Vec<Square> = legal_moves(board)
        .into_iter()
        .filter(|m| m.to == mv.to && m.from != mv.from && board.piece_on(m.from) == Some(piece))
        .map(|m| m.from)
        .collect();
    if rivals.is_empty() {
        return String::new();
    }
    let same_file = rivals.iter().any(|sq| sq.file() == mv.from.file());
    let same_rank = rivals.iter().any(|sq| sq.rank() == mv.from.rank());
    if !same_file {
        file_char(mv.from.file()).to_string()
    } else if !same_rank {
        rank_char(mv.from.rank()).to_string()
    } else {
        format!("{}", mv.from)
    }
}

/// Resolve a SAN token against the legal moves of `board`.
///
/// Annotation suffixes (`+`, `#`, `!`, `?`) are ignored. Both `O-O` and
/// `0-0` castling spellings are accepted.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let token = san.trim_end_matches(['+', '#', '!', '?']);
    if token.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    if matches!(token, "O-O" | "0-0" | "O-O-O" | "0-0-0") {
        let long = token.len() == 5;
        return find_castle(board, long).ok_or_else(|| SanError::NoLegalMove(san.to_string()));
    }

    let mut chars: Vec<char> = token.chars().collect();

    // Trailing promotion: "e8=Q" (tolerate a missing '=').
    let mut promotion = None;
    if let Some(&last) = chars.last() {
        if let Some(p) = promo_piece(last) {
            promotion = Some(p);
            chars.pop();
            if chars.last() == Some(&'=') {
                chars.pop();
            }
        }
    }

    if chars.len() < 2 {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let dest_rank = rank_from_char(chars.pop().unwrap())
        .ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;
    let dest_file = file_from_char(chars.pop().unwrap())
        .ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;
    let dest = Square::new(dest_file, dest_rank);

    let piece = match chars.first() {
        Some('K') => Piece::King,
        Some('Q') => Piece::Queen,
        Some('R') => Piece::Rook,
        Some('B') => Piece::Bishop,
        Some('N') => Piece::Knight,
        _ => Piece::Pawn,
    };
    if piece != Piece::Pawn {
        chars.remove(0);
    }

    // Whatever remains is "x" and/or a from-square qualifier.
    let mut from_file = None;
    let mut from_rank = None;
    for c in chars {
        if c == 'x' {
            continue;
        } else if let Some(f) = file_from_char(c) {
            from_file = Some(f);
        } else if let Some(r) = rank_from_char(c) {
            from_rank = Some(r);
        } else {
            return Err(SanError::InvalidFormat(san.to_string()));
        }
    }

    let candidates: Vec<Move> = legal_moves(board)
        .into_iter()
        .filter(|m| {
            m.to == dest
                && board.piece_on(m.from) == Some(piece)
                && m.promotion == promotion
                && from_file.is_none_or(|f| m.from.file() == f)
                && from_rank.is_none_or(|r| m.from.rank() == r)
        })
        .collect();

    match candidates.len() {
        0 => Err(SanError::NoLegalMove(san.to_string())),
        1 => Ok(candidates[0]),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

fn find_castle(board: &Board, long: bool) -> Option<Move> {
    let stm = board.side_to_move();
    legal_moves(board).into_iter().find(|m| {
        board.piece_on(m.from) == Some(Piece::King)
            && board.piece_on(m.to) == Some(Piece::Rook)
            && board.color_on(m.to) == Some(stm)
            && ((m.to.file() as u8) < (m.from.file() as u8)) == long
    })
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn promo_piece(c: char) -> Option<Piece> {
    match c {
        'Q' | 'q' => Some(Piece::Queen),
        'R' | 'r' => Some(Piece::Rook),
        'B' => Some(Piece::Bishop),
        'N' | 'n' => Some(Piece::Knight),
        _ => None,
    }
}

fn file_char(file: File) -> char {
    (b'a' + file as u8) as char
}

fn rank_char(rank: Rank) -> char {
    (b'1' + rank as u8) as char
}

fn file_from_char(c: char) -> Option<File> {
    match c {
        'a'..='h' => Some(File::index((c as u8 - b'a') as usize)),
        _ => None,
    }
}

fn rank_from_char(c: char) -> Option<Rank> {
    match c {
        '1'..='8' => Some(Rank::index((c as u8 - b'1') as usize)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_fen, parse_uci_move};
    use proptest::prelude::*;

    fn san_of(fen: &str, uci: &str) -> String {
        let board = parse_fen(fen).unwrap();
        let mv = parse_uci_move(&board, uci).unwrap();
        format_san(&board, mv)
    }

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_pawn_push() {
        assert_eq!(san_of(START_FEN, "e2e4"), "e4");
    }

    #[test]
    fn test_knight_move() {
        assert_eq!(san_of(START_FEN, "g1f3"), "Nf3");
    }

    #[test]
    fn test_pawn_capture() {
        let fen = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2";
        assert_eq!(san_of(fen, "e4d5"), "exd5");
    }

    #[test]
    fn test_en_passant_is_a_capture() {
        let fen = "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3";
        assert_eq!(san_of(fen, "e5f6"), "exf6");
    }

    #[test]
    fn test_castling() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQK2R w KQkq - 0 1";
        assert_eq!(san_of(fen, "e1g1"), "O-O");
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/R3KBNR w KQkq - 0 1";
        assert_eq!(san_of(fen, "e1c1"), "O-O-O");
    }

    #[test]
    fn test_promotion_with_mate() {
        let fen = "8/P7/8/8/8/8/8/k2K4 w - - 0 1";
        let san = san_of(fen, "a7a8q");
        assert!(san.starts_with("a8=Q"), "got {san}");
    }

    #[test]
    fn test_file_disambiguation() {
        // Knights on b2 and f2 can both reach d3.
        let fen = "4k3/8/8/8/8/8/1N3N2/4K3 w - - 0 1";
        assert_eq!(san_of(fen, "b2d3"), "Nbd3");
        assert_eq!(san_of(fen, "f2d3"), "Nfd3");
    }

    #[test]
    fn test_rank_disambiguation() {
        // Rooks on a1 and a5, both can reach a3.
        let fen = "4k3/8/8/R7/8/8/8/R3K3 w - - 0 1";
        assert_eq!(san_of(fen, "a1a3"), "R1a3");
        assert_eq!(san_of(fen, "a5a3"), "R5a3");
    }

    #[test]
    fn test_check_suffix() {
        let fen = "rnbqkbnr/ppppp1pp/8/5p2/4P3/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 2";
        assert_eq!(san_of(fen, "d1h5"), "Qh5+");
    }

    #[test]
    fn test_mate_suffix() {
        // Scholar's mate delivery.
        let fen = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4";
        assert_eq!(san_of(fen, "h5f7"), "Qxf7#");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let board = parse_fen(START_FEN).unwrap();
        assert!(parse_san(&board, "zz9").is_err());
        assert!(parse_san(&board, "").is_err());
    }

    #[test]
    fn test_parse_castle_spellings() {
        let board =
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQK2R w KQkq - 0 1").unwrap();
        assert!(parse_san(&board, "O-O").is_ok());
        assert!(parse_san(&board, "0-0").is_ok());
    }

    proptest! {
        // Formatting then parsing any legal move must return the same move,
        // along random play-outs from the starting position.
        #[test]
        fn roundtrip_random_playout(seed in 0u64..500) {
            let mut board = cozy_chess::Board::default();
            let mut state = seed;
            for _ in 0..40 {
                let moves = crate::legal_moves(&board);
                if moves.is_empty() {
                    break;
                }
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let mv = moves[(state >> 33) as usize % moves.len()];
                let san = format_san(&board, mv);
                let parsed = parse_san(&board, &san).unwrap();
                prop_assert_eq!(parsed, mv);
                board.play_unchecked(mv);
                if board.status() != cozy_chess::GameStatus::Ongoing {
                    break;
                }
            }
        }
    }
}
