use std::collections::HashMap;

use crate::fen::{format_fen, parse_fen};
use crate::san::parse_san;
use crate::uci::format_uci_move;

use super::{PgnError, PgnGame, PgnMove};

/// Parse one PGN record: a tag-pair block followed by movetext.
///
/// Comments (`{...}`, `;`), numeric annotation glyphs and nested variations
/// are consumed but not kept, except that `[%clk H:MM:SS]` comments attach a
/// clock to the preceding move. The movetext result token fills in a missing
/// `Result` tag.
pub fn parse_game(input: &str) -> Result<PgnGame, PgnError> {
    let mut tags = HashMap::new();
    let mut movetext = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if movetext.is_empty() && trimmed.starts_with('[') {
            let (key, value) = parse_tag_pair(trimmed)?;
            tags.insert(key, value);
        } else if !trimmed.is_empty() {
            movetext.push_str(trimmed);
            movetext.push('\n');
        }
    }

    let mut game = PgnGame {
        tags,
        moves: Vec::new(),
    };
    let mut board = parse_fen(game.starting_fen())?;

    let mut chars = movetext.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '{' => {
                chars.next();
                let mut comment = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => comment.push(ch),
                        None => return Err(PgnError::Unbalanced),
                    }
                }
                if let Some(clock) = extract_clock(&comment) {
                    if let Some(last) = game.moves.last_mut() {
                        last.clock = Some(clock);
                    }
                }
            }
            '(' => {
                chars.next();
                let mut depth = 1usize;
                for ch in chars.by_ref() {
                    match ch {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                if depth != 0 {
                    return Err(PgnError::Unbalanced);
                }
            }
            ';' => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        break;
                    }
                }
            }
            '$' => {
                chars.next();
                while chars.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                    chars.next();
                }
            }
            _ => {
                let mut token = String::new();
                while chars
                    .peek()
                    .is_some_and(|&ch| !ch.is_whitespace() && !matches!(ch, '{' | '(' | ';'))
                {
                    token.push(chars.next().unwrap());
                }
                if token.is_empty() {
                    chars.next();
                    continue;
                }
                if let Some(result) = as_result_token(&token) {
                    game.tags
                        .entry("Result".to_string())
                        .or_insert_with(|| result.to_string());
                    continue;
                }
                let token = strip_move_number(&token);
                let Some(token) = token else {
                    continue;
                };
                let mv = parse_san(&board, token).map_err(|source| PgnError::BadMove {
                    token: token.to_string(),
                    source,
                })?;
                let san = crate::san::format_san(&board, mv);
                let uci = format_uci_move(&board, mv);
                board.play_unchecked(mv);
                game.moves.push(PgnMove {
                    mv,
                    san,
                    uci,
                    clock: None,
                    fen_after: format_fen(&board),
                });
            }
        }
    }

    Ok(game)
}

/// Parse a concatenated multi-game PGN export. A tag line following movetext
/// starts the next record.
pub fn parse_games(input: &str) -> Result<Vec<PgnGame>, PgnError> {
    let mut games = Vec::new();
    let mut record = String::new();
    let mut in_movetext = false;

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && is_tag_line(trimmed) {
            if in_movetext {
                games.push(parse_game(&record)?);
                record.clear();
                in_movetext = false;
            }
        } else if !trimmed.is_empty() {
            in_movetext = true;
        }
        record.push_str(line);
        record.push('\n');
    }
    if !record.trim().is_empty() {
        games.push(parse_game(&record)?);
    }
    Ok(games)
}

fn is_tag_line(line: &str) -> bool {
    line.ends_with(']') && line.contains('"')
}

fn parse_tag_pair(line: &str) -> Result<(String, String), PgnError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let (key, rest) = inner
        .split_once(' ')
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let quoted = rest.trim();
    if !(quoted.starts_with('"') && quoted.ends_with('"') && quoted.len() >= 2) {
        return Err(PgnError::InvalidTag(line.to_string()));
    }
    let value = quoted[1..quoted.len() - 1]
        .replace("\\\"", "\"")
        .replace("\\\\", "\\");
    Ok((key.to_string(), value))
}

/// Drop a leading move number ("12.", "12...", or glued "12.e4" → "e4").
/// Returns None when nothing playable remains. "0-0" castling spellings are
/// left alone even though they start with a digit.
fn strip_move_number(token: &str) -> Option<&str> {
    if token.starts_with("0-0") {
        return Some(token);
    }
    if !token.starts_with(|ch: char| ch.is_ascii_digit()) {
        return Some(token);
    }
    let rest = token.trim_start_matches(|ch: char| ch.is_ascii_digit());
    let rest = rest.trim_start_matches('.');
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

fn as_result_token(token: &str) -> Option<&'static str> {
    match token {
        "1-0" => Some("1-0"),
        "0-1" => Some("0-1"),
        "1/2-1/2" => Some("1/2-1/2"),
        "*" => Some("*"),
        _ => None,
    }
}

/// Pull the clock out of a `[%clk 1:23:45]` comment, as whole seconds.
fn extract_clock(comment: &str) -> Option<u64> {
    let start = comment.find("[%clk")? + "[%clk".len();
    let rest = comment[start..].trim_start();
    let end = rest.find(']')?;
    parse_clock(rest[..end].trim())
}

fn parse_clock(text: &str) -> Option<u64> {
    let mut seconds = 0u64;
    for part in text.split(':') {
        // The seconds field may carry a fraction; truncate it.
        let whole = part.split('.').next()?;
        seconds = seconds * 60 + whole.parse::<u64>().ok()?;
    }
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SICILIAN: &str = "\
[Event \"Test Open\"]
[Site \"?\"]
[White \"Carlsen, Magnus\"]
[Black \"Nepomniachtchi, Ian\"]
[Result \"*\"]

1. e4 {[%clk 1:30:00]} c5 {[%clk 1:29:45]} 2. Nf3 {[%clk 1:28:03]} *
";

    #[test]
    fn test_parse_headers_and_moves() {
        let game = parse_game(SICILIAN).unwrap();
        assert_eq!(game.tag("White"), Some("Carlsen, Magnus"));
        assert_eq!(game.result(), "*");
        assert!(game.is_ongoing());
        let sans: Vec<&str> = game.moves.iter().map(|m| m.san.as_str()).collect();
        assert_eq!(sans, vec!["e4", "c5", "Nf3"]);
        let ucis: Vec<&str> = game.moves.iter().map(|m| m.uci.as_str()).collect();
        assert_eq!(ucis, vec!["e2e4", "c7c5", "g1f3"]);
    }

    #[test]
    fn test_clocks_attach_to_moves() {
        let game = parse_game(SICILIAN).unwrap();
        let clocks: Vec<Option<u64>> = game.moves.iter().map(|m| m.clock).collect();
        assert_eq!(clocks, vec![Some(5400), Some(5385), Some(5283)]);
    }

    #[test]
    fn test_leaf_fen_tracks_mainline() {
        let game = parse_game(SICILIAN).unwrap();
        assert_eq!(
            game.leaf_fen(),
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
    }

    #[test]
    fn test_headers_only_game() {
        let game = parse_game("[Event \"E\"]\n[Result \"*\"]\n\n*\n").unwrap();
        assert!(game.moves.is_empty());
        assert_eq!(game.leaf_fen(), crate::STARTPOS_FEN);
    }

    #[test]
    fn test_finished_game_result() {
        let pgn = "[Event \"E\"]\n[Result \"1-0\"]\n\n1. e4 e5 2. Qh5 Ke7 3. Qxe5# 1-0\n";
        let game = parse_game(pgn).unwrap();
        assert_eq!(game.result(), "1-0");
        assert!(!game.is_ongoing());
        assert_eq!(game.moves.last().unwrap().san, "Qxe5#");
    }

    #[test]
    fn test_result_token_fills_missing_tag() {
        let game = parse_game("[Event \"E\"]\n\n1. e4 e5 1/2-1/2\n").unwrap();
        assert_eq!(game.result(), "1/2-1/2");
    }

    #[test]
    fn test_variations_and_nags_skipped() {
        let pgn = "[Event \"E\"]\n\n1. e4 $1 (1. d4 d5 (1... Nf6)) 1... c5 2. Nf3 *\n";
        let game = parse_game(pgn).unwrap();
        let sans: Vec<&str> = game.moves.iter().map(|m| m.san.as_str()).collect();
        assert_eq!(sans, vec!["e4", "c5", "Nf3"]);
    }

    #[test]
    fn test_illegal_san_is_an_error() {
        let pgn = "[Event \"E\"]\n\n1. e4 e4 *\n";
        assert!(matches!(
            parse_game(pgn),
            Err(PgnError::BadMove { .. })
        ));
    }

    #[test]
    fn test_parse_games_splits_concatenated() {
        let two = format!("{SICILIAN}\n\n[Event \"Second\"]\n[Result \"*\"]\n\n1. d4 *\n");
        let games = parse_games(&two).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].tag("Event"), Some("Test Open"));
        assert_eq!(games[1].tag("Event"), Some("Second"));
        assert_eq!(games[1].moves[0].san, "d4");
    }

    #[test]
    fn test_mainline_plies() {
        let game = parse_game(SICILIAN).unwrap();
        let plies: Vec<u32> = game.mainline().map(|(ply, _)| ply).collect();
        assert_eq!(plies, vec![1, 2, 3]);
    }

    #[test]
    fn test_glued_move_numbers() {
        let game = parse_game("[Event \"E\"]\n\n1.e4 c5 2.Nf3 *\n").unwrap();
        let sans: Vec<&str> = game.moves.iter().map(|m| m.san.as_str()).collect();
        assert_eq!(sans, vec!["e4", "c5", "Nf3"]);
    }

    #[test]
    fn test_custom_starting_fen() {
        let pgn = "[Event \"E\"]\n[FEN \"8/P7/8/8/8/8/8/k2K4 w - - 0 1\"]\n\n1. a8=Q *\n";
        let game = parse_game(pgn).unwrap();
        assert_eq!(game.moves[0].uci, "a7a8q");
    }
}
