use crate::{InfoRecord, Score, Wdl};

/// Incoming message from a UCI engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    BestMove { mv: String, ponder: Option<String> },
    Info(InfoRecord),
    /// An `option name …` declaration or anything else we pass over.
    Other,
}

/// Parse one line of engine output. Unknown lines become `Other` rather
/// than errors; engines print banners and option lists freely.
pub fn parse_uci_message(line: &str) -> UciMessage {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => UciMessage::UciOk,
        Some(&"readyok") => UciMessage::ReadyOk,

        Some(&"id") if tokens.len() >= 3 => UciMessage::Id {
            name: tokens[1].to_string(),
            value: tokens[2..].join(" "),
        },

        Some(&"bestmove") if tokens.len() >= 2 => {
            let ponder = if tokens.len() >= 4 && tokens[2] == "ponder" {
                Some(tokens[3].to_string())
            } else {
                None
            };
            UciMessage::BestMove {
                mv: tokens[1].to_string(),
                ponder,
            }
        }

        Some(&"info") => UciMessage::Info(parse_info_line(&tokens[1..])),

        _ => UciMessage::Other,
    }
}

/// Parse an `info` line from the engine.
fn parse_info_line(tokens: &[&str]) -> InfoRecord {
    let mut info = InfoRecord::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "movesleft" => {
                i += 1;
                info.movesleft = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
            }
            "wdl" => {
                let parts: Option<(u32, u32, u32)> = (|| {
                    let w = tokens.get(i + 1)?.parse().ok()?;
                    let d = tokens.get(i + 2)?.parse().ok()?;
                    let l = tokens.get(i + 3)?.parse().ok()?;
                    Some((w, d, l))
                })();
                if let Some((win, draw, loss)) = parts {
                    info.wdl = Some(Wdl { win, draw, loss });
                    i += 3;
                }
            }
            "pv" => {
                // Collect all moves until the next keyword.
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    info.pv.push(tokens[i].to_string());
                    i += 1;
                }
                continue;
            }
            "string" => break,
            _ => {
                // Unknown keyword (currmove, hashfull, tbhits…), skip.
            }
        }
        i += 1;
    }

    info
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "movesleft"
            | "wdl"
            | "currmove"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bestmove() {
        let msg = parse_uci_message("bestmove e2e4 ponder e7e5");
        assert_eq!(
            msg,
            UciMessage::BestMove {
                mv: "e2e4".to_string(),
                ponder: Some("e7e5".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_info() {
        let msg = parse_uci_message("info depth 12 score cp 35 nodes 15234 pv e2e4 e7e5");
        match msg {
            UciMessage::Info(info) => {
                assert_eq!(info.depth, Some(12));
                assert_eq!(info.score, Some(Score::Centipawns(35)));
                assert_eq!(info.nodes, Some(15234));
                assert_eq!(info.pv, vec!["e2e4", "e7e5"]);
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_parse_info_multipv_wdl_movesleft() {
        let msg = parse_uci_message(
            "info depth 8 seldepth 21 time 930 nodes 4418 multipv 2 \
             score cp -37 wdl 212 537 251 movesleft 52 nps 4750 pv d7d5 g1f3 e7e6",
        );
        match msg {
            UciMessage::Info(info) => {
                assert_eq!(info.multipv, Some(2));
                assert_eq!(info.seldepth, Some(21));
                assert_eq!(info.time_ms, Some(930));
                assert_eq!(
                    info.wdl,
                    Some(Wdl {
                        win: 212,
                        draw: 537,
                        loss: 251
                    })
                );
                assert_eq!(info.movesleft, Some(52));
                assert_eq!(info.score, Some(Score::Centipawns(-37)));
                assert_eq!(info.pv.len(), 3);
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_parse_info_mate_score() {
        let msg = parse_uci_message("info depth 10 score mate -3 pv e8d8");
        match msg {
            UciMessage::Info(info) => assert_eq!(info.score, Some(Score::Mate(-3))),
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_info_string_is_ignored() {
        let msg = parse_uci_message("info string NNUE evaluation using nn-1111.nnue");
        match msg {
            UciMessage::Info(info) => assert_eq!(info, InfoRecord::default()),
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_line_is_other() {
        assert_eq!(
            parse_uci_message("option name Hash type spin default 16"),
            UciMessage::Other
        );
        assert_eq!(parse_uci_message(""), UciMessage::Other);
    }
}
