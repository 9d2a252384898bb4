pub mod client;
pub mod uci;

pub use client::{AnalysisHandle, SpawnSpec, SshSpec, UciEngine};
pub use uci::{parse_uci_message, UciMessage};

/// One parsed `info` line from the engine.
///
/// The client does not interpret records beyond parsing them; ordering
/// within a depth is engine-dictated. PV moves stay as UCI strings because
/// resolving them (castling encodings included) needs board context the
/// engine crate does not have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoRecord {
    /// 1-based multi-PV index; engines omit it in single-PV mode.
    pub multipv: Option<u32>,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub score: Option<Score>,
    pub wdl: Option<Wdl>,
    pub movesleft: Option<u32>,
    pub pv: Vec<String>,
}

/// Engine evaluation, from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Signed distance to mate; negative when being mated.
    Mate(i32),
}

/// Win/draw/loss expectation in per-mille, side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wdl {
    pub win: u32,
    pub draw: u32,
    pub loss: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine startup failed: {0}")]
    Startup(String),
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine process closed unexpectedly")]
    Closed,
    #[error("An analysis is already in progress")]
    AnalysisInProgress,
}
