pub mod catalog;
pub mod pgn_feed;
pub mod types;

pub use catalog::{CatalogClient, CatalogError, DEFAULT_BASE_URL};
pub use pgn_feed::PgnFeed;
pub use types::{BoardGame, BoardPlayer, Broadcast, Round, RoundBoards, Tour};
