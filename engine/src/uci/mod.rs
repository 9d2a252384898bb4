pub mod parser;

pub use parser::{parse_uci_message, UciMessage};
