//! Per-gamemode input files

pub mod players;
pub mod scores;

pub use players::{parse_player_line, PlayerDirectory};
pub use scores::{load_score_events, read_score_events, score_events_path};
