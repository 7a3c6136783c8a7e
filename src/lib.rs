pub mod conditions;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod sequencer;
pub mod server_protocol;
pub mod server_utils;
pub mod stats_store;
pub mod track;
pub mod types;
