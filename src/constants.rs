pub const STATS_FILE_VERSION: u8 = 1;

pub const DEFAULT_CONFIG_PATH: &str = "config/track.json";
pub const DEFAULT_STATS_PATH: &str = ".data/lap_stats.json";

pub const AUTOSAVE_INTERVAL_MS: u64 = 30_000;

pub const MAX_RANKING_LIMIT: usize = 100;

pub const MAX_ENTITY_ID_LEN: usize = 64;

pub const MS_PER_SECOND: u64 = 1_000;
pub const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;

pub fn normalize_ranking_limit(requested: Option<usize>, configured_top: usize) -> usize {
    requested
        .unwrap_or(configured_top)
        .clamp(1, MAX_RANKING_LIMIT)
}
