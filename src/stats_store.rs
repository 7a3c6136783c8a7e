use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::STATS_FILE_VERSION;
use crate::error::StoreError;
use crate::sequencer::LapCompletion;
use crate::server_utils::sanitize_entity_id;
use crate::types::{EntityStats, PersonalTotals};

impl EntityStats {
    /// Folds one completed lap into the totals.
    pub fn record_lap(&mut self, lap: &LapCompletion) {
        self.total_advances += lap.advances;
        self.total_time_ms += lap.lap_time_ms;
        if self
            .min_lap_time_ms
            .map_or(true, |current| lap.lap_time_ms < current)
        {
            self.min_lap_time_ms = Some(lap.lap_time_ms);
        }
        self.max_streak = self.max_streak.max(lap.streak_laps);
    }

    pub fn total_laps(&self, track_len: usize) -> u64 {
        if track_len == 0 {
            return 0;
        }
        self.total_advances / track_len as u64
    }

    pub fn totals(&self, track_len: usize) -> PersonalTotals {
        PersonalTotals {
            total_laps: self.total_laps(track_len),
            best_streak: self.max_streak,
            total_time_ms: self.total_time_ms,
            fastest_lap_ms: self.min_lap_time_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct StatsStoreFile<'a> {
    version: u8,
    entities: &'a BTreeMap<String, EntityStats>,
}

#[derive(Clone, Debug, Deserialize)]
struct StatsStoreFileRaw {
    version: u8,
    entities: BTreeMap<String, serde_json::Value>,
}

/// Cumulative stats of every entity ever seen, keyed by entity id.
///
/// Ids are kept ordered so that leaderboard ties resolve the same way on every scan.
pub struct StatsStore {
    file_path: PathBuf,
    entities: BTreeMap<String, EntityStats>,
    dirty: bool,
}

impl StatsStore {
    pub fn new(file_path: PathBuf) -> Self {
        let entities = load_entities(&file_path);
        Self {
            file_path,
            entities,
            dirty: false,
        }
    }

    pub fn in_memory(file_path: PathBuf, entities: BTreeMap<String, EntityStats>) -> Self {
        Self {
            file_path,
            entities,
            dirty: false,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Stats for `entity_id`, or all-unset defaults for an unknown id.
    pub fn get(&self, entity_id: &str) -> EntityStats {
        self.entities.get(entity_id).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityStats)> + Clone {
        self.entities
            .iter()
            .map(|(entity_id, stats)| (entity_id.as_str(), stats))
    }

    pub fn snapshot(&self) -> BTreeMap<String, EntityStats> {
        self.entities.clone()
    }

    pub fn record_lap(&mut self, entity_id: &str, lap: &LapCompletion) {
        let stats = self.entities.entry(entity_id.to_string()).or_default();
        stats.record_lap(lap);
        self.dirty = true;
    }

    pub fn min_lap_time_ms(&self, entity_id: &str) -> Option<u64> {
        self.entities
            .get(entity_id)
            .and_then(|stats| stats.min_lap_time_ms)
    }

    pub fn max_streak(&self, entity_id: &str) -> u64 {
        self.entities
            .get(entity_id)
            .map_or(0, |stats| stats.max_streak)
    }

    pub fn total_laps(&self, entity_id: &str, track_len: usize) -> u64 {
        self.entities
            .get(entity_id)
            .map_or(0, |stats| stats.total_laps(track_len))
    }

    pub fn total_time_ms(&self, entity_id: &str) -> u64 {
        self.entities
            .get(entity_id)
            .map_or(0, |stats| stats.total_time_ms)
    }

    pub fn save(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let payload = StatsStoreFile {
            version: STATS_FILE_VERSION,
            entities: &self.entities,
        };
        let text =
            serde_json::to_string_pretty(&payload).map_err(|source| StoreError::Serialize {
                path: self.file_path.clone(),
                source,
            })?;
        fs::write(&self.file_path, text).map_err(|source| StoreError::Write {
            path: self.file_path.clone(),
            source,
        })?;

        self.dirty = false;
        debug!(
            path = %self.file_path.display(),
            entities = self.entities.len(),
            "stats saved"
        );
        Ok(())
    }
}

fn load_entities(path: &Path) -> BTreeMap<String, EntityStats> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read stats file");
            }
            return BTreeMap::new();
        }
    };
    let parsed = match serde_json::from_str::<StatsStoreFileRaw>(&text) {
        Ok(value) if value.version == STATS_FILE_VERSION => value,
        Ok(value) => {
            warn!(
                path = %path.display(),
                version = value.version,
                "unsupported stats file version"
            );
            return BTreeMap::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse stats file");
            return BTreeMap::new();
        }
    };

    let mut entities = BTreeMap::new();
    for (raw_id, raw_value) in parsed.entities {
        let Some(entity_id) = sanitize_entity_id(&raw_id) else {
            warn!(path = %path.display(), entity = %raw_id, "skipping entry with invalid id");
            continue;
        };
        let stats: EntityStats = match serde_json::from_value(raw_value) {
            Ok(stats) => stats,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    entity = %raw_id,
                    %error,
                    "skipping malformed stats entry"
                );
                continue;
            }
        };
        entities.insert(entity_id, stats);
    }
    entities
}

#[cfg(test)]
pub(crate) fn temp_file(name: &str) -> PathBuf {
    let unique = format!(
        "{}-{}-{}",
        name,
        std::process::id(),
        rand::random::<u64>()
    );
    std::env::temp_dir().join(unique).join("lap_stats.json")
}
