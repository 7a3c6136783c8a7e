use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constants::MS_PER_SECOND;
use crate::error::ConfigError;
use crate::track::Track;
use crate::types::Vec3;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackConfig {
    /// Checkpoints as `"x;y;z"` strings, in loop order.
    pub checkpoints: Vec<String>,
    pub radius: f64,
    #[serde(rename = "floorHeight")]
    pub floor_height: f64,
    #[serde(rename = "maxTimeSecs")]
    pub max_time_secs: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LapConfig {
    pub track: TrackConfig,
    /// Streak length that unlocks the stats command.
    #[serde(rename = "commandLaps")]
    pub command_laps: u64,
    #[serde(rename = "rankingTop")]
    pub ranking_top: usize,
    /// Food level the host tops entities up to after each lap.
    #[serde(rename = "foodLevel", default)]
    pub food_level: Option<u32>,
}

impl LapConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses and validates the whole config, including the track, so a bad file never gets
    /// half applied.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: LapConfig = serde_json::from_str(text)?;
        if config.command_laps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "commandLaps",
                reason: "must be at least 1".to_string(),
            });
        }
        config.build_track()?;
        Ok(config)
    }

    pub fn max_time_ms(&self) -> Result<u64, ConfigError> {
        let secs = self.track.max_time_secs;
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "maxTimeSecs",
                reason: format!("must be a non-negative number, got {secs}"),
            });
        }
        Ok((secs * MS_PER_SECOND as f64).round() as u64)
    }

    pub fn build_track(&self) -> Result<Track, ConfigError> {
        let positions = self
            .track
            .checkpoints
            .iter()
            .enumerate()
            .map(|(index, raw)| parse_checkpoint(index, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Track::new(
            positions,
            self.track.radius,
            self.track.floor_height,
            self.max_time_ms()?,
        )
    }
}

fn parse_checkpoint(index: usize, raw: &str) -> Result<Vec3, ConfigError> {
    let invalid = || ConfigError::InvalidCheckpoint {
        index,
        raw: raw.to_string(),
    };
    let parts: Vec<&str> = raw.split(';').collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(invalid());
    };
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(invalid)
    };
    Ok(Vec3::new(parse(*x)?, parse(*y)?, parse(*z)?))
}
