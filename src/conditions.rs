use serde::Serialize;

use crate::constants::{MS_PER_MINUTE, MS_PER_SECOND};
use crate::error::ConditionError;
use crate::types::EntityStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Longest streak reached at least `threshold` laps.
    MaxLaps,
    /// Fastest lap no slower than `threshold` seconds.
    MinTime,
    /// At least `threshold` whole laps in total.
    TotalLaps,
    /// At least `threshold` minutes spent lapping in total.
    TotalTime,
}

impl ConditionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "maxlaps" => Some(Self::MaxLaps),
            "mintime" => Some(Self::MinTime),
            "totallaps" => Some(Self::TotalLaps),
            "totaltime" => Some(Self::TotalTime),
            _ => None,
        }
    }
}

/// A threshold check against one entity's stats, as registered by an external quest system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QueryCondition {
    pub kind: ConditionKind,
    pub threshold: u64,
}

impl QueryCondition {
    /// Parses `"<kind> <amount> [...]"`. Extra trailing words are ignored.
    pub fn parse(instruction: &str) -> Result<Self, ConditionError> {
        let mut parts = instruction.split_whitespace();
        let raw_kind = parts.next().unwrap_or_default();
        let Some(raw_amount) = parts.next() else {
            return Err(ConditionError::MissingArgument {
                instruction: instruction.to_string(),
            });
        };
        let kind = ConditionKind::parse(&raw_kind.to_ascii_lowercase()).ok_or_else(|| {
            ConditionError::UnknownKind {
                kind: raw_kind.to_string(),
            }
        })?;
        let threshold = raw_amount
            .parse::<u64>()
            .map_err(|_| ConditionError::InvalidAmount {
                raw: raw_amount.to_string(),
            })?;
        Ok(Self { kind, threshold })
    }

    pub fn evaluate(&self, stats: &EntityStats, track_len: usize) -> bool {
        match self.kind {
            ConditionKind::MaxLaps => stats.max_streak >= self.threshold,
            ConditionKind::MinTime => {
                let limit_ms = self.threshold.saturating_mul(MS_PER_SECOND);
                stats
                    .min_lap_time_ms
                    .is_some_and(|fastest| fastest <= limit_ms)
            }
            ConditionKind::TotalLaps => stats.total_laps(track_len) >= self.threshold,
            ConditionKind::TotalTime => {
                stats.total_time_ms >= self.threshold.saturating_mul(MS_PER_MINUTE)
            }
        }
    }
}
