use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    FloorBreach,
    NotAdjacent,
    WrongDirection,
    Timeout,
}

/// Cumulative statistics of one entity, persisted across sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    #[serde(
        rename = "minLapTimeMs",
        alias = "min_lap_time_ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_lap_time_ms: Option<u64>,
    #[serde(rename = "maxStreak", alias = "max_streak", default)]
    pub max_streak: u64,
    /// Raw checkpoint advances; divide by the track length for whole laps.
    #[serde(rename = "totalAdvances", alias = "total_advances", default)]
    pub total_advances: u64,
    #[serde(rename = "totalTimeMs", alias = "total_time_ms", default)]
    pub total_time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LapEvent {
    LapCompleted {
        #[serde(rename = "entityId")]
        entity_id: String,
        lap: u64,
        #[serde(rename = "lapTimeMs")]
        lap_time_ms: u64,
        #[serde(rename = "foodLevel", skip_serializing_if = "Option::is_none")]
        food_level: Option<u32>,
    },
    CommandUnlocked {
        #[serde(rename = "entityId")]
        entity_id: String,
        #[serde(rename = "requiredLaps")]
        required_laps: u64,
    },
    StreakReset {
        #[serde(rename = "entityId")]
        entity_id: String,
        reason: ResetReason,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub value: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Leaderboards {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    #[serde(rename = "fastestLap")]
    pub fastest_lap: Vec<RankedEntry>,
    #[serde(rename = "bestStreak")]
    pub best_streak: Vec<RankedEntry>,
    #[serde(rename = "totalLaps")]
    pub total_laps: Vec<RankedEntry>,
    #[serde(rename = "totalTime")]
    pub total_time: Vec<RankedEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PersonalTotals {
    #[serde(rename = "totalLaps")]
    pub total_laps: u64,
    #[serde(rename = "bestStreak")]
    pub best_streak: u64,
    #[serde(rename = "totalTimeMs")]
    pub total_time_ms: u64,
    #[serde(rename = "fastestLapMs")]
    pub fastest_lap_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommandReport {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub totals: PersonalTotals,
    pub leaderboards: Leaderboards,
}
