use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::types::{EntityStats, Leaderboards, RankedEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    FastestLap,
    BestStreak,
    TotalLaps,
    TotalTime,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::FastestLap,
        Metric::BestStreak,
        Metric::TotalLaps,
        Metric::TotalTime,
    ];

    /// Ranking key; zero means the entity does not qualify.
    ///
    /// Total laps rank on raw advances so the order matches the stored counter.
    pub fn raw_value(self, stats: &EntityStats) -> u64 {
        match self {
            Metric::FastestLap => stats.min_lap_time_ms.unwrap_or(0),
            Metric::BestStreak => stats.max_streak,
            Metric::TotalLaps => stats.total_advances,
            Metric::TotalTime => stats.total_time_ms,
        }
    }

    pub fn display_value(self, raw: u64, track_len: usize) -> u64 {
        match self {
            Metric::TotalLaps if track_len > 0 => raw / track_len as u64,
            _ => raw,
        }
    }

    pub fn is_better(self, candidate: u64, incumbent: u64) -> bool {
        match self {
            Metric::FastestLap => candidate < incumbent,
            _ => candidate > incumbent,
        }
    }
}

/// Best `k` entities for `metric`, best first.
///
/// Works over a fixed array of `k` slots: a qualifying entity is inserted at the first slot that
/// is empty or holds a strictly worse value, everything behind it shifts right and the last slot
/// falls off. Equal values keep the order in which they were seen.
pub fn top_k<'a, I>(entries: I, metric: Metric, k: usize) -> Vec<(&'a str, u64)>
where
    I: IntoIterator<Item = (&'a str, &'a EntityStats)>,
{
    let mut slots: Vec<Option<(&'a str, u64)>> = vec![None; k];
    for (entity_id, stats) in entries {
        let value = metric.raw_value(stats);
        if value == 0 {
            continue;
        }
        let Some(position) = slots.iter().position(|slot| {
            slot.map_or(true, |(_, current)| metric.is_better(value, current))
        }) else {
            continue;
        };
        slots[position..].rotate_right(1);
        slots[position] = Some((entity_id, value));
    }
    slots.into_iter().flatten().collect()
}

pub fn rank<'a, I>(entries: I, metric: Metric, k: usize, track_len: usize) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = (&'a str, &'a EntityStats)>,
{
    top_k(entries, metric, k)
        .into_iter()
        .enumerate()
        .map(|(index, (entity_id, raw))| RankedEntry {
            rank: index + 1,
            entity_id: entity_id.to_string(),
            value: metric.display_value(raw, track_len),
        })
        .collect()
}

pub fn build_leaderboards<'a, I>(entries: I, k: usize, track_len: usize) -> Leaderboards
where
    I: IntoIterator<Item = (&'a str, &'a EntityStats)> + Clone,
{
    Leaderboards {
        generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        fastest_lap: rank(entries.clone(), Metric::FastestLap, k, track_len),
        best_streak: rank(entries.clone(), Metric::BestStreak, k, track_len),
        total_laps: rank(entries.clone(), Metric::TotalLaps, k, track_len),
        total_time: rank(entries, Metric::TotalTime, k, track_len),
    }
}
