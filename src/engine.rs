use std::collections::HashMap;

use tracing::{debug, info};

use crate::conditions::QueryCondition;
use crate::config::LapConfig;
use crate::error::{ConfigError, StoreError};
use crate::leaderboard::build_leaderboards;
use crate::sequencer::{HitOutcome, Sequencer};
use crate::stats_store::StatsStore;
use crate::track::Track;
use crate::types::{CommandReport, EntityStats, LapEvent, Leaderboards, ResetReason, Vec3};

#[derive(Clone, Copy, Debug)]
pub struct LapEngineOptions {
    pub command_laps: u64,
    pub ranking_top: usize,
    pub food_level: Option<u32>,
}

impl From<&LapConfig> for LapEngineOptions {
    fn from(config: &LapConfig) -> Self {
        Self {
            command_laps: config.command_laps,
            ranking_top: config.ranking_top,
            food_level: config.food_level,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PositionUpdate {
    pub entity_id: String,
    pub position: Vec3,
    pub airborne: bool,
    pub mounted: bool,
    pub now_ms: u64,
}

/// Owns the live sessions of active entities and the stats of every known entity.
///
/// All mutation goes through `&mut self`, so callers serialise events by holding the engine
/// behind one lock.
pub struct LapEngine {
    track: Track,
    options: LapEngineOptions,
    sessions: HashMap<String, Sequencer>,
    stats: StatsStore,
    events: Vec<LapEvent>,
}

impl LapEngine {
    pub fn new(track: Track, options: LapEngineOptions, stats: StatsStore) -> Self {
        Self {
            track,
            options,
            sessions: HashMap::new(),
            stats,
            events: Vec::new(),
        }
    }

    pub fn from_config(config: &LapConfig, stats: StatsStore) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.build_track()?,
            LapEngineOptions::from(config),
            stats,
        ))
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn options(&self) -> LapEngineOptions {
        self.options
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    pub fn is_active(&self, entity_id: &str) -> bool {
        self.sessions.contains_key(entity_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, entity_id: &str) -> Option<&Sequencer> {
        self.sessions.get(entity_id)
    }

    /// Starts a fresh session. A second join for an active entity restarts its session.
    pub fn handle_join(&mut self, entity_id: &str) {
        self.sessions.insert(entity_id.to_string(), Sequencer::new());
        info!(entity = entity_id, "entity joined");
    }

    /// Ends the session. Completed laps are already in the stats store and the partial lap is
    /// dropped, so nothing else has to be flushed.
    pub fn handle_leave(&mut self, entity_id: &str) -> bool {
        let removed = self.sessions.remove(entity_id);
        if let Some(sequencer) = &removed {
            info!(
                entity = entity_id,
                streak_laps = sequencer.streak_laps(),
                "entity left"
            );
        }
        removed.is_some()
    }

    pub fn handle_position(&mut self, update: &PositionUpdate) {
        if update.airborne || update.mounted {
            return;
        }
        let Some(sequencer) = self.sessions.get_mut(&update.entity_id) else {
            debug!(entity = %update.entity_id, "position update for inactive entity");
            return;
        };
        if !self.track.contains(&update.position) {
            return;
        }

        if self.track.is_below_floor(&update.position) && sequencer.breach_floor() {
            debug!(entity = %update.entity_id, "streak reset: floor breach");
            self.events.push(LapEvent::StreakReset {
                entity_id: update.entity_id.clone(),
                reason: ResetReason::FloorBreach,
            });
        }

        let Some(checkpoint) = self.track.hit_checkpoint(&update.position) else {
            return;
        };
        let outcome = sequencer.hit(&self.track, checkpoint.index, update.now_ms);

        match outcome {
            HitOutcome::Started | HitOutcome::Repeated | HitOutcome::Advanced => {}
            HitOutcome::Reset(reason) => {
                debug!(entity = %update.entity_id, ?reason, "streak reset");
                self.events.push(LapEvent::StreakReset {
                    entity_id: update.entity_id.clone(),
                    reason,
                });
            }
            HitOutcome::LapCompleted(lap) => {
                self.stats.record_lap(&update.entity_id, &lap);
                info!(
                    entity = %update.entity_id,
                    lap = lap.streak_laps,
                    lap_time_ms = lap.lap_time_ms,
                    "lap completed"
                );
                self.events.push(LapEvent::LapCompleted {
                    entity_id: update.entity_id.clone(),
                    lap: lap.streak_laps,
                    lap_time_ms: lap.lap_time_ms,
                    food_level: self.options.food_level,
                });
                if lap.streak_laps == self.options.command_laps {
                    self.events.push(LapEvent::CommandUnlocked {
                        entity_id: update.entity_id.clone(),
                        required_laps: self.options.command_laps,
                    });
                }
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<LapEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn entity_stats(&self, entity_id: &str) -> EntityStats {
        self.stats.get(entity_id)
    }

    pub fn check_condition(&self, entity_id: &str, condition: &QueryCondition) -> bool {
        condition.evaluate(&self.stats.get(entity_id), self.track.len())
    }

    pub fn leaderboards(&self, top: usize) -> Leaderboards {
        build_leaderboards(self.stats.iter(), top, self.track.len())
    }

    /// Personal totals plus the four rankings, for entities whose best streak unlocked the
    /// command. Others get `None`.
    pub fn handle_command(&self, entity_id: &str) -> Option<CommandReport> {
        if !self.is_active(entity_id) {
            return None;
        }
        let stats = self.stats.get(entity_id);
        if stats.max_streak < self.options.command_laps {
            debug!(
                entity = entity_id,
                best_streak = stats.max_streak,
                "command still locked"
            );
            return None;
        }
        Some(CommandReport {
            entity_id: entity_id.to_string(),
            totals: stats.totals(self.track.len()),
            leaderboards: self.leaderboards(self.options.ranking_top),
        })
    }

    pub fn needs_save(&self) -> bool {
        self.stats.is_dirty()
    }

    pub fn save_stats(&mut self) -> Result<(), StoreError> {
        self.stats.save()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::sequencer::SequencerPhase;
    use crate::stats_store::temp_file;
    use crate::track::square_track;

    fn make_engine(command_laps: u64) -> LapEngine {
        LapEngine::new(
            square_track(),
            LapEngineOptions {
                command_laps,
                ranking_top: 5,
                food_level: Some(20),
            },
            StatsStore::in_memory(temp_file("engine"), BTreeMap::new()),
        )
    }

    fn at(x: f64, y: f64, z: f64) -> Vec3 {
        Vec3::new(x, y, z)
    }

    fn step(engine: &mut LapEngine, entity_id: &str, position: Vec3, now_ms: u64) {
        engine.handle_position(&PositionUpdate {
            entity_id: entity_id.to_string(),
            position,
            airborne: false,
            mounted: false,
            now_ms,
        });
    }

    fn corner(index: usize) -> Vec3 {
        match index % 4 {
            0 => at(0.5, 64.0, 0.5),
            1 => at(9.5, 64.0, 0.5),
            2 => at(9.5, 64.0, 9.5),
            _ => at(0.5, 64.0, 9.5),
        }
    }

    fn run_laps(engine: &mut LapEngine, entity_id: &str, hits: usize, start_ms: u64) {
        for index in 0..hits {
            step(
                engine,
                entity_id,
                corner(index),
                start_ms + index as u64 * 1_000,
            );
        }
    }

    #[test]
    fn single_lap_updates_stats_and_emits_event() {
        let mut engine = make_engine(3);
        engine.handle_join("alice");
        run_laps(&mut engine, "alice", 5, 0);

        let stats = engine.entity_stats("alice");
        assert_eq!(stats.total_advances, 4);
        assert_eq!(stats.total_time_ms, 4_000);
        assert_eq!(stats.min_lap_time_ms, Some(4_000));
        assert_eq!(stats.max_streak, 1);
        assert_eq!(
            engine.drain_events(),
            vec![LapEvent::LapCompleted {
                entity_id: "alice".to_string(),
                lap: 1,
                lap_time_ms: 4_000,
                food_level: Some(20),
            }]
        );
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn reversal_leaves_stats_untouched() {
        let mut engine = make_engine(3);
        engine.handle_join("alice");
        for (index, checkpoint) in [0, 1, 2, 1].into_iter().enumerate() {
            step(&mut engine, "alice", corner(checkpoint), index as u64 * 1_000);
        }

        assert_eq!(engine.entity_stats("alice"), EntityStats::default());
        assert_eq!(
            engine.session("alice").map(|s| s.phase()),
            Some(SequencerPhase::Idle)
        );
        assert_eq!(
            engine.drain_events(),
            vec![LapEvent::StreakReset {
                entity_id: "alice".to_string(),
                reason: ResetReason::WrongDirection,
            }]
        );
    }

    #[test]
    fn timeout_credits_nothing() {
        let mut engine = make_engine(3);
        engine.handle_join("alice");
        step(&mut engine, "alice", corner(0), 0);
        step(&mut engine, "alice", corner(1), 10_000);
        assert_eq!(engine.entity_stats("alice").total_advances, 0);
        assert!(engine.session("alice").is_some_and(|s| s.is_idle()));
    }

    #[test]
    fn airborne_mounted_and_inactive_updates_are_ignored() {
        let mut engine = make_engine(3);
        engine.handle_join("alice");
        engine.handle_position(&PositionUpdate {
            entity_id: "alice".to_string(),
            position: corner(0),
            airborne: true,
            mounted: false,
            now_ms: 0,
        });
        engine.handle_position(&PositionUpdate {
            entity_id: "alice".to_string(),
            position: corner(0),
            airborne: false,
            mounted: true,
            now_ms: 0,
        });
        assert!(engine.session("alice").is_some_and(|s| s.is_idle()));

        step(&mut engine, "ghost", corner(0), 0);
        assert!(engine.session("ghost").is_none());
    }

    #[test]
    fn falling_below_floor_resets_streak() {
        let mut engine = make_engine(3);
        engine.handle_join("alice");
        step(&mut engine, "alice", corner(0), 0);
        step(&mut engine, "alice", corner(1), 1_000);
        step(&mut engine, "alice", at(5.0, 10.0, 5.0), 1_500);
        step(&mut engine, "alice", corner(2), 2_000);
        step(&mut engine, "alice", corner(3), 3_000);
        step(&mut engine, "alice", corner(0), 4_000);

        assert_eq!(engine.entity_stats("alice").total_advances, 0);
        assert_eq!(
            engine.session("alice").and_then(|s| s.first_checkpoint()),
            Some(2)
        );
        let events = engine.drain_events();
        assert_eq!(
            events.first(),
            Some(&LapEvent::StreakReset {
                entity_id: "alice".to_string(),
                reason: ResetReason::FloorBreach,
            })
        );
    }

    #[test]
    fn floor_breach_outside_track_bounds_is_ignored() {
        let mut engine = make_engine(3);
        engine.handle_join("alice");
        step(&mut engine, "alice", corner(0), 0);
        step(&mut engine, "alice", at(50.0, 0.0, 50.0), 500);
        assert!(engine.session("alice").is_some_and(|s| !s.is_idle()));
    }

    #[test]
    fn command_unlocks_at_configured_streak() {
        let mut engine = make_engine(2);
        engine.handle_join("alice");
        run_laps(&mut engine, "alice", 5, 0);
        assert!(engine.handle_command("alice").is_none());

        run_laps(&mut engine, "alice", 5, 4_000);
        let events = engine.drain_events();
        assert!(events.contains(&LapEvent::CommandUnlocked {
            entity_id: "alice".to_string(),
            required_laps: 2,
        }));

        let report = engine.handle_command("alice").expect("command unlocked");
        assert_eq!(report.totals.total_laps, 2);
        assert_eq!(report.totals.best_streak, 2);
        assert_eq!(report.totals.fastest_lap_ms, Some(4_000));
        assert_eq!(report.leaderboards.best_streak[0].entity_id, "alice");
    }

    #[test]
    fn stats_survive_leave_and_rejoin() {
        let mut engine = make_engine(1);
        engine.handle_join("alice");
        run_laps(&mut engine, "alice", 5, 0);
        step(&mut engine, "alice", corner(1), 5_000);
        assert!(engine.handle_leave("alice"));
        assert!(!engine.handle_leave("alice"));
        assert!(engine.handle_command("alice").is_none());

        engine.handle_join("alice");
        let stats = engine.entity_stats("alice");
        assert_eq!(stats.total_advances, 4);
        assert_eq!(stats.total_time_ms, 4_000);
        assert!(engine.session("alice").is_some_and(|s| s.is_idle()));
        let total_laps = QueryCondition::parse("totallaps 1").expect("valid");
        let max_laps = QueryCondition::parse("maxlaps 1").expect("valid");
        assert!(engine.check_condition("alice", &total_laps));
        assert!(!engine.check_condition("bob", &max_laps));
    }

    #[test]
    fn leaderboards_rank_all_known_entities() {
        let mut engine = make_engine(1);
        engine.handle_join("alice");
        engine.handle_join("bob");
        run_laps(&mut engine, "alice", 9, 0);
        for index in 0..5 {
            step(&mut engine, "bob", corner(index), index as u64 * 500);
        }
        engine.handle_leave("bob");

        let boards = engine.leaderboards(5);
        let fastest: Vec<&str> = boards
            .fastest_lap
            .iter()
            .map(|entry| entry.entity_id.as_str())
            .collect();
        assert_eq!(fastest, vec!["bob", "alice"]);
        assert_eq!(boards.total_laps[0].entity_id, "alice");
        assert_eq!(boards.total_laps[0].value, 2);
        assert_eq!(boards.best_streak[0].entity_id, "alice");
    }

    #[test]
    fn save_stats_persists_and_clears_dirty_flag() {
        let path = temp_file("engine-save");
        let mut engine = LapEngine::new(
            square_track(),
            LapEngineOptions {
                command_laps: 1,
                ranking_top: 5,
                food_level: None,
            },
            StatsStore::new(path.clone()),
        );
        engine.handle_join("alice");
        run_laps(&mut engine, "alice", 5, 0);
        assert!(engine.needs_save());
        engine.save_stats().expect("save");
        assert!(!engine.needs_save());

        let reloaded = StatsStore::new(path.clone());
        assert_eq!(reloaded.get("alice").total_advances, 4);

        let _ = std::fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
