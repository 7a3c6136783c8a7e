use crate::track::Track;
use crate::types::{Direction, ResetReason};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerPhase {
    Idle,
    Undirected,
    Directed(Direction),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LapCompletion {
    pub lap_time_ms: u64,
    /// Laps completed in the current streak, including this one.
    pub streak_laps: u64,
    /// Checkpoint advances that closed the loop; always the track length.
    pub advances: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitOutcome {
    Started,
    Repeated,
    Advanced,
    LapCompleted(LapCompletion),
    Reset(ResetReason),
}

/// Per-entity checkpoint state machine.
///
/// Idle until a checkpoint is hit, then undirected until the second hit locks the direction.
/// Every inconsistency drops back to idle without crediting the partial lap.
#[derive(Clone, Debug, Default)]
pub struct Sequencer {
    first: Option<usize>,
    last: Option<usize>,
    direction: Option<Direction>,
    streak_started_ms: u64,
    last_hit_ms: u64,
    streak_laps: u64,
    lap_advances: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SequencerPhase {
        match (self.last, self.direction) {
            (None, _) => SequencerPhase::Idle,
            (Some(_), None) => SequencerPhase::Undirected,
            (Some(_), Some(direction)) => SequencerPhase::Directed(direction),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.last.is_none()
    }

    pub fn last_checkpoint(&self) -> Option<usize> {
        self.last
    }

    pub fn first_checkpoint(&self) -> Option<usize> {
        self.first
    }

    pub fn streak_laps(&self) -> u64 {
        self.streak_laps
    }

    /// Advances made toward the lap in progress. Never credited unless the lap closes.
    pub fn lap_advances(&self) -> u64 {
        self.lap_advances
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drops the streak after the entity fell below the floor. Returns whether anything was lost.
    pub fn breach_floor(&mut self) -> bool {
        let was_tracking = !self.is_idle();
        self.reset();
        was_tracking
    }

    pub fn hit(&mut self, track: &Track, checkpoint: usize, now_ms: u64) -> HitOutcome {
        let Some(last) = self.last else {
            self.first = Some(checkpoint);
            self.last = Some(checkpoint);
            self.streak_started_ms = now_ms;
            self.last_hit_ms = now_ms;
            return HitOutcome::Started;
        };
        if checkpoint == last {
            return HitOutcome::Repeated;
        }

        let step = if track.successor(last) == checkpoint {
            Direction::Forward
        } else if track.predecessor(last) == checkpoint {
            Direction::Backward
        } else {
            return self.fail(ResetReason::NotAdjacent);
        };
        match self.direction {
            None => self.direction = Some(step),
            Some(locked) if locked != step => return self.fail(ResetReason::WrongDirection),
            Some(_) => {}
        }

        let elapsed = now_ms.saturating_sub(self.last_hit_ms);
        if elapsed > track.max_time_ms() {
            return self.fail(ResetReason::Timeout);
        }

        self.lap_advances += 1;
        self.last = Some(checkpoint);
        self.last_hit_ms = now_ms;

        if self.first != Some(checkpoint) {
            return HitOutcome::Advanced;
        }

        self.streak_laps += 1;
        let completion = LapCompletion {
            lap_time_ms: now_ms.saturating_sub(self.streak_started_ms),
            streak_laps: self.streak_laps,
            advances: self.lap_advances,
        };
        self.streak_started_ms = now_ms;
        self.lap_advances = 0;
        HitOutcome::LapCompleted(completion)
    }

    fn fail(&mut self, reason: ResetReason) -> HitOutcome {
        self.reset();
        HitOutcome::Reset(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::square_track;
    use crate::types::Vec3;

    fn run(sequencer: &mut Sequencer, track: &Track, hits: &[(usize, u64)]) -> Vec<HitOutcome> {
        hits.iter()
            .map(|(checkpoint, at)| sequencer.hit(track, *checkpoint, *at))
            .collect()
    }

    fn laps(outcomes: &[HitOutcome]) -> Vec<LapCompletion> {
        outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                HitOutcome::LapCompleted(lap) => Some(*lap),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn forward_loop_completes_exactly_one_lap() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        let outcomes = run(
            &mut sequencer,
            &track,
            &[(0, 0), (1, 1_000), (2, 2_000), (3, 3_000), (0, 4_000)],
        );

        assert_eq!(
            laps(&outcomes),
            vec![LapCompletion {
                lap_time_ms: 4_000,
                streak_laps: 1,
                advances: 4,
            }]
        );
        assert_eq!(sequencer.phase(), SequencerPhase::Directed(Direction::Forward));
        assert_eq!(sequencer.lap_advances(), 0);
    }

    #[test]
    fn every_starting_checkpoint_closes_after_n_advances() {
        let track = square_track();
        for start in 0..track.len() {
            let mut sequencer = Sequencer::new();
            let hits: Vec<(usize, u64)> = (0..=track.len())
                .map(|step| ((start + step) % track.len(), step as u64 * 500))
                .collect();
            let outcomes = run(&mut sequencer, &track, &hits);
            let completed = laps(&outcomes);
            assert_eq!(completed.len(), 1, "start {start}");
            assert_eq!(completed[0].lap_time_ms, 2_000);
        }
    }

    #[test]
    fn backward_loop_counts_and_chains_laps() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        let outcomes = run(
            &mut sequencer,
            &track,
            &[
                (2, 0),
                (1, 900),
                (0, 1_800),
                (3, 2_700),
                (2, 3_600),
                (1, 4_000),
                (0, 4_400),
                (3, 4_800),
                (2, 5_200),
            ],
        );

        let completed = laps(&outcomes);
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].lap_time_ms, 3_600);
        assert_eq!(completed[1].lap_time_ms, 1_600);
        assert_eq!(completed[1].streak_laps, 2);
        assert_eq!(
            sequencer.phase(),
            SequencerPhase::Directed(Direction::Backward)
        );
    }

    #[test]
    fn reversal_resets_to_idle_without_laps() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        let outcomes = run(
            &mut sequencer,
            &track,
            &[(0, 0), (1, 1_000), (2, 2_000), (1, 3_000)],
        );

        assert_eq!(
            outcomes.last(),
            Some(&HitOutcome::Reset(ResetReason::WrongDirection))
        );
        assert!(laps(&outcomes).is_empty());
        assert!(sequencer.is_idle());
        assert_eq!(sequencer.lap_advances(), 0);
    }

    #[test]
    fn non_adjacent_hit_resets_regardless_of_streak() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        run(
            &mut sequencer,
            &track,
            &[(0, 0), (1, 100), (2, 200), (3, 300), (0, 400), (1, 500)],
        );
        assert_eq!(sequencer.streak_laps(), 1);

        let outcome = sequencer.hit(&track, 3, 600);
        assert_eq!(outcome, HitOutcome::Reset(ResetReason::NotAdjacent));
        assert!(sequencer.is_idle());
        assert_eq!(sequencer.streak_laps(), 0);
    }

    #[test]
    fn slow_adjacent_hit_times_out() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        let outcomes = run(&mut sequencer, &track, &[(0, 0), (1, 10_000)]);
        assert_eq!(outcomes[1], HitOutcome::Reset(ResetReason::Timeout));
        assert!(sequencer.is_idle());
    }

    #[test]
    fn hit_exactly_at_max_time_is_accepted() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        let outcomes = run(&mut sequencer, &track, &[(0, 0), (1, 5_000)]);
        assert_eq!(outcomes[1], HitOutcome::Advanced);
        assert_eq!(sequencer.lap_advances(), 1);
    }

    #[test]
    fn repeated_hits_on_same_checkpoint_are_ignored() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        let outcomes = run(&mut sequencer, &track, &[(0, 0), (0, 100), (0, 9_000)]);
        assert_eq!(
            outcomes,
            vec![HitOutcome::Started, HitOutcome::Repeated, HitOutcome::Repeated]
        );
        assert_eq!(sequencer.phase(), SequencerPhase::Undirected);
    }

    #[test]
    fn reset_hit_does_not_start_new_streak() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        run(&mut sequencer, &track, &[(0, 0), (2, 100)]);
        assert!(sequencer.is_idle());

        let outcome = sequencer.hit(&track, 2, 200);
        assert_eq!(outcome, HitOutcome::Started);
        assert_eq!(sequencer.first_checkpoint(), Some(2));
    }

    #[test]
    fn floor_breach_discards_streak() {
        let track = square_track();
        let mut sequencer = Sequencer::new();
        assert!(!sequencer.breach_floor());
        run(&mut sequencer, &track, &[(0, 0), (1, 100)]);
        assert!(sequencer.breach_floor());
        assert!(sequencer.is_idle());
    }

    #[test]
    fn two_checkpoint_track_prefers_forward() {
        let track = Track::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)],
            1.0,
            -5.0,
            1_000,
        )
        .expect("valid");
        let mut sequencer = Sequencer::new();
        let outcomes = run(&mut sequencer, &track, &[(0, 0), (1, 500), (0, 1_000)]);
        assert_eq!(
            sequencer.phase(),
            SequencerPhase::Directed(Direction::Forward)
        );
        assert_eq!(laps(&outcomes).len(), 1);
    }
}
