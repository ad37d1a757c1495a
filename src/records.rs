//! Personal-record tracking
//!
//! Given the sets logged for one exercise in one workout and the exercise's best
//! marks so far, decide which sets earn the 1RM, volume and weight PR flags. Each
//! category is awarded to at most one set per workout: the first set that reaches
//! the workout's maximum, and only when that maximum beats history.

use serde::{Deserialize, Serialize};

use crate::models::PrFlags;

/// Estimated one-rep max, rounded to two decimals
pub fn one_rep_max(weight: f64, reps: i64) -> f64 {
    match reps {
        r if r <= 0 => 0.0,
        1 => weight,
        r => round2(weight * (1.0 + r as f64 / 30.0)),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Strength set as seen by the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiftSet {
    pub weight: Option<f64>,
    pub reps: Option<i64>,
    pub completed: bool,
}

impl LiftSet {
    pub fn completed(weight: f64, reps: i64) -> Self {
        Self {
            weight: Some(weight),
            reps: Some(reps),
            completed: true,
        }
    }

    /// Weight and reps if this set takes part in PR computation
    fn eligible(&self) -> Option<(f64, i64)> {
        if !self.completed {
            return None;
        }
        match (self.weight, self.reps) {
            (Some(w), Some(r)) => Some((w, r)),
            _ => None,
        }
    }
}

/// Best marks for one exercise, carried forward through chronological replay
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonalBests {
    pub max_one_rm: f64,
    pub max_volume: f64,
    pub max_weight: f64,
    /// Most reps ever done at `max_weight`
    pub reps_at_max_weight: i64,
}

impl PersonalBests {
    /// Fold one historical set into the bests
    pub fn absorb(&mut self, weight: f64, reps: i64) {
        let one_rm = one_rep_max(weight, reps);
        if one_rm > self.max_one_rm {
            self.max_one_rm = one_rm;
        }
        if reps > 0 {
            let volume = weight * reps as f64;
            if volume > self.max_volume {
                self.max_volume = volume;
            }
            if self.beats_weight(weight, reps) {
                self.max_weight = weight;
                self.reps_at_max_weight = reps;
            }
        }
    }

    /// Weight PR rule: heavier, or same weight for more reps
    pub fn beats_weight(&self, weight: f64, reps: i64) -> bool {
        reps > 0
            && (weight > self.max_weight
                || (weight == self.max_weight && reps > self.reps_at_max_weight))
    }
}

/// Maxima reached within a single workout
#[derive(Debug, Default)]
struct WorkoutMaxima {
    one_rm: f64,
    volume: f64,
    heaviest: Option<(f64, i64)>,
}

impl WorkoutMaxima {
    fn scan(sets: &[(usize, f64, i64)]) -> Self {
        let mut maxima = WorkoutMaxima::default();
        for &(_, weight, reps) in sets {
            maxima.one_rm = maxima.one_rm.max(one_rep_max(weight, reps));
            if reps > 0 {
                maxima.volume = maxima.volume.max(weight * reps as f64);
                let heavier = match maxima.heaviest {
                    None => true,
                    Some((w, r)) => weight > w || (weight == w && reps > r),
                };
                if heavier {
                    maxima.heaviest = Some((weight, reps));
                }
            }
        }
        maxima
    }
}

pub struct RecordTracker;

impl RecordTracker {
    /// Compute per-set PR flags for one exercise within one workout.
    ///
    /// Returns one `PrFlags` per input set (excluded sets get none) and the bests
    /// updated with this workout's sets.
    pub fn compute_flags(history: &PersonalBests, sets: &[LiftSet]) -> (Vec<PrFlags>, PersonalBests) {
        let mut flags = vec![PrFlags::default(); sets.len()];
        let eligible: Vec<(usize, f64, i64)> = sets
            .iter()
            .enumerate()
            .filter_map(|(i, set)| set.eligible().map(|(w, r)| (i, w, r)))
            .collect();

        if eligible.is_empty() {
            return (flags, *history);
        }

        // Pass 1: workout maxima against history
        let maxima = WorkoutMaxima::scan(&eligible);
        let one_rm_pr = maxima.one_rm > 0.0 && maxima.one_rm > history.max_one_rm;
        let volume_pr = maxima.volume > 0.0 && maxima.volume > history.max_volume;
        let weight_pr = maxima
            .heaviest
            .map(|(w, r)| history.beats_weight(w, r))
            .unwrap_or(false);

        // Pass 2: first set reaching each maximum takes the flag
        let mut one_rm_assigned = !one_rm_pr;
        let mut volume_assigned = !volume_pr;
        let mut weight_assigned = !weight_pr;
        for &(index, weight, reps) in &eligible {
            if !one_rm_assigned && one_rep_max(weight, reps) == maxima.one_rm {
                flags[index].one_rm = true;
                one_rm_assigned = true;
            }
            if !volume_assigned && reps > 0 && weight * reps as f64 == maxima.volume {
                flags[index].volume = true;
                volume_assigned = true;
            }
            if !weight_assigned && maxima.heaviest == Some((weight, reps)) {
                flags[index].weight = true;
                weight_assigned = true;
            }
        }

        let mut updated = *history;
        for &(_, weight, reps) in &eligible {
            updated.absorb(weight, reps);
        }

        (flags, updated)
    }
}
