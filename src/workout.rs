//! Turning a logged workout into ledger rows.
//!
//! Both the workout editor and the importer describe a workout as a
//! [`WorkoutDraft`]. [`build_entries`] drops incomplete sets, numbers exercises and
//! sets, and runs the record tracker per exercise so the resulting
//! [`WorkoutEntry`] rows carry their PR flags.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::debug;

use crate::database::{load_bests, Database};
use crate::error::DatabaseError;
use crate::models::{PrFlags, SetType, WorkoutEntry};
use crate::records::{one_rep_max, LiftSet, PersonalBests, RecordTracker};

/// One set as logged in the editor or read from an import
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetDraft {
    pub set_type: SetType,
    pub weight: Option<f64>,
    pub reps: Option<i64>,
    pub distance: Option<f64>,
    pub seconds: Option<i64>,
    pub completed: bool,
}

impl SetDraft {
    pub fn strength(weight: f64, reps: i64) -> Self {
        Self {
            weight: Some(weight),
            reps: Some(reps),
            completed: true,
            ..Default::default()
        }
    }

    pub fn cardio(distance: Option<f64>, seconds: Option<i64>) -> Self {
        Self {
            distance,
            seconds,
            completed: true,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, set_type: SetType) -> Self {
        self.set_type = set_type;
        self
    }

    pub fn is_cardio(&self) -> bool {
        self.distance.is_some() || self.seconds.is_some()
    }

    /// Completed, and carrying the data its kind needs
    fn is_loggable(&self) -> bool {
        if !self.completed {
            return false;
        }
        if self.is_cardio() {
            true
        } else {
            self.weight.is_some() && self.reps.is_some()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseDraft {
    pub exercise_id: i64,
    pub notes: Option<String>,
    pub sets: Vec<SetDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutDraft {
    pub title: String,
    pub time: NaiveDateTime,
    pub duration_minutes: i64,
    pub exercises: Vec<ExerciseDraft>,
}

impl WorkoutDraft {
    pub fn new(title: impl Into<String>, time: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            time,
            duration_minutes: 0,
            exercises: Vec::new(),
        }
    }
}

/// Build the rows of one session.
///
/// `bests` holds the running bests per exercise; exercises missing from it are
/// fetched with `load` first. After the call it holds the bests including this
/// workout, which is what chronological replay carries into the next session.
pub fn build_entries<F, E>(
    draft: &WorkoutDraft,
    session_number: i64,
    bests: &mut HashMap<i64, PersonalBests>,
    mut load: F,
) -> Result<Vec<WorkoutEntry>, E>
where
    F: FnMut(i64) -> Result<PersonalBests, E>,
{
    let mut entries = Vec::new();
    let mut exercise_num = 0;

    for exercise in &draft.exercises {
        let sets: Vec<&SetDraft> = exercise.sets.iter().filter(|s| s.is_loggable()).collect();
        if sets.is_empty() {
            continue;
        }
        exercise_num += 1;

        let mut normal_sets = 0;
        for set in sets {
            let set_num = if set.set_type.is_numbered() {
                normal_sets += 1;
                normal_sets
            } else {
                0
            };
            let one_rm = match (set.is_cardio(), set.weight, set.reps) {
                (false, Some(weight), Some(reps)) => Some(one_rep_max(weight, reps)),
                _ => None,
            };
            entries.push(WorkoutEntry {
                workout_session: session_number,
                exercise_num,
                set_num,
                exercise_id: exercise.exercise_id,
                set_type: set.set_type,
                weight: set.weight,
                reps: set.reps,
                distance: set.distance,
                seconds: set.seconds,
                one_rm,
                time: draft.time,
                notes: exercise.notes.clone(),
                flags: PrFlags::default(),
            });
        }
    }

    // The same exercise may appear in more than one block; its PRs are decided
    // across all of them together.
    let mut exercise_order: Vec<i64> = Vec::new();
    for entry in &entries {
        if entry.one_rm.is_some() && !exercise_order.contains(&entry.exercise_id) {
            exercise_order.push(entry.exercise_id);
        }
    }

    for exercise_id in exercise_order {
        let indices: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.exercise_id == exercise_id && e.one_rm.is_some())
            .map(|(i, _)| i)
            .collect();
        let lifts: Vec<LiftSet> = indices
            .iter()
            .map(|&i| LiftSet {
                weight: entries[i].weight,
                reps: entries[i].reps,
                completed: true,
            })
            .collect();

        let history = match bests.get(&exercise_id) {
            Some(b) => *b,
            None => load(exercise_id)?,
        };
        let (flags, updated) = RecordTracker::compute_flags(&history, &lifts);
        bests.insert(exercise_id, updated);

        for (index, flag) in indices.into_iter().zip(flags) {
            entries[index].flags = flag;
        }
    }

    Ok(entries)
}

impl Database {
    /// Save a workout from the editor as a new session; returns its number
    pub fn record_workout(&mut self, draft: &WorkoutDraft) -> Result<i64, DatabaseError> {
        let session_number = self.latest_session_number()? + 1;
        let entries = {
            let conn = self.conn();
            build_entries(draft, session_number, &mut HashMap::new(), |exercise_id| {
                load_bests(conn, exercise_id, Some(draft.time), None)
            })?
        };
        if entries.is_empty() {
            return Err(DatabaseError::InvalidSession(
                "workout has no completed sets".to_string(),
            ));
        }

        debug!(session = session_number, sets = entries.len(), "Recording workout");
        self.insert_session(&entries, &draft.title, draft.duration_minutes)?;
        Ok(session_number)
    }

    /// Replace a stored session with an edited draft, recomputing its PRs
    /// against history before the draft's time
    pub fn update_workout(
        &mut self,
        session_number: i64,
        draft: &WorkoutDraft,
    ) -> Result<usize, DatabaseError> {
        let entries = {
            let conn = self.conn();
            build_entries(draft, session_number, &mut HashMap::new(), |exercise_id| {
                load_bests(conn, exercise_id, Some(draft.time), Some(session_number))
            })?
        };
        self.overwrite_session(session_number, &entries, &draft.title, draft.duration_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    fn no_history(_: i64) -> Result<PersonalBests, DatabaseError> {
        Ok(PersonalBests::default())
    }

    #[test]
    fn test_set_numbering_skips_warmup_and_drop() {
        let mut draft = WorkoutDraft::new("Legs", at(1));
        draft.exercises.push(ExerciseDraft {
            exercise_id: 7,
            notes: None,
            sets: vec![
                SetDraft::strength(40.0, 10).with_type(SetType::Warmup),
                SetDraft::strength(100.0, 5),
                SetDraft::strength(100.0, 5),
                SetDraft::strength(70.0, 8).with_type(SetType::Drop),
            ],
        });

        let entries = build_entries(&draft, 3, &mut HashMap::new(), no_history).unwrap();
        let numbers: Vec<i64> = entries.iter().map(|e| e.set_num).collect();
        assert_eq!(numbers, vec![0, 1, 2, 0]);
        assert!(entries.iter().all(|e| e.workout_session == 3 && e.exercise_num == 1));
    }

    #[test]
    fn test_incomplete_exercises_take_no_number() {
        let mut draft = WorkoutDraft::new("Push", at(2));
        draft.exercises.push(ExerciseDraft {
            exercise_id: 1,
            notes: None,
            sets: vec![SetDraft {
                completed: false,
                ..SetDraft::strength(50.0, 5)
            }],
        });
        draft.exercises.push(ExerciseDraft {
            exercise_id: 2,
            notes: Some("felt strong".to_string()),
            sets: vec![SetDraft::strength(20.0, 12)],
        });

        let entries = build_entries(&draft, 1, &mut HashMap::new(), no_history).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].exercise_id, 2);
        assert_eq!(entries[0].exercise_num, 1);
        assert_eq!(entries[0].notes.as_deref(), Some("felt strong"));
    }

    #[test]
    fn test_repeated_exercise_shares_one_pr_per_category() {
        let mut draft = WorkoutDraft::new("Bench twice", at(3));
        for _ in 0..2 {
            draft.exercises.push(ExerciseDraft {
                exercise_id: 5,
                notes: None,
                sets: vec![SetDraft::strength(100.0, 5)],
            });
        }

        let entries = build_entries(&draft, 1, &mut HashMap::new(), no_history).unwrap();
        assert_eq!(entries[0].exercise_num, 1);
        assert_eq!(entries[1].exercise_num, 2);
        assert!(entries[0].flags.one_rm && entries[0].flags.weight && entries[0].flags.volume);
        assert!(!entries[1].flags.any());
    }

    #[test]
    fn test_cardio_sets_carry_no_one_rm_or_flags() {
        let mut draft = WorkoutDraft::new("Run", at(4));
        draft.exercises.push(ExerciseDraft {
            exercise_id: 9,
            notes: None,
            sets: vec![SetDraft::cardio(Some(5000.0), Some(1500))],
        });

        let mut loads = 0;
        let entries = build_entries(&draft, 1, &mut HashMap::new(), |_| {
            loads += 1;
            Ok::<_, DatabaseError>(PersonalBests::default())
        })
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].one_rm, None);
        assert!(!entries[0].flags.any());
        assert_eq!(loads, 0);
    }

    #[test]
    fn test_bests_carry_between_sessions() {
        let mut bests = HashMap::new();
        let mut first = WorkoutDraft::new("A", at(5));
        first.exercises.push(ExerciseDraft {
            exercise_id: 1,
            notes: None,
            sets: vec![SetDraft::strength(80.0, 5)],
        });
        let mut second = WorkoutDraft::new("B", at(6));
        second.exercises.push(ExerciseDraft {
            exercise_id: 1,
            notes: None,
            sets: vec![SetDraft::strength(80.0, 5)],
        });

        let a = build_entries(&first, 1, &mut bests, no_history).unwrap();
        let b = build_entries(&second, 2, &mut bests, no_history).unwrap();
        assert!(a[0].flags.weight);
        assert!(!b[0].flags.any());
    }
}
