//! Bulk import of workout-tracker CSV exports.
//!
//! The pipeline runs in three steps:
//!
//! 1. **Parse**: [`csv::parse_rows`] decodes the whole text. Nothing is written if
//!    any row fails to parse.
//! 2. **Plan**: every row is classified ([`classify::classify_row`]), set rows are
//!    grouped into sessions by timestamp and into exercises by name, and
//!    body-weight rows are set aside.
//! 3. **Replay**: sessions are written oldest first inside one transaction, with
//!    personal bests carried from each session to the next, so PR flags come out
//!    right no matter how the file was ordered.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::body_weight::upsert_body_weight;
use crate::database::{find_exercise_by_name, insert_exercise, load_bests, set_cardio_flag, Database};
use crate::error::{DatabaseError, Result};
use crate::ledger::{latest_session_number, write_entries};
use crate::models::NewExercise;
use crate::records::PersonalBests;
use crate::workout::{build_entries, ExerciseDraft, SetDraft, WorkoutDraft};

pub mod classify;
pub mod csv;

use self::classify::{classify_row, RowKind};
use self::csv::CsvRow;

/// Importer settings, also the `[import]` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Report progress every this many sessions
    pub progress_interval: usize,
    /// Exercise names that are really body-weight measurements
    pub body_weight_names: Vec<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            progress_interval: 10,
            body_weight_names: vec!["Body Weight".to_string(), "Weight".to_string()],
        }
    }
}

/// Progress events, in the order they are emitted
#[derive(Debug, Clone, PartialEq)]
pub enum ImportProgress {
    Parsed {
        rows: usize,
        sessions: usize,
        body_weight_entries: usize,
    },
    Preparing,
    Importing {
        sessions_processed: usize,
        total_sessions: usize,
        sets_imported: usize,
    },
    Complete(ImportSummary),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub sets_imported: usize,
    pub sessions_imported: usize,
    pub body_weight_entries: usize,
    pub exercises_created: usize,
    /// Set rows dropped for missing data
    pub rows_skipped: usize,
    pub first_session: Option<i64>,
    pub last_session: Option<i64>,
}

#[derive(Debug, Default)]
struct ExerciseGroup {
    name: String,
    notes: Option<String>,
    sets: Vec<SetDraft>,
}

#[derive(Debug, Default)]
struct SessionGroup {
    title: String,
    duration_minutes: Option<i64>,
    exercises: Vec<ExerciseGroup>,
}

impl SessionGroup {
    fn exercise_mut(&mut self, name: &str) -> &mut ExerciseGroup {
        let index = match self.exercises.iter().position(|e| e.name == name) {
            Some(index) => index,
            None => {
                self.exercises.push(ExerciseGroup {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.exercises.len() - 1
            }
        };
        &mut self.exercises[index]
    }
}

/// Classified and grouped rows, ready to write
#[derive(Debug, Default)]
struct ImportPlan {
    rows: usize,
    rows_skipped: usize,
    /// Keyed by timestamp, so iteration is chronological
    sessions: BTreeMap<NaiveDateTime, SessionGroup>,
    body_weights: Vec<(NaiveDateTime, f64)>,
}

impl ImportPlan {
    /// Exercise names in first-seen chronological order, with whether any of
    /// their sets carry cardio data
    fn exercise_names(&self) -> Vec<(String, bool)> {
        let mut names: Vec<(String, bool)> = Vec::new();
        for exercise in self.sessions.values().flat_map(|s| &s.exercises) {
            let cardio = exercise.sets.iter().any(SetDraft::is_cardio);
            match names.iter_mut().find(|(name, _)| *name == exercise.name) {
                Some((_, seen_cardio)) => *seen_cardio |= cardio,
                None => names.push((exercise.name.clone(), cardio)),
            }
        }
        names
    }
}

pub struct Importer {
    settings: ImportSettings,
}

impl Importer {
    pub fn new(settings: ImportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Import a CSV export into the database in one transaction
    pub fn import<F>(&self, db: &mut Database, text: &str, mut on_progress: F) -> Result<ImportSummary>
    where
        F: FnMut(ImportProgress),
    {
        let rows = self::csv::parse_rows(text)?;
        let plan = self.plan(rows);
        info!(
            rows = plan.rows,
            sessions = plan.sessions.len(),
            body_weight_entries = plan.body_weights.len(),
            "Parsed import file"
        );
        on_progress(ImportProgress::Parsed {
            rows: plan.rows,
            sessions: plan.sessions.len(),
            body_weight_entries: plan.body_weights.len(),
        });

        on_progress(ImportProgress::Preparing);
        let tx = db.conn_mut().transaction().map_err(DatabaseError::from)?;
        let summary = self
            .write_plan(&tx, &plan, &mut on_progress)
            .map_err(|e| DatabaseError::transaction("import", e))?;
        tx.commit()
            .map_err(|e| DatabaseError::transaction("import", e.into()))?;

        info!(
            sessions = summary.sessions_imported,
            sets = summary.sets_imported,
            body_weight_entries = summary.body_weight_entries,
            exercises_created = summary.exercises_created,
            "Import complete"
        );
        on_progress(ImportProgress::Complete(summary.clone()));
        Ok(summary)
    }

    /// Read a file and import it
    pub fn import_file<P, F>(&self, db: &mut Database, path: P, on_progress: F) -> Result<ImportSummary>
    where
        P: AsRef<Path>,
        F: FnMut(ImportProgress),
    {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = text.len(), "Read import file");
        self.import(db, &text, on_progress)
    }

    fn plan(&self, rows: Vec<CsvRow>) -> ImportPlan {
        let mut plan = ImportPlan {
            rows: rows.len(),
            ..Default::default()
        };

        // Note rows apply to every set of their (date, exercise) pair, wherever
        // they appear in the file
        let mut note_rows: HashMap<(NaiveDateTime, String), String> = HashMap::new();

        for row in rows {
            let kind = classify_row(&row, &self.settings.body_weight_names);
            let set = match kind {
                RowKind::BodyWeight => {
                    match row.weight {
                        Some(weight) if weight > 0.0 => plan.body_weights.push((row.date, weight)),
                        _ => {
                            warn!(line = row.line, "Body-weight row without a weight, skipping");
                            plan.rows_skipped += 1;
                        }
                    }
                    continue;
                }
                RowKind::Note => {
                    if let Some(text) = row.notes {
                        note_rows.entry((row.date, row.exercise_name)).or_insert(text);
                    }
                    continue;
                }
                RowKind::Timer => continue,
                RowKind::Cardio { set_type } => SetDraft::cardio(
                    row.distance.filter(|d| *d > 0.0),
                    row.seconds.filter(|s| *s > 0),
                )
                .with_type(set_type),
                RowKind::Strength { set_type } => match row.reps {
                    // Body-weight movements are exported with an empty weight
                    Some(reps) => SetDraft::strength(row.weight.unwrap_or(0.0), reps).with_type(set_type),
                    None => {
                        warn!(line = row.line, exercise = %row.exercise_name, "Set without reps, skipping");
                        plan.rows_skipped += 1;
                        continue;
                    }
                },
            };

            let session = plan.sessions.entry(row.date).or_default();
            if session.title.is_empty() {
                session.title = row.workout_name;
            }
            if session.duration_minutes.is_none() {
                session.duration_minutes = row.duration_minutes;
            }
            let exercise = session.exercise_mut(&row.exercise_name);
            if exercise.notes.is_none() {
                exercise.notes = row.notes;
            }
            exercise.sets.push(set);
        }

        for (time, session) in plan.sessions.iter_mut() {
            for exercise in &mut session.exercises {
                if exercise.notes.is_none() {
                    exercise.notes = note_rows.remove(&(*time, exercise.name.clone()));
                }
            }
        }

        plan
    }

    fn write_plan<F>(
        &self,
        conn: &Connection,
        plan: &ImportPlan,
        on_progress: &mut F,
    ) -> std::result::Result<ImportSummary, DatabaseError>
    where
        F: FnMut(ImportProgress),
    {
        let mut summary = ImportSummary {
            rows_skipped: plan.rows_skipped,
            ..Default::default()
        };

        let mut exercise_ids: HashMap<String, i64> = HashMap::new();
        for (name, is_cardio) in plan.exercise_names() {
            let id = match find_exercise_by_name(conn, &name)? {
                Some(existing) => existing.id,
                None => {
                    summary.exercises_created += 1;
                    info!(exercise = %name, "Creating exercise from import");
                    insert_exercise(
                        conn,
                        &NewExercise {
                            name: name.clone(),
                            target_muscles: Vec::new(),
                            accessory_muscles: Vec::new(),
                            is_cardio: false,
                        },
                    )?
                }
            };
            set_cardio_flag(conn, id, is_cardio)?;
            exercise_ids.insert(name, id);
        }

        let total_sessions = plan.sessions.len();
        let interval = self.settings.progress_interval.max(1);
        let mut next_session = latest_session_number(conn)? + 1;
        let mut bests: HashMap<i64, PersonalBests> = HashMap::new();
        let mut loaded: HashSet<i64> = HashSet::new();

        for (processed, (time, session)) in plan.sessions.iter().enumerate() {
            let draft = WorkoutDraft {
                title: session.title.clone(),
                time: *time,
                duration_minutes: session.duration_minutes.unwrap_or(0),
                exercises: session
                    .exercises
                    .iter()
                    .map(|exercise| ExerciseDraft {
                        exercise_id: exercise_ids[&exercise.name],
                        notes: exercise.notes.clone(),
                        sets: exercise.sets.clone(),
                    })
                    .collect(),
            };

            let entries = build_entries(&draft, next_session, &mut bests, |exercise_id| {
                loaded.insert(exercise_id);
                load_bests(conn, exercise_id, None, None)
            })?;
            if !entries.is_empty() {
                let written = write_entries(conn, None, &entries, &draft.title, draft.duration_minutes)?;
                debug!(session = next_session, time = %time, sets = written, "Imported session");
                summary.sets_imported += written;
                summary.sessions_imported += 1;
                summary.first_session.get_or_insert(next_session);
                summary.last_session = Some(next_session);
                next_session += 1;
            }

            let processed = processed + 1;
            if processed % interval == 0 || processed == total_sessions {
                on_progress(ImportProgress::Importing {
                    sessions_processed: processed,
                    total_sessions,
                    sets_imported: summary.sets_imported,
                });
            }
        }
        debug!(exercises = loaded.len(), "Seeded bests from stored history");

        for (datetime, weight) in &plan.body_weights {
            upsert_body_weight(conn, *datetime, *weight)?;
            summary.body_weight_entries += 1;
        }

        Ok(summary)
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::new(ImportSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SetType;

    const HEADER: &str = "Date,Workout Name,Exercise Name,Set Order,Weight (kg),Reps,Distance (meters),Seconds,Notes";

    fn plan_of(lines: &[&str]) -> ImportPlan {
        let text = format!("{}\n{}\n", HEADER, lines.join("\n"));
        Importer::default().plan(super::csv::parse_rows(&text).unwrap())
    }

    #[test]
    fn test_plan_groups_by_timestamp_and_exercise() {
        let plan = plan_of(&[
            "2024-03-02 10:00:00,Legs,Squat (Barbell),1,100,5,,,",
            "2024-03-01 10:00:00,Push,Bench Press (Barbell),1,80,5,,,",
            "2024-03-02 10:00:00,Legs,Leg Press,1,200,10,,,",
            "2024-03-02 10:00:00,Legs,Squat (Barbell),2,100,5,,,",
        ]);

        let sessions: Vec<&SessionGroup> = plan.sessions.values().collect();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].title, "Push");
        let legs: Vec<(&str, usize)> = sessions[1]
            .exercises
            .iter()
            .map(|e| (e.name.as_str(), e.sets.len()))
            .collect();
        assert_eq!(legs, vec![("Squat (Barbell)", 2), ("Leg Press", 1)]);
    }

    #[test]
    fn test_plan_routes_special_rows() {
        let plan = plan_of(&[
            "2024-03-01 07:00:00,,Body Weight,1,81.5,,,,",
            "2024-03-01 10:00:00,Push,Dip,Note,,,,,lean forward",
            "2024-03-01 10:00:00,Push,Dip,Rest Timer,,,,90,",
            "2024-03-01 10:00:00,Push,Dip,W,0,5,,,",
            "2024-03-01 10:00:00,Push,Dip,1,10,8,,,",
        ]);

        assert_eq!(plan.body_weights.len(), 1);
        let session = plan.sessions.values().next().unwrap();
        let dip = &session.exercises[0];
        assert_eq!(dip.notes.as_deref(), Some("lean forward"));
        assert_eq!(dip.sets.len(), 2);
        assert_eq!(dip.sets[0].set_type, SetType::Warmup);
    }

    #[test]
    fn test_own_notes_win_over_note_row() {
        let plan = plan_of(&[
            "2024-03-01 10:00:00,Push,Dip,Note,,,,,from note row",
            "2024-03-01 10:00:00,Push,Dip,1,10,8,,,from the set",
        ]);
        let session = plan.sessions.values().next().unwrap();
        assert_eq!(session.exercises[0].notes.as_deref(), Some("from the set"));
    }

    #[test]
    fn test_cardio_names_are_tracked() {
        let plan = plan_of(&[
            "2024-03-01 10:00:00,Mixed,Rowing (Machine),1,,,2000,480,",
            "2024-03-01 10:00:00,Mixed,Dip,1,10,8,0,0,",
        ]);
        assert_eq!(
            plan.exercise_names(),
            vec![("Rowing (Machine)".to_string(), true), ("Dip".to_string(), false)]
        );
    }

    #[test]
    fn test_store_failure_rolls_back_whole_import() {
        let mut db = Database::in_memory().unwrap();
        db.conn()
            .execute_batch(
                "CREATE TRIGGER fail_second_session BEFORE INSERT ON workoutHistory
                 WHEN NEW.workoutSession = 2
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let text = format!(
            "{}\n{}\n",
            HEADER,
            [
                "2024-03-01 07:00:00,,Body Weight,1,81.5,,,,",
                "2024-03-01 10:00:00,Push,Landmine Press,1,40,8,,,",
                "2024-03-02 10:00:00,Legs,Squat (Barbell),1,100,5,,,",
            ]
            .join("\n")
        );
        let err = Importer::default().import(&mut db, &text, |_| {}).unwrap_err();
        assert!(
            matches!(
                err,
                crate::error::LiftLogError::Database(DatabaseError::TransactionFailure { .. })
            ),
            "got {:?}",
            err
        );

        // The first session, the new exercise and the body weight all went with it
        assert_eq!(db.latest_session_number().unwrap(), 0);
        assert!(db.exercise_by_name("Landmine Press").unwrap().is_none());
        assert!(db.body_weight_entries().unwrap().is_empty());
    }
}
