use chrono::{Duration, Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::models::{
    format_time, join_muscles, parse_time, split_muscles, Exercise, MuscleUsage, NewExercise,
    PersonalRecords, PrFlags, RecordMark, SetRecord, SetType,
};
use crate::records::{one_rep_max, PersonalBests};
use crate::schema::{self, SchemaReport};

/// Column list shared by every query that yields a [`SetRecord`]
pub(crate) const SET_RECORD_SELECT: &str = r#"
    SELECT h.workoutSession, h.exerciseNum, h.setNum, h.exerciseID, e.name AS exerciseName,
           h.setType, h.weight, h.reps, h.distance, h.seconds, h.oneRM, h.time,
           h.name AS title, h.duration, h.notes, h.is1rmPR, h.isVolumePR, h.isWeightPR
    FROM workoutHistory h
    JOIN exercises e ON e.exerciseID = h.exerciseID
"#;

/// Owner of the single SQLite connection
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path.as_ref())?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(path = %db_path.as_ref().display(), journal_mode = %mode, "Opened database");
        Self::from_connection(conn)
    }

    /// Private database, used by tests and dry runs
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self { conn };
        let report = db.ensure_schema()?;
        if !report.is_noop() {
            info!(
                columns_added = report.columns_added.len(),
                exercises_seeded = report.exercises_seeded,
                "Schema updated"
            );
        }
        Ok(db)
    }

    /// Idempotent schema bootstrap; safe to call again at any time
    pub fn ensure_schema(&self) -> Result<SchemaReport, DatabaseError> {
        schema::ensure_schema(&self.conn)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // Exercises

    pub fn list_exercises(&self) -> Result<Vec<Exercise>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT exerciseID, name, targetMuscle, accessoryMuscles, isCardio
             FROM exercises ORDER BY name COLLATE NOCASE",
        )?;
        let exercises = stmt
            .query_map([], exercise_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(exercises)
    }

    pub fn exercise(&self, exercise_id: i64) -> Result<Exercise, DatabaseError> {
        self.conn
            .query_row(
                "SELECT exerciseID, name, targetMuscle, accessoryMuscles, isCardio
                 FROM exercises WHERE exerciseID = ?1",
                params![exercise_id],
                exercise_from_row,
            )
            .optional()?
            .ok_or_else(|| DatabaseError::NotFound {
                table: "exercises".to_string(),
                id: exercise_id.to_string(),
            })
    }

    pub fn exercise_by_name(&self, name: &str) -> Result<Option<Exercise>, DatabaseError> {
        find_exercise_by_name(&self.conn, name)
    }

    /// Insert a new exercise; a taken name is a `ConstraintViolation`
    pub fn create_exercise(&self, exercise: &NewExercise) -> Result<Exercise, DatabaseError> {
        let id = insert_exercise(&self.conn, exercise)?;
        self.exercise(id)
    }

    /// Rename or re-tag an existing exercise
    pub fn update_exercise(
        &self,
        exercise_id: i64,
        exercise: &NewExercise,
    ) -> Result<Exercise, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE exercises SET name = ?1, targetMuscle = ?2, accessoryMuscles = ?3, isCardio = ?4
             WHERE exerciseID = ?5",
            params![
                exercise.name.trim(),
                join_muscles(&exercise.target_muscles),
                join_muscles(&exercise.accessory_muscles),
                exercise.is_cardio,
                exercise_id,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "exercises".to_string(),
                id: exercise_id.to_string(),
            });
        }
        self.exercise(exercise_id)
    }

    /// Insert by name, or update the tags of the exercise already holding that name
    pub fn upsert_exercise(
        &self,
        name: &str,
        target_muscles: &[String],
        accessory_muscles: &[String],
        is_cardio: bool,
    ) -> Result<Exercise, DatabaseError> {
        let exercise = NewExercise {
            name: name.trim().to_string(),
            target_muscles: target_muscles.to_vec(),
            accessory_muscles: accessory_muscles.to_vec(),
            is_cardio,
        };
        match self.exercise_by_name(&exercise.name)? {
            Some(existing) => self.update_exercise(existing.id, &exercise),
            None => self.create_exercise(&exercise),
        }
    }

    // History

    /// Every stored set of an exercise, newest session first
    pub fn fetch_history(&self, exercise_id: i64) -> Result<Vec<SetRecord>, DatabaseError> {
        let sql = format!(
            "{} WHERE h.exerciseID = ?1
             ORDER BY h.time DESC, h.workoutSession DESC, h.exerciseNum, h.setNum, h.rowid",
            SET_RECORD_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![exercise_id], set_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All-time best marks for an exercise, with the set that holds each one
    pub fn personal_records(&self, exercise_id: i64) -> Result<PersonalRecords, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT weight, reps, time, workoutSession FROM workoutHistory
             WHERE exerciseID = ?1 AND weight IS NOT NULL AND reps IS NOT NULL
             ORDER BY time, workoutSession, exerciseNum, setNum, rowid",
        )?;
        let rows = stmt.query_map(params![exercise_id], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, i64>(1)?,
                time_from_row(row, 2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut records = PersonalRecords {
            exercise_id,
            ..Default::default()
        };
        let mut bests = PersonalBests::default();
        for row in rows {
            let (weight, reps, time, workout_session) = row?;
            let mark = |value: f64| RecordMark {
                value,
                weight,
                reps,
                time,
                workout_session,
            };

            let one_rm = one_rep_max(weight, reps);
            if one_rm > bests.max_one_rm {
                records.best_one_rm = Some(mark(one_rm));
            }
            if reps > 0 && weight * reps as f64 > bests.max_volume {
                records.best_volume = Some(mark(weight * reps as f64));
            }
            if bests.beats_weight(weight, reps) {
                records.best_weight = Some(mark(weight));
            }
            bests.absorb(weight, reps);
        }

        Ok(records)
    }

    /// Sets per muscle over the last `days` days
    pub fn recent_muscle_usage(&self, days: i64) -> Result<Vec<MuscleUsage>, DatabaseError> {
        let since = Local::now().naive_local() - Duration::days(days);
        self.recent_muscle_usage_since(since)
    }

    /// Sets per muscle since a point in time; warmups don't count
    pub fn recent_muscle_usage_since(
        &self,
        since: NaiveDateTime,
    ) -> Result<Vec<MuscleUsage>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.targetMuscle, e.accessoryMuscles FROM workoutHistory h
             JOIN exercises e ON e.exerciseID = h.exerciseID
             WHERE h.time >= ?1 AND h.setType != 'warmup'",
        )?;
        let rows = stmt.query_map(params![format_time(&since)], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })?;

        let mut usage: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for row in rows {
            let (targets, accessories) = row?;
            for muscle in split_muscles(targets.as_deref().unwrap_or_default()) {
                usage.entry(muscle).or_default().0 += 1;
            }
            for muscle in split_muscles(accessories.as_deref().unwrap_or_default()) {
                usage.entry(muscle).or_default().1 += 1;
            }
        }

        let mut result: Vec<MuscleUsage> = usage
            .into_iter()
            .map(|(muscle, (target_sets, accessory_sets))| MuscleUsage {
                muscle,
                target_sets,
                accessory_sets,
            })
            .collect();
        result.sort_by(|a, b| {
            b.target_sets
                .cmp(&a.target_sets)
                .then(b.accessory_sets.cmp(&a.accessory_sets))
                .then(a.muscle.cmp(&b.muscle))
        });
        Ok(result)
    }
}

pub(crate) fn find_exercise_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<Exercise>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT exerciseID, name, targetMuscle, accessoryMuscles, isCardio
             FROM exercises WHERE name = ?1",
            params![name.trim()],
            exercise_from_row,
        )
        .optional()?)
}

pub(crate) fn insert_exercise(conn: &Connection, exercise: &NewExercise) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO exercises (name, targetMuscle, accessoryMuscles, isCardio)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            exercise.name.trim(),
            join_muscles(&exercise.target_muscles),
            join_muscles(&exercise.accessory_muscles),
            exercise.is_cardio,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn set_cardio_flag(
    conn: &Connection,
    exercise_id: i64,
    is_cardio: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE exercises SET isCardio = ?1 WHERE exerciseID = ?2",
        params![is_cardio, exercise_id],
    )?;
    Ok(())
}

/// Bests from stored history, optionally limited to sets before `before` and
/// skipping one session (the one being rewritten).
pub(crate) fn load_bests(
    conn: &Connection,
    exercise_id: i64,
    before: Option<NaiveDateTime>,
    exclude_session: Option<i64>,
) -> Result<PersonalBests, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT weight, reps FROM workoutHistory
         WHERE exerciseID = ?1 AND weight IS NOT NULL AND reps IS NOT NULL
           AND (?2 IS NULL OR time < ?2)
           AND (?3 IS NULL OR workoutSession != ?3)",
    )?;
    let rows = stmt.query_map(
        params![exercise_id, before.map(|t| format_time(&t)), exclude_session],
        |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let mut bests = PersonalBests::default();
    for row in rows {
        let (weight, reps) = row?;
        bests.absorb(weight, reps);
    }
    Ok(bests)
}

fn exercise_from_row(row: &Row) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: row.get(0)?,
        name: row.get(1)?,
        target_muscles: split_muscles(&row.get::<_, Option<String>>(2)?.unwrap_or_default()),
        accessory_muscles: split_muscles(&row.get::<_, Option<String>>(3)?.unwrap_or_default()),
        is_cardio: row.get(4)?,
    })
}

pub(crate) fn time_from_row(row: &Row, index: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(index)?;
    parse_time(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{}'", text).into(),
        )
    })
}

/// Map a row selected with [`SET_RECORD_SELECT`]
pub(crate) fn set_record_from_row(row: &Row) -> rusqlite::Result<SetRecord> {
    Ok(SetRecord {
        workout_session: row.get("workoutSession")?,
        exercise_num: row.get("exerciseNum")?,
        set_num: row.get("setNum")?,
        exercise_id: row.get("exerciseID")?,
        exercise_name: row.get("exerciseName")?,
        set_type: SetType::from_db(row.get::<_, Option<String>>("setType")?.as_deref()),
        weight: row.get("weight")?,
        reps: row.get("reps")?,
        distance: row.get("distance")?,
        seconds: row.get("seconds")?,
        one_rm: row.get("oneRM")?,
        time: time_from_row(row, 11)?,
        title: row.get::<_, Option<String>>("title")?.unwrap_or_default(),
        duration_minutes: row.get("duration")?,
        notes: row.get("notes")?,
        flags: PrFlags {
            one_rm: row.get("is1rmPR")?,
            volume: row.get("isVolumePR")?,
            weight: row.get("isWeightPR")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database_is_seeded() {
        let db = Database::in_memory().unwrap();
        let exercises = db.list_exercises().unwrap();
        assert!(!exercises.is_empty());
        assert!(db.exercise_by_name("Running").unwrap().unwrap().is_cardio);
    }

    #[test]
    fn test_duplicate_exercise_name_is_constraint_violation() {
        let db = Database::in_memory().unwrap();
        let new = NewExercise {
            name: "Zercher Squat".to_string(),
            target_muscles: vec!["Quadriceps".to_string()],
            accessory_muscles: vec![],
            is_cardio: false,
        };
        db.create_exercise(&new).unwrap();

        let err = db.create_exercise(&new).unwrap_err();
        assert!(err.is_constraint_violation(), "got {:?}", err);
    }

    #[test]
    fn test_rename_onto_taken_name_is_rejected() {
        let db = Database::in_memory().unwrap();
        let squat = db.exercise_by_name("Squat (Barbell)").unwrap().unwrap();
        let rename = NewExercise {
            name: "Deadlift (Barbell)".to_string(),
            target_muscles: squat.target_muscles.clone(),
            accessory_muscles: vec![],
            is_cardio: false,
        };
        let err = db.update_exercise(squat.id, &rename).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_upsert_exercise_updates_in_place() {
        let db = Database::in_memory().unwrap();
        let created = db
            .upsert_exercise("Sled Push", &["Quadriceps".to_string()], &[], false)
            .unwrap();
        let updated = db
            .upsert_exercise(
                "Sled Push",
                &["Quadriceps".to_string()],
                &["Glutes".to_string()],
                true,
            )
            .unwrap();
        assert_eq!(created.id, updated.id);
        assert!(updated.is_cardio);
        assert_eq!(updated.accessory_muscles, vec!["Glutes"]);
    }

    #[test]
    fn test_update_missing_exercise_is_not_found() {
        let db = Database::in_memory().unwrap();
        let new = NewExercise {
            name: "Ghost".to_string(),
            target_muscles: vec![],
            accessory_muscles: vec![],
            is_cardio: false,
        };
        assert!(matches!(
            db.update_exercise(99_999, &new),
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
