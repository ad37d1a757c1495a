//! Saved workout templates.
//!
//! The exercise list is stored as a JSON document in `workoutTemplates.data`;
//! only the name and creation time are real columns.

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use crate::database::{time_from_row, Database};
use crate::error::DatabaseError;
use crate::models::{format_time, SetType, Template, TemplateExercise, TemplateSet};

impl Database {
    pub fn create_template(
        &self,
        name: &str,
        exercises: &[TemplateExercise],
    ) -> Result<i64, DatabaseError> {
        let data = serde_json::to_string(exercises)?;
        let created_at = Local::now().naive_local();
        self.conn().execute(
            "INSERT INTO workoutTemplates (name, data, createdAt) VALUES (?1, ?2, ?3)",
            params![name.trim(), data, format_time(&created_at)],
        )?;
        let id = self.conn().last_insert_rowid();
        info!(id, name, exercises = exercises.len(), "Created template");
        Ok(id)
    }

    /// Templates ordered by name
    pub fn list_templates(&self) -> Result<Vec<Template>, DatabaseError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, data, createdAt FROM workoutTemplates ORDER BY name COLLATE NOCASE, id",
        )?;
        let rows = stmt
            .query_map([], raw_template)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawTemplate::decode).collect()
    }

    pub fn template(&self, id: i64) -> Result<Template, DatabaseError> {
        self.conn()
            .query_row(
                "SELECT id, name, data, createdAt FROM workoutTemplates WHERE id = ?1",
                params![id],
                raw_template,
            )
            .optional()?
            .ok_or_else(|| DatabaseError::NotFound {
                table: "workoutTemplates".to_string(),
                id: id.to_string(),
            })?
            .decode()
    }

    pub fn update_template(
        &self,
        id: i64,
        name: &str,
        exercises: &[TemplateExercise],
    ) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(exercises)?;
        let changed = self.conn().execute(
            "UPDATE workoutTemplates SET name = ?1, data = ?2 WHERE id = ?3",
            params![name.trim(), data, id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "workoutTemplates".to_string(),
                id: id.to_string(),
            });
        }
        debug!(id, name, "Updated template");
        Ok(())
    }

    pub fn delete_template(&self, id: i64) -> Result<bool, DatabaseError> {
        let removed = self
            .conn()
            .execute("DELETE FROM workoutTemplates WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Save the shape of a logged session as a template. Weights and reps are
    /// kept as suggestions; warmups and drops keep their type.
    pub fn template_from_session(&self, session_number: i64, name: &str) -> Result<i64, DatabaseError> {
        let session = self
            .session(session_number)?
            .ok_or_else(|| DatabaseError::NotFound {
                table: "workoutHistory".to_string(),
                id: session_number.to_string(),
            })?;

        let exercises: Vec<TemplateExercise> = session
            .exercises
            .iter()
            .map(|exercise| TemplateExercise {
                exercise_id: exercise.exercise_id,
                notes: exercise.notes.clone(),
                sets: exercise
                    .sets
                    .iter()
                    .map(|set| TemplateSet {
                        set_type: set.set_type,
                        weight: set.weight,
                        reps: set.reps,
                        distance: set.distance,
                        seconds: set.seconds,
                    })
                    .collect(),
            })
            .collect();

        self.create_template(name, &exercises)
    }
}

struct RawTemplate {
    id: i64,
    name: String,
    data: String,
    created_at: Option<NaiveDateTime>,
}

impl RawTemplate {
    fn decode(self) -> Result<Template, DatabaseError> {
        let exercises: Vec<TemplateExercise> = serde_json::from_str(&self.data)?;
        Ok(Template {
            id: self.id,
            name: self.name,
            exercises,
            // Rows from before createdAt existed sort as the epoch
            created_at: self.created_at.unwrap_or_default(),
        })
    }
}

fn raw_template(row: &Row) -> rusqlite::Result<RawTemplate> {
    let created_at = match row.get::<_, Option<String>>(3)? {
        Some(_) => Some(time_from_row(row, 3)?),
        None => None,
    };
    Ok(RawTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        data: row.get(2)?,
        created_at,
    })
}

impl TemplateSet {
    pub fn strength(weight: f64, reps: i64) -> Self {
        Self {
            weight: Some(weight),
            reps: Some(reps),
            ..Default::default()
        }
    }

    pub fn warmup(weight: f64, reps: i64) -> Self {
        Self {
            set_type: SetType::Warmup,
            ..Self::strength(weight, reps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_day(db: &Database) -> Vec<TemplateExercise> {
        let bench = db.exercise_by_name("Bench Press (Barbell)").unwrap().unwrap();
        vec![TemplateExercise {
            exercise_id: bench.id,
            notes: Some("pause reps".to_string()),
            sets: vec![TemplateSet::warmup(40.0, 10), TemplateSet::strength(80.0, 5)],
        }]
    }

    #[test]
    fn test_template_crud() {
        let db = Database::in_memory().unwrap();
        let exercises = push_day(&db);

        let id = db.create_template("Push Day", &exercises).unwrap();
        let stored = db.template(id).unwrap();
        assert_eq!(stored.name, "Push Day");
        assert_eq!(stored.exercises, exercises);

        db.update_template(id, "Push A", &exercises[..0]).unwrap();
        let renamed = db.template(id).unwrap();
        assert_eq!(renamed.name, "Push A");
        assert!(renamed.exercises.is_empty());

        assert_eq!(db.list_templates().unwrap().len(), 1);
        assert!(db.delete_template(id).unwrap());
        assert!(!db.delete_template(id).unwrap());
        assert!(matches!(db.template(id), Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn test_corrupt_template_data_is_serialization_error() {
        let db = Database::in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO workoutTemplates (name, data) VALUES ('Broken', 'not json')",
                [],
            )
            .unwrap();
        let id = db.conn().last_insert_rowid();
        assert!(matches!(db.template(id), Err(DatabaseError::Serialization(_))));
    }
}
