//! Table definitions, additive column migrations and the seed exercise catalog.
//!
//! `ensure_schema` runs on every startup. Tables are created with their original
//! columns; everything added later goes through the column migration list, which
//! only ever adds what is missing.

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::models::{join_muscles, NewExercise};

const SEED_CATALOG: &str = include_str!("../data/exercises.json");

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS exercises (
    exerciseID INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    targetMuscle TEXT
);

CREATE TABLE IF NOT EXISTS workoutHistory (
    workoutSession INTEGER NOT NULL,
    exerciseNum INTEGER NOT NULL,
    setNum INTEGER NOT NULL,
    exerciseID INTEGER NOT NULL REFERENCES exercises (exerciseID),
    weight REAL,
    reps INTEGER,
    oneRM REAL,
    time TEXT NOT NULL,
    name TEXT,
    pr INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS workoutTemplates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bodyWeight (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    datetime TEXT NOT NULL UNIQUE,
    weight REAL NOT NULL
);
"#;

const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_history_session ON workoutHistory (workoutSession);
CREATE INDEX IF NOT EXISTS idx_history_exercise_time ON workoutHistory (exerciseID, time);
CREATE INDEX IF NOT EXISTS idx_history_time ON workoutHistory (time);
"#;

/// A column added after the table's first release
struct ColumnMigration {
    table: &'static str,
    column: &'static str,
    definition: &'static str,
}

const COLUMN_MIGRATIONS: &[ColumnMigration] = &[
    ColumnMigration { table: "exercises", column: "accessoryMuscles", definition: "TEXT" },
    ColumnMigration { table: "exercises", column: "isCardio", definition: "INTEGER NOT NULL DEFAULT 0" },
    ColumnMigration { table: "workoutHistory", column: "duration", definition: "INTEGER NOT NULL DEFAULT 0" },
    ColumnMigration { table: "workoutHistory", column: "setType", definition: "TEXT NOT NULL DEFAULT 'normal'" },
    ColumnMigration { table: "workoutHistory", column: "notes", definition: "TEXT" },
    ColumnMigration { table: "workoutHistory", column: "is1rmPR", definition: "INTEGER NOT NULL DEFAULT 0" },
    ColumnMigration { table: "workoutHistory", column: "isVolumePR", definition: "INTEGER NOT NULL DEFAULT 0" },
    ColumnMigration { table: "workoutHistory", column: "isWeightPR", definition: "INTEGER NOT NULL DEFAULT 0" },
    ColumnMigration { table: "workoutHistory", column: "distance", definition: "REAL" },
    ColumnMigration { table: "workoutHistory", column: "seconds", definition: "INTEGER" },
    ColumnMigration { table: "workoutTemplates", column: "createdAt", definition: "TEXT" },
];

/// What a call to [`ensure_schema`] changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaReport {
    /// `table.column` for every column added
    pub columns_added: Vec<String>,
    pub exercises_seeded: usize,
}

impl SchemaReport {
    pub fn is_noop(&self) -> bool {
        self.columns_added.is_empty() && self.exercises_seeded == 0
    }
}

/// Create missing tables, add missing columns and seed an empty catalog
pub fn ensure_schema(conn: &Connection) -> Result<SchemaReport, DatabaseError> {
    conn.execute_batch(CREATE_TABLES)?;

    let mut report = SchemaReport::default();
    for migration in COLUMN_MIGRATIONS {
        if column_exists(conn, migration.table, migration.column)? {
            debug!(table = migration.table, column = migration.column, "Column present, skipping");
            continue;
        }

        info!(table = migration.table, column = migration.column, "Adding column");
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                migration.table, migration.column, migration.definition
            ),
            [],
        )?;
        report
            .columns_added
            .push(format!("{}.{}", migration.table, migration.column));
    }

    conn.execute_batch(CREATE_INDEXES)?;

    report.exercises_seeded = seed_exercises(conn)?;
    Ok(report)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name.eq_ignore_ascii_case(column)))
}

/// Bundled exercise catalog
pub fn seed_catalog() -> Result<Vec<NewExercise>, DatabaseError> {
    Ok(serde_json::from_str(SEED_CATALOG)?)
}

fn seed_exercises(conn: &Connection) -> Result<usize, DatabaseError> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM exercises", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }

    let catalog = seed_catalog()?;
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO exercises (name, targetMuscle, accessoryMuscles, isCardio)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for exercise in &catalog {
            stmt.execute(params![
                exercise.name,
                join_muscles(&exercise.target_muscles),
                join_muscles(&exercise.accessory_muscles),
                exercise.is_cardio,
            ])?;
        }
    }
    tx.commit()?;

    info!(count = catalog.len(), "Seeded exercise catalog");
    Ok(catalog.len())
}
