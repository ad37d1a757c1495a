//! Session ledger: writes, overwrites and reads of workout session rows.
//!
//! A session is every `workoutHistory` row sharing one `workoutSession` number.
//! Multi-row writes run in a single transaction so a failed write leaves the
//! previous state untouched.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::database::{set_record_from_row, time_from_row, Database, SET_RECORD_SELECT};
use crate::error::DatabaseError;
use crate::models::{format_time, PrFlags, SessionSummary, SetRecord, WorkoutEntry, WorkoutSession};
use crate::records::{LiftSet, PersonalBests, RecordTracker};

impl Database {
    /// Highest stored session number, or 0 for an empty ledger
    pub fn latest_session_number(&self) -> Result<i64, DatabaseError> {
        latest_session_number(self.conn())
    }

    /// Write a new session's rows. The session number comes from the entries.
    pub fn insert_session(
        &mut self,
        entries: &[WorkoutEntry],
        title: &str,
        duration_minutes: i64,
    ) -> Result<usize, DatabaseError> {
        let tx = self.conn_mut().transaction()?;
        let written = write_entries(&tx, None, entries, title, duration_minutes)
            .map_err(|e| DatabaseError::transaction("insert_session", e))?;
        tx.commit()
            .map_err(|e| DatabaseError::transaction("insert_session", e.into()))?;

        debug!(rows = written, title, "Inserted session");
        Ok(written)
    }

    /// Replace every row of `session_number` with `entries`, atomically
    pub fn overwrite_session(
        &mut self,
        session_number: i64,
        entries: &[WorkoutEntry],
        title: &str,
        duration_minutes: i64,
    ) -> Result<usize, DatabaseError> {
        let tx = self.conn_mut().transaction()?;
        let written = replace_rows(&tx, session_number, entries, title, duration_minutes)
            .map_err(|e| DatabaseError::transaction("overwrite_session", e))?;
        tx.commit()
            .map_err(|e| DatabaseError::transaction("overwrite_session", e.into()))?;

        info!(session = session_number, rows = written, "Overwrote session");
        Ok(written)
    }

    /// Remove a session; returns the number of rows deleted
    pub fn delete_session(&mut self, session_number: i64) -> Result<usize, DatabaseError> {
        let removed = delete_rows(self.conn(), session_number)?;
        info!(session = session_number, removed, "Deleted session");
        Ok(removed)
    }

    /// Flat rows of a session ordered by exercise number then set number
    pub fn fetch_by_session(&self, session_number: i64) -> Result<Vec<SetRecord>, DatabaseError> {
        let sql = format!(
            "{} WHERE h.workoutSession = ?1 ORDER BY h.exerciseNum, h.setNum, h.rowid",
            SET_RECORD_SELECT
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let records = stmt
            .query_map(params![session_number], set_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Grouped view of a session, `None` if it has no rows
    pub fn session(&self, session_number: i64) -> Result<Option<WorkoutSession>, DatabaseError> {
        Ok(WorkoutSession::from_records(self.fetch_by_session(session_number)?))
    }

    /// One summary line per session, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, DatabaseError> {
        let mut stmt = self.conn().prepare(
            "SELECT workoutSession, MIN(time), MAX(name), MAX(duration),
                    COUNT(DISTINCT exerciseNum), COUNT(*),
                    SUM(CASE WHEN is1rmPR = 1 OR isVolumePR = 1 OR isWeightPR = 1 THEN 1 ELSE 0 END)
             FROM workoutHistory
             GROUP BY workoutSession
             ORDER BY MIN(time) DESC, workoutSession DESC",
        )?;
        let sessions = stmt
            .query_map([], |row| {
                Ok(SessionSummary {
                    number: row.get(0)?,
                    time: time_from_row(row, 1)?,
                    title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    duration_minutes: row.get(3)?,
                    exercise_count: row.get(4)?,
                    set_count: row.get(5)?,
                    pr_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Replay the whole ledger in chronological order and rewrite every PR flag.
    ///
    /// Needed after editing or deleting an older session, since later sessions'
    /// flags were computed against the old history. Returns the rows whose flags
    /// changed.
    pub fn rebuild_records(&mut self) -> Result<usize, DatabaseError> {
        let tx = self.conn_mut().transaction()?;
        let changed = rebuild_flags(&tx).map_err(|e| DatabaseError::transaction("rebuild_records", e))?;
        tx.commit()
            .map_err(|e| DatabaseError::transaction("rebuild_records", e.into()))?;
        info!(changed, "Rebuilt personal records");
        Ok(changed)
    }
}

pub(crate) fn latest_session_number(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(workoutSession), 0) FROM workoutHistory",
        [],
        |row| row.get(0),
    )?)
}

fn session_has_rows(conn: &Connection, session_number: i64) -> Result<bool, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM workoutHistory WHERE workoutSession = ?1 LIMIT 1",
            params![session_number],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn delete_rows(conn: &Connection, session_number: i64) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM workoutHistory WHERE workoutSession = ?1",
        params![session_number],
    )?)
}

fn replace_rows(
    conn: &Connection,
    session_number: i64,
    entries: &[WorkoutEntry],
    title: &str,
    duration_minutes: i64,
) -> Result<usize, DatabaseError> {
    let removed = delete_rows(conn, session_number)?;
    debug!(session = session_number, removed, "Cleared session for overwrite");
    write_entries(conn, Some(session_number), entries, title, duration_minutes)
}

/// Insert the rows of one session on an open connection or transaction.
///
/// `session_number` overrides the entries' own numbers (used by overwrite).
/// Title and duration are stamped on every row.
pub(crate) fn write_entries(
    conn: &Connection,
    session_number: Option<i64>,
    entries: &[WorkoutEntry],
    title: &str,
    duration_minutes: i64,
) -> Result<usize, DatabaseError> {
    let Some(first) = entries.first() else {
        return Ok(0);
    };
    let session = session_number.unwrap_or(first.workout_session);
    if session <= 0 {
        return Err(DatabaseError::InvalidSession(format!(
            "session number must be positive, got {}",
            session
        )));
    }
    for entry in entries {
        if session_number.is_none() && entry.workout_session != session {
            return Err(DatabaseError::InvalidSession(format!(
                "entries span sessions {} and {}",
                session, entry.workout_session
            )));
        }
        if entry.time != first.time {
            return Err(DatabaseError::InvalidSession(format!(
                "entries of session {} have different times",
                session
            )));
        }
    }
    // A fresh write must not merge into rows with another time or title
    if session_number.is_none() && session_has_rows(conn, session)? {
        return Err(DatabaseError::InvalidSession(format!(
            "session {} already exists",
            session
        )));
    }

    let mut stmt = conn.prepare(
        "INSERT INTO workoutHistory (
            workoutSession, exerciseNum, setNum, exerciseID, weight, reps, oneRM, time, name, pr,
            duration, setType, notes, is1rmPR, isVolumePR, isWeightPR, distance, seconds
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
    )?;
    let time = format_time(&first.time);
    for entry in entries {
        stmt.execute(params![
            session,
            entry.exercise_num,
            entry.set_num,
            entry.exercise_id,
            entry.weight,
            entry.reps,
            entry.one_rm,
            time,
            title,
            entry.flags.one_rm,
            duration_minutes,
            entry.set_type.as_str(),
            entry.notes,
            entry.flags.one_rm,
            entry.flags.volume,
            entry.flags.weight,
            entry.distance,
            entry.seconds,
        ])?;
    }
    Ok(entries.len())
}

struct StoredSet {
    rowid: i64,
    session: i64,
    exercise_id: i64,
    weight: Option<f64>,
    reps: Option<i64>,
    flags: PrFlags,
}

fn rebuild_flags(conn: &Connection) -> Result<usize, DatabaseError> {
    let mut select = conn.prepare(
        "SELECT rowid, workoutSession, exerciseID, weight, reps, is1rmPR, isVolumePR, isWeightPR
         FROM workoutHistory
         ORDER BY time, workoutSession, exerciseNum, setNum, rowid",
    )?;
    let rows = select
        .query_map([], |row| {
            Ok(StoredSet {
                rowid: row.get(0)?,
                session: row.get(1)?,
                exercise_id: row.get(2)?,
                weight: row.get(3)?,
                reps: row.get(4)?,
                flags: PrFlags {
                    one_rm: row.get(5)?,
                    volume: row.get(6)?,
                    weight: row.get(7)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut bests: HashMap<i64, PersonalBests> = HashMap::new();
    let mut update = conn.prepare(
        "UPDATE workoutHistory SET pr = ?1, is1rmPR = ?1, isVolumePR = ?2, isWeightPR = ?3
         WHERE rowid = ?4",
    )?;
    let mut changed = 0;

    for session_rows in rows.chunk_by(|a, b| a.session == b.session) {
        let mut exercise_order: Vec<i64> = Vec::new();
        for row in session_rows {
            if !exercise_order.contains(&row.exercise_id) {
                exercise_order.push(row.exercise_id);
            }
        }

        for exercise_id in exercise_order {
            let sets: Vec<&StoredSet> = session_rows
                .iter()
                .filter(|r| r.exercise_id == exercise_id)
                .collect();
            let lifts: Vec<LiftSet> = sets
                .iter()
                .map(|r| LiftSet {
                    weight: r.weight,
                    reps: r.reps,
                    completed: true,
                })
                .collect();
            let history = bests.get(&exercise_id).copied().unwrap_or_default();
            let (flags, updated) = RecordTracker::compute_flags(&history, &lifts);
            bests.insert(exercise_id, updated);

            for (row, flag) in sets.iter().zip(flags) {
                if row.flags != flag {
                    update.execute(params![flag.one_rm, flag.volume, flag.weight, row.rowid])?;
                    changed += 1;
                }
            }
        }
    }

    Ok(changed)
}
