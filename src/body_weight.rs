//! Body-weight log, one weight per timestamp.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::database::{time_from_row, Database};
use crate::error::DatabaseError;
use crate::models::{format_time, BodyWeightEntry};

impl Database {
    /// Record a weight; an existing entry at the same time is replaced
    pub fn log_body_weight(&self, datetime: NaiveDateTime, weight: f64) -> Result<(), DatabaseError> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(DatabaseError::InvalidValue(format!(
                "body weight must be positive, got {}",
                weight
            )));
        }
        upsert_body_weight(self.conn(), datetime, weight)
    }

    /// All entries, oldest first
    pub fn body_weight_entries(&self) -> Result<Vec<BodyWeightEntry>, DatabaseError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, datetime, weight FROM bodyWeight ORDER BY datetime, id")?;
        let entries = stmt
            .query_map([], body_weight_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries within `[from, to]`, oldest first
    pub fn body_weight_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<BodyWeightEntry>, DatabaseError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, datetime, weight FROM bodyWeight
             WHERE datetime >= ?1 AND datetime <= ?2 ORDER BY datetime, id",
        )?;
        let entries = stmt
            .query_map(
                params![format_time(&from), format_time(&to)],
                body_weight_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn latest_body_weight(&self) -> Result<Option<BodyWeightEntry>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, datetime, weight FROM bodyWeight ORDER BY datetime DESC, id DESC LIMIT 1",
                [],
                body_weight_from_row,
            )
            .optional()?)
    }

    pub fn delete_body_weight(&self, id: i64) -> Result<bool, DatabaseError> {
        let removed = self
            .conn()
            .execute("DELETE FROM bodyWeight WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

pub(crate) fn upsert_body_weight(
    conn: &Connection,
    datetime: NaiveDateTime,
    weight: f64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO bodyWeight (datetime, weight) VALUES (?1, ?2)
         ON CONFLICT(datetime) DO UPDATE SET weight = excluded.weight",
        params![format_time(&datetime), weight],
    )?;
    debug!(datetime = %datetime, weight, "Logged body weight");
    Ok(())
}

fn body_weight_from_row(row: &Row) -> rusqlite::Result<BodyWeightEntry> {
    Ok(BodyWeightEntry {
        id: row.get(0)?,
        datetime: time_from_row(row, 1)?,
        weight: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn morning(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, day)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_same_timestamp_replaces_weight() {
        let db = Database::in_memory().unwrap();
        db.log_body_weight(morning(1), 82.4).unwrap();
        db.log_body_weight(morning(1), 82.1).unwrap();
        db.log_body_weight(morning(3), 81.9).unwrap();

        let entries = db.body_weight_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].weight, 82.1);

        let latest = db.latest_body_weight().unwrap().unwrap();
        assert_eq!(latest.datetime, morning(3));

        let range = db.body_weight_between(morning(2), morning(5)).unwrap();
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(
            db.log_body_weight(morning(1), 0.0),
            Err(DatabaseError::InvalidValue(_))
        ));
        assert!(db.log_body_weight(morning(1), f64::NAN).is_err());
        assert!(db.latest_body_weight().unwrap().is_none());
    }

    #[test]
    fn test_delete_body_weight() {
        let db = Database::in_memory().unwrap();
        db.log_body_weight(morning(4), 80.0).unwrap();
        let id = db.body_weight_entries().unwrap()[0].id;
        assert!(db.delete_body_weight(id).unwrap());
        assert!(!db.delete_body_weight(id).unwrap());
    }
}
