use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::database::{set_record_from_row, Database, SET_RECORD_SELECT};
use crate::error::{DatabaseError, ImportExportError, Result};
use crate::models::{format_time, BodyWeightEntry, SetRecord};

pub mod csv;

/// Date range filter for exports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    /// Check if a date falls within this range
    pub fn contains(&self, date: &NaiveDate) -> bool {
        let after_start = self.start.map_or(true, |start| date >= &start);
        let before_end = self.end.map_or(true, |end| date <= &end);
        after_start && before_end
    }

    /// Inclusive lower and exclusive upper timestamp bounds; `end` covers its whole day
    fn bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let lower = self.start.map(|d| d.and_time(NaiveTime::MIN));
        let upper = self
            .end
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(|d| d.and_time(NaiveTime::MIN));
        (lower, upper)
    }
}

/// Export configuration options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    pub date_range: DateRange,
    /// Append body-weight entries as `Body Weight` rows
    pub include_body_weight: bool,
}

/// Render the ledger (and optionally the body-weight log) as CSV in the import
/// format, ordered by time, exercise number and set number
pub fn export_csv(db: &Database, options: &ExportOptions) -> Result<String> {
    let sets = sets_in_range(db, &options.date_range)?;
    let body_weights: Vec<BodyWeightEntry> = if options.include_body_weight {
        db.body_weight_entries()?
            .into_iter()
            .filter(|entry| options.date_range.contains(&entry.datetime.date()))
            .collect()
    } else {
        Vec::new()
    };

    let mut writer = ::csv::Writer::from_writer(Vec::new());
    csv::write_header(&mut writer)?;
    csv::write_sets(&mut writer, &sets)?;
    csv::write_body_weights(&mut writer, &body_weights)?;

    let bytes = writer.into_inner().map_err(|e| ImportExportError::ExportFailed {
        reason: e.to_string(),
    })?;
    let text = String::from_utf8(bytes).map_err(|e| ImportExportError::ExportFailed {
        reason: e.to_string(),
    })?;

    info!(sets = sets.len(), body_weight_entries = body_weights.len(), "Exported CSV");
    Ok(text)
}

/// Write [`export_csv`] output to a file; returns the number of bytes written
pub fn export_to_file<P: AsRef<Path>>(db: &Database, options: &ExportOptions, path: P) -> Result<usize> {
    let text = export_csv(db, options)?;
    std::fs::write(path.as_ref(), &text).map_err(ImportExportError::Io)?;
    info!(path = %path.as_ref().display(), bytes = text.len(), "Wrote export file");
    Ok(text.len())
}

fn sets_in_range(db: &Database, range: &DateRange) -> std::result::Result<Vec<SetRecord>, DatabaseError> {
    let (lower, upper) = range.bounds();
    let sql = format!(
        "{} WHERE (?1 IS NULL OR h.time >= ?1) AND (?2 IS NULL OR h.time < ?2)
         ORDER BY h.time, h.workoutSession, h.exerciseNum, h.setNum, h.rowid",
        SET_RECORD_SELECT
    );
    let mut stmt = db.conn().prepare(&sql)?;
    let records = stmt
        .query_map(
            params![lower.map(|t| format_time(&t)), upper.map(|t| format_time(&t))],
            set_record_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_bounds_cover_end_day() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), NaiveDate::from_ymd_opt(2024, 1, 31));
        let (lower, upper) = range.bounds();
        assert_eq!(format_time(&lower.unwrap()), "2024-01-01T00:00:00");
        assert_eq!(format_time(&upper.unwrap()), "2024-02-01T00:00:00");
        assert!(range.contains(&NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!range.contains(&NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    }

    #[test]
    fn test_empty_ledger_exports_header_only() {
        let db = Database::in_memory().unwrap();
        let text = export_csv(&db, &ExportOptions::default()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("Date,Workout Name,Duration,Exercise Name"));
    }
}
