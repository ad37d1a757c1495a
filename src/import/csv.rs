use chrono::{NaiveDateTime, SubsecRound};
use csv::{ReaderBuilder, StringRecord};

use crate::error::ImportExportError;

/// One data row of a workout-tracker CSV export, with typed cells.
///
/// Cells are parsed but not interpreted; [`super::classify::classify_row`]
/// decides what the row means.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    /// 1-based line in the source text
    pub line: u64,
    pub date: NaiveDateTime,
    pub workout_name: String,
    pub exercise_name: String,
    pub set_order: String,
    pub weight: Option<f64>,
    pub reps: Option<i64>,
    /// Always meters
    pub distance: Option<f64>,
    pub seconds: Option<i64>,
    pub notes: Option<String>,
    pub duration_minutes: Option<i64>,
}

/// Positions of the known columns in the header
#[derive(Debug, Default)]
struct ColumnMap {
    date: Option<usize>,
    workout_name: Option<usize>,
    exercise_name: Option<usize>,
    set_order: Option<usize>,
    weight: Option<usize>,
    reps: Option<usize>,
    distance: Option<usize>,
    distance_in_km: bool,
    seconds: Option<usize>,
    notes: Option<usize>,
    duration: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, ImportExportError> {
        let mut map = ColumnMap::default();

        for (i, header) in headers.iter().enumerate() {
            let normalized = header.trim().trim_start_matches('\u{feff}').to_lowercase();
            match normalized.as_str() {
                "date" => map.date = Some(i),
                "workout name" => map.workout_name = Some(i),
                "exercise name" => map.exercise_name = Some(i),
                "set order" => map.set_order = Some(i),
                "reps" => map.reps = Some(i),
                "seconds" | "time" => map.seconds = Some(i),
                "notes" => map.notes = Some(i),
                "duration" => map.duration = Some(i),
                h if h.starts_with("weight") => map.weight = Some(i),
                h if h.contains("distance") || h.contains("meters") => {
                    map.distance = Some(i);
                    map.distance_in_km = h.contains("km");
                }
                _ => {}
            }
        }

        if map.date.is_none() {
            return Err(ImportExportError::MissingColumn {
                column: "Date".to_string(),
            });
        }
        if map.exercise_name.is_none() {
            return Err(ImportExportError::MissingColumn {
                column: "Exercise Name".to_string(),
            });
        }
        Ok(map)
    }
}

/// `;` when the header line has more semicolons than commas
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Parse the whole export. The first bad cell aborts with its line number.
pub fn parse_rows(text: &str) -> Result<Vec<CsvRow>, ImportExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(detect_delimiter(text))
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(parse_record(&record, &columns, line)?);
    }

    Ok(rows)
}

fn parse_record(
    record: &StringRecord,
    columns: &ColumnMap,
    line: u64,
) -> Result<CsvRow, ImportExportError> {
    let cell = |index: Option<usize>| -> Option<&str> {
        index
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let parse_error = |reason: String| ImportExportError::Parse { line, reason };

    let date_text = cell(columns.date).ok_or_else(|| parse_error("missing date".to_string()))?;
    let date = parse_datetime(date_text)
        .ok_or_else(|| parse_error(format!("unrecognized date '{}'", date_text)))?;

    let exercise_name = cell(columns.exercise_name)
        .ok_or_else(|| parse_error("missing exercise name".to_string()))?
        .to_string();

    let weight = cell(columns.weight)
        .map(|v| parse_number(v).ok_or_else(|| parse_error(format!("invalid weight '{}'", v))))
        .transpose()?;
    let reps = cell(columns.reps)
        .map(|v| parse_whole(v).ok_or_else(|| parse_error(format!("invalid reps '{}'", v))))
        .transpose()?;
    let distance = cell(columns.distance)
        .map(|v| parse_number(v).ok_or_else(|| parse_error(format!("invalid distance '{}'", v))))
        .transpose()?
        .map(|d| if columns.distance_in_km { d * 1000.0 } else { d });
    let seconds = cell(columns.seconds)
        .map(|v| parse_number(v).ok_or_else(|| parse_error(format!("invalid seconds '{}'", v))))
        .transpose()?
        .map(|s| s.round() as i64);
    let duration_minutes = cell(columns.duration)
        .map(|v| parse_duration(v).ok_or_else(|| parse_error(format!("invalid duration '{}'", v))))
        .transpose()?;

    Ok(CsvRow {
        line,
        date,
        workout_name: cell(columns.workout_name).unwrap_or_default().to_string(),
        exercise_name,
        set_order: cell(columns.set_order).unwrap_or_default().to_string(),
        weight,
        reps,
        distance,
        seconds,
        notes: cell(columns.notes).map(str::to_string),
        duration_minutes,
    })
}

/// Parse a timestamp cell. Fractional seconds are dropped, since stored times
/// have whole-second precision and sessions are grouped by timestamp.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|time| time.trunc_subsecs(0))
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whole numbers, also when written as `5.0`
fn parse_whole(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().or_else(|| {
        parse_number(value)
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

/// Session length in minutes from `1h 5m`, `45m`, `30s` or a bare number of minutes
pub fn parse_duration(value: &str) -> Option<i64> {
    if let Some(minutes) = parse_whole(value) {
        return Some(minutes);
    }

    let mut seconds = 0i64;
    let mut matched = false;
    for part in value.split_whitespace() {
        let (number, unit) = part.split_at(part.find(|c: char| c.is_ascii_alphabetic())?);
        let amount: i64 = number.parse().ok()?;
        let part_seconds = match unit.to_ascii_lowercase().as_str() {
            "h" => amount.checked_mul(3600)?,
            "m" | "min" => amount.checked_mul(60)?,
            "s" => amount,
            _ => return None,
        };
        seconds = seconds.checked_add(part_seconds)?;
        matched = true;
    }

    matched.then_some(seconds / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date,Workout Name,Duration,Exercise Name,Set Order,Weight (kg),Reps,Distance (meters),Seconds,Notes";

    #[test]
    fn test_parse_strength_and_cardio_rows() {
        let text = format!(
            "{}\n2024-01-05 18:00:00,Push,1h 5m,Bench Press (Barbell),1,80,5,,,\n2024-01-05 18:00:00,Push,1h 5m,Running,1,,,2000,600,easy\n",
            HEADER
        );
        let rows = parse_rows(&text).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].weight, Some(80.0));
        assert_eq!(rows[0].reps, Some(5));
        assert_eq!(rows[0].duration_minutes, Some(65));
        assert_eq!(rows[0].distance, None);

        assert_eq!(rows[1].distance, Some(2000.0));
        assert_eq!(rows[1].seconds, Some(600));
        assert_eq!(rows[1].notes.as_deref(), Some("easy"));
    }

    #[test]
    fn test_semicolon_delimiter_and_km_distance() {
        let text = "Date;Exercise Name;Set Order;Distance (km);Time\n2024-01-06T07:00:00;Cycling;1;12.5;1800\n";
        assert_eq!(detect_delimiter(text), b';');

        let rows = parse_rows(text).unwrap();
        assert_eq!(rows[0].distance, Some(12_500.0));
        assert_eq!(rows[0].seconds, Some(1800));
        assert_eq!(rows[0].workout_name, "");
    }

    #[test]
    fn test_bad_cell_reports_line() {
        let text = format!(
            "{}\n2024-01-05 18:00:00,Push,,Dip,1,0,10,,,\n2024-01-05 18:00:00,Push,,Dip,2,0,ten,,,\n",
            HEADER
        );
        match parse_rows(&text) {
            Err(ImportExportError::Parse { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("reps"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_column() {
        let err = parse_rows("Date,Reps\n2024-01-05 18:00:00,5\n").unwrap_err();
        assert!(matches!(err, ImportExportError::MissingColumn { column } if column == "Exercise Name"));
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2024-01-05 18:00:00").is_some());
        assert!(parse_datetime("2024-01-05T18:00:00.250").is_some());
        assert!(parse_datetime("2024-01-05 18:00").is_some());
        assert!(parse_datetime("05/01/2024").is_none());
    }

    #[test]
    fn test_parse_datetime_drops_fractional_seconds() {
        let early = parse_datetime("2024-01-05 10:00:00.250").unwrap();
        let late = parse_datetime("2024-01-05 10:00:00.750").unwrap();
        assert_eq!(early, late);
        assert_eq!(early, parse_datetime("2024-01-05 10:00:00").unwrap());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h 5m"), Some(65));
        assert_eq!(parse_duration("45m"), Some(45));
        assert_eq!(parse_duration("30s"), Some(0));
        assert_eq!(parse_duration("70"), Some(70));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("9999999999999999h"), None);
        assert_eq!(parse_duration("9223372036854775807s 1s"), None);
    }
}
