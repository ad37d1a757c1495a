use csv::Writer;
use std::io::Write;

use crate::error::ImportExportError;
use crate::models::{BodyWeightEntry, SetRecord, SetType};

pub const HEADER: [&str; 10] = [
    "Date",
    "Workout Name",
    "Duration",
    "Exercise Name",
    "Set Order",
    "Weight (kg)",
    "Reps",
    "Distance (meters)",
    "Seconds",
    "Notes",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn write_header<W: Write>(writer: &mut Writer<W>) -> Result<(), ImportExportError> {
    writer.write_record(HEADER)?;
    Ok(())
}

/// One line per stored set. PR flags are derived data and are not written.
pub fn write_sets<W: Write>(writer: &mut Writer<W>, sets: &[SetRecord]) -> Result<(), ImportExportError> {
    for set in sets {
        let order = match set.set_type {
            SetType::Normal => set.set_num.to_string(),
            SetType::Warmup => "W".to_string(),
            SetType::Drop => "D".to_string(),
        };
        writer.write_record([
            set.time.format(DATE_FORMAT).to_string(),
            set.title.clone(),
            format_duration(set.duration_minutes),
            set.exercise_name.clone(),
            order,
            optional(set.weight),
            optional(set.reps),
            optional(set.distance),
            optional(set.seconds),
            set.notes.clone().unwrap_or_default(),
        ])?;
    }
    Ok(())
}

pub fn write_body_weights<W: Write>(
    writer: &mut Writer<W>,
    entries: &[BodyWeightEntry],
) -> Result<(), ImportExportError> {
    for entry in entries {
        writer.write_record([
            entry.datetime.format(DATE_FORMAT).to_string(),
            String::new(),
            String::new(),
            "Body Weight".to_string(),
            "1".to_string(),
            entry.weight.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
    }
    Ok(())
}

/// `1h 5m` style, read back by the importer
pub fn format_duration(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::csv::parse_duration;

    #[test]
    fn test_duration_round_trips_through_importer() {
        for minutes in [0, 45, 60, 65, 150] {
            assert_eq!(parse_duration(&format_duration(minutes)), Some(minutes));
        }
    }

    #[test]
    fn test_body_weight_rows() {
        let entry = BodyWeightEntry {
            id: 1,
            datetime: chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap(),
            weight: 80.5,
        };
        let mut writer = Writer::from_writer(Vec::new());
        write_body_weights(&mut writer, &[entry]).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text, "2024-06-01 07:00:00,,,Body Weight,1,80.5,,,,\n");
    }
}
