use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp layout stored in the `time` / `datetime` columns
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Exercise in the global catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub target_muscles: Vec<String>,
    pub accessory_muscles: Vec<String>,
    pub is_cardio: bool,
}

/// Exercise definition before it has an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExercise {
    pub name: String,
    #[serde(default)]
    pub target_muscles: Vec<String>,
    #[serde(default)]
    pub accessory_muscles: Vec<String>,
    #[serde(default)]
    pub is_cardio: bool,
}

/// Muscle tags are stored as comma-delimited text
pub fn join_muscles(muscles: &[String]) -> String {
    muscles
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn split_muscles(text: &str) -> Vec<String> {
    text.split(',')
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Kind of logged set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SetType {
    #[default]
    Normal,
    Warmup,
    Drop,
}

impl SetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetType::Normal => "normal",
            SetType::Warmup => "warmup",
            SetType::Drop => "drop",
        }
    }

    /// Lenient parse of the stored value; anything unknown is a normal set
    pub fn from_db(value: Option<&str>) -> Self {
        match value.map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "warmup" => SetType::Warmup,
            Some(v) if v == "drop" => SetType::Drop,
            _ => SetType::Normal,
        }
    }

    /// Warmup and drop rows don't take a set number
    pub fn is_numbered(&self) -> bool {
        matches!(self, SetType::Normal)
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Personal-record flags carried by one set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrFlags {
    pub one_rm: bool,
    pub volume: bool,
    pub weight: bool,
}

impl PrFlags {
    pub fn any(&self) -> bool {
        self.one_rm || self.volume || self.weight
    }
}

/// One set row ready to be written to `workoutHistory`.
///
/// Session title and duration are not part of the entry; the ledger stamps them on
/// every row of the session when it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutEntry {
    pub workout_session: i64,
    pub exercise_num: i64,
    pub set_num: i64,
    pub exercise_id: i64,
    pub set_type: SetType,
    pub weight: Option<f64>,
    pub reps: Option<i64>,
    pub distance: Option<f64>,
    pub seconds: Option<i64>,
    pub one_rm: Option<f64>,
    pub time: NaiveDateTime,
    pub notes: Option<String>,
    pub flags: PrFlags,
}

/// A stored set as read back, joined with its exercise name
#[derive(Debug, Clone, PartialEq)]
pub struct SetRecord {
    pub workout_session: i64,
    pub exercise_num: i64,
    pub set_num: i64,
    pub exercise_id: i64,
    pub exercise_name: String,
    pub set_type: SetType,
    pub weight: Option<f64>,
    pub reps: Option<i64>,
    pub distance: Option<f64>,
    pub seconds: Option<i64>,
    pub one_rm: Option<f64>,
    pub time: NaiveDateTime,
    pub title: String,
    pub duration_minutes: i64,
    pub notes: Option<String>,
    pub flags: PrFlags,
}

impl SetRecord {
    pub fn is_cardio(&self) -> bool {
        self.distance.is_some() || self.seconds.is_some()
    }
}

impl fmt::Display for SetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.set_type {
            SetType::Normal => self.set_num.to_string(),
            SetType::Warmup => "W".to_string(),
            SetType::Drop => "D".to_string(),
        };
        if self.is_cardio() {
            write!(
                f,
                "{} [{}]: {:.0}m in {}s",
                self.exercise_name,
                label,
                self.distance.unwrap_or(0.0),
                self.seconds.unwrap_or(0)
            )
        } else {
            write!(
                f,
                "{} [{}]: {:.1}kg x {}",
                self.exercise_name,
                label,
                self.weight.unwrap_or(0.0),
                self.reps.unwrap_or(0)
            )
        }
    }
}

/// Grouped view of one workout session
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSession {
    pub number: i64,
    pub time: NaiveDateTime,
    pub title: String,
    pub duration_minutes: i64,
    pub exercises: Vec<SessionExercise>,
}

impl WorkoutSession {
    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }

    /// Group flat rows (already ordered by exercise number) into a session view
    pub fn from_records(records: Vec<SetRecord>) -> Option<Self> {
        let first = records.first()?;
        let mut session = WorkoutSession {
            number: first.workout_session,
            time: first.time,
            title: first.title.clone(),
            duration_minutes: first.duration_minutes,
            exercises: Vec::new(),
        };

        for record in records {
            match session.exercises.last_mut() {
                Some(group) if group.exercise_num == record.exercise_num => {
                    if group.notes.is_none() {
                        group.notes = record.notes.clone();
                    }
                    group.sets.push(record);
                }
                _ => session.exercises.push(SessionExercise {
                    exercise_num: record.exercise_num,
                    exercise_id: record.exercise_id,
                    exercise_name: record.exercise_name.clone(),
                    notes: record.notes.clone(),
                    sets: vec![record],
                }),
            }
        }

        Some(session)
    }
}

/// One exercise block within a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionExercise {
    pub exercise_num: i64,
    pub exercise_id: i64,
    pub exercise_name: String,
    pub notes: Option<String>,
    pub sets: Vec<SetRecord>,
}

/// One line per stored session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub number: i64,
    pub time: NaiveDateTime,
    pub title: String,
    pub duration_minutes: i64,
    pub exercise_count: i64,
    pub set_count: i64,
    pub pr_count: i64,
}

/// Saved workout template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub exercises: Vec<TemplateExercise>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExercise {
    pub exercise_id: i64,
    #[serde(default)]
    pub notes: Option<String>,
    pub sets: Vec<TemplateSet>,
}

/// Placeholder set in a template; carries no completion state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default)]
    pub set_type: SetType,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub reps: Option<i64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyWeightEntry {
    pub id: i64,
    pub datetime: NaiveDateTime,
    pub weight: f64,
}

/// Sets hitting a muscle over a recent window
#[derive(Debug, Clone, PartialEq)]
pub struct MuscleUsage {
    pub muscle: String,
    pub target_sets: i64,
    pub accessory_sets: i64,
}

/// Where a personal record was set
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMark {
    pub value: f64,
    pub weight: f64,
    pub reps: i64,
    pub time: NaiveDateTime,
    pub workout_session: i64,
}

/// Best marks for an exercise across its whole history
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersonalRecords {
    pub exercise_id: i64,
    pub best_one_rm: Option<RecordMark>,
    pub best_volume: Option<RecordMark>,
    pub best_weight: Option<RecordMark>,
}
