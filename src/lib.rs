// Library interface for liftlog modules
// This allows integration tests and benches to access the core functionality

pub mod body_weight;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod import;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod records;
pub mod schema;
pub mod templates;
pub mod workout;

// Re-export commonly used types for convenience
pub use database::Database;
pub use error::{DatabaseError, ImportExportError, LiftLogError, Result};
pub use export::{export_csv, export_to_file, DateRange, ExportOptions};
pub use import::{ImportProgress, ImportSettings, ImportSummary, Importer};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::*;
pub use records::{one_rep_max, PersonalBests, RecordTracker};
pub use workout::{ExerciseDraft, SetDraft, WorkoutDraft};
