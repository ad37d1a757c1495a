use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use liftlog::config::AppConfig;
use liftlog::database::Database;
use liftlog::error::{DatabaseError, ErrorSeverity, LiftLogError};
use liftlog::export::{export_csv, export_to_file, DateRange, ExportOptions};
use liftlog::import::csv::parse_datetime;
use liftlog::import::{ImportProgress, Importer};
use liftlog::logging::{init_logging, LogLevel};
use liftlog::models::{RecordMark, SetType};

/// LiftLog - workout history, personal records and CSV import/export
#[derive(Parser)]
#[command(name = "liftlog")]
#[command(version)]
#[command(about = "Workout log with personal-record tracking", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and bring its schema up to date
    Init,

    /// Import a CSV export from a workout tracker
    Import {
        /// Input CSV file
        file: PathBuf,
    },

    /// Export the workout history as CSV
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Include body-weight entries
        #[arg(long)]
        body_weight: bool,
    },

    /// List recent sessions
    Sessions {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one session set by set
    Show { session: i64 },

    /// Delete a session
    Delete {
        session: i64,

        /// Recompute PR flags of the remaining history afterwards
        #[arg(long)]
        rebuild: bool,
    },

    /// Personal records for an exercise
    Records { exercise: String },

    /// List the exercise catalog
    Exercises {
        /// Only cardio exercises
        #[arg(long)]
        cardio: bool,
    },

    /// Sets per muscle over recent days
    Muscles {
        #[arg(short, long, default_value = "7")]
        days: i64,
    },

    /// Body-weight log
    #[command(subcommand)]
    Bodyweight(BodyWeightCommand),

    /// Workout templates
    #[command(subcommand)]
    Templates(TemplateCommand),

    /// Recompute every PR flag by replaying the history in order
    RebuildRecords,

    /// Show or write the configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum BodyWeightCommand {
    /// Record a weight in kg
    Log {
        weight: f64,

        /// Time of the measurement (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// List all entries
    List,
    /// Delete an entry by id
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List templates
    List,
    /// Show a template's exercises
    Show { id: i64 },
    /// Save a logged session as a template
    FromSession { session: i64, name: String },
    /// Delete a template
    Delete { id: i64 },
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "#")]
    number: i64,
    date: String,
    title: String,
    minutes: i64,
    exercises: i64,
    sets: i64,
    #[tabled(rename = "PRs")]
    prs: i64,
}

#[derive(Tabled)]
struct ExerciseRow {
    id: i64,
    name: String,
    target: String,
    accessory: String,
    cardio: String,
}

#[derive(Tabled)]
struct MuscleRow {
    muscle: String,
    target: i64,
    accessory: i64,
}

#[derive(Tabled)]
struct BodyWeightRow {
    id: i64,
    date: String,
    #[tabled(rename = "kg")]
    weight: String,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        report_failure(&err);
        std::process::exit(1);
    }
}

/// Log a failed command at its severity, then print it for the user
fn report_failure(err: &anyhow::Error) {
    let (severity, retryable) = if let Some(e) = err.downcast_ref::<LiftLogError>() {
        (e.severity(), e.is_retryable())
    } else if let Some(e) = err.downcast_ref::<DatabaseError>() {
        (e.severity(), e.is_retryable())
    } else {
        (ErrorSeverity::Error, false)
    };

    if severity.to_tracing_level() == tracing::Level::WARN {
        tracing::warn!(error = %format!("{:#}", err), "Command failed");
    } else {
        tracing::error!(error = %format!("{:#}", err), "Command failed");
    }

    let mut message = match err.downcast_ref::<LiftLogError>() {
        Some(liftlog_err) => liftlog_err.user_message(),
        None => format!("{:#}", err),
    };
    if retryable {
        message.push_str(" (temporary failure, try again)");
    }
    eprintln!("{} {}", "error:".red().bold(), message);
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(),
    };

    config.logging.level = match cli.verbose {
        0 => config.logging.level,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_logging(&config.logging)?;

    if let Commands::Config { save } = cli.command {
        return show_config(&mut config, cli.config, save);
    }

    let db_path = cli.database.unwrap_or_else(|| config.database.path.clone());
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command {
        Commands::Init => {
            let report = db.ensure_schema()?;
            println!("{} {}", "✓ Database ready:".green().bold(), db_path.display());
            println!("  Exercises in catalog: {}", db.list_exercises()?.len());
            if !report.is_noop() {
                println!("  Columns added: {}", report.columns_added.join(", "));
            }
        }

        Commands::Import { file } => {
            let importer = Importer::new(config.import.clone());
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")?
                    .progress_chars("#>-"),
            );

            let summary = importer.import_file(&mut db, &file, |progress| match progress {
                ImportProgress::Parsed { sessions, .. } => {
                    pb.set_length(sessions as u64);
                    pb.set_message("parsed");
                }
                ImportProgress::Preparing => pb.set_message("preparing"),
                ImportProgress::Importing {
                    sessions_processed,
                    sets_imported,
                    ..
                } => {
                    pb.set_position(sessions_processed as u64);
                    pb.set_message(format!("{} sets", sets_imported));
                }
                ImportProgress::Complete(_) => pb.finish_and_clear(),
            });
            if !pb.is_finished() {
                pb.abandon();
            }
            let summary = summary?;

            println!("{}", "✓ Import completed successfully".green().bold());
            println!("  Sessions: {}", summary.sessions_imported);
            println!("  Sets: {}", summary.sets_imported);
            println!("  Body-weight entries: {}", summary.body_weight_entries);
            if summary.exercises_created > 0 {
                println!("  New exercises: {}", summary.exercises_created);
            }
            if summary.rows_skipped > 0 {
                println!(
                    "{}",
                    format!("  Skipped {} incomplete rows", summary.rows_skipped).yellow()
                );
            }
        }

        Commands::Export {
            output,
            from,
            to,
            body_weight,
        } => {
            let options = ExportOptions {
                date_range: DateRange::new(from, to),
                include_body_weight: body_weight || config.export.include_body_weight,
            };
            match output {
                Some(path) => {
                    let bytes = export_to_file(&db, &options, &path)?;
                    eprintln!(
                        "{} {} ({} bytes)",
                        "✓ Exported to".green().bold(),
                        path.display(),
                        bytes
                    );
                }
                None => print!("{}", export_csv(&db, &options)?),
            }
        }

        Commands::Sessions { limit } => {
            let rows: Vec<SessionRow> = db
                .list_sessions()?
                .into_iter()
                .take(limit)
                .map(|s| SessionRow {
                    number: s.number,
                    date: s.time.format("%Y-%m-%d %H:%M").to_string(),
                    title: s.title,
                    minutes: s.duration_minutes,
                    exercises: s.exercise_count,
                    sets: s.set_count,
                    prs: s.pr_count,
                })
                .collect();
            if rows.is_empty() {
                println!("{}", "No sessions logged yet".dimmed());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }

        Commands::Show { session } => {
            let Some(view) = db.session(session)? else {
                bail!("Session {} not found", session);
            };
            println!(
                "{} {} ({}, {} min)",
                format!("#{}", view.number).bold(),
                view.title.bold(),
                view.time.format("%Y-%m-%d %H:%M"),
                view.duration_minutes
            );
            for exercise in &view.exercises {
                println!("\n{}", exercise.exercise_name.cyan().bold());
                if let Some(notes) = &exercise.notes {
                    println!("  {}", notes.dimmed());
                }
                for set in &exercise.sets {
                    let mut line = format!("  {}", set);
                    if set.flags.one_rm {
                        line.push_str(&" 1RM PR".yellow().to_string());
                    }
                    if set.flags.volume {
                        line.push_str(&" volume PR".yellow().to_string());
                    }
                    if set.flags.weight {
                        line.push_str(&" weight PR".yellow().to_string());
                    }
                    if set.set_type == SetType::Warmup {
                        line = line.dimmed().to_string();
                    }
                    println!("{}", line);
                }
            }
        }

        Commands::Delete { session, rebuild } => {
            let removed = db.delete_session(session)?;
            if removed == 0 {
                bail!("Session {} not found", session);
            }
            println!("{} session {} ({} sets)", "✓ Deleted".green().bold(), session, removed);
            if rebuild {
                let changed = db.rebuild_records()?;
                println!("  Updated PR flags on {} sets", changed);
            }
        }

        Commands::Records { exercise } => {
            let Some(found) = db.exercise_by_name(&exercise)? else {
                bail!("No exercise named '{}'", exercise);
            };
            let records = db.personal_records(found.id)?;
            println!("{}", found.name.cyan().bold());
            print_mark("Estimated 1RM", records.best_one_rm.as_ref(), "kg");
            print_mark("Volume", records.best_volume.as_ref(), "kg");
            print_mark("Weight", records.best_weight.as_ref(), "kg");
        }

        Commands::Exercises { cardio } => {
            let rows: Vec<ExerciseRow> = db
                .list_exercises()?
                .into_iter()
                .filter(|e| !cardio || e.is_cardio)
                .map(|e| ExerciseRow {
                    id: e.id,
                    name: e.name,
                    target: e.target_muscles.join(", "),
                    accessory: e.accessory_muscles.join(", "),
                    cardio: if e.is_cardio { "yes".to_string() } else { String::new() },
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }

        Commands::Muscles { days } => {
            let rows: Vec<MuscleRow> = db
                .recent_muscle_usage(days)?
                .into_iter()
                .map(|u| MuscleRow {
                    muscle: u.muscle,
                    target: u.target_sets,
                    accessory: u.accessory_sets,
                })
                .collect();
            if rows.is_empty() {
                println!("{}", format!("No sets in the last {} days", days).dimmed());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }

        Commands::Bodyweight(command) => match command {
            BodyWeightCommand::Log { weight, at } => {
                let datetime = match at {
                    Some(text) => parse_datetime(&text)
                        .with_context(|| format!("Unrecognized time '{}'", text))?,
                    None => Local::now().naive_local(),
                };
                db.log_body_weight(datetime, weight)?;
                println!("{} {} kg at {}", "✓ Logged".green().bold(), weight, datetime);
            }
            BodyWeightCommand::List => {
                let rows: Vec<BodyWeightRow> = db
                    .body_weight_entries()?
                    .into_iter()
                    .map(|e| BodyWeightRow {
                        id: e.id,
                        date: e.datetime.format("%Y-%m-%d %H:%M").to_string(),
                        weight: format!("{:.1}", e.weight),
                    })
                    .collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
            BodyWeightCommand::Delete { id } => {
                if !db.delete_body_weight(id)? {
                    bail!("No body-weight entry {}", id);
                }
                println!("{} entry {}", "✓ Deleted".green().bold(), id);
            }
        },

        Commands::Templates(command) => match command {
            TemplateCommand::List => {
                for template in db.list_templates()? {
                    println!(
                        "{:>4}  {}  {}",
                        template.id,
                        template.name.bold(),
                        format!("{} exercises", template.exercises.len()).dimmed()
                    );
                }
            }
            TemplateCommand::Show { id } => {
                let template = db.template(id)?;
                println!("{}", template.name.bold());
                for exercise in &template.exercises {
                    let name = db.exercise(exercise.exercise_id)?.name;
                    println!("  {} ({} sets)", name.cyan(), exercise.sets.len());
                }
            }
            TemplateCommand::FromSession { session, name } => {
                let id = db.template_from_session(session, &name)?;
                println!("{} template {} '{}'", "✓ Created".green().bold(), id, name);
            }
            TemplateCommand::Delete { id } => {
                if !db.delete_template(id)? {
                    bail!("No template {}", id);
                }
                println!("{} template {}", "✓ Deleted".green().bold(), id);
            }
        },

        Commands::RebuildRecords => {
            let changed = db.rebuild_records()?;
            println!("{} {} sets changed", "✓ Records rebuilt:".green().bold(), changed);
        }

        Commands::Config { .. } => unreachable!("handled before opening the database"),
    }

    Ok(())
}

fn show_config(config: &mut AppConfig, path: Option<PathBuf>, save: bool) -> Result<()> {
    if save {
        let path = match path {
            Some(path) => {
                config.save_to_file(&path)?;
                path
            }
            None => config.save_default()?,
        };
        println!("{} {}", "✓ Configuration written to".green().bold(), path.display());
    } else {
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

fn print_mark(label: &str, mark: Option<&RecordMark>, unit: &str) {
    match mark {
        Some(mark) => println!(
            "  {:<14} {:>8.2} {}  ({} x {} on {}, session {})",
            label,
            mark.value,
            unit,
            mark.weight,
            mark.reps,
            mark.time.format("%Y-%m-%d"),
            mark.workout_session
        ),
        None => println!("  {:<14} {}", label, "-".dimmed()),
    }
}
