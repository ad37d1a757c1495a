use chrono::{NaiveDate, NaiveDateTime};
use liftlog::{
    Database, DatabaseError, ExerciseDraft, PrFlags, SetDraft, SetType, WorkoutDraft, WorkoutEntry,
};

// Ledger behavior: numbering, atomic overwrite, ordering and PR bookkeeping

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn exercise_id(db: &Database, name: &str) -> i64 {
    db.exercise_by_name(name).unwrap().unwrap().id
}

fn entry(session: i64, exercise_num: i64, set_num: i64, exercise_id: i64, weight: f64, reps: i64, time: NaiveDateTime) -> WorkoutEntry {
    WorkoutEntry {
        workout_session: session,
        exercise_num,
        set_num,
        exercise_id,
        set_type: SetType::Normal,
        weight: Some(weight),
        reps: Some(reps),
        distance: None,
        seconds: None,
        one_rm: Some(liftlog::one_rep_max(weight, reps)),
        time,
        notes: None,
        flags: PrFlags::default(),
    }
}

fn strength_draft(title: &str, time: NaiveDateTime, exercise_id: i64, sets: &[(f64, i64)]) -> WorkoutDraft {
    WorkoutDraft {
        title: title.to_string(),
        time,
        duration_minutes: 45,
        exercises: vec![ExerciseDraft {
            exercise_id,
            notes: None,
            sets: sets.iter().map(|&(w, r)| SetDraft::strength(w, r)).collect(),
        }],
    }
}

#[test]
fn test_session_numbers_increase_monotonically() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");
    assert_eq!(db.latest_session_number().unwrap(), 0);

    let first = db.record_workout(&strength_draft("A", at(1, 18), bench, &[(60.0, 5)])).unwrap();
    let second = db.record_workout(&strength_draft("B", at(2, 18), bench, &[(62.5, 5)])).unwrap();
    assert_eq!((first, second), (1, 2));

    // Deleting an older session leaves a gap; numbering continues from the max
    db.delete_session(1).unwrap();
    assert_eq!(db.latest_session_number().unwrap(), 2);
    let third = db.record_workout(&strength_draft("C", at(3, 18), bench, &[(65.0, 5)])).unwrap();
    assert_eq!(third, 3);
}

#[test]
fn test_failed_overwrite_leaves_session_untouched() {
    let mut db = Database::in_memory().unwrap();
    let squat = exercise_id(&db, "Squat (Barbell)");
    let time = at(5, 9);

    let original = vec![
        entry(1, 1, 1, squat, 100.0, 5, time),
        entry(1, 1, 2, squat, 100.0, 5, time),
    ];
    db.insert_session(&original, "Legs", 60).unwrap();
    let before = db.fetch_by_session(1).unwrap();

    // Second row references an exercise that does not exist, so the insert
    // fails after the delete has already run
    let replacement = vec![
        entry(1, 1, 1, squat, 140.0, 3, time),
        entry(1, 2, 1, 999_999, 10.0, 10, time),
    ];
    let err = db.overwrite_session(1, &replacement, "Edited", 30).unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionFailure { .. }), "got {:?}", err);
    assert!(matches!(err.root(), DatabaseError::ReferentialError { .. }));

    assert_eq!(db.fetch_by_session(1).unwrap(), before);
}

#[test]
fn test_overwrite_replaces_all_rows() {
    let mut db = Database::in_memory().unwrap();
    let squat = exercise_id(&db, "Squat (Barbell)");
    let time = at(6, 9);
    db.insert_session(&[entry(1, 1, 1, squat, 100.0, 5, time)], "Legs", 60)
        .unwrap();

    let written = db
        .overwrite_session(
            1,
            &[
                entry(1, 1, 1, squat, 110.0, 3, time),
                entry(1, 1, 2, squat, 110.0, 3, time),
            ],
            "Heavy legs",
            75,
        )
        .unwrap();
    assert_eq!(written, 2);

    let rows = db.fetch_by_session(1).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.weight == Some(110.0) && r.title == "Heavy legs" && r.duration_minutes == 75));
}

#[test]
fn test_rows_come_back_in_exercise_then_set_order() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");
    let dip = exercise_id(&db, "Dip");
    let time = at(7, 18);

    // Written out of order on purpose
    let entries = vec![
        entry(1, 2, 2, dip, 0.0, 10, time),
        entry(1, 1, 2, bench, 80.0, 5, time),
        entry(1, 2, 1, dip, 0.0, 12, time),
        entry(1, 1, 1, bench, 80.0, 5, time),
    ];
    db.insert_session(&entries, "Push", 50).unwrap();

    let order: Vec<(i64, i64)> = db
        .fetch_by_session(1)
        .unwrap()
        .iter()
        .map(|r| (r.exercise_num, r.set_num))
        .collect();
    assert_eq!(order, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);

    let session = db.session(1).unwrap().unwrap();
    assert_eq!(session.exercises.len(), 2);
    assert_eq!(session.exercises[1].exercise_name, "Dip");
    assert_eq!(session.set_count(), 4);
}

#[test]
fn test_insert_rejects_mixed_sessions() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");
    let entries = vec![
        entry(1, 1, 1, bench, 80.0, 5, at(8, 18)),
        entry(2, 1, 1, bench, 80.0, 5, at(8, 18)),
    ];
    let err = db.insert_session(&entries, "Push", 50).unwrap_err();
    assert!(matches!(err.root(), DatabaseError::InvalidSession(_)));
    assert_eq!(db.latest_session_number().unwrap(), 0);
}

#[test]
fn test_insert_onto_existing_session_number_is_rejected() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");
    db.insert_session(&[entry(1, 1, 1, bench, 80.0, 5, at(1, 10))], "Monday", 30)
        .unwrap();
    let before = db.fetch_by_session(1).unwrap();

    let err = db
        .insert_session(&[entry(1, 1, 1, bench, 85.0, 5, at(9, 10))], "Friday", 90)
        .unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionFailure { .. }), "got {:?}", err);
    assert!(matches!(err.root(), DatabaseError::InvalidSession(_)));

    // Still one title, one time and one duration
    assert_eq!(db.fetch_by_session(1).unwrap(), before);
}

#[test]
fn test_record_workout_flags_against_earlier_history() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");

    db.record_workout(&strength_draft("Week 1", at(1, 18), bench, &[(100.0, 5)]))
        .unwrap();
    let session = db
        .record_workout(&strength_draft("Week 2", at(8, 18), bench, &[(100.0, 4), (100.0, 6), (90.0, 6)]))
        .unwrap();

    let rows = db.fetch_by_session(session).unwrap();
    assert!(!rows[0].flags.any());
    // Same weight for more reps: weight PR, also the best 1RM and volume
    assert!(rows[1].flags.weight && rows[1].flags.one_rm && rows[1].flags.volume);
    assert!(!rows[2].flags.any());

    let records = db.personal_records(bench).unwrap();
    let best = records.best_weight.unwrap();
    assert_eq!((best.weight, best.reps, best.workout_session), (100.0, 6, session));
}

#[test]
fn test_record_workout_without_completed_sets_is_rejected() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");
    let mut draft = strength_draft("Nothing", at(2, 18), bench, &[(80.0, 5)]);
    draft.exercises[0].sets[0].completed = false;

    assert!(matches!(db.record_workout(&draft), Err(DatabaseError::InvalidSession(_))));
    assert_eq!(db.latest_session_number().unwrap(), 0);
}

#[test]
fn test_update_workout_ignores_its_own_old_rows() {
    let mut db = Database::in_memory().unwrap();
    let deadlift = exercise_id(&db, "Deadlift (Barbell)");

    let session = db
        .record_workout(&strength_draft("Pull", at(3, 18), deadlift, &[(180.0, 3)]))
        .unwrap();

    // Lowering the weight must still be a PR, since the old version of this
    // session is not history
    db.update_workout(session, &strength_draft("Pull", at(3, 18), deadlift, &[(170.0, 3)]))
        .unwrap();

    let rows = db.fetch_by_session(session).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].weight, Some(170.0));
    assert!(rows[0].flags.one_rm && rows[0].flags.weight);
}

#[test]
fn test_rebuild_records_after_deleting_history() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");

    let first = db.record_workout(&strength_draft("A", at(1, 18), bench, &[(100.0, 5)])).unwrap();
    let second = db.record_workout(&strength_draft("B", at(2, 18), bench, &[(90.0, 5)])).unwrap();
    assert!(!db.fetch_by_session(second).unwrap()[0].flags.any());

    db.delete_session(first).unwrap();
    let changed = db.rebuild_records().unwrap();
    assert_eq!(changed, 1);
    assert!(db.fetch_by_session(second).unwrap()[0].flags.weight);

    // Already consistent
    assert_eq!(db.rebuild_records().unwrap(), 0);
}

#[test]
fn test_list_sessions_newest_first() {
    let mut db = Database::in_memory().unwrap();
    let bench = exercise_id(&db, "Bench Press (Barbell)");
    db.record_workout(&strength_draft("Old", at(1, 18), bench, &[(60.0, 5)])).unwrap();
    db.record_workout(&strength_draft("New", at(9, 18), bench, &[(50.0, 5), (50.0, 5)])).unwrap();

    let sessions = db.list_sessions().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].title, "New");
    assert_eq!(sessions[0].set_count, 2);
    assert_eq!(sessions[0].pr_count, 0);
    assert_eq!(sessions[1].pr_count, 1);
}

#[test]
fn test_muscle_usage_skips_warmups_and_old_sets() {
    let mut db = Database::in_memory().unwrap();
    let bench = db.exercise_by_name("Bench Press (Barbell)").unwrap().unwrap();

    let mut draft = strength_draft("Push", at(10, 18), bench.id, &[(80.0, 5), (80.0, 5)]);
    draft.exercises[0]
        .sets
        .insert(0, SetDraft::strength(40.0, 10).with_type(SetType::Warmup));
    db.record_workout(&draft).unwrap();
    db.record_workout(&strength_draft("Ancient", at(1, 18), bench.id, &[(70.0, 5)]))
        .unwrap();

    let usage = db.recent_muscle_usage_since(at(5, 0)).unwrap();
    let target = &bench.target_muscles[0];
    let row = usage.iter().find(|u| &u.muscle == target).unwrap();
    assert_eq!(row.target_sets, 2);
}
