use crate::import::csv::CsvRow;
use crate::models::SetType;

/// What an import row means. Checked in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// Body-weight pseudo-exercise, routed to the body-weight log
    BodyWeight,
    /// Free-text note for the (date, exercise) pair
    Note,
    /// Rest-timer marker, dropped
    Timer,
    Cardio { set_type: SetType },
    Strength { set_type: SetType },
}

pub fn classify_row(row: &CsvRow, body_weight_names: &[String]) -> RowKind {
    let exercise = row.exercise_name.trim();
    if body_weight_names
        .iter()
        .any(|name| name.trim().eq_ignore_ascii_case(exercise))
    {
        return RowKind::BodyWeight;
    }

    let order = row.set_order.trim().to_lowercase();
    if order == "note" {
        return RowKind::Note;
    }
    if order.contains("timer") {
        return RowKind::Timer;
    }

    let set_type = set_type_from_order(&order);
    if has_cardio_data(row) {
        RowKind::Cardio { set_type }
    } else {
        RowKind::Strength { set_type }
    }
}

/// Case-insensitive marker match: a marker containing `warm` or a standalone
/// `W` is a warmup, `drop` or a standalone `D` a drop set, anything else normal.
///
/// The one-letter forms only count as whole tokens, so a `d` inside some other
/// word does not turn a set into a drop set.
pub fn set_type_from_order(order: &str) -> SetType {
    let order = order.trim().to_lowercase();
    let has_token = |letter: &str| {
        order
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == letter)
    };
    if order.contains("warm") || has_token("w") {
        SetType::Warmup
    } else if order.contains("drop") || has_token("d") {
        SetType::Drop
    } else {
        SetType::Normal
    }
}

/// Exports write `0` into unused distance and time cells
fn has_cardio_data(row: &CsvRow) -> bool {
    row.distance.is_some_and(|d| d > 0.0) || row.seconds.is_some_and(|s| s > 0)
}
