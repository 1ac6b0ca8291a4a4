//! Unit conversion and parsing helpers shared by the target calculator.

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

pub const KG_PER_LB: f64 = 0.453_592_37;
pub const CM_PER_INCH: f64 = 2.54;

/// Multiplier used when the workout count is zero or could not be parsed.
pub const DEFAULT_ACTIVITY_MULTIPLIER: f64 = 1.35;

pub fn lb_to_kg(lb: f64) -> f64 {
    lb * KG_PER_LB
}

pub fn kg_to_lb(kg: f64) -> f64 {
    kg / KG_PER_LB
}

/// Feet + inches to whole centimetres.
pub fn ft_in_to_cm(ft: f64, inch: f64) -> f64 {
    ((ft * 12.0 + inch) * CM_PER_INCH).round()
}

/// Completed years between the birth date and `today`, never negative.
///
/// Missing month or day count as January 1st.
pub fn age_on(today: NaiveDate, year: i32, month: Option<u32>, day: Option<u32>) -> u32 {
    let month = month.unwrap_or(1);
    let day = day.unwrap_or(1);

    let Some(mut age) = today.year().checked_sub(year) else {
        return 0;
    };
    if (today.month(), today.day()) < (month, day) {
        age -= 1;
    }
    u32::try_from(age).unwrap_or(0)
}

/// Map a weekly workout count to its activity multiplier.
pub fn activity_multiplier(workouts: Option<i64>) -> f64 {
    match workouts {
        None => DEFAULT_ACTIVITY_MULTIPLIER,
        Some(w) if w <= 0 => DEFAULT_ACTIVITY_MULTIPLIER,
        Some(1..=2) => 1.45,
        Some(3..=4) => 1.55,
        Some(5..=6) => 1.725,
        Some(_) => 1.9,
    }
}

/// Parse the stored `workouts` value: a count, a numeric string, or one of
/// the onboarding bucket labels.
pub fn parse_workouts(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => parse_workout_label(s),
        _ => None,
    }
}

fn parse_workout_label(label: &str) -> Option<i64> {
    let label = label.trim().to_ascii_lowercase();
    if let Ok(n) = label.parse::<i64>() {
        return Some(n);
    }

    match label.as_str() {
        "none" | "never" => Some(0),
        "0-2" | "1-2" => Some(2),
        "3-4" | "3-5" => Some(4),
        "5-6" | "6+" => Some(6),
        "7+" | "daily" => Some(7),
        _ => {
            let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
    }
}

/// Coerce a JSON number or numeric string to a finite `f64`.
pub fn finite_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}
