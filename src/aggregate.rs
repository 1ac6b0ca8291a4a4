use serde_json::Value;
use tracing::warn;

use crate::models::{ConsumptionEvent, DailyConsumedTotals, NutrientFields};
use crate::units::finite_number;

/// Macros one event adds to the day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contribution {
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub sugar: f64,
    pub fiber: f64,
    pub sodium: f64,
}

impl std::ops::AddAssign for Contribution {
    fn add_assign(&mut self, rhs: Self) {
        self.calories += rhs.calories;
        self.carbs += rhs.carbs;
        self.protein += rhs.protein;
        self.fat += rhs.fat;
        self.sugar += rhs.sugar;
        self.fiber += rhs.fiber;
        self.sodium += rhs.sodium;
    }
}

/// Extract an event's macros.
///
/// Top-level fields win whenever any of them is present; the `items`
/// breakdown is only summed when there are none. Fields that don't coerce
/// to a finite, non-negative number count as zero.
pub fn event_contribution(event: &ConsumptionEvent) -> Contribution {
    if event.fields.has_any() {
        return field_contribution(&event.id, &event.fields);
    }

    let mut total = Contribution::default();
    for item in event.items.iter().flatten() {
        total += field_contribution(&event.id, item);
    }
    total
}

fn field_contribution(event_id: &str, fields: &NutrientFields) -> Contribution {
    let coerce = |name: &'static str, value: &Option<Value>| -> f64 {
        let Some(raw) = value else {
            return 0.0;
        };
        match finite_number(raw) {
            Some(n) if n >= 0.0 => n,
            _ => {
                warn!(event = event_id, field = name, value = %raw, "malformed event field, counting as 0");
                0.0
            }
        }
    };

    Contribution {
        calories: coerce("calories", &fields.calories),
        carbs: coerce("carbs_g", &fields.carbs),
        protein: coerce("protein_g", &fields.protein),
        fat: coerce("fat_g", &fields.fat),
        sugar: coerce("sugar_g", &fields.sugar),
        fiber: coerce("fiber_g", &fields.fiber),
        sodium: coerce("sodium_mg", &fields.sodium),
    }
}

/// Sum a day's events into consumed-so-far totals.
///
/// Always recomputes from the full set; no rounding is applied.
pub fn aggregate_events<'a, I>(events: I) -> DailyConsumedTotals
where
    I: IntoIterator<Item = &'a ConsumptionEvent>,
{
    let mut sum = Contribution::default();
    for event in events {
        sum += event_contribution(event);
    }

    DailyConsumedTotals {
        calories_today: sum.calories,
        carbs_today: sum.carbs,
        protein_today: sum.protein,
        fat_today: sum.fat,
        sugar_today: sum.sugar,
        fiber_today: sum.fiber,
        sodium_today: sum.sodium,
    }
}
