use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Weight-change goal chosen during onboarding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Lose,
    Gain,
    #[default]
    Maintain,
}

impl Goal {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lose" => Some(Goal::Lose),
            "gain" => Some(Goal::Gain),
            "maintain" => Some(Goal::Maintain),
            _ => None,
        }
    }
}

/// Low / moderate / high setting used by the kidney and heart plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Moderate,
    High,
}

impl Level {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Level::Low),
            "moderate" => Some(Level::Moderate),
            "high" => Some(Level::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KidneySettings {
    #[serde(default, deserialize_with = "lenient::number")]
    pub sodium_limit_mg: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub hydration_goal_cups: Option<f64>,
    #[serde(default, deserialize_with = "lenient::level")]
    pub protein_level: Option<Level>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartSettings {
    #[serde(default, deserialize_with = "lenient::number")]
    pub sodium_limit_mg: Option<f64>,
    #[serde(default, deserialize_with = "lenient::level")]
    pub sat_fat_limit: Option<Level>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiabetesSettings {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub track_carbs: bool,
    #[serde(default, deserialize_with = "lenient::number")]
    pub carb_target_per_meal: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitSettings {
    #[serde(default, deserialize_with = "lenient::number")]
    pub coffee_per_day_target: Option<f64>,
}

/// Snapshot of the `users/{uid}` profile document.
///
/// Every field is optional. Numbers may be stored as numbers or numeric
/// strings; anything that does not coerce to a finite number reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "lenient::number")]
    pub kg: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lb: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub cm: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub inch: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub gender: Option<String>,

    #[serde(default, deserialize_with = "lenient::number")]
    pub year: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub month: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub day: Option<f64>,

    /// Weekly workout count, already parsed from a count or bucket label.
    #[serde(default, deserialize_with = "lenient::workouts")]
    pub workouts: Option<i64>,
    #[serde(rename = "dietPreferenceId", default, deserialize_with = "lenient::text")]
    pub diet_preference_id: Option<String>,

    #[serde(default, deserialize_with = "lenient::goal")]
    pub goal: Goal,
    /// Requested rate of change in kg per day.
    #[serde(rename = "HowFast", default, deserialize_with = "lenient::number")]
    pub how_fast: Option<f64>,

    #[serde(rename = "kidneySettings", default, deserialize_with = "lenient::settings")]
    pub kidney_settings: Option<KidneySettings>,
    #[serde(rename = "heartSettings", default, deserialize_with = "lenient::settings")]
    pub heart_settings: Option<HeartSettings>,
    #[serde(rename = "diabetesSettings", default, deserialize_with = "lenient::settings")]
    pub diabetes_settings: Option<DiabetesSettings>,
    #[serde(rename = "habitSettings", default, deserialize_with = "lenient::settings")]
    pub habit_settings: Option<HabitSettings>,

    #[serde(rename = "mealsPerDay", default, deserialize_with = "lenient::number")]
    pub meals_per_day: Option<f64>,
}

impl UserProfile {
    /// Build a profile from the parsed fields of a profile document.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Gender strings starting with "m" use the male BMR constant.
    pub fn is_male(&self) -> bool {
        self.gender
            .as_deref()
            .map(|g| g.trim().to_ascii_lowercase().starts_with('m'))
            .unwrap_or(false)
    }
}

/// Daily nutrition targets computed from one profile snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTargets {
    pub calories: u32,
    pub water_ml: u32,
    pub coffee_cups: u32,
    pub protein_g: u32,
    pub carbs_g: u32,
    pub fat_g: u32,
    pub sugar_g: u32,
    pub fiber_g: u32,
    pub sodium_mg: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat_fat_g: Option<u32>,
    pub meals_per_day: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diabetes_daily_carb_g: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carb_per_meal_g: Option<u32>,
}

impl DailyTargets {
    /// Targets minus what has been consumed so far. Values go negative
    /// once a target is exceeded.
    pub fn remaining(&self, today: &DailyConsumedTotals) -> DailyRemaining {
        DailyRemaining {
            calories: f64::from(self.calories) - today.calories_today,
            carbs: f64::from(self.carbs_g) - today.carbs_today,
            protein: f64::from(self.protein_g) - today.protein_today,
            fat: f64::from(self.fat_g) - today.fat_today,
            sugar: f64::from(self.sugar_g) - today.sugar_today,
            fiber: f64::from(self.fiber_g) - today.fiber_today,
            sodium: f64::from(self.sodium_mg) - today.sodium_today,
        }
    }
}

/// Nutrient fields of one logged food or one of its sub-items, kept raw
/// until aggregation coerces them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutrientFields {
    pub calories: Option<Value>,
    pub carbs: Option<Value>,
    pub protein: Option<Value>,
    pub fat: Option<Value>,
    pub sugar: Option<Value>,
    pub fiber: Option<Value>,
    pub sodium: Option<Value>,
}

impl NutrientFields {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| map.get(*k))
                .find(|v| !v.is_null())
                .cloned()
        };

        Self {
            calories: pick(&["calories_kcal_total", "calories_kcal"]),
            carbs: pick(&["carbs_g"]),
            protein: pick(&["protein_g"]),
            fat: pick(&["fat_g", "fats_g"]),
            sugar: pick(&["sugar_g"]),
            fiber: pick(&["fiber_g"]),
            sodium: pick(&["sodium_mg"]),
        }
    }

    /// True when at least one field is present and non-null.
    pub fn has_any(&self) -> bool {
        [
            &self.calories,
            &self.carbs,
            &self.protein,
            &self.fat,
            &self.sugar,
            &self.fiber,
            &self.sodium,
        ]
        .iter()
        .any(|f| f.is_some())
    }
}

/// One food logged for the day: top-level macros, an `items` breakdown, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionEvent {
    pub id: String,
    pub fields: NutrientFields,
    pub items: Option<Vec<NutrientFields>>,
}

impl ConsumptionEvent {
    pub fn from_map(id: impl Into<String>, map: &Map<String, Value>) -> Self {
        let items = map.get("items").and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|item| item.as_object())
                .map(NutrientFields::from_map)
                .collect()
        });

        Self {
            id: id.into(),
            fields: NutrientFields::from_map(map),
            items,
        }
    }

    /// Anything other than a JSON object becomes an empty event.
    pub fn from_value(id: impl Into<String>, value: &Value) -> Self {
        match value.as_object() {
            Some(map) => Self::from_map(id, map),
            None => Self {
                id: id.into(),
                ..Self::default()
            },
        }
    }
}

/// What has been eaten so far today. Not rounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyConsumedTotals {
    pub calories_today: f64,
    pub carbs_today: f64,
    pub protein_today: f64,
    pub fat_today: f64,
    pub sugar_today: f64,
    pub fiber_today: f64,
    pub sodium_today: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRemaining {
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub sugar: f64,
    pub fiber: f64,
    pub sodium: f64,
}

mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{Goal, Level};
    use crate::units::{finite_number, parse_workouts};

    fn raw<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
        Option::<Value>::deserialize(d)
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(raw(d)?.as_ref().and_then(finite_number))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match raw(d)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match raw(d)? {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    pub fn workouts<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(raw(d)?.as_ref().and_then(parse_workouts))
    }

    pub fn goal<'de, D: Deserializer<'de>>(d: D) -> Result<Goal, D::Error> {
        Ok(match raw(d)? {
            Some(Value::String(s)) => Goal::parse(&s).unwrap_or_default(),
            _ => Goal::default(),
        })
    }

    pub fn level<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Level>, D::Error> {
        Ok(match raw(d)? {
            Some(Value::String(s)) => Level::parse(&s),
            _ => None,
        })
    }

    /// A settings block that is not an object reads as absent.
    pub fn settings<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match raw(d)? {
            Some(v @ Value::Object(_)) => serde_json::from_value(v).ok(),
            _ => None,
        })
    }
}
