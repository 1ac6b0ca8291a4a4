//! Daily target calculation.
//!
//! Energy comes from the Mifflin-St Jeor BMR scaled by a workout-driven
//! activity multiplier, then shifted toward the user's goal within safety
//! caps. Macros are split from the resulting calorie target, with kidney,
//! heart and diabetes settings overriding the defaults where present.
//!
//! # References
//!
//! - Mifflin, M.D., et al. (1990). A new predictive equation for resting energy expenditure.
//!   *American Journal of Clinical Nutrition*, 51(2), 241-247.
//!   <https://doi.org/10.1093/ajcn/51.2.241>

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::error::PlanError;
use crate::models::{DailyTargets, Goal, Level, UserProfile};
use crate::units::{activity_multiplier, age_on, ft_in_to_cm, lb_to_kg};

/// Energy stored in one kilogram of body mass.
pub const KCAL_PER_KG_BODY_MASS: f64 = 7700.0;

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

const MIN_CALORIES: f64 = 1200.0;
const MIN_CALORIES_BMR_FRACTION: f64 = 0.8;
const MAX_DEFICIT_KCAL: f64 = 1000.0;
const MAX_DEFICIT_TDEE_FRACTION: f64 = 0.30;
const MAX_SURPLUS_KCAL: f64 = 600.0;
const MAX_SURPLUS_TDEE_FRACTION: f64 = 0.15;

const ML_PER_CUP: f64 = 250.0;
const WATER_ML_PER_KG: f64 = 30.0;
const MIN_WATER_ML: f64 = 1500.0;
const DEFAULT_SODIUM_MG: f64 = 2300.0;
const DEFAULT_COFFEE_CUPS: u32 = 1;
const DEFAULT_MEALS_PER_DAY: u32 = 3;

const DEFAULT_FAT_FRACTION: f64 = 0.30;
const SUGAR_CALORIE_FRACTION: f64 = 0.10;
const FIBER_G_PER_1000_KCAL: f64 = 14.0;
const MIN_FIBER_G: f64 = 25.0;

/// Body measurements resolved to metric units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BodyMetrics {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age: u32,
    pub male: bool,
}

impl BodyMetrics {
    /// Resolve weight, height and age from a profile.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ProfileIncomplete`] if weight or height cannot be
    /// resolved to a positive number.
    pub fn from_profile(profile: &UserProfile, today: NaiveDate) -> Result<Self, PlanError> {
        let weight_kg = positive(profile.kg)
            .or_else(|| positive(profile.lb).map(lb_to_kg))
            .ok_or(PlanError::ProfileIncomplete {
                reason: "weight is missing (need kg or lb)",
            })?;

        let height_cm = positive(profile.cm)
            .or_else(|| match (profile.ft, profile.inch) {
                (None, None) => None,
                (ft, inch) => positive(Some(ft_in_to_cm(
                    ft.unwrap_or(0.0),
                    inch.unwrap_or(0.0),
                ))),
            })
            .ok_or(PlanError::ProfileIncomplete {
                reason: "height is missing (need cm or ft/inch)",
            })?;

        // a birth year outside 1..=this year counts as missing
        let birth_year = profile
            .year
            .filter(|y| y.is_finite())
            .map(|y| y.trunc())
            .filter(|y| (1.0..=f64::from(today.year())).contains(y));
        let age = match birth_year {
            Some(year) => age_on(
                today,
                year as i32,
                profile.month.map(|m| m as u32),
                profile.day.map(|d| d as u32),
            ),
            None => 0,
        };

        Ok(Self {
            weight_kg,
            height_cm,
            age,
            male: profile.is_male(),
        })
    }
}

/// Basal metabolic rate using the Mifflin-St Jeor equation (1990).
///
/// Formula: BMR = 10 x `weight_kg` + 6.25 x `height_cm` - 5 x age + s,
/// where s is +5 for men and -161 for women.
pub fn mifflin_st_jeor(body: &BodyMetrics) -> f64 {
    let sex_constant = if body.male { 5.0 } else { -161.0 };
    10.0 * body.weight_kg + 6.25 * body.height_cm - 5.0 * f64::from(body.age) + sex_constant
}

/// How the calorie target was derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyBreakdown {
    pub bmr: f64,
    pub activity_multiplier: f64,
    pub tdee: f64,
    /// Calories never go below this.
    pub safe_min_calories: f64,
    pub deficit_cap: f64,
    pub surplus_cap: f64,
    /// Shift the user asked for (`HowFast` x 7700), before capping.
    pub requested_shift: f64,
    pub effective_deficit: f64,
    pub effective_surplus: f64,
    /// Unrounded calorie target.
    pub target_calories: f64,
    /// The rate the capped shift actually delivers, in kg per day.
    pub achievable_how_fast_kg_per_day: f64,
}

/// Work out TDEE and apply the goal shift within the safety caps.
pub fn energy_budget(
    body: &BodyMetrics,
    workouts: Option<i64>,
    goal: Goal,
    how_fast_kg_per_day: f64,
) -> EnergyBreakdown {
    let bmr = mifflin_st_jeor(body);
    let multiplier = activity_multiplier(workouts);
    let tdee = bmr * multiplier;

    let safe_min_calories = MIN_CALORIES.max(MIN_CALORIES_BMR_FRACTION * bmr);
    let deficit_cap = (MAX_DEFICIT_TDEE_FRACTION * tdee)
        .min(MAX_DEFICIT_KCAL.min(tdee - safe_min_calories))
        .max(0.0);
    let surplus_cap = MAX_SURPLUS_KCAL.min(MAX_SURPLUS_TDEE_FRACTION * tdee);

    let requested_shift = how_fast_kg_per_day.max(0.0) * KCAL_PER_KG_BODY_MASS;
    let (effective_deficit, effective_surplus) = match goal {
        Goal::Lose => (requested_shift.min(deficit_cap), 0.0),
        Goal::Gain => (0.0, requested_shift.min(surplus_cap)),
        Goal::Maintain => (0.0, 0.0),
    };

    let target_calories = safe_min_calories.max(tdee - effective_deficit + effective_surplus);

    EnergyBreakdown {
        bmr,
        activity_multiplier: multiplier,
        tdee,
        safe_min_calories,
        deficit_cap,
        surplus_cap,
        requested_shift,
        effective_deficit,
        effective_surplus,
        target_calories,
        achievable_how_fast_kg_per_day: (effective_deficit + effective_surplus)
            / KCAL_PER_KG_BODY_MASS,
    }
}

/// Targets plus the intermediate values behind them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCalculation {
    pub body: BodyMetrics,
    pub energy: EnergyBreakdown,
    pub targets: DailyTargets,
}

/// Compute the full set of daily targets for a profile.
///
/// `today` is the local date used for the age calculation.
///
/// # Errors
///
/// Returns [`PlanError::ProfileIncomplete`] if weight or height is missing.
pub fn calculate(profile: &UserProfile, today: NaiveDate) -> Result<TargetCalculation, PlanError> {
    let body = BodyMetrics::from_profile(profile, today)?;
    let energy = energy_budget(
        &body,
        profile.workouts,
        profile.goal,
        profile.how_fast.unwrap_or(0.0),
    );

    let calories = round_u32(energy.target_calories);
    let kcal = f64::from(calories);

    let kidney = profile.kidney_settings.as_ref();
    let heart = profile.heart_settings.as_ref();

    let water_ml = match kidney.and_then(|k| k.hydration_goal_cups) {
        Some(cups) => round_u32(cups * ML_PER_CUP),
        None => round_u32(MIN_WATER_ML.max((WATER_ML_PER_KG * body.weight_kg).round())),
    };

    let sodium_mg = [
        kidney.and_then(|k| k.sodium_limit_mg),
        heart.and_then(|h| h.sodium_limit_mg),
    ]
    .into_iter()
    .flatten()
    .reduce(f64::min)
    .map(round_u32)
    .unwrap_or(DEFAULT_SODIUM_MG as u32);

    let coffee_cups = profile
        .habit_settings
        .as_ref()
        .and_then(|h| h.coffee_per_day_target)
        .map(round_u32)
        .unwrap_or(DEFAULT_COFFEE_CUPS);

    let sat_fat_g = heart
        .and_then(|h| h.sat_fat_limit)
        .map(|limit| round_u32(sat_fat_fraction(limit) * kcal / KCAL_PER_G_FAT));

    let protein_g = round_u32(
        body.weight_kg * protein_g_per_kg(kidney.and_then(|k| k.protein_level), profile.goal),
    );
    let mut fat_g = round_u32(kcal * fat_fraction(profile.diet_preference_id.as_deref()) / KCAL_PER_G_FAT);
    let mut carbs_g = round_u32(
        (kcal - f64::from(protein_g) * KCAL_PER_G_PROTEIN - f64::from(fat_g) * KCAL_PER_G_FAT)
            .max(0.0)
            / KCAL_PER_G_CARBS,
    );

    let meals_per_day = profile
        .meals_per_day
        .filter(|m| *m > 0.0)
        .map(|m| round_u32(m).max(1))
        .unwrap_or(DEFAULT_MEALS_PER_DAY);

    let mut diabetes_daily_carb_g = None;
    let mut carb_per_meal_g = None;
    if let Some(per_meal) = profile
        .diabetes_settings
        .as_ref()
        .filter(|d| d.track_carbs)
        .and_then(|d| d.carb_target_per_meal)
    {
        let per_meal = per_meal.max(0.0);
        let daily = per_meal * f64::from(meals_per_day);

        if daily < f64::from(carbs_g) {
            carbs_g = round_u32(daily);
            // fat takes up the calories the carb cap freed
            let fat_kcal = kcal
                - f64::from(protein_g) * KCAL_PER_G_PROTEIN
                - f64::from(carbs_g) * KCAL_PER_G_CARBS;
            fat_g = round_u32(fat_kcal.max(0.0) / KCAL_PER_G_FAT);
            debug!(carbs_g, fat_g, "diabetes carb cap applied");
        }

        diabetes_daily_carb_g = Some(round_u32(daily));
        carb_per_meal_g = Some(round_u32(per_meal));
    }

    let sugar_g = round_u32(SUGAR_CALORIE_FRACTION * kcal / KCAL_PER_G_CARBS).min(carbs_g);
    let fiber_g = round_u32(MIN_FIBER_G.max((FIBER_G_PER_1000_KCAL * kcal / 1000.0).round()));

    debug!(
        bmr = energy.bmr,
        tdee = energy.tdee,
        calories,
        protein_g,
        carbs_g,
        fat_g,
        "computed daily targets"
    );

    Ok(TargetCalculation {
        body,
        energy,
        targets: DailyTargets {
            calories,
            water_ml,
            coffee_cups,
            protein_g,
            carbs_g,
            fat_g,
            sugar_g,
            fiber_g,
            sodium_mg,
            sat_fat_g,
            meals_per_day,
            diabetes_daily_carb_g,
            carb_per_meal_g,
        },
    })
}

/// Compute daily targets, dropping the intermediate values.
///
/// # Errors
///
/// Returns [`PlanError::ProfileIncomplete`] if weight or height is missing.
pub fn compute_targets(profile: &UserProfile, today: NaiveDate) -> Result<DailyTargets, PlanError> {
    calculate(profile, today).map(|c| c.targets)
}

/// Protein in g per kg of bodyweight. A kidney protein level wins over the goal.
fn protein_g_per_kg(kidney_level: Option<Level>, goal: Goal) -> f64 {
    match (kidney_level, goal) {
        (Some(Level::Low), _) => 0.6,
        (Some(Level::Moderate), _) => 0.8,
        (Some(Level::High), _) => 1.2,
        (None, Goal::Lose) => 1.2,
        (None, Goal::Gain) => 1.6,
        (None, Goal::Maintain) => 1.0,
    }
}

/// Share of calories from fat for a diet preference id.
fn fat_fraction(diet_preference: Option<&str>) -> f64 {
    let Some(diet) = diet_preference.map(str::to_ascii_lowercase) else {
        return DEFAULT_FAT_FRACTION;
    };

    if diet.contains("low_carb") {
        0.40
    } else if diet.contains("low-fat") || diet.contains("low_fat") {
        0.20
    } else {
        // high_protein and balanced both sit at the default
        DEFAULT_FAT_FRACTION
    }
}

fn sat_fat_fraction(limit: Level) -> f64 {
    match limit {
        Level::Low => 0.07,
        Level::Moderate => 0.10,
        Level::High => 0.13,
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn round_u32(value: f64) -> u32 {
    value.max(0.0).round() as u32
}
