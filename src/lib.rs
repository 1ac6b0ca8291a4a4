pub mod aggregate;
pub mod auth;
pub mod client;
pub mod config;
pub mod day;
pub mod error;
pub mod firestore;
pub mod models;
pub mod provider;
pub mod store;
pub mod targets;
pub mod units;

pub use aggregate::aggregate_events;
pub use client::DailyPlanClient;
pub use error::PlanError;
pub use models::{ConsumptionEvent, DailyConsumedTotals, DailyTargets, UserProfile};
pub use targets::compute_targets;
