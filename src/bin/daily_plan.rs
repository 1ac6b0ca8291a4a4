//! Print the signed-in user's targets, today's totals and what is left.
//!
//! Reads Firebase settings and `DAILY_PLAN_EMAIL` / `DAILY_PLAN_PASSWORD`
//! from the environment (a `.env` file is loaded if present). With
//! `--watch`, keeps both providers running and prints every update until
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use daily_plan::config::{FirebaseConfig, ProviderConfig};
use daily_plan::provider::{DailyLeftProvider, DailyPlanProvider, LeftState, PlanState};
use daily_plan::DailyPlanClient;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daily-plan", about = "Daily nutrition targets and what is left of them today")]
struct Cli {
    /// Keep running and print every provider update
    #[arg(long)]
    watch: bool,

    /// Refresh interval in seconds for --watch (overrides DAILY_PLAN_REFRESH_SECS)
    #[arg(long, value_name = "SECS", requires = "watch")]
    refresh_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("daily_plan=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = FirebaseConfig::from_env()?;
    let email = std::env::var("DAILY_PLAN_EMAIL").context("DAILY_PLAN_EMAIL is not set")?;
    let password = std::env::var("DAILY_PLAN_PASSWORD").context("DAILY_PLAN_PASSWORD is not set")?;

    let client = DailyPlanClient::login(config, &email, &password).await?;

    if cli.watch {
        let config = match cli.refresh_secs {
            Some(secs) => ProviderConfig::new(Duration::from_secs(secs)),
            None => ProviderConfig::from_env()?,
        };
        return watch_loop(client, config).await;
    }

    let targets = client.daily_targets().await.context("no targets")?;
    let today = client.today_totals().await.context("no totals")?;

    let report = json!({
        "targets": targets,
        "today": today,
        "remaining": targets.remaining(&today),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn watch_loop(client: DailyPlanClient, config: ProviderConfig) -> Result<()> {
    let uid = client.get_user_id().await?;
    let store = Arc::new(client);

    let (_identity, identity_rx) = watch::channel(Some(uid));
    let plan = DailyPlanProvider::spawn(store.clone(), identity_rx.clone(), config.clone());
    let left = DailyLeftProvider::spawn(store, identity_rx, config);

    let mut plan_rx = plan.subscribe();
    let mut left_rx = left.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = plan_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = left_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let plan_state = plan_rx.borrow_and_update().clone();
        let left_state = left_rx.borrow_and_update().clone();
        println!("{}", serde_json::to_string(&report(&plan_state, &left_state))?);
    }

    Ok(())
}

fn report(plan: &PlanState, left: &LeftState) -> Value {
    let remaining = match (&plan.value, &left.value) {
        (Some(targets), Some(today)) if !left.loading => Some(targets.remaining(today)),
        _ => None,
    };

    json!({
        "targets": plan.value,
        "targetsLoading": plan.loading,
        "targetsError": plan.error,
        "today": left.value,
        "todayLoading": left.loading,
        "todayError": left.error,
        "remaining": remaining,
    })
}
