use anyhow::{Context, Result};
use clap::Parser;
use quality_core_rs::{cli, config, db};
use quality_core_rs::services::cell_events::{
    aggregate_change_events, recommended_dates, write_events_csv,
};
use quality_core_rs::services::cell_events::periods::detect_all_periods;
use quality_core_rs::services::evaluation::{self, EvaluationRequest};
use quality_core_rs::services::evaluation::types::{reference_metric_set, EvalOptions};
use quality_core_rs::store::pg::PgStore;
use quality_core_rs::store::TrafficStore;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::CoreConfig::from_env()?;
    let pool = db::connect_lazy(&config.database_url)?;
    let store = PgStore::new(pool);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_cancel.cancel();
        }
    });

    match args.command {
        cli::Command::Evaluate {
            site,
            date,
            neighbors,
            threshold,
            period,
            guard,
        } => {
            let defaults = config.eval_options();
            let options = EvalOptions {
                threshold: threshold.unwrap_or(defaults.threshold),
                period_days: period.unwrap_or(defaults.period_days),
                guard_days: guard.unwrap_or(defaults.guard_days),
            };
            let request = EvaluationRequest {
                site: &site,
                neighbors: &neighbors,
                input_date: date,
                options,
            };
            let evaluation = evaluation::evaluate(
                &store,
                &request,
                &reference_metric_set(),
                config.retry_policy(),
                &cancel,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }
        cli::Command::DetectPeriods { tech, min_run } => {
            let tech = tech.into();
            let rows = store.active_traffic_days(tech, None).await?;
            let periods = detect_all_periods(&rows, min_run.unwrap_or(config.min_run_days));
            tracing::info!(
                rows = rows.len(),
                periods = periods.len(),
                "traffic period rebuild complete"
            );
            println!("{}", serde_json::to_string_pretty(&periods)?);
        }
        cli::Command::ChangeEvents {
            site,
            tech,
            min_run,
            csv,
        } => {
            let tech = tech.into();
            let metadata = store.cell_metadata(Some(&site)).await?;
            let cells: Vec<String> = metadata.iter().map(|meta| meta.cell.clone()).collect();
            let rows = store.active_traffic_days(tech, Some(&cells)).await?;
            let periods = detect_all_periods(&rows, min_run.unwrap_or(config.min_run_days));
            let events = aggregate_change_events(&site, tech, &periods, &metadata);
            tracing::info!(
                site = %site,
                events = events.len(),
                candidate_dates = recommended_dates(&events).len(),
                "change event rebuild complete"
            );
            match csv {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    write_events_csv(&events, file)?;
                }
                None => println!("{}", serde_json::to_string_pretty(&events)?),
            }
        }
    }

    Ok(())
}
