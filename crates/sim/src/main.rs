use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workpool_dispatch::DispatcherConfig;

mod simulation;

use simulation::{SimConfig, Simulation};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; real environment variables take precedence
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workpool_sim=info,workpool_dispatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("workpool-sim starting...");

    let dispatch_config = DispatcherConfig::from_env();
    let sim_config = SimConfig::from_env();

    tracing::info!(
        worker_count = dispatch_config.worker_count,
        max_queued = dispatch_config.max_queued,
        overflow_policy = %dispatch_config.overflow_policy,
        tasks = sim_config.tasks,
        pin_ratio = sim_config.pin_ratio,
        "Configuration loaded"
    );

    let simulation =
        Simulation::new(&dispatch_config, sim_config).context("Failed to create simulation")?;

    let report = tokio::select! {
        result = simulation.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            simulation.shutdown();
            tracing::info!(stats = ?simulation.dispatcher().stats(), "Stopped early");
            return Ok(());
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    tracing::info!("Simulation complete");
    Ok(())
}
