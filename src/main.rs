use anyhow::{Context, Result};
use clap::Parser;
use energy_load_forecaster::cli::{Cli, Command};
use energy_load_forecaster::config::Config;
use energy_load_forecaster::pipeline::FamilyOutcome;
use energy_load_forecaster::tracking::Trackers;
use energy_load_forecaster::{api, pipeline, telemetry};
use tracing::{info, warn};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format);

    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "config file not found, using defaults and environment");
    }
    let cfg = Config::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    info!(command = cli.command.name(), "starting");
    match cli.command {
        Command::Analyze => {
            pipeline::analyze(&cfg)?;
        }
        Command::Engineer => {
            pipeline::engineer(&cfg)?;
        }
        Command::Preprocess => {
            pipeline::preprocess(&cfg)?;
        }
        Command::Train => {
            let summary = pipeline::train(&cfg, &Trackers::from_config(&cfg))?;
            info!(model = %summary.best, mse = summary.best_metrics.mse, "training complete");
        }
        Command::Tune => {
            let summary = pipeline::tune(&cfg, &Trackers::from_config(&cfg))?;
            for family in &summary.families {
                match &family.outcome {
                    FamilyOutcome::Tuned {
                        cv_mse,
                        validation,
                        evaluated,
                        failed,
                        ..
                    } => info!(
                        model = %family.kind,
                        evaluated,
                        failed,
                        cv_mse,
                        validation_mse = validation.mse,
                        "family tuned"
                    ),
                    FamilyOutcome::Failed { error } => warn!(
                        model = %family.kind,
                        configurations = family.configurations,
                        error = %error,
                        "family skipped"
                    ),
                }
            }
            info!(model = %summary.best, "tuning complete");
        }
        Command::Forecast => {
            let report = pipeline::forecast(&cfg, &Trackers::from_config(&cfg))?;
            info!(mse = report.metrics.mse, "forecast complete");
        }
        Command::Serve => {
            if cfg.server.host == "0.0.0.0" {
                warn!("binding to 0.0.0.0, the prediction service is reachable from the network");
            }
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?
                .block_on(api::serve(cfg))?;
        }
    }
    Ok(())
}
