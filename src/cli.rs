//! Command-line interface of the `elf` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_FILE;
use crate::telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "elf")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Energy load forecasting: feature engineering, model selection and a prediction API")]
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Exploratory analysis of the raw datasets
    Analyze,
    /// Missing values, calendar features, generation mix and outlier clipping
    Engineer,
    /// Fit and persist encoders and the scaler; write the final feature files
    Preprocess,
    /// Train the default candidates and keep the best
    Train,
    /// Cross-validated grid search over the tree ensembles
    Tune,
    /// Fit and evaluate the seasonal ARIMA model on the load series
    Forecast,
    /// Serve predictions over HTTP
    Serve,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Analyze => "analyze",
            Command::Engineer => "engineer",
            Command::Preprocess => "preprocess",
            Command::Train => "train",
            Command::Tune => "tune",
            Command::Forecast => "forecast",
            Command::Serve => "serve",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["elf", "train", "--config", "custom.toml"]).unwrap();
        assert_eq!(cli.command, Command::Train);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["elf", "serve", "--log-format", "json"]).unwrap();
        assert_eq!(cli.command.name(), "serve");
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["elf", "deploy"]).is_err());
    }
}
