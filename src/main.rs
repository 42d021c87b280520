//! Next-close forecaster CLI.
//!
//! Trains the LSTM + boosted-tree ensemble on daily bars, reports holdout and
//! walk-forward metrics, and predicts the next close from a saved model.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rustforecast::application::pipeline::{ForecastPipeline, HoldoutReport, fetch_bars};
use rustforecast::config::ForecastConfig;
use rustforecast::domain::market::PriceBar;
use rustforecast::domain::ml::EnsembleWeights;
use rustforecast::domain::ports::MarketDataProvider;
use rustforecast::infrastructure::{CsvMarketDataProvider, ModelStore, SyntheticMarketData};
use std::path::PathBuf;
use tracing::{Level, info};

#[derive(Parser)]
#[command(author, version, about = "Ensemble next-close forecaster", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Ticker symbol
    #[arg(short, long, default_value = "000001.SZ")]
    symbol: String,

    /// Start date (YYYY-MM-DD)
    #[arg(long, default_value = "2020-01-01")]
    start: String,

    /// End date (YYYY-MM-DD)
    #[arg(long, default_value = "2023-12-31")]
    end: String,

    /// CSV file or directory of <symbol>.csv files. Synthetic data when omitted.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Seed for synthetic data
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a chronological split, report holdout metrics and save the model
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// Output file for the trained model
        #[arg(short, long, default_value = "forecaster.json")]
        output: PathBuf,

        /// Write the holdout report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// LSTM share of the blend in [0, 1]; trees get the rest
        #[arg(long)]
        lstm_weight: Option<f64>,
    },
    /// Walk-forward cross-validation
    CrossValidate {
        #[command(flatten)]
        data: DataArgs,

        /// Number of folds (overrides configuration)
        #[arg(long)]
        splits: Option<usize>,
    },
    /// Predict the next close with a saved model
    Predict {
        #[command(flatten)]
        data: DataArgs,

        /// Trained model file
        #[arg(short, long, default_value = "forecaster.json")]
        model: PathBuf,

        /// LSTM share of the blend in [0, 1]; trees get the rest
        #[arg(long)]
        lstm_weight: Option<f64>,
    },
    /// Run the full flow on synthetic data with a reduced configuration
    Demo {
        /// Number of synthetic trading days
        #[arg(long, default_value = "300")]
        days: usize,

        /// LSTM share of the blend in [0, 1]; trees get the rest
        #[arg(long)]
        lstm_weight: Option<f64>,
    },
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

fn load_config(path: Option<&PathBuf>) -> Result<ForecastConfig> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            ForecastConfig::from_toml_file(path)?
        }
        None => ForecastConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn load_bars(args: &DataArgs) -> Result<Vec<PriceBar>> {
    let start = parse_date(&args.start)?;
    let end = parse_date(&args.end)?;
    let provider: Box<dyn MarketDataProvider> = match &args.data {
        Some(path) => Box::new(CsvMarketDataProvider::new(path.clone())),
        None => Box::new(SyntheticMarketData::new(args.seed)),
    };
    Ok(fetch_bars(provider.as_ref(), &args.symbol, start, end)?)
}

fn apply_lstm_weight(pipeline: &mut ForecastPipeline, share: Option<f64>) -> Result<()> {
    if let Some(share) = share {
        let weights = EnsembleWeights::from_sequence_share(share)?;
        info!(
            "Blend weights set to LSTM {:.2}, trees {:.2}",
            weights.sequence(),
            weights.tree()
        );
        pipeline.set_weights(weights);
    }
    Ok(())
}

fn print_holdout(report: &HoldoutReport) {
    println!("\n{}", "=".repeat(64));
    println!(
        "Holdout: {} training windows, {} test windows",
        report.train_windows, report.test_windows
    );
    println!(
        "Weights: sequence {:.2}, tree {:.2}",
        report.weights.sequence(),
        report.weights.tree()
    );
    println!("{:<12} {:>12} {:>12} {:>12} {:>8}", "Model", "MSE", "RMSE", "MAE", "R2");
    for (name, m) in [
        ("LSTM", &report.sequence_metrics),
        ("Trees", &report.tree_metrics),
        ("Ensemble", &report.ensemble_metrics),
    ] {
        println!(
            "{:<12} {:>12.4} {:>12.4} {:>12.4} {:>8.4}",
            name, m.mse, m.rmse, m.mae, m.r2
        );
    }
    println!("{}", "=".repeat(64));
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            output,
            report,
            lstm_weight,
        } => {
            let config = load_config(cli.config.as_ref())?;
            let bars = load_bars(&data)?;
            let mut pipeline = ForecastPipeline::new(config)?;
            apply_lstm_weight(&mut pipeline, lstm_weight)?;

            let holdout = pipeline.run_holdout(&bars)?;
            print_holdout(&holdout);

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&holdout)
                    .context("Failed to serialize holdout report")?;
                std::fs::write(&path, json).context("Failed to write holdout report")?;
                info!("Holdout report written to {:?}", path);
            }

            ModelStore::new(output).save(&pipeline)?;
        }
        Commands::CrossValidate { data, splits } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(k) = splits {
                config.pipeline.cv_splits = k;
            }
            let bars = load_bars(&data)?;
            let mut pipeline = ForecastPipeline::new(config)?;
            let dataset = pipeline.prepare(&bars)?;

            let report = pipeline.cross_validate(&dataset)?;
            println!("{:<6} {:>14} {:>14} {:>10} {:>10}", "Fold", "Train", "Validation", "RMSE", "R2");
            for fold in &report.folds {
                println!(
                    "{:<6} {:>14} {:>14} {:>10.4} {:>10.4}",
                    fold.fold,
                    format!("{}..{}", fold.train.start, fold.train.end),
                    format!("{}..{}", fold.validation.start, fold.validation.end),
                    fold.metrics.rmse,
                    fold.metrics.r2
                );
            }
            println!(
                "Mean: MSE {:.4}, RMSE {:.4}, MAE {:.4}, R2 {:.4}",
                report.mean.mse, report.mean.rmse, report.mean.mae, report.mean.r2
            );
        }
        Commands::Predict {
            data,
            model,
            lstm_weight,
        } => {
            let mut pipeline = ModelStore::new(model).load()?;
            apply_lstm_weight(&mut pipeline, lstm_weight)?;
            let bars = load_bars(&data)?;
            let next = pipeline.predict_next(&bars)?;
            println!(
                "{} next close after {}: ensemble {:.4} (LSTM {:.4}, trees {:.4})",
                data.symbol, next.as_of, next.ensemble, next.sequence, next.tree
            );
        }
        Commands::Demo { days, lstm_weight } => {
            let mut config = match cli.config.as_ref() {
                Some(path) => ForecastConfig::from_toml_file(path)?,
                None => ForecastConfig::default(),
            };
            config.sequence.epochs = config.sequence.epochs.min(10);
            config.tree.n_estimators = config.tree.n_estimators.min(200);
            config.validate()?;

            let start = parse_date("2022-01-03")?;
            let bars = SyntheticMarketData::new(42).generate(start, days);
            info!("Generated {} synthetic bars", bars.len());

            let mut pipeline = ForecastPipeline::new(config)?;
            apply_lstm_weight(&mut pipeline, lstm_weight)?;
            let holdout = pipeline.run_holdout(&bars)?;
            print_holdout(&holdout);

            let next = pipeline.predict_next(&bars)?;
            println!(
                "Next close after {}: ensemble {:.4} (LSTM {:.4}, trees {:.4})",
                next.as_of, next.ensemble, next.sequence, next.tree
            );
        }
    }

    Ok(())
}
