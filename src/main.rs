use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use distress_insight_engine::insight_core::FEATURE_CATALOGUE;
use distress_insight_engine::{DistressDetector, PipelineConfig, RawBatch};
use serde_json::json;
use tracing::error;

#[derive(Parser)]
#[command(name = "distress-insight-engine")]
#[command(author = "Hummer Team")]
#[command(version = "0.1.0")]
#[command(about = "Flags tourist telemetry records that indicate possible distress", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit on a training file and score a second file
    Detect {
        /// Training telemetry
        #[arg(long)]
        train: PathBuf,

        /// Telemetry to score
        #[arg(long)]
        test: PathBuf,

        /// Input file format
        #[arg(short, long, value_enum, default_value_t = InputFormat::Csv)]
        format: InputFormat,

        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of ranked cases in the report (overrides the config)
        #[arg(long)]
        top: Option<usize>,

        /// What to print
        #[arg(short, long, value_enum, default_value_t = OutputKind::Both)]
        output: OutputKind,
    },

    /// Print the model feature catalogue in column order
    Catalogue,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    Csv,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputKind {
    Records,
    Report,
    Both,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Detect {
            train,
            test,
            format,
            config,
            top,
            output,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_file(path)?,
                None => PipelineConfig::default(),
            };
            if let Some(top) = top {
                config.top_n = top;
            }

            let detector = DistressDetector::new(config)?;
            let training = load(&train, format)?;
            let trained = detector.fit(&training)?;
            let scored = detector.score(&load(&test, format)?)?;

            let mut result = serde_json::Map::new();
            result.insert(
                "training".to_string(),
                json!({
                    "summary": detector.training_summary(),
                    "report": detector.analyze(&trained),
                }),
            );
            if output != OutputKind::Report {
                result.insert("records".to_string(), serde_json::to_value(&scored.records)?);
            }
            if output != OutputKind::Records {
                result.insert(
                    "report".to_string(),
                    serde_json::to_value(detector.analyze(&scored))?,
                );
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Catalogue => {
            for (column, name) in FEATURE_CATALOGUE.iter().enumerate() {
                println!("{column:>2}  {name}");
            }
        }
    }

    Ok(())
}

fn load(path: &Path, format: InputFormat) -> anyhow::Result<RawBatch> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match format {
        InputFormat::Csv => RawBatch::from_csv(name, &content),
        InputFormat::Json => RawBatch::from_json(name, &content),
    }
    .with_context(|| format!("failed to parse {}", path.display()))
}
