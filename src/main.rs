use aa_engine::error::PipelineError;
use aa_engine::polarity::RankingSentimentPolicy;
use aa_engine::{heads, pipeline, wind};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aa")]
#[command(about = "Indicator extraction pipeline and analysis report generator")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the configured source sheets and write the merged artifact
    Prepare {
        /// Extraction configuration workbook
        #[arg(long, env = "AA_CONFIG", default_value = "config/data_extraction_config.xlsx")]
        config: PathBuf,

        /// Directory holding the source spreadsheets
        #[arg(long, env = "AA_RAW_DIR", default_value = "data/raw")]
        raw_dir: PathBuf,

        /// Artifact workbook to write
        #[arg(long, env = "AA_OUTPUT", default_value = "data/processed/data_preprocessed.xlsx")]
        output: PathBuf,
    },
    /// Render markdown reports from a prepared artifact
    Report {
        /// Extraction configuration workbook (keyword sheets only)
        #[arg(long, env = "AA_CONFIG", default_value = "config/data_extraction_config.xlsx")]
        config: PathBuf,

        /// Report layout (YAML)
        #[arg(long, env = "AA_REPORT_CONFIG", default_value = "config/report_config.yaml")]
        report_config: PathBuf,

        /// Artifact workbook written by `prepare`
        #[arg(long, env = "AA_DATA", default_value = "data/processed/data_preprocessed.xlsx")]
        data: PathBuf,

        /// Output directory for the markdown files
        #[arg(long, env = "AA_REPORTS_DIR", default_value = "reports")]
        out_dir: PathBuf,

        /// Ranking sentiment policy: legacy or symmetric
        #[arg(long, env = "AA_RANKING_SENTIMENT", default_value = "legacy")]
        ranking_sentiment: RankingSentimentPolicy,
    },
    /// Dump the header region of every extraction rule for checking row ranges
    Heads {
        /// Extraction configuration workbook
        #[arg(long, env = "AA_CONFIG", default_value = "config/data_extraction_config.xlsx")]
        config: PathBuf,

        /// Directory holding the source spreadsheets
        #[arg(long, env = "AA_RAW_DIR", default_value = "data/raw")]
        raw_dir: PathBuf,

        /// Workbook to write, one page per source sheet
        #[arg(long, env = "AA_HEADS_OUTPUT", default_value = "data/processed/table_heads.xlsx")]
        output: PathBuf,
    },
    /// Pivot a Wind export into a sheet usable by a standard rule
    ReshapeWind {
        /// Wind export workbook
        #[arg(long)]
        input: PathBuf,

        /// Sheet of the export to pivot
        #[arg(long, default_value = "业务指标")]
        sheet: String,

        /// Workbook to write
        #[arg(long)]
        output: PathBuf,
    },
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Prepare { config, raw_dir, output } => {
            let summary = pipeline::prepare(&config, &raw_dir, &output)
                .with_context(|| format!("prepare failed for {}", config.display()))?;
            info!(
                "prepared {} ({} raw tables, {} long rows)",
                summary.output.display(),
                summary.raw_tables,
                summary.long_rows
            );
        }
        Commands::Report { config, report_config, data, out_dir, ranking_sentiment } => {
            let written = pipeline::generate_reports(&config, &report_config, &data, &out_dir, ranking_sentiment)
                .with_context(|| format!("report generation failed for {}", report_config.display()))?;
            info!("{} reports written to {}", written.len(), out_dir.display());
        }
        Commands::Heads { config, raw_dir, output } => {
            let summary = heads::dump_heads(&config, &raw_dir, &output)
                .with_context(|| format!("header dump failed for {}", config.display()))?;
            info!("{} header pages written to {}", summary.pages, summary.output.display());
        }
        Commands::ReshapeWind { input, sheet, output } => {
            let rows = wind::reshape_wind(&input, &sheet, &output)
                .with_context(|| format!("reshape failed for {}", input.display()))?;
            info!("{} rows written to {}", rows, output.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(3);
            ExitCode::from(code)
        }
    }
}
