//! CLI entry point for the shelter availability analysis.
//!
//! Provides subcommands for building the merged table from the source CSVs,
//! fitting the model on a previously merged table, or running both.

use anyhow::Result;
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use shelter_model::config::SourcesConfig;
use shelter_model::model::{Factor, FitOptions, IrlsConfig, ModelSpec};
use shelter_model::output::{render_report, write_json, write_records, write_summary};
use shelter_model::pipeline::{AnalysisReport, analyze, load_merged, prepare};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "shelter_model")]
#[command(
    about = "Merge shelter occupancy with crime, weather and economic data and model bed availability",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, merge and clean the sources, then write the merged table
    Merge {
        /// JSON file listing the source CSVs
        #[arg(short, long, default_value = "sources.json")]
        sources: PathBuf,

        /// CSV file to write the merged table to
        #[arg(short, long, default_value = "output/merged.csv")]
        output: PathBuf,
    },
    /// Fit the model on a merged table written by `merge`
    Fit {
        /// Merged table CSV
        #[arg(short, long, default_value = "output/merged.csv")]
        input: PathBuf,

        /// Directory for the summary CSV and JSON report
        #[arg(short = 'd', long, default_value = "output")]
        out_dir: PathBuf,

        #[command(flatten)]
        fit: FitArgs,
    },
    /// Merge the sources and fit the model in one pass
    Run {
        /// JSON file listing the source CSVs
        #[arg(short, long, default_value = "sources.json")]
        sources: PathBuf,

        /// Directory for the merged table, summary CSV and JSON report
        #[arg(short = 'd', long, default_value = "output")]
        out_dir: PathBuf,

        #[command(flatten)]
        fit: FitArgs,
    },
}

#[derive(Args)]
struct FitArgs {
    /// Probability at or above which a program is classified as available
    #[arg(long, default_value_t = 0.5, value_parser = parse_probability)]
    threshold: f64,

    /// Maximum IRLS iterations
    #[arg(
        long,
        default_value_t = 25,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_iter: usize,

    /// Convergence tolerance on the relative deviance change
    #[arg(long, default_value_t = 1e-8, value_parser = parse_positive)]
    tolerance: f64,

    /// Leave the neighbourhood factor out of the model
    #[arg(long, default_value_t = false)]
    no_neighbourhood: bool,
}

impl FitArgs {
    fn spec(&self) -> ModelSpec {
        let spec = ModelSpec::default();
        if self.no_neighbourhood {
            spec.without_factor(Factor::Neighbourhood)
        } else {
            spec
        }
    }

    fn options(&self) -> FitOptions {
        FitOptions {
            irls: IrlsConfig {
                max_iterations: self.max_iter,
                tolerance: self.tolerance,
                ..IrlsConfig::default()
            },
            threshold: self.threshold,
            ..FitOptions::default()
        }
    }
}

fn parse_probability(text: &str) -> Result<f64, String> {
    let value: f64 = text.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not between 0 and 1"))
    }
}

fn parse_positive(text: &str) -> Result<f64, String> {
    let value: f64 = text.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not a positive number"))
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/shelter_model.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("shelter_model.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Merge { sources, output } => {
            let config = SourcesConfig::load(&sources)?;
            let prepared = prepare(&config)?;
            write_records(&output, &prepared.records)?;
        }
        Commands::Fit {
            input,
            out_dir,
            fit,
        } => {
            let records = load_merged(&input)?;
            let report = analyze(&records, &fit.spec(), &fit.options(), None)?;
            publish(&report, &out_dir)?;
        }
        Commands::Run {
            sources,
            out_dir,
            fit,
        } => {
            let config = SourcesConfig::load(&sources)?;
            let prepared = prepare(&config)?;
            write_records(&out_dir.join("merged.csv"), &prepared.records)?;

            let report = analyze(
                &prepared.records,
                &fit.spec(),
                &fit.options(),
                Some((&prepared.merge, &prepared.cleaning)),
            )?;
            publish(&report, &out_dir)?;
        }
    }

    Ok(())
}

/// Writes the summary CSV and JSON report to `out_dir` and prints the report.
#[tracing::instrument(skip(report), fields(out_dir = %out_dir.display()))]
fn publish(report: &AnalysisReport, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    write_summary(&out_dir.join("model_summary.csv"), report)?;
    write_json(&out_dir.join("model_report.json"), report)?;

    println!("{}", render_report(report));
    info!("Analysis complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit_args(extra: &[&str]) -> Result<FitArgs, clap::Error> {
        let args = ["shelter_model", "fit"].iter().chain(extra);
        match Cli::try_parse_from(args)?.command {
            Commands::Fit { fit, .. } => Ok(fit),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_fit_defaults() {
        let fit = fit_args(&[]).unwrap();
        let options = fit.options();

        assert_eq!(options.threshold, 0.5);
        assert_eq!(options.irls.max_iterations, 25);
        assert_eq!(options.irls.tolerance, 1e-8);
        assert_eq!(fit.spec(), ModelSpec::default());
    }

    #[test]
    fn test_no_neighbourhood_flag() {
        let fit = fit_args(&["--no-neighbourhood", "--threshold", "0.3"]).unwrap();

        assert_eq!(fit.options().threshold, 0.3);
        assert_eq!(fit.spec(), ModelSpec::default().without_factor(Factor::Neighbourhood));
    }

    #[test]
    fn test_rejects_out_of_range_fit_flags() {
        assert!(fit_args(&["--threshold", "1.5"]).is_err());
        assert!(fit_args(&["--threshold", "-0.1"]).is_err());
        assert!(fit_args(&["--max-iter", "0"]).is_err());
        assert!(fit_args(&["--tolerance", "0"]).is_err());
        assert!(fit_args(&["--tolerance", "-1e-6"]).is_err());
        assert!(fit_args(&["--tolerance", "abc"]).is_err());
    }
}
