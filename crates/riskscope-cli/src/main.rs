mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::percentile::PercentileArgs;
use commands::report::{EntityArgs, ReportArgs};
use commands::score::ScoreArgs;

/// Corporate default-risk reports with feature attribution and peer benchmarks
#[derive(Parser)]
#[command(
    name = "riskscope",
    version,
    about = "Corporate default-risk reports with feature attribution and peer benchmarks",
    long_about = "A CLI for scoring a company's bankruptcy risk from tabular financial, \
                  macroeconomic and text-sentiment features. Explains the score per feature, \
                  benchmarks each feature against industry and population baselines, and \
                  classifies five risk categories into ok / caution / alert."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// TOML file with thresholds, directions and table schema
    #[arg(long, env = "RISKSCOPE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity to debug
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the full risk report for one company
    Report(ReportArgs),
    /// Top risk and top mitigating factors for one company
    Factors(EntityArgs),
    /// Print the narrative prompt without calling any service
    Prompt(EntityArgs),
    /// Score a raw feature vector (JSON) through the classifier
    Score(ScoreArgs),
    /// Percentile score of one value against the company population
    Percentile(PercentileArgs),
    /// Show the category routing rules and thresholds in effect
    Rules,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "riskscope=info,riskscope_core=info",
        _ => "riskscope=debug,riskscope_core=debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Version = cli.command {
        println!("riskscope {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Report(args) => commands::report::run_report(args, &config),
        Commands::Factors(args) => commands::report::run_factors(args, &config),
        Commands::Prompt(args) => commands::report::run_prompt(args, &config),
        Commands::Score(args) => commands::score::run_score(args, &config),
        Commands::Percentile(args) => commands::percentile::run_percentile(args, &config),
        Commands::Rules => commands::rules::run_rules(&config),
        Commands::Version => unreachable!("handled above"),
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
