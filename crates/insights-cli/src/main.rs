//! insights CLI: synthetic cohorts, miss networks and correlation reports.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use insights_core::selection::{AttemptWindow, CohortSplit};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "insights",
    version,
    about = "Synthetic assessment data and network analytics"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate score and Socratic tables as CSV
    Generate {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Number of students
        #[arg(long)]
        n_students: Option<usize>,

        /// Attempts per student
        #[arg(long)]
        n_attempts: Option<u32>,

        /// Output directory
        #[arg(long, default_value = "./insights-data")]
        output: PathBuf,
    },

    /// Classify misses and build networks
    Analyze {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Score table CSV (generated when omitted)
        #[arg(
            long,
            requires = "socratic",
            conflicts_with_all = ["seed", "n_students", "n_attempts"]
        )]
        scores: Option<PathBuf>,

        /// Socratic table CSV, long or wide
        #[arg(long, requires = "scores")]
        socratic: Option<PathBuf>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Number of students
        #[arg(long)]
        n_students: Option<usize>,

        /// Attempts per student
        #[arg(long)]
        n_attempts: Option<u32>,

        /// Scores below this value are misses
        #[arg(long)]
        miss_threshold: Option<f64>,

        /// Minimum misses for a subject to join a network
        #[arg(long)]
        min_misses: Option<u32>,

        /// Minimum |r| for a correlation edge
        #[arg(long)]
        min_abs_corr: Option<f64>,

        /// Student to profile
        #[arg(long)]
        student_id: Option<String>,

        /// Attempts to analyse: all, first:N or recent:N
        #[arg(long)]
        attempt_window: Option<AttemptWindow>,

        /// Cohort half for the networks: all, undergrad or graduate
        #[arg(long)]
        cohort: Option<CohortSplit>,

        /// Criterion whose elements get their own co-miss network
        #[arg(long)]
        focus_criterion: Option<String>,

        /// Output directory
        #[arg(long, default_value = "./insights-results")]
        output: PathBuf,

        /// Output format: json, html, all
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Compare two analysis reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Exit code 1 if any classification changed
        #[arg(long)]
        fail_on_change: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check a config file
    Validate {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter insights.toml
    Init,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("insights=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            config,
            seed,
            n_students,
            n_attempts,
            output,
        } => commands::generate::execute(
            config,
            commands::generate::CohortOverrides {
                seed,
                n_students,
                n_attempts,
            },
            output,
        ),
        Commands::Analyze {
            config,
            scores,
            socratic,
            seed,
            n_students,
            n_attempts,
            miss_threshold,
            min_misses,
            min_abs_corr,
            student_id,
            attempt_window,
            cohort,
            focus_criterion,
            output,
            format,
        } => commands::analyze::execute(commands::analyze::AnalyzeArgs {
            config,
            scores,
            socratic,
            generated: commands::generate::CohortOverrides {
                seed,
                n_students,
                n_attempts,
            },
            miss_threshold,
            min_misses,
            min_abs_corr,
            student_id,
            attempt_window,
            cohort,
            focus_criterion,
            output,
            format,
        }),
        Commands::Compare {
            baseline,
            current,
            fail_on_change,
            format,
        } => commands::compare::execute(baseline, current, fail_on_change, format),
        Commands::Validate { config } => commands::validate::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
