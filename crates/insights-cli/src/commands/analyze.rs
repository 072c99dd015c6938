//! The `insights analyze` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use insights_core::config::load_config_from;
use insights_core::pipeline::{Pipeline, ProgressReporter, Stage};
use insights_core::report::AnalysisReport;
use insights_core::selection::{AttemptWindow, CohortSplit};
use insights_report::csv::{read_scores_file, read_socratic_file};
use insights_report::html::write_html_report;

use super::generate::CohortOverrides;

/// File names written into the output directory.
pub const JSON_REPORT: &str = "report.json";
pub const HTML_REPORT: &str = "report.html";

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_stage_start(&self, stage: Stage) {
        tracing::debug!(%stage, "stage started");
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        if detail.is_empty() {
            eprintln!("  Done: {stage}");
        } else {
            eprintln!("  Done: {stage} ({detail})");
        }
    }

    fn on_pipeline_complete(&self, elapsed: Duration) {
        eprintln!("\nComplete ({:.1}s)", elapsed.as_secs_f64());
    }
}

pub struct AnalyzeArgs {
    pub config: Option<PathBuf>,
    pub scores: Option<PathBuf>,
    pub socratic: Option<PathBuf>,
    /// Generator overrides; only meaningful without `scores`.
    pub generated: CohortOverrides,
    pub miss_threshold: Option<f64>,
    pub min_misses: Option<u32>,
    pub min_abs_corr: Option<f64>,
    pub student_id: Option<String>,
    pub attempt_window: Option<AttemptWindow>,
    pub cohort: Option<CohortSplit>,
    pub focus_criterion: Option<String>,
    pub output: PathBuf,
    pub format: String,
}

pub fn execute(args: AnalyzeArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    args.generated.apply(&mut config);
    if let Some(t) = args.miss_threshold {
        config.analysis.miss_threshold = t;
    }
    if let Some(m) = args.min_misses {
        config.analysis.min_misses = m;
    }
    if let Some(r) = args.min_abs_corr {
        config.analysis.min_abs_corr = r;
    }
    if let Some(id) = args.student_id {
        config.analysis.student_id = id;
    }
    if let Some(window) = args.attempt_window {
        config.analysis.attempt_window = window;
    }
    if let Some(cohort) = args.cohort {
        config.analysis.cohort = cohort;
    }
    if let Some(criterion) = args.focus_criterion {
        config.analysis.focus_criterion = Some(criterion);
    }

    let formats: Vec<&str> = if args.format == "all" {
        vec!["json", "html"]
    } else {
        args.format.split(',').map(str::trim).collect()
    };
    for fmt in &formats {
        anyhow::ensure!(
            matches!(*fmt, "json" | "html"),
            "unknown format '{fmt}' (expected json, html or all)"
        );
    }

    let pipeline = Pipeline::new(config);
    let reporter = ConsoleReporter;

    let report = match (&args.scores, &args.socratic) {
        (Some(scores_path), Some(socratic_path)) => {
            let taxonomy = pipeline.config().resolve_taxonomy()?;
            let scores = read_scores_file(scores_path, &taxonomy)?;
            let socratic = read_socratic_file(socratic_path)?;
            eprintln!(
                "insights v{}: analysing {} ({} scores) and {} ({} values)",
                env!("CARGO_PKG_VERSION"),
                scores_path.display(),
                scores.len(),
                socratic_path.display(),
                socratic.len()
            );
            pipeline
                .analyze(&scores, &socratic, &reporter)
                .context("analysis failed")?
        }
        (None, None) => {
            let g = &pipeline.config().generator;
            eprintln!(
                "insights v{}: analysing {} generated students x {} attempts (seed {})",
                env!("CARGO_PKG_VERSION"),
                g.n_students,
                g.n_attempts,
                g.seed
            );
            pipeline.run(&reporter).context("analysis failed")?
        }
        _ => anyhow::bail!("--scores and --socratic must be given together"),
    };

    print_summary(&report);

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = args.output.join(JSON_REPORT);
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            _ => {
                let path = args.output.join(HTML_REPORT);
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
        }
    }

    Ok(())
}

fn print_summary(report: &AnalysisReport) {
    let counts = &report.miss_counts;
    let mut misses = Table::new();
    let mut header = vec!["Subject".to_string()];
    header.extend(counts.columns.iter().cloned());
    misses.set_header(header);
    for row in &counts.rows {
        let mut cells = vec![Cell::new(row.subject())];
        cells.extend(row.counts.iter().map(Cell::new));
        misses.add_row(cells);
    }
    println!(
        "Misses below {} ({} total)\n{misses}",
        counts.threshold, report.summary.total_misses
    );

    let mut central = Table::new();
    central.set_header(vec!["Criterion", "Degree", "Closeness", "Betweenness"]);
    for node in &report.centrality.co_miss {
        central.add_row(vec![
            Cell::new(&node.id),
            Cell::new(format!("{:.3}", node.degree)),
            Cell::new(format!("{:.3}", node.closeness)),
            Cell::new(format!("{:.3}", node.betweenness)),
        ]);
    }
    println!(
        "\nCo-miss network: {} nodes, {} edges\n{central}",
        report.co_miss.node_count(),
        report.co_miss.edge_count()
    );

    let mut corr = Table::new();
    corr.set_header(vec!["Assessment", "Socratic", "r", "n"]);
    for pair in report.correlation.significant() {
        corr.add_row(vec![
            Cell::new(&pair.a),
            Cell::new(&pair.b),
            Cell::new(format!("{:+.3}", pair.r)),
            Cell::new(pair.n),
        ]);
    }
    println!(
        "\nCorrelation network (|r| >= {}): {} edges\n{corr}",
        report.correlation.min_abs_corr,
        report.correlation.graph.edge_count()
    );

    let cmp = &report.cohort_comparison;
    let mut cohorts = Table::new();
    cohorts.set_header(vec!["Cohort", "Students", "Mean", "First to last"]);
    for stats in [&cmp.a, &cmp.b] {
        cohorts.add_row(vec![
            Cell::new(stats.cohort.label()),
            Cell::new(stats.students),
            Cell::new(stats.mean.map_or("-".to_string(), |m| format!("{m:.1}"))),
            Cell::new(stats.first_to_last.map_or("-".to_string(), |d| format!("{d:+.1}"))),
        ]);
    }
    println!(
        "\nCohorts over attempts {}\n{cohorts}",
        report.parameters.analysis.attempt_window
    );

    if let Some(focus) = &report.focus {
        let mut focused = Table::new();
        focused.set_header(vec!["Element", "Degree", "Betweenness"]);
        for node in &focus.centrality {
            focused.add_row(vec![
                Cell::new(&node.id),
                Cell::new(format!("{:.3}", node.degree)),
                Cell::new(format!("{:.3}", node.betweenness)),
            ]);
        }
        println!(
            "\nFocus {} (min misses {}): {} edges\n{focused}",
            focus.criterion,
            focus.min_misses,
            focus.graph.edge_count()
        );
    }

    if let Some(profile) = &report.student_profile {
        let means: Vec<String> = profile
            .criterion_means
            .iter()
            .map(|m| format!("{} {:.1}", m.criterion, m.mean))
            .collect();
        println!("\nStudent {}: {}", profile.student_id, means.join(", "));
    }
}
