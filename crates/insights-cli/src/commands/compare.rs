//! The `insights compare` command.

use std::path::PathBuf;

use anyhow::Result;

use insights_core::report::AnalysisReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    fail_on_change: bool,
    format: String,
) -> Result<()> {
    let baseline = AnalysisReport::load_json(&baseline_path)?;
    let current = AnalysisReport::load_json(&current_path)?;

    let diff = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", diff.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        _ => {
            println!(
                "Comparison: {} miss-count changes, {} unchanged, {} edge changes",
                diff.miss_changes.len(),
                diff.unchanged,
                diff.edge_changes.len()
            );
            if diff.parameters_changed {
                println!("Note: reports were produced with different parameters");
            }

            if !diff.miss_changes.is_empty() {
                println!("\nMiss-count changes:");
                for c in &diff.miss_changes {
                    println!(
                        "  {} {} {} -> {} ({:+})",
                        c.subject, c.criterion, c.baseline, c.current, c.delta
                    );
                }
            }

            if !diff.edge_changes.is_empty() {
                println!("\nCo-miss edge changes:");
                for e in &diff.edge_changes {
                    let fmt = |w: Option<f64>| w.map(|w| w.to_string()).unwrap_or_else(|| "-".into());
                    println!(
                        "  {} - {}: {} -> {}",
                        e.source,
                        e.target,
                        fmt(e.baseline),
                        fmt(e.current)
                    );
                }
            }

            if diff.new_subjects > 0 {
                println!("\n{} new subject(s)", diff.new_subjects);
            }
            if diff.removed_subjects > 0 {
                println!("{} removed subject(s)", diff.removed_subjects);
            }
        }
    }

    if fail_on_change && diff.has_changes() {
        std::process::exit(1);
    }

    Ok(())
}
