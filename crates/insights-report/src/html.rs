//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::Result;
use std::path::Path;

use insights_core::centrality::NodeCentrality;
use insights_core::graph::Graph;
use insights_core::report::{AnalysisReport, DataSource};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn source_label(source: &DataSource) -> String {
    match source {
        DataSource::Generated {
            seed,
            n_students,
            n_attempts,
        } => format!("generated (seed {seed}, {n_students} students, {n_attempts} attempts)"),
        DataSource::External => "external tables".to_string(),
    }
}

/// Generate an HTML report from an analysis report.
pub fn generate_html(report: &AnalysisReport) -> String {
    let mut html = String::new();
    let analysis = &report.parameters.analysis;

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>INSIGHTs analysis {}</title>\n",
        report.created_at.format("%Y-%m-%d %H:%M")
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n");
    html.push_str("<h1>INSIGHTs analysis</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Data: <strong>{}</strong> | attempts {} | cohort {} | miss threshold {} | min misses {} | min |r| {} | {}</p>\n",
        html_escape(&source_label(&report.parameters.source)),
        analysis.attempt_window,
        analysis.cohort.label(),
        analysis.miss_threshold,
        analysis.min_misses,
        analysis.min_abs_corr,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Cohort summary
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Cohort</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Students</th><th>Attempts</th><th>Scores</th><th>Socratic values</th><th>Misses</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr></tbody></table>\n",
        report.summary.students,
        report.summary.attempts,
        report.summary.score_records,
        report.summary.socratic_records,
        report.summary.total_misses,
    ));

    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Criterion</th><th>Mean</th><th>Min</th><th>Median</th><th>Max</th></tr></thead>\n<tbody>\n");
    for (mean, dist) in report
        .statistics
        .criterion_means
        .iter()
        .zip(&report.statistics.distributions)
    {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td></tr>\n",
            html_escape(&mean.criterion),
            mean.mean,
            dist.summary.min,
            dist.summary.median,
            dist.summary.max
        ));
    }
    html.push_str("</tbody></table>\n");

    if let Some(trend) = &report.statistics.linear_trend {
        html.push_str(&format!(
            "<p class=\"meta\">Trend: {:+.2} points per attempt (intercept {:.1})</p>\n",
            trend.slope, trend.intercept
        ));
    }

    html.push_str("<table class=\"summary\" id=\"cohorts\">\n");
    html.push_str("<thead><tr><th>Cohort</th><th>Students</th><th>Mean</th><th>First to last attempt</th></tr></thead>\n<tbody>\n");
    for stats in [&report.cohort_comparison.a, &report.cohort_comparison.b] {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            stats.cohort.label(),
            stats.students,
            stats.mean.map_or("-".to_string(), |m| format!("{m:.1}")),
            stats.first_to_last.map_or("-".to_string(), |d| format!("{d:+.1}")),
        ));
    }
    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Miss counts
    let counts = &report.miss_counts;
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Misses</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"misses\">\n<thead><tr><th onclick=\"sortTable(0)\">Subject</th>");
    for (i, column) in counts.columns.iter().enumerate() {
        html.push_str(&format!(
            "<th onclick=\"sortTable({})\">{}</th>",
            i + 1,
            html_escape(column)
        ));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &counts.rows {
        html.push_str(&format!("<tr><td>{}</td>", html_escape(&row.subject())));
        for &count in &row.counts {
            let class = if count >= analysis.min_misses && count > 0 {
                "fail"
            } else {
                "pass"
            };
            html.push_str(&format!("<td class=\"{class}\">{count}</td>"));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Networks
    html.push_str("<section class=\"networks\">\n");
    html.push_str("<h2>Co-miss network</h2>\n");
    if !report.centrality.co_miss.is_empty() {
        html.push_str(&generate_bar_chart(&report.centrality.co_miss));
    }
    html.push_str(&edge_table(&report.co_miss, "Co-misses"));

    html.push_str("<h2>Student–criterion network</h2>\n");
    html.push_str(&edge_table(&report.bipartite, "Misses"));

    if let Some(focus) = &report.focus {
        html.push_str(&format!(
            "<h2>Focus: {}</h2>\n<p class=\"meta\">Element co-misses at min misses {}</p>\n",
            html_escape(&focus.criterion),
            focus.min_misses
        ));
        if !focus.centrality.is_empty() {
            html.push_str(&generate_bar_chart(&focus.centrality));
        }
        html.push_str(&edge_table(&focus.graph, "Co-misses"));
    }

    html.push_str("<h2>Correlation network</h2>\n");
    html.push_str("<table>\n<thead><tr><th>Assessment</th><th>Socratic</th><th>r</th><th>n</th><th>95% CI</th></tr></thead>\n<tbody>\n");
    for pair in report.correlation.significant() {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:+.3}</td><td>{}</td><td>[{:+.3}, {:+.3}]</td></tr>\n",
            html_escape(&pair.a),
            html_escape(&pair.b),
            pair.r,
            pair.n,
            pair.ci_low,
            pair.ci_high
        ));
    }
    html.push_str("</tbody></table>\n");
    if !report.correlation.skipped.is_empty() {
        html.push_str(&format!(
            "<p class=\"meta\">{} pair(s) skipped for insufficient data.</p>\n",
            report.correlation.skipped.len()
        ));
    }
    html.push_str("</section>\n");

    if let Some(profile) = &report.student_profile {
        html.push_str("<section class=\"profile\">\n");
        html.push_str(&format!("<h2>Student {}</h2>\n", html_escape(&profile.student_id)));
        html.push_str("<table>\n<thead><tr><th>Criterion</th><th>Mean</th></tr></thead>\n<tbody>\n");
        for m in &profile.criterion_means {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{:.1}</td></tr>\n",
                html_escape(&m.criterion),
                m.mean
            ));
        }
        html.push_str("</tbody></table>\n</section>\n");
    }

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(
        &serde_json::to_string_pretty(report)
            .unwrap_or_default()
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    );
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)?;
    Ok(())
}

fn edge_table(graph: &Graph, weight_label: &str) -> String {
    if graph.edge_count() == 0 {
        return "<p class=\"meta\">No edges.</p>\n".to_string();
    }
    let mut table = format!(
        "<table>\n<thead><tr><th>Source</th><th>Target</th><th>{}</th></tr></thead>\n<tbody>\n",
        html_escape(weight_label)
    );
    for e in graph.edges() {
        table.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(&e.source),
            html_escape(&e.target),
            e.weight
        ));
    }
    table.push_str("</tbody></table>\n");
    table
}

/// Horizontal bars of degree centrality, one per node.
fn generate_bar_chart(nodes: &[NodeCentrality]) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 280;

    let total_height = nodes.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, node) in nodes.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let score = node.degree.clamp(0.0, 1.0);
        let width = (score * max_width as f64) as usize;

        let color = if score >= 0.8 {
            "#ef4444"
        } else if score >= 0.4 {
            "#eab308"
        } else {
            "#22c55e"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(&node.id)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.2}</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            node.degree
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('misses');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = Number(va), nb = Number(vb);
    const cmp = isNaN(na) || isNaN(nb) ? va.localeCompare(vb) : na - nb;
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
