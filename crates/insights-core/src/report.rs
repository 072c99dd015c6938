//! Analysis report with JSON persistence and classification diffs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::centrality::NodeCentrality;
use crate::config::AnalysisConfig;
use crate::correlation::CorrelationResult;
use crate::graph::Graph;
use crate::misses::{MissCountRow, MissCounts};
use crate::statistics::{
    AttemptMean, CohortComparison, CriterionDistribution, CriterionMean, LinearTrend,
};
use crate::taxonomy::Taxonomy;

/// Where the analysed tables came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DataSource {
    Generated {
        seed: u64,
        n_students: usize,
        n_attempts: u32,
    },
    /// Tables supplied by the caller (e.g. read from CSV).
    External,
}

/// Parameters that produced a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParameters {
    pub source: DataSource,
    pub taxonomy: Taxonomy,
    pub analysis: AnalysisConfig,
}

/// Cohort size and miss totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub students: usize,
    pub attempts: usize,
    pub score_records: usize,
    pub socratic_records: usize,
    pub total_misses: usize,
}

/// Centrality of every graph in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralitySet {
    pub co_miss: Vec<NodeCentrality>,
    pub bipartite: Vec<NodeCentrality>,
    pub correlation: Vec<NodeCentrality>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStatistics {
    pub criterion_means: Vec<CriterionMean>,
    pub trend: Vec<AttemptMean>,
    pub distributions: Vec<CriterionDistribution>,
    pub linear_trend: Option<LinearTrend>,
}

/// Element co-miss network of one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusedNetwork {
    pub criterion: String,
    /// Edge threshold actually applied; relaxed for small criteria.
    pub min_misses: u32,
    pub graph: Graph,
    pub centrality: Vec<NodeCentrality>,
}

/// Single-student view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_id: String,
    pub criterion_means: Vec<CriterionMean>,
    /// Miss counts per criterion, one row per subject of this student.
    pub misses: Vec<MissCountRow>,
}

/// A complete analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub parameters: ReportParameters,
    pub summary: CohortSummary,
    /// Criterion-level miss counts.
    pub miss_counts: MissCounts,
    pub co_miss: Graph,
    pub bipartite: Graph,
    /// Co-miss graph at element level.
    pub element_co_miss: Graph,
    /// Assessment element means against Socratic metric means.
    pub correlation: CorrelationResult,
    /// Socratic metrics against each other.
    pub socratic_correlation: CorrelationResult,
    pub centrality: CentralitySet,
    pub statistics: CohortStatistics,
    /// The two configured cohort halves, over the attempt window.
    pub cohort_comparison: CohortComparison,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusedNetwork>,
    pub student_profile: Option<StudentProfile>,
    /// Wall-clock analysis time in milliseconds.
    pub duration_ms: u64,
}

impl AnalysisReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AnalysisReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare this report's miss classifications and co-miss edges against
    /// a baseline.
    pub fn compare(&self, baseline: &AnalysisReport) -> ClassificationDiff {
        let count_map = |counts: &MissCounts| -> BTreeMap<(String, String), u32> {
            let mut map = BTreeMap::new();
            for row in &counts.rows {
                for (column, &count) in counts.columns.iter().zip(&row.counts) {
                    map.insert((row.subject(), column.clone()), count);
                }
            }
            map
        };
        let subjects = |counts: &MissCounts| -> BTreeSet<String> {
            counts.rows.iter().map(MissCountRow::subject).collect()
        };

        let baseline_counts = count_map(&baseline.miss_counts);
        let current_counts = count_map(&self.miss_counts);

        let mut miss_changes = Vec::new();
        let mut unchanged = 0usize;
        for (key, &current) in &current_counts {
            let Some(&before) = baseline_counts.get(key) else {
                continue;
            };
            if before == current {
                unchanged += 1;
            } else {
                miss_changes.push(MissChange {
                    subject: key.0.clone(),
                    criterion: key.1.clone(),
                    baseline: before,
                    current,
                    delta: i64::from(current) - i64::from(before),
                });
            }
        }

        let baseline_subjects = subjects(&baseline.miss_counts);
        let current_subjects = subjects(&self.miss_counts);

        ClassificationDiff {
            baseline_id: baseline.id,
            current_id: self.id,
            parameters_changed: baseline.parameters != self.parameters,
            miss_changes,
            unchanged,
            new_subjects: current_subjects.difference(&baseline_subjects).count(),
            removed_subjects: baseline_subjects.difference(&current_subjects).count(),
            edge_changes: edge_changes(&baseline.co_miss, &self.co_miss),
        }
    }
}

fn edge_map(graph: &Graph) -> BTreeMap<(String, String), f64> {
    graph
        .edges()
        .iter()
        .map(|e| {
            let key = if e.source <= e.target {
                (e.source.clone(), e.target.clone())
            } else {
                (e.target.clone(), e.source.clone())
            };
            (key, e.weight)
        })
        .collect()
}

fn edge_changes(baseline: &Graph, current: &Graph) -> Vec<EdgeChange> {
    let before = edge_map(baseline);
    let after = edge_map(current);
    let keys: BTreeSet<&(String, String)> = before.keys().chain(after.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let (b, c) = (before.get(key).copied(), after.get(key).copied());
            (b != c).then(|| EdgeChange {
                source: key.0.clone(),
                target: key.1.clone(),
                baseline: b,
                current: c,
            })
        })
        .collect()
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationDiff {
    pub baseline_id: Uuid,
    pub current_id: Uuid,
    /// True when the reports were produced with different parameters.
    pub parameters_changed: bool,
    /// (subject, criterion) cells whose miss count changed.
    pub miss_changes: Vec<MissChange>,
    /// Cells present in both reports with equal counts.
    pub unchanged: usize,
    /// Subjects in current but not baseline.
    pub new_subjects: usize,
    /// Subjects in baseline but not current.
    pub removed_subjects: usize,
    /// Co-miss edges added, removed or re-weighted.
    pub edge_changes: Vec<EdgeChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissChange {
    pub subject: String,
    pub criterion: String,
    pub baseline: u32,
    pub current: u32,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeChange {
    pub source: String,
    pub target: String,
    /// `None` when the edge is absent from the baseline.
    pub baseline: Option<f64>,
    /// `None` when the edge is absent from the current report.
    pub current: Option<f64>,
}

fn fmt_weight(w: Option<f64>) -> String {
    w.map(|w| format!("{w}")).unwrap_or_else(|| "-".to_string())
}

impl ClassificationDiff {
    /// Format the diff as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} miss-count changes, {} unchanged, {} co-miss edge changes\n\n",
            self.miss_changes.len(),
            self.unchanged,
            self.edge_changes.len()
        ));
        if self.parameters_changed {
            md.push_str("_Reports were produced with different parameters._\n\n");
        }
        if self.new_subjects > 0 || self.removed_subjects > 0 {
            md.push_str(&format!(
                "Subjects: {} new, {} removed\n\n",
                self.new_subjects, self.removed_subjects
            ));
        }

        if !self.miss_changes.is_empty() {
            md.push_str("### Miss-count changes\n\n");
            md.push_str("| Subject | Criterion | Baseline | Current | Delta |\n");
            md.push_str("|---------|-----------|----------|---------|-------|\n");
            for c in &self.miss_changes {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {:+} |\n",
                    c.subject, c.criterion, c.baseline, c.current, c.delta
                ));
            }
            md.push('\n');
        }

        if !self.edge_changes.is_empty() {
            md.push_str("### Co-miss edge changes\n\n");
            md.push_str("| Edge | Baseline | Current |\n");
            md.push_str("|------|----------|---------|\n");
            for e in &self.edge_changes {
                md.push_str(&format!(
                    "| {} – {} | {} | {} |\n",
                    e.source,
                    e.target,
                    fmt_weight(e.baseline),
                    fmt_weight(e.current)
                ));
            }
        }

        md
    }

    /// Returns true if any classification or edge changed.
    pub fn has_changes(&self) -> bool {
        !self.miss_changes.is_empty() || !self.edge_changes.is_empty()
    }
}
