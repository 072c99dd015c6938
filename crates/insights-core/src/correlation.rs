//! Correlation networks between per-student metric means.
//!
//! Pairs are computed pairwise-complete: a student contributes to a pair only
//! when both metrics have a value. Degenerate pairs (constant columns, fewer
//! than three shared students) are recorded as skipped and never produce a
//! NaN edge.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ParamError, TableError};
use crate::graph::{Graph, Node, NodeKind};
use crate::model::{ScoreTable, SocraticLong};

/// Minimum number of shared students for a correlation.
pub const MIN_SHARED_STUDENTS: usize = 3;

/// Sum of squared deviations below which a column counts as constant.
const ZERO_VARIANCE: f64 = 1e-12;

/// Per-student mean of every metric in one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMeans {
    /// Source label carried onto graph nodes.
    pub group: String,
    students: Vec<String>,
    metrics: Vec<String>,
    /// One row per student, one slot per metric.
    values: Vec<Vec<Option<f64>>>,
}

impl MetricMeans {
    /// Build from explicit rows. Students are sorted; rows must match the
    /// metric count and student ids must be unique.
    pub fn new(
        group: impl Into<String>,
        metrics: Vec<String>,
        rows: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self, TableError> {
        let mut sorted: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for (student, values) in rows {
            if values.len() != metrics.len() {
                return Err(TableError::RaggedRow {
                    student_id: student,
                    attempt: 0,
                    expected: metrics.len(),
                    found: values.len(),
                });
            }
            if sorted.contains_key(&student) {
                return Err(TableError::DuplicateKey {
                    student_id: student,
                    attempt: 0,
                    column: "*".into(),
                });
            }
            sorted.insert(student, values);
        }
        let (students, values) = sorted.into_iter().unzip();
        Ok(Self {
            group: group.into(),
            students,
            metrics,
            values,
        })
    }

    /// Mean score of every element per student, elements in taxonomy order.
    pub fn from_scores(scores: &ScoreTable) -> Self {
        let metrics: Vec<String> = scores.taxonomy().elements().map(String::from).collect();
        let mut sums: BTreeMap<&str, Vec<(f64, u32)>> = BTreeMap::new();
        for record in scores.records() {
            let Some(slot) = scores.taxonomy().element_index(&record.element) else {
                continue;
            };
            let acc = sums
                .entry(record.student_id.as_str())
                .or_insert_with(|| vec![(0.0, 0); metrics.len()]);
            acc[slot].0 += record.score;
            acc[slot].1 += 1;
        }
        Self::from_sums("assessment", metrics, sums)
    }

    /// Mean value of every Socratic metric per student.
    pub fn from_socratic(table: &SocraticLong) -> Self {
        let metrics: Vec<String> = table.metrics().to_vec();
        let slot: BTreeMap<&str, usize> = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.as_str(), i))
            .collect();
        let mut sums: BTreeMap<&str, Vec<(f64, u32)>> = BTreeMap::new();
        for record in table.records() {
            let Some(&i) = slot.get(record.metric.as_str()) else {
                continue;
            };
            let acc = sums
                .entry(record.student_id.as_str())
                .or_insert_with(|| vec![(0.0, 0); metrics.len()]);
            acc[i].0 += record.value;
            acc[i].1 += 1;
        }
        Self::from_sums("socratic", metrics, sums)
    }

    fn from_sums(group: &str, metrics: Vec<String>, sums: BTreeMap<&str, Vec<(f64, u32)>>) -> Self {
        let (students, values) = sums
            .into_iter()
            .map(|(student, acc)| {
                let means: Vec<Option<f64>> = acc
                    .into_iter()
                    .map(|(sum, n)| (n > 0).then(|| sum / f64::from(n)))
                    .collect();
                (student.to_string(), means)
            })
            .unzip();
        Self {
            group: group.into(),
            students,
            metrics,
            values,
        }
    }

    /// Student ids, sorted.
    pub fn students(&self) -> &[String] {
        &self.students
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn value(&self, student: &str, metric: &str) -> Option<f64> {
        let row = self.students.binary_search_by(|s| s.as_str().cmp(student)).ok()?;
        let column = self.metrics.iter().position(|m| m == metric)?;
        self.values[row][column]
    }

    fn row_of(&self, student: &str) -> Option<&[Option<f64>]> {
        self.students
            .binary_search_by(|s| s.as_str().cmp(student))
            .ok()
            .map(|i| self.values[i].as_slice())
    }
}

/// Pearson correlation coefficient; `None` for mismatched lengths, fewer
/// than two points or a constant series.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx < ZERO_VARIANCE || syy < ZERO_VARIANCE {
        return None;
    }
    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Fisher-z 95% confidence interval for `r` over `n` samples.
pub fn fisher_ci(r: f64, n: usize) -> (f64, f64) {
    if r.abs() >= 0.999 || n <= 3 {
        return (r, r);
    }
    let z = r.atanh();
    let half = 1.96 / ((n - 3) as f64).sqrt();
    ((z - half).tanh(), (z + half).tanh())
}

/// A computed correlation between two metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub a: String,
    pub b: String,
    pub r: f64,
    /// Number of students contributing to `r`.
    pub n: usize,
    pub ci_low: f64,
    pub ci_high: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    /// One of the metrics is constant over the shared students.
    ZeroVariance,
    /// Fewer than three students have both values.
    InsufficientData { shared: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ZeroVariance => write!(f, "zero variance"),
            SkipReason::InsufficientData { shared } => {
                write!(f, "only {shared} shared students")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPair {
    pub a: String,
    pub b: String,
    pub reason: SkipReason,
}

/// Output of a correlation build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub min_abs_corr: f64,
    pub graph: Graph,
    /// Every computed pair, including those below the cutoff.
    pub pairs: Vec<CorrelationPair>,
    pub skipped: Vec<SkippedPair>,
    /// Students present in only one of the two tables.
    pub excluded_students: usize,
}

impl CorrelationResult {
    /// Pairs whose |r| reached the cutoff.
    pub fn significant(&self) -> impl Iterator<Item = &CorrelationPair> {
        self.pairs.iter().filter(move |p| p.r.abs() >= self.min_abs_corr)
    }
}

fn metric_nodes(graph: &mut Graph, table: &MetricMeans) -> Vec<usize> {
    table
        .metrics
        .iter()
        .map(|m| graph.add_node(Node::new(m.clone(), NodeKind::Metric).with_group(table.group.clone())))
        .collect()
}

struct PairBuilder {
    min_abs_corr: f64,
    graph: Graph,
    pairs: Vec<CorrelationPair>,
    skipped: Vec<SkippedPair>,
}

impl PairBuilder {
    fn new(min_abs_corr: f64) -> Result<Self, ParamError> {
        Ok(Self {
            min_abs_corr: ParamError::ensure_range("min_abs_corr", min_abs_corr, 0.0, 1.0)?,
            graph: Graph::new(),
            pairs: Vec::new(),
            skipped: Vec::new(),
        })
    }

    /// Correlate two columns given as aligned per-student values.
    fn correlate(&mut self, (a, ai): (&str, usize), (b, bi): (&str, usize), values: &[(Option<f64>, Option<f64>)]) {
        let (x, y): (Vec<f64>, Vec<f64>) = values
            .iter()
            .filter_map(|&(x, y)| Some((x?, y?)))
            .unzip();

        let reason = if x.len() < MIN_SHARED_STUDENTS {
            Some(SkipReason::InsufficientData { shared: x.len() })
        } else {
            None
        };
        let r = match reason {
            Some(_) => None,
            None => pearson(&x, &y),
        };

        let Some(r) = r else {
            let reason = reason.unwrap_or(SkipReason::ZeroVariance);
            tracing::debug!(a, b, %reason, "skipping correlation pair");
            self.skipped.push(SkippedPair {
                a: a.to_string(),
                b: b.to_string(),
                reason,
            });
            return;
        };

        let (ci_low, ci_high) = fisher_ci(r, x.len());
        self.pairs.push(CorrelationPair {
            a: a.to_string(),
            b: b.to_string(),
            r,
            n: x.len(),
            ci_low,
            ci_high,
        });
        if r.abs() >= self.min_abs_corr {
            self.graph.add_weight(ai, bi, r);
        }
    }

    fn finish(self, excluded_students: usize) -> CorrelationResult {
        tracing::debug!(
            pairs = self.pairs.len(),
            skipped = self.skipped.len(),
            edges = self.graph.edge_count(),
            excluded_students,
            "built correlation graph"
        );
        CorrelationResult {
            min_abs_corr: self.min_abs_corr,
            graph: self.graph,
            pairs: self.pairs,
            skipped: self.skipped,
            excluded_students,
        }
    }
}

/// Correlate every metric of `a` with every metric of `b` across the
/// students both tables share.
pub fn build_correlation_graph(
    a: &MetricMeans,
    b: &MetricMeans,
    min_abs_corr: f64,
) -> Result<CorrelationResult, ParamError> {
    let mut builder = PairBuilder::new(min_abs_corr)?;

    let a_names: HashSet<&str> = a.metrics.iter().map(String::as_str).collect();
    if let Some(clash) = b.metrics.iter().find(|m| a_names.contains(m.as_str())) {
        return Err(ParamError::DuplicateElement(clash.clone()));
    }

    let a_nodes = metric_nodes(&mut builder.graph, a);
    let b_nodes = metric_nodes(&mut builder.graph, b);

    let a_students: BTreeSet<&str> = a.students.iter().map(String::as_str).collect();
    let b_students: BTreeSet<&str> = b.students.iter().map(String::as_str).collect();
    let shared: Vec<&str> = a_students.intersection(&b_students).copied().collect();
    let excluded = a_students.symmetric_difference(&b_students).count();
    if excluded > 0 {
        tracing::warn!(excluded, shared = shared.len(), "student ids differ between tables");
    }

    let rows: Vec<(&[Option<f64>], &[Option<f64>])> = shared
        .iter()
        .filter_map(|s| Some((a.row_of(s)?, b.row_of(s)?)))
        .collect();

    for (i, am) in a.metrics.iter().enumerate() {
        for (j, bm) in b.metrics.iter().enumerate() {
            let values: Vec<(Option<f64>, Option<f64>)> =
                rows.iter().map(|(ra, rb)| (ra[i], rb[j])).collect();
            builder.correlate((am.as_str(), a_nodes[i]), (bm.as_str(), b_nodes[j]), &values);
        }
    }

    Ok(builder.finish(excluded))
}

/// Correlate the metrics of one table with each other (i < j only).
pub fn build_within_correlation_graph(
    table: &MetricMeans,
    min_abs_corr: f64,
) -> Result<CorrelationResult, ParamError> {
    let mut builder = PairBuilder::new(min_abs_corr)?;
    let nodes = metric_nodes(&mut builder.graph, table);

    for i in 0..table.metrics.len() {
        for j in i + 1..table.metrics.len() {
            let values: Vec<(Option<f64>, Option<f64>)> =
                table.values.iter().map(|row| (row[i], row[j])).collect();
            builder.correlate(
                (table.metrics[i].as_str(), nodes[i]),
                (table.metrics[j].as_str(), nodes[j]),
                &values,
            );
        }
    }

    Ok(builder.finish(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{generate, generate_socratic};
    use crate::taxonomy::Taxonomy;

    fn means(group: &str, metrics: &[&str], rows: &[(&str, Vec<Option<f64>>)]) -> MetricMeans {
        MetricMeans::new(
            group,
            metrics.iter().map(|m| m.to_string()).collect(),
            rows.iter().map(|(s, v)| (s.to_string(), v.clone())).collect(),
        )
        .unwrap()
    }

    #[test]
    fn pearson_basics() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), Some(1.0));
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), Some(-1.0));
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(pearson(&[1.0], &[1.0]), None);
        assert_eq!(pearson(&[1.0, 2.0], &[1.0]), None);
    }

    #[test]
    fn cross_table_edges_respect_cutoff() {
        let a = means(
            "assessment",
            &["x", "flat"],
            &[
                ("S01", vec![Some(1.0), Some(5.0)]),
                ("S02", vec![Some(2.0), Some(5.0)]),
                ("S03", vec![Some(3.0), Some(5.0)]),
                ("S04", vec![Some(4.0), Some(5.0)]),
            ],
        );
        let b = means(
            "socratic",
            &["up", "down", "noise"],
            &[
                ("S01", vec![Some(1.0), Some(4.0), Some(1.0)]),
                ("S02", vec![Some(2.0), Some(3.0), Some(-1.0)]),
                ("S03", vec![Some(3.0), Some(2.0), Some(-1.0)]),
                ("S04", vec![Some(4.0), Some(1.0), Some(1.0)]),
            ],
        );
        let result = build_correlation_graph(&a, &b, 0.5).unwrap();

        let ids: Vec<&str> = result.graph.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "flat", "up", "down", "noise"]);
        assert_eq!(result.graph.weight("x", "up"), Some(1.0));
        assert_eq!(result.graph.weight("down", "x"), Some(-1.0));
        assert_eq!(result.graph.weight("x", "noise"), None);
        assert_eq!(result.pairs.len(), 3);
        assert_eq!(result.significant().count(), 2);
        assert_eq!(result.skipped.len(), 3);
        assert!(result
            .skipped
            .iter()
            .all(|s| s.a == "flat" && s.reason == SkipReason::ZeroVariance));
        assert!(result
            .graph
            .edges()
            .iter()
            .all(|e| e.weight.is_finite() && e.weight.abs() >= 0.5));
        assert_eq!(result.excluded_students, 0);
    }

    #[test]
    fn mismatched_students_are_excluded_and_counted() {
        let a = means(
            "a",
            &["x"],
            &[
                ("S01", vec![Some(1.0)]),
                ("S02", vec![Some(2.0)]),
                ("S03", vec![Some(3.0)]),
                ("S09", vec![Some(9.0)]),
            ],
        );
        let b = means(
            "b",
            &["y"],
            &[
                ("S01", vec![Some(2.0)]),
                ("S02", vec![Some(4.0)]),
                ("S03", vec![Some(6.5)]),
            ],
        );
        let result = build_correlation_graph(&a, &b, 0.0).unwrap();
        assert_eq!(result.excluded_students, 1);
        assert_eq!(result.pairs[0].n, 3);
    }

    #[test]
    fn too_few_shared_students_is_skipped() {
        let a = means("a", &["x"], &[("S01", vec![Some(1.0)]), ("S02", vec![Some(2.0)])]);
        let b = means("b", &["y"], &[("S01", vec![Some(1.0)]), ("S02", vec![None])]);
        let result = build_correlation_graph(&a, &b, 0.0).unwrap();
        assert!(result.pairs.is_empty());
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::InsufficientData { shared: 1 }
        );
        assert_eq!(result.graph.edge_count(), 0);
    }

    #[test]
    fn invalid_cutoff_and_name_clash_are_rejected() {
        let a = means("a", &["x"], &[]);
        assert!(matches!(
            build_correlation_graph(&a, &a, 1.2),
            Err(ParamError::OutOfRange { .. })
        ));
        assert!(build_within_correlation_graph(&a, f64::NAN).is_err());
        assert_eq!(
            build_correlation_graph(&a, &a, 0.3),
            Err(ParamError::DuplicateElement("x".into()))
        );
    }

    #[test]
    fn within_table_pairs_are_unique_and_never_reflexive() {
        let scores = generate(42, 12, 5, &Taxonomy::default()).unwrap();
        let m = MetricMeans::from_scores(&scores);
        assert_eq!(m.students().len(), 12);
        assert_eq!(m.metrics().len(), 12);

        let result = build_within_correlation_graph(&m, 0.3).unwrap();
        assert_eq!(result.pairs.len() + result.skipped.len(), 12 * 11 / 2);
        for p in &result.pairs {
            assert_ne!(p.a, p.b);
            assert!((-1.0..=1.0).contains(&p.r));
            assert!(p.ci_low <= p.r && p.r <= p.ci_high);
        }
        for e in result.graph.edges() {
            assert_eq!(
                result.graph.weight(&e.source, &e.target),
                result.graph.weight(&e.target, &e.source)
            );
            assert!(e.weight.abs() >= 0.3);
        }
    }

    #[test]
    fn generated_tables_correlate_without_nan() {
        let scores = generate(42, 12, 5, &Taxonomy::default()).unwrap();
        let socratic = generate_socratic(42, 12, 5).unwrap();
        let a = MetricMeans::from_scores(&scores);
        let b = MetricMeans::from_socratic(&socratic);
        assert_eq!(b.group, "socratic");
        let result = build_correlation_graph(&a, &b, 0.3).unwrap();
        assert_eq!(result.graph.node_count(), 16);
        assert_eq!(result.pairs.len() + result.skipped.len(), 12 * 4);
        assert!(result.pairs.iter().all(|p| p.r.is_finite()));
    }

    #[test]
    fn from_scores_averages_over_attempts() {
        let scores = generate(5, 3, 4, &Taxonomy::default()).unwrap();
        let m = MetricMeans::from_scores(&scores);
        let expected: f64 = (1..=4)
            .filter_map(|a| scores.score("S02", a, "reliability"))
            .sum::<f64>()
            / 4.0;
        let got = m.value("S02", "reliability").unwrap();
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn fisher_interval_narrows_with_more_samples() {
        let (lo10, hi10) = fisher_ci(0.5, 10);
        let (lo100, hi100) = fisher_ci(0.5, 100);
        assert!(hi100 - lo100 < hi10 - lo10);
        assert_eq!(fisher_ci(0.9995, 50), (0.9995, 0.9995));
        assert_eq!(fisher_ci(0.5, 3), (0.5, 0.5));
    }
}
