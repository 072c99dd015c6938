//! Cohort summary statistics over a score table.
//!
//! All statistics are computed on the stored (post-clamp) scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ScoreRecord, ScoreTable};
use crate::selection::{select_scores, AttemptWindow, CohortSplit};

/// Mean score of one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionMean {
    pub criterion: String,
    pub mean: f64,
    /// Number of scores averaged.
    pub count: usize,
}

/// Mean score of one attempt across the cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptMean {
    pub attempt: u32,
    pub mean: f64,
    pub count: usize,
}

/// Five-number summary of a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiveNumber {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl FiveNumber {
    /// Summarise `values`; `None` when empty. Quantiles use linear
    /// interpolation between closest ranks.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Distribution of per-(student, attempt) means of one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDistribution {
    pub criterion: String,
    pub summary: FiveNumber,
}

/// Least-squares fit of the overall row mean against attempt number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

/// Mean per criterion over every record, in taxonomy order.
pub fn cohort_criterion_means(scores: &ScoreTable) -> Vec<CriterionMean> {
    criterion_means_where(scores, |_| true)
}

/// A single student's criterion profile; `None` when the student is absent.
pub fn student_criterion_means(scores: &ScoreTable, student_id: &str) -> Option<Vec<CriterionMean>> {
    if !scores.records().iter().any(|r| r.student_id == student_id) {
        return None;
    }
    Some(criterion_means_where(scores, |id| id == student_id))
}

fn criterion_means_where(scores: &ScoreTable, keep: impl Fn(&str) -> bool) -> Vec<CriterionMean> {
    let taxonomy = scores.taxonomy();
    let mut acc = vec![(0.0f64, 0usize); taxonomy.criteria().len()];
    for r in scores.records().iter().filter(|r| keep(&r.student_id)) {
        if let Some(ci) = taxonomy.criterion_index_of(&r.element) {
            acc[ci].0 += r.score;
            acc[ci].1 += 1;
        }
    }
    taxonomy
        .criterion_names()
        .zip(acc)
        .filter(|(_, (_, count))| *count > 0)
        .map(|(name, (sum, count))| CriterionMean {
            criterion: name.to_string(),
            mean: sum / count as f64,
            count,
        })
        .collect()
}

/// Overall mean per attempt, ascending attempts.
pub fn cohort_trend(scores: &ScoreTable) -> Vec<AttemptMean> {
    let mut acc: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for r in scores.records() {
        let entry = acc.entry(r.attempt).or_default();
        entry.0 += r.score;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|(attempt, (sum, count))| AttemptMean {
            attempt,
            mean: sum / count as f64,
            count,
        })
        .collect()
}

/// Five-number summary of per-(student, attempt) criterion means.
pub fn criterion_distributions(scores: &ScoreTable) -> Vec<CriterionDistribution> {
    let taxonomy = scores.taxonomy();
    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); taxonomy.criteria().len()];

    for row in scores.rows() {
        let mut offset = 0;
        for (ci, criterion) in taxonomy.criteria().iter().enumerate() {
            let width = criterion.elements.len();
            let present: Vec<f64> = row.scores[offset..offset + width].iter().flatten().copied().collect();
            offset += width;
            if !present.is_empty() {
                samples[ci].push(present.iter().sum::<f64>() / present.len() as f64);
            }
        }
    }

    taxonomy
        .criterion_names()
        .zip(samples)
        .filter_map(|(name, values)| {
            FiveNumber::from_values(&values).map(|summary| CriterionDistribution {
                criterion: name.to_string(),
                summary,
            })
        })
        .collect()
}

/// Fit `row mean = slope · attempt + intercept`; `None` with fewer than two
/// distinct attempts.
pub fn linear_trend(scores: &ScoreTable) -> Option<LinearTrend> {
    let points: Vec<(f64, f64)> = scores
        .rows()
        .iter()
        .filter_map(|row| {
            let present: Vec<f64> = row.scores.iter().flatten().copied().collect();
            if present.is_empty() {
                return None;
            }
            let mean = present.iter().sum::<f64>() / present.len() as f64;
            Some((f64::from(row.attempt), mean))
        })
        .collect();

    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    if points.is_empty() || sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    let slope = sxy / sxx;
    Some(LinearTrend {
        slope,
        intercept: my - slope * mx,
    })
}

/// Headline numbers for one cohort half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    pub cohort: CohortSplit,
    pub students: usize,
    /// Mean of the per-element means; `None` for an empty half.
    pub mean: Option<f64>,
    /// Mean at the latest attempt minus mean at the earliest attempt.
    pub first_to_last: Option<f64>,
}

/// Side-by-side statistics of two cohort halves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortComparison {
    pub a: CohortStats,
    pub b: CohortStats,
}

impl CohortComparison {
    /// `b.mean - a.mean`, when both halves have data.
    pub fn mean_gap(&self) -> Option<f64> {
        Some(self.b.mean? - self.a.mean?)
    }
}

/// Statistics of `cohort` within `scores`.
pub fn cohort_stats(scores: &ScoreTable, cohort: CohortSplit) -> CohortStats {
    let half = select_scores(scores, AttemptWindow::All, cohort);
    let records = half.records();
    let first = records.iter().map(|r| r.attempt).min();
    let last = records.iter().map(|r| r.attempt).max();
    let at = |attempt: u32| element_mean(&half, records.iter().filter(move |r| r.attempt == attempt));
    let first_to_last = match (first, last) {
        (Some(first), Some(last)) => at(last).zip(at(first)).map(|(l, f)| l - f),
        _ => None,
    };
    CohortStats {
        cohort,
        students: half.student_ids().len(),
        mean: element_mean(&half, records.iter()),
        first_to_last,
    }
}

/// Compare two cohort halves of the same table.
pub fn compare_cohorts(scores: &ScoreTable, a: CohortSplit, b: CohortSplit) -> CohortComparison {
    CohortComparison {
        a: cohort_stats(scores, a),
        b: cohort_stats(scores, b),
    }
}

/// Mean of per-element means over `records`, so every element weighs the
/// same regardless of how many scores it has.
fn element_mean<'a>(scores: &ScoreTable, records: impl Iterator<Item = &'a ScoreRecord>) -> Option<f64> {
    let taxonomy = scores.taxonomy();
    let mut acc = vec![(0.0f64, 0usize); taxonomy.element_count()];
    for r in records {
        if let Some(ei) = taxonomy.element_index(&r.element) {
            acc[ei].0 += r.score;
            acc[ei].1 += 1;
        }
    }
    let means: Vec<f64> = acc
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(sum, count)| sum / count as f64)
        .collect();
    if means.is_empty() {
        return None;
    }
    Some(means.iter().sum::<f64>() / means.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate;
    use crate::model::ScoreRecord;
    use crate::taxonomy::{Criterion, Taxonomy};

    fn rec(student: &str, attempt: u32, element: &str, score: f64) -> ScoreRecord {
        ScoreRecord {
            student_id: student.into(),
            attempt,
            element: element.into(),
            score,
        }
    }

    fn uneven() -> Taxonomy {
        Taxonomy::new(vec![
            Criterion::new("A", &["a1"]),
            Criterion::new("B", &["b1", "b2", "b3"]),
        ])
        .unwrap()
    }

    #[test]
    fn five_number_summary_interpolates() {
        let s = FiveNumber::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert!((s.median - 2.5).abs() < 1e-12);
        assert!((s.q1 - 1.75).abs() < 1e-12);
        assert!((s.q3 - 3.25).abs() < 1e-12);
        assert!(FiveNumber::from_values(&[]).is_none());
    }

    #[test]
    fn criterion_means_respect_uneven_criteria() {
        let table = ScoreTable::from_records(
            uneven(),
            vec![
                rec("S01", 1, "a1", 50.0),
                rec("S01", 1, "b1", 60.0),
                rec("S01", 1, "b2", 70.0),
                rec("S01", 1, "b3", 80.0),
                rec("S02", 1, "a1", 90.0),
            ],
        )
        .unwrap();

        let means = cohort_criterion_means(&table);
        assert_eq!(means.len(), 2);
        assert_eq!(means[0].criterion, "A");
        assert_eq!(means[0].mean, 70.0);
        assert_eq!(means[1].mean, 70.0);
        assert_eq!(means[1].count, 3);

        let profile = student_criterion_means(&table, "S02").unwrap();
        assert_eq!(profile.len(), 1);
        assert_eq!(profile[0].mean, 90.0);
        assert!(student_criterion_means(&table, "S99").is_none());

        let dist = criterion_distributions(&table);
        assert_eq!(dist[0].summary.min, 50.0);
        assert_eq!(dist[0].summary.max, 90.0);
        assert_eq!(dist[1].summary.median, 70.0);
    }

    #[test]
    fn trend_is_ascending_by_attempt() {
        let table = generate(42, 12, 5, &Taxonomy::default()).unwrap();
        let trend = cohort_trend(&table);
        let attempts: Vec<u32> = trend.iter().map(|t| t.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
        assert!(trend.iter().all(|t| t.count == 12 * 12));

        let fit = linear_trend(&table).unwrap();
        assert!(fit.slope > 0.0, "slope {}", fit.slope);
    }

    #[test]
    fn linear_trend_needs_two_attempts() {
        let single = generate(1, 4, 1, &Taxonomy::default()).unwrap();
        assert!(linear_trend(&single).is_none());

        let exact = ScoreTable::from_records(
            uneven(),
            vec![
                rec("S01", 1, "a1", 50.0),
                rec("S01", 2, "a1", 55.0),
                rec("S01", 3, "a1", 60.0),
            ],
        )
        .unwrap();
        let fit = linear_trend(&exact).unwrap();
        assert!((fit.slope - 5.0).abs() < 1e-9);
        assert!((fit.intercept - 45.0).abs() < 1e-9);
    }

    #[test]
    fn cohort_halves_compare_means_and_progress() {
        let table = ScoreTable::from_records(
            uneven(),
            vec![
                rec("S01", 1, "a1", 40.0),
                rec("S01", 1, "b1", 60.0),
                rec("S01", 3, "a1", 60.0),
                rec("S01", 3, "b1", 80.0),
                rec("S02", 1, "a1", 80.0),
                rec("S02", 3, "a1", 70.0),
                rec("S03", 1, "a1", 90.0),
                rec("S03", 3, "a1", 90.0),
            ],
        )
        .unwrap();

        let cmp = compare_cohorts(&table, CohortSplit::Undergrad, CohortSplit::Graduate);
        assert_eq!(cmp.a.students, 1);
        assert_eq!(cmp.b.students, 2);
        // S01: a1 mean 50, b1 mean 70.
        assert_eq!(cmp.a.mean, Some(60.0));
        assert_eq!(cmp.a.first_to_last, Some(20.0));
        assert_eq!(cmp.b.mean, Some(82.5));
        assert_eq!(cmp.b.first_to_last, Some(-5.0));
        assert_eq!(cmp.mean_gap(), Some(22.5));
    }

    #[test]
    fn empty_cohort_half_has_no_statistics() {
        let single = generate(7, 1, 3, &Taxonomy::default()).unwrap();
        let stats = cohort_stats(&single, CohortSplit::Undergrad);
        assert_eq!(stats.students, 0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.first_to_last, None);

        let only = cohort_stats(&single, CohortSplit::Graduate);
        assert_eq!(only.students, 1);
        assert!(only.mean.is_some());
    }

    #[test]
    fn single_attempt_half_shows_no_progress() {
        let table = generate(3, 4, 1, &Taxonomy::default()).unwrap();
        assert_eq!(cohort_stats(&table, CohortSplit::All).first_to_last, Some(0.0));
    }
}
