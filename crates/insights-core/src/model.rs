//! Core tabular types: the rubric score table and the Socratic metric tables.
//!
//! Tables are immutable once built and always kept in primary-key order so
//! that two tables with the same content compare and serialize identically.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::taxonomy::Taxonomy;

/// Format the stable, sortable id of the `ordinal`-th student (1-based).
///
/// Ids are zero-padded to at least two digits, or to the digit count of the
/// cohort size, so lexicographic order equals ordinal order.
pub fn student_id(ordinal: usize, cohort_size: usize) -> String {
    let width = cohort_size.max(1).to_string().len().max(2);
    format!("S{ordinal:0width$}")
}

/// One rubric element score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub student_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub element: String,
    pub score: f64,
}

/// A complete or partial score table keyed by (student_id, attempt, element).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    taxonomy: Taxonomy,
    records: Vec<ScoreRecord>,
}

impl ScoreTable {
    /// Build a table from arbitrary records.
    ///
    /// Records are sorted by student, attempt and element declaration order.
    /// Unknown elements, attempt 0 and duplicate keys are rejected.
    pub fn from_records(
        taxonomy: Taxonomy,
        mut records: Vec<ScoreRecord>,
    ) -> Result<Self, TableError> {
        for r in &records {
            if taxonomy.element_index(&r.element).is_none() {
                return Err(TableError::UnknownElement(r.element.clone()));
            }
            if r.attempt == 0 {
                return Err(TableError::ZeroAttempt(r.student_id.clone()));
            }
        }

        records.sort_by(|a, b| compare_records(&taxonomy, a, b));

        for pair in records.windows(2) {
            if compare_records(&taxonomy, &pair[0], &pair[1]) == Ordering::Equal {
                return Err(TableError::DuplicateKey {
                    student_id: pair[1].student_id.clone(),
                    attempt: pair[1].attempt,
                    column: pair[1].element.clone(),
                });
            }
        }

        Ok(Self { taxonomy, records })
    }

    /// Wrap records that are already unique and in primary-key order.
    pub(crate) fn from_sorted(taxonomy: Taxonomy, records: Vec<ScoreRecord>) -> Self {
        debug_assert!(records
            .windows(2)
            .all(|p| compare_records(&taxonomy, &p[0], &p[1]) == Ordering::Less));
        Self { taxonomy, records }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Records in primary-key order.
    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct student ids, sorted.
    pub fn student_ids(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self.records.iter().map(|r| r.student_id.as_str()).collect();
        ids.into_iter().map(String::from).collect()
    }

    /// Distinct attempt numbers, ascending.
    pub fn attempts(&self) -> Vec<u32> {
        let attempts: BTreeSet<u32> = self.records.iter().map(|r| r.attempt).collect();
        attempts.into_iter().collect()
    }

    /// Look up a single score.
    pub fn score(&self, student_id: &str, attempt: u32, element: &str) -> Option<f64> {
        let target = self.taxonomy.element_index(element)?;
        self.records
            .binary_search_by(|r| {
                r.student_id
                    .as_str()
                    .cmp(student_id)
                    .then(r.attempt.cmp(&attempt))
                    .then(self.element_rank(&r.element).cmp(&target))
            })
            .ok()
            .map(|i| self.records[i].score)
    }

    /// Records pivoted to one row per (student, attempt), with one slot per
    /// taxonomy element in declaration order.
    pub fn rows(&self) -> Vec<ScoreRow> {
        let width = self.taxonomy.element_count();
        let mut rows: Vec<ScoreRow> = Vec::new();
        for r in &self.records {
            let same_key = rows
                .last()
                .is_some_and(|row| row.student_id == r.student_id && row.attempt == r.attempt);
            if !same_key {
                rows.push(ScoreRow {
                    student_id: r.student_id.clone(),
                    attempt: r.attempt,
                    scores: vec![None; width],
                });
            }
            if let Some(row) = rows.last_mut() {
                row.scores[self.element_rank(&r.element)] = Some(r.score);
            }
        }
        rows
    }

    fn element_rank(&self, element: &str) -> usize {
        self.taxonomy.element_index(element).unwrap_or(usize::MAX)
    }
}

fn compare_records(taxonomy: &Taxonomy, a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    let rank = |e: &str| taxonomy.element_index(e).unwrap_or(usize::MAX);
    a.student_id
        .cmp(&b.student_id)
        .then(a.attempt.cmp(&b.attempt))
        .then(rank(&a.element).cmp(&rank(&b.element)))
}

/// One (student, attempt) row of the score table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub student_id: String,
    pub attempt: u32,
    /// Scores in taxonomy element order; `None` where the table has no value.
    pub scores: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Socratic metrics
// ---------------------------------------------------------------------------

/// Definition of one Socratic dialogue metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Competency area (e.g. "Critical Thinking").
    pub competency_area: String,
    /// Metric name (e.g. "Logical Reasoning").
    pub metric: String,
    /// Unit of measurement (e.g. "rating").
    pub measurement: String,
}

impl MetricSpec {
    pub fn new(area: &str, metric: &str, measurement: &str) -> Self {
        Self {
            competency_area: area.into(),
            metric: metric.into(),
            measurement: measurement.into(),
        }
    }

    /// Column name used in the wide table, e.g. `socratic_Logical_Reasoning`.
    pub fn column_name(&self) -> String {
        format!("socratic_{}", self.metric.replace(' ', "_"))
    }

    /// The four built-in Socratic metrics.
    pub fn defaults() -> Vec<MetricSpec> {
        vec![
            MetricSpec::new("Question Formulation", "Question Depth", "levels"),
            MetricSpec::new("Response Quality", "Answer Completeness", "percent"),
            MetricSpec::new("Critical Thinking", "Logical Reasoning", "rating"),
            MetricSpec::new("Assumption Recognition", "Assumption Awareness", "rating"),
        ]
    }
}

/// One Socratic metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocraticRecord {
    pub student_id: String,
    pub attempt: u32,
    /// Metric column name.
    pub metric: String,
    pub value: f64,
}

/// Long-form Socratic table: one row per (student, attempt, metric).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocraticLong {
    metrics: Vec<String>,
    records: Vec<SocraticRecord>,
}

impl SocraticLong {
    /// Build a long table. Metrics not listed in `metrics` are appended in
    /// first-seen order; records are sorted by key.
    pub fn new(mut metrics: Vec<String>, mut records: Vec<SocraticRecord>) -> Result<Self, TableError> {
        ensure_unique_columns(&metrics)?;
        for r in &records {
            if r.attempt == 0 {
                return Err(TableError::ZeroAttempt(r.student_id.clone()));
            }
            if !metrics.contains(&r.metric) {
                metrics.push(r.metric.clone());
            }
        }

        let rank: BTreeMap<&str, usize> = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.as_str(), i))
            .collect();
        records.sort_by(|a, b| {
            a.student_id
                .cmp(&b.student_id)
                .then(a.attempt.cmp(&b.attempt))
                .then(rank[a.metric.as_str()].cmp(&rank[b.metric.as_str()]))
        });
        for pair in records.windows(2) {
            if pair[0].student_id == pair[1].student_id
                && pair[0].attempt == pair[1].attempt
                && pair[0].metric == pair[1].metric
            {
                return Err(TableError::DuplicateKey {
                    student_id: pair[1].student_id.clone(),
                    attempt: pair[1].attempt,
                    column: pair[1].metric.clone(),
                });
            }
        }

        Ok(Self { metrics, records })
    }

    /// Wrap records that are already unique and in key order.
    pub(crate) fn from_sorted(metrics: Vec<String>, records: Vec<SocraticRecord>) -> Self {
        Self { metrics, records }
    }

    /// Metric column names in table order.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn records(&self) -> &[SocraticRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pivot to the wide form keyed by (student_id, attempt).
    ///
    /// Cells absent from the long form stay `None`, so the pivot never
    /// invents or drops observations.
    pub fn pivot(&self) -> SocraticWide {
        let width = self.metrics.len();
        let column: BTreeMap<&str, usize> = self
            .metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.as_str(), i))
            .collect();

        let mut rows: Vec<WideRow> = Vec::new();
        for r in &self.records {
            let same_key = rows
                .last()
                .is_some_and(|row| row.student_id == r.student_id && row.attempt == r.attempt);
            if !same_key {
                rows.push(WideRow {
                    student_id: r.student_id.clone(),
                    attempt: r.attempt,
                    values: vec![None; width],
                });
            }
            if let Some(row) = rows.last_mut() {
                row.values[column[r.metric.as_str()]] = Some(r.value);
            }
        }

        SocraticWide {
            metrics: self.metrics.clone(),
            rows,
        }
    }
}

/// One row of the wide Socratic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub student_id: String,
    pub attempt: u32,
    /// Values in metric column order.
    pub values: Vec<Option<f64>>,
}

fn ensure_unique_columns(columns: &[String]) -> Result<(), TableError> {
    let mut seen = BTreeSet::new();
    for c in columns {
        if !seen.insert(c.as_str()) {
            return Err(TableError::DuplicateColumn(c.clone()));
        }
    }
    Ok(())
}

/// Wide-form Socratic table: one row per (student, attempt), one column per metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocraticWide {
    metrics: Vec<String>,
    rows: Vec<WideRow>,
}

impl SocraticWide {
    /// Build a wide table, rejecting ragged rows and duplicate keys.
    pub fn new(metrics: Vec<String>, mut rows: Vec<WideRow>) -> Result<Self, TableError> {
        ensure_unique_columns(&metrics)?;
        for row in &rows {
            if row.values.len() != metrics.len() {
                return Err(TableError::RaggedRow {
                    student_id: row.student_id.clone(),
                    attempt: row.attempt,
                    expected: metrics.len(),
                    found: row.values.len(),
                });
            }
            if row.attempt == 0 {
                return Err(TableError::ZeroAttempt(row.student_id.clone()));
            }
        }
        rows.sort_by(|a, b| {
            a.student_id
                .cmp(&b.student_id)
                .then(a.attempt.cmp(&b.attempt))
        });
        for pair in rows.windows(2) {
            if pair[0].student_id == pair[1].student_id && pair[0].attempt == pair[1].attempt {
                return Err(TableError::DuplicateKey {
                    student_id: pair[1].student_id.clone(),
                    attempt: pair[1].attempt,
                    column: "*".into(),
                });
            }
        }
        Ok(Self { metrics, rows })
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    /// Melt back to the long form. Inverse of [`SocraticLong::pivot`].
    pub fn melt(&self) -> SocraticLong {
        let records = self
            .rows
            .iter()
            .flat_map(|row| {
                self.metrics
                    .iter()
                    .zip(&row.values)
                    .filter_map(move |(metric, value)| {
                        value.map(|v| SocraticRecord {
                            student_id: row.student_id.clone(),
                            attempt: row.attempt,
                            metric: metric.clone(),
                            value: v,
                        })
                    })
            })
            .collect();

        // Rows are already key-sorted and metrics unique, so the melted
        // records are in long-table order.
        SocraticLong {
            metrics: self.metrics.clone(),
            records,
        }
    }
}
