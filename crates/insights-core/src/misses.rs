//! Miss detection and per-subject miss counting.
//!
//! A miss is a score strictly below the threshold. Miss flags are derived on
//! demand from a [`ScoreTable`]; they are never stored alongside the scores.

use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::model::ScoreTable;
use crate::taxonomy::Taxonomy;

/// Default miss threshold.
pub const DEFAULT_MISS_THRESHOLD: f64 = 70.0;

/// Row unit of a miss-count table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// One row per student, summed over all attempts.
    #[default]
    Student,
    /// One row per (student, attempt).
    StudentAttempt,
}

/// Column unit of a miss-count table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Criterion,
    Element,
}

/// Miss flag for one score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissFlag {
    pub student_id: String,
    pub attempt: u32,
    pub element: String,
    pub miss: bool,
}

/// Miss flags for every record of a score table, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct MissTable {
    taxonomy: Taxonomy,
    threshold: f64,
    flags: Vec<MissFlag>,
}

/// Flag every score below `threshold`.
pub fn misses(scores: &ScoreTable, threshold: f64) -> Result<MissTable, ParamError> {
    let threshold = ParamError::ensure_finite("miss_threshold", threshold)?;
    let flags = scores
        .records()
        .iter()
        .map(|r| MissFlag {
            student_id: r.student_id.clone(),
            attempt: r.attempt,
            element: r.element.clone(),
            miss: r.score < threshold,
        })
        .collect();
    Ok(MissTable {
        taxonomy: scores.taxonomy().clone(),
        threshold,
        flags,
    })
}

impl MissTable {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn flags(&self) -> &[MissFlag] {
        &self.flags
    }

    pub fn total_misses(&self) -> usize {
        self.flags.iter().filter(|f| f.miss).count()
    }

    /// Aggregate the flags into a subject × column count matrix.
    pub fn counts(&self, grouping: Grouping, level: Level) -> MissCounts {
        let columns: Vec<String> = match level {
            Level::Criterion => self.taxonomy.criterion_names().map(String::from).collect(),
            Level::Element => self.taxonomy.elements().map(String::from).collect(),
        };

        let mut rows: Vec<MissCountRow> = Vec::new();
        for flag in &self.flags {
            let attempt = match grouping {
                Grouping::Student => None,
                Grouping::StudentAttempt => Some(flag.attempt),
            };
            // Flags are in (student, attempt) order, so each subject is contiguous.
            let same_subject = rows
                .last()
                .is_some_and(|row| row.student_id == flag.student_id && row.attempt == attempt);
            if !same_subject {
                rows.push(MissCountRow {
                    student_id: flag.student_id.clone(),
                    attempt,
                    counts: vec![0; columns.len()],
                });
            }
            if !flag.miss {
                continue;
            }
            let column = match level {
                Level::Criterion => self.taxonomy.criterion_index_of(&flag.element),
                Level::Element => self.taxonomy.element_index(&flag.element),
            };
            if let (Some(row), Some(column)) = (rows.last_mut(), column) {
                row.counts[column] += 1;
            }
        }

        MissCounts {
            grouping,
            level,
            threshold: self.threshold,
            columns,
            rows,
        }
    }
}

/// Miss counts for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissCountRow {
    pub student_id: String,
    /// Set only for [`Grouping::StudentAttempt`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Counts in column order.
    pub counts: Vec<u32>,
}

impl MissCountRow {
    /// Display label of the subject: `S01`, or `S01@3` for a single attempt.
    pub fn subject(&self) -> String {
        match self.attempt {
            Some(attempt) => format!("{}@{attempt}", self.student_id),
            None => self.student_id.clone(),
        }
    }
}

/// A subject × column miss-count matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissCounts {
    pub grouping: Grouping,
    pub level: Level,
    pub threshold: f64,
    /// Criterion or element names in taxonomy order.
    pub columns: Vec<String>,
    /// Rows sorted by subject.
    pub rows: Vec<MissCountRow>,
}

impl MissCounts {
    /// Total misses per column, for node sizing.
    pub fn column_totals(&self) -> Vec<u32> {
        let mut totals = vec![0u32; self.columns.len()];
        for row in &self.rows {
            for (total, count) in totals.iter_mut().zip(&row.counts) {
                *total += count;
            }
        }
        totals
    }

    /// Count for a subject label and column name.
    pub fn get(&self, subject: &str, column: &str) -> Option<u32> {
        let ci = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.subject() == subject)
            .map(|row| row.counts[ci])
    }

    pub fn row(&self, subject: &str) -> Option<&MissCountRow> {
        self.rows.iter().find(|row| row.subject() == subject)
    }

    /// The sub-matrix of the columns named in `keep`, in this table's order.
    pub fn select_columns(&self, keep: &[String]) -> MissCounts {
        let picked: Vec<usize> = (0..self.columns.len())
            .filter(|&i| keep.contains(&self.columns[i]))
            .collect();
        MissCounts {
            grouping: self.grouping,
            level: self.level,
            threshold: self.threshold,
            columns: picked.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| MissCountRow {
                    student_id: row.student_id.clone(),
                    attempt: row.attempt,
                    counts: picked.iter().map(|&i| row.counts[i]).collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate;
    use crate::model::ScoreRecord;
    use crate::taxonomy::Criterion;

    fn rec(student: &str, attempt: u32, element: &str, score: f64) -> ScoreRecord {
        ScoreRecord {
            student_id: student.into(),
            attempt,
            element: element.into(),
            score,
        }
    }

    fn small_taxonomy() -> Taxonomy {
        Taxonomy::new(vec![
            Criterion::new("A", &["a1", "a2"]),
            Criterion::new("B", &["b1", "b2", "b3"]),
        ])
        .unwrap()
    }

    #[test]
    fn threshold_is_strict() {
        let table = ScoreTable::from_records(
            small_taxonomy(),
            vec![rec("S01", 1, "a1", 70.0), rec("S01", 1, "a2", 69.9)],
        )
        .unwrap();
        let m = misses(&table, 70.0).unwrap();
        let flags: Vec<bool> = m.flags().iter().map(|f| f.miss).collect();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(m.total_misses(), 1);
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let table = generate(1, 2, 2, &Taxonomy::default()).unwrap();
        assert!(matches!(
            misses(&table, f64::NAN),
            Err(ParamError::NonFinite { .. })
        ));
        assert!(misses(&table, f64::INFINITY).is_err());
    }

    #[test]
    fn criterion_counts_sum_declared_elements() {
        let table = ScoreTable::from_records(
            small_taxonomy(),
            vec![
                rec("S01", 1, "a1", 50.0),
                rec("S01", 1, "b1", 50.0),
                rec("S01", 1, "b3", 50.0),
                rec("S01", 2, "b2", 50.0),
                rec("S02", 1, "a2", 90.0),
            ],
        )
        .unwrap();
        let counts = misses(&table, 70.0)
            .unwrap()
            .counts(Grouping::Student, Level::Criterion);

        assert_eq!(counts.columns, vec!["A", "B"]);
        assert_eq!(counts.rows.len(), 2);
        assert_eq!(counts.rows[0].counts, vec![1, 3]);
        assert_eq!(counts.rows[1].counts, vec![0, 0]);
        assert_eq!(counts.column_totals(), vec![1, 3]);
        assert_eq!(counts.get("S01", "B"), Some(3));
    }

    #[test]
    fn attempt_grouping_keeps_one_row_per_attempt() {
        let table = ScoreTable::from_records(
            small_taxonomy(),
            vec![
                rec("S01", 1, "a1", 50.0),
                rec("S01", 2, "a1", 50.0),
                rec("S01", 2, "a2", 50.0),
            ],
        )
        .unwrap();
        let counts = misses(&table, 70.0)
            .unwrap()
            .counts(Grouping::StudentAttempt, Level::Element);

        assert_eq!(counts.grouping, Grouping::StudentAttempt);
        assert_eq!(counts.columns, vec!["a1", "a2", "b1", "b2", "b3"]);
        let subjects: Vec<String> = counts.rows.iter().map(MissCountRow::subject).collect();
        assert_eq!(subjects, vec!["S01@1", "S01@2"]);
        assert_eq!(counts.rows[1].counts, vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn golden_cohort_miss_counts() {
        let table = generate(42, 12, 5, &Taxonomy::default()).unwrap();
        let counts = misses(&table, 70.0)
            .unwrap()
            .counts(Grouping::default(), Level::default());

        assert_eq!(counts.rows.len(), 12);
        assert_eq!(counts.get("S01", "PI_01_Foster_Integrity"), Some(1));
        assert_eq!(counts.rows[0].counts, vec![1, 4, 0]);
        assert_eq!(counts.rows[1].counts, vec![16, 15, 17]);
        assert_eq!(counts.rows[2].counts, vec![1, 0, 0]);

        let other = generate(43, 12, 5, &Taxonomy::default()).unwrap();
        let other_counts = misses(&other, 70.0)
            .unwrap()
            .counts(Grouping::Student, Level::Criterion);
        assert_ne!(other_counts.rows, counts.rows);
        assert_eq!(other_counts.get("S01", "PI_01_Foster_Integrity"), Some(0));
    }

    #[test]
    fn golden_first_attempt_scores() {
        let table = generate(42, 12, 5, &Taxonomy::default()).unwrap();
        let first: Vec<f64> = table
            .records()
            .iter()
            .take(4)
            .map(|r| r.score)
            .collect();
        assert_eq!(first, vec![69.8, 76.3, 77.1, 75.7]);
    }

    #[test]
    fn column_selection_keeps_table_order() {
        let table = ScoreTable::from_records(
            small_taxonomy(),
            vec![
                rec("S01", 1, "a1", 50.0),
                rec("S01", 1, "b1", 50.0),
                rec("S01", 1, "b3", 50.0),
                rec("S02", 1, "b2", 50.0),
            ],
        )
        .unwrap();
        let counts = misses(&table, 70.0)
            .unwrap()
            .counts(Grouping::Student, Level::Element);
        let focus = counts.select_columns(&["b3".to_string(), "b1".to_string(), "zz".to_string()]);

        assert_eq!(focus.columns, vec!["b1", "b3"]);
        assert_eq!(focus.level, Level::Element);
        assert_eq!(focus.rows.len(), 2);
        assert_eq!(focus.get("S01", "b3"), Some(1));
        assert_eq!(focus.rows[1].counts, vec![0, 0]);
    }
}
