//! Error types for the analytics core.
//!
//! Parameter errors are raised before any generation or analysis starts, so
//! callers never observe a partially built table or graph.

use thiserror::Error;

/// Invalid parameters or taxonomy definitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// The cohort must contain at least one student.
    #[error("n_students must be at least 1, got {0}")]
    InvalidStudentCount(usize),

    /// Every student must have at least one attempt.
    #[error("n_attempts must be at least 1, got {0}")]
    InvalidAttemptCount(u32),

    /// A float parameter was NaN or infinite.
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    /// A float parameter fell outside its allowed range.
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The taxonomy declares no criteria.
    #[error("taxonomy must declare at least one criterion")]
    EmptyTaxonomy,

    /// A criterion declares no elements.
    #[error("criterion '{0}' declares no elements")]
    EmptyCriterion(String),

    /// Two criteria share a name.
    #[error("duplicate criterion name: {0}")]
    DuplicateCriterion(String),

    /// An element name appears more than once in the taxonomy.
    #[error("duplicate element name: {0}")]
    DuplicateElement(String),

    /// A named built-in taxonomy does not exist.
    #[error("unknown taxonomy: {0} (expected \"pi\" or \"proactive\")")]
    UnknownTaxonomy(String),

    /// A criterion name that the taxonomy does not declare.
    #[error("unknown criterion: {0}")]
    UnknownCriterion(String),

    /// Two nodes of different kinds would share an id in one graph.
    #[error("node id '{0}' names both a subject and a column")]
    NodeIdClash(String),

    /// An attempt window that selects no attempt at all.
    #[error("attempt window must span at least one attempt, got {0}")]
    EmptyAttemptWindow(String),
}

impl ParamError {
    /// Check that `value` is finite.
    pub fn ensure_finite(name: &'static str, value: f64) -> Result<f64, ParamError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ParamError::NonFinite { name, value })
        }
    }

    /// Check that `value` is finite and within `[min, max]`.
    pub fn ensure_range(
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<f64, ParamError> {
        Self::ensure_finite(name, value)?;
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ParamError::OutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

/// Structural problems with a score or metric table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    /// The same primary key appeared twice.
    #[error("duplicate row for student {student_id}, attempt {attempt}, column {column}")]
    DuplicateKey {
        student_id: String,
        attempt: u32,
        column: String,
    },

    /// A row's value count does not match the header.
    #[error("row for student {student_id}, attempt {attempt} has {found} values, expected {expected}")]
    RaggedRow {
        student_id: String,
        attempt: u32,
        expected: usize,
        found: usize,
    },

    /// A column is not part of the taxonomy.
    #[error("unknown element column: {0}")]
    UnknownElement(String),

    /// A column name appears twice in a header.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// Attempts are 1-based.
    #[error("attempt must be at least 1 for student {0}")]
    ZeroAttempt(String),
}
