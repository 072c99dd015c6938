//! Seeded synthetic data generators.
//!
//! Every random draw comes from a ChaCha8 stream whose seed is the FxHash of
//! `(seed, stream tag, student ordinal, attempt)`. Attempt `0` is the
//! student-level stream (baseline and biases). Each (student, attempt) cell
//! is therefore a pure function of its index: generation order, cohort size
//! and parallelism never change a value.

use std::hash::{Hash, Hasher};

use fxhash::FxHasher;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::model::{student_id, MetricSpec, ScoreRecord, ScoreTable, SocraticLong, SocraticRecord};
use crate::taxonomy::Taxonomy;

/// Stream tag for rubric element scores ("SCORES").
pub const SCORE_STREAM: u64 = 0x5343_4f52_4553;
/// Stream tag for Socratic metrics ("SOCRAT").
pub const SOCRATIC_STREAM: u64 = 0x534f_4352_4154;

/// Lower clamp bound for rubric scores.
pub const SCORE_MIN: f64 = 40.0;
/// Upper clamp bound for rubric scores.
pub const SCORE_MAX: f64 = 100.0;

/// Derive the ChaCha seed for one (student, attempt) cell of a stream.
pub fn stream_seed(seed: u64, stream: u64, ordinal: usize, attempt: u32) -> u64 {
    let mut hasher = FxHasher::default();
    seed.hash(&mut hasher);
    stream.hash(&mut hasher);
    (ordinal as u64).hash(&mut hasher);
    u64::from(attempt).hash(&mut hasher);
    hasher.finish()
}

fn cell_rng(seed: u64, stream: u64, ordinal: usize, attempt: u32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(stream_seed(seed, stream, ordinal, attempt))
}

/// Bounded, zero-centred noise in `[-1, 1)`: a rescaled sum of three uniforms.
fn bounded_noise(rng: &mut ChaCha8Rng) -> f64 {
    let sum = rng.gen::<f64>() + rng.gen::<f64>() + rng.gen::<f64>();
    sum / 1.5 - 1.0
}

fn uniform(rng: &mut ChaCha8Rng, low: f64, high: f64) -> f64 {
    low + (high - low) * rng.gen::<f64>()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Rubric score generator
// ---------------------------------------------------------------------------

/// Tuning of the trend/noise model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendModel {
    /// Lower bound of the per-student baseline.
    pub baseline_low: f64,
    /// Upper bound of the per-student baseline.
    pub baseline_high: f64,
    /// Expected gain per attempt; must be positive.
    pub trend_slope: f64,
    /// Half-width of the per-student, per-criterion bias.
    pub criterion_bias: f64,
    /// Half-width of the per-element noise.
    pub noise_amplitude: f64,
}

impl Default for TrendModel {
    fn default() -> Self {
        Self {
            baseline_low: 55.0,
            baseline_high: 80.0,
            trend_slope: 3.0,
            criterion_bias: 5.0,
            noise_amplitude: 12.0,
        }
    }
}

impl TrendModel {
    pub fn validate(&self) -> Result<(), ParamError> {
        ParamError::ensure_finite("baseline_low", self.baseline_low)?;
        ParamError::ensure_range(
            "baseline_high",
            self.baseline_high,
            self.baseline_low,
            f64::MAX,
        )?;
        ParamError::ensure_range("trend_slope", self.trend_slope, f64::MIN_POSITIVE, f64::MAX)?;
        ParamError::ensure_range("criterion_bias", self.criterion_bias, 0.0, f64::MAX)?;
        ParamError::ensure_range("noise_amplitude", self.noise_amplitude, 0.0, f64::MAX)?;
        Ok(())
    }
}

/// Generates rubric score tables for a fixed taxonomy and trend model.
#[derive(Debug, Clone)]
pub struct ScoreGenerator {
    taxonomy: Taxonomy,
    model: TrendModel,
}

impl ScoreGenerator {
    pub fn new(taxonomy: Taxonomy, model: TrendModel) -> Result<Self, ParamError> {
        model.validate()?;
        Ok(Self { taxonomy, model })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn model(&self) -> &TrendModel {
        &self.model
    }

    /// Generate the complete table for `n_students` × `n_attempts` × elements.
    pub fn generate(&self, seed: u64, n_students: usize, n_attempts: u32) -> Result<ScoreTable, ParamError> {
        validate_cohort(n_students, n_attempts)?;

        let mut records = Vec::with_capacity(n_students * n_attempts as usize * self.taxonomy.element_count());
        for ordinal in 1..=n_students {
            let id = student_id(ordinal, n_students);
            self.generate_student(seed, ordinal, &id, n_attempts, &mut records);
        }

        tracing::debug!(
            seed,
            n_students,
            n_attempts,
            records = records.len(),
            "generated score table"
        );

        // Ordinal order matches id order because ids are zero-padded.
        Ok(ScoreTable::from_sorted(self.taxonomy.clone(), records))
    }

    fn generate_student(
        &self,
        seed: u64,
        ordinal: usize,
        id: &str,
        n_attempts: u32,
        out: &mut Vec<ScoreRecord>,
    ) {
        let m = &self.model;
        let mut traits = cell_rng(seed, SCORE_STREAM, ordinal, 0);
        let baseline = uniform(&mut traits, m.baseline_low, m.baseline_high);
        let biases: Vec<f64> = self
            .taxonomy
            .criteria()
            .iter()
            .map(|_| m.criterion_bias * (traits.gen::<f64>() * 2.0 - 1.0))
            .collect();

        for attempt in 1..=n_attempts {
            let mut rng = cell_rng(seed, SCORE_STREAM, ordinal, attempt);
            let expected = baseline + m.trend_slope * f64::from(attempt - 1);
            for (criterion, bias) in self.taxonomy.criteria().iter().zip(&biases) {
                for element in &criterion.elements {
                    let raw = expected + bias + m.noise_amplitude * bounded_noise(&mut rng);
                    out.push(ScoreRecord {
                        student_id: id.to_string(),
                        attempt,
                        element: element.clone(),
                        score: round1(raw).clamp(SCORE_MIN, SCORE_MAX),
                    });
                }
            }
        }
    }
}

/// Generate a score table with the default trend model.
pub fn generate(
    seed: u64,
    n_students: usize,
    n_attempts: u32,
    taxonomy: &Taxonomy,
) -> Result<ScoreTable, ParamError> {
    ScoreGenerator::new(taxonomy.clone(), TrendModel::default())?.generate(seed, n_students, n_attempts)
}

fn validate_cohort(n_students: usize, n_attempts: u32) -> Result<(), ParamError> {
    if n_students < 1 {
        return Err(ParamError::InvalidStudentCount(n_students));
    }
    if n_attempts < 1 {
        return Err(ParamError::InvalidAttemptCount(n_attempts));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Socratic metric generator
// ---------------------------------------------------------------------------

/// Tuning of the Socratic metric model (0–4 rubric scale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocraticModel {
    pub scale_min: f64,
    pub scale_max: f64,
    pub baseline_low: f64,
    pub baseline_high: f64,
    /// Minimum gain per attempt.
    pub progression_low: f64,
    /// Maximum gain per attempt.
    pub progression_high: f64,
    pub noise_amplitude: f64,
}

impl Default for SocraticModel {
    fn default() -> Self {
        Self {
            scale_min: 0.0,
            scale_max: 4.0,
            baseline_low: 1.2,
            baseline_high: 2.8,
            progression_low: 0.1,
            progression_high: 0.3,
            noise_amplitude: 0.6,
        }
    }
}

impl SocraticModel {
    pub fn validate(&self) -> Result<(), ParamError> {
        ParamError::ensure_finite("scale_min", self.scale_min)?;
        ParamError::ensure_range("scale_max", self.scale_max, self.scale_min, f64::MAX)?;
        ParamError::ensure_finite("baseline_low", self.baseline_low)?;
        ParamError::ensure_range("baseline_high", self.baseline_high, self.baseline_low, f64::MAX)?;
        ParamError::ensure_range("progression_low", self.progression_low, 0.0, f64::MAX)?;
        ParamError::ensure_range(
            "progression_high",
            self.progression_high,
            self.progression_low,
            f64::MAX,
        )?;
        ParamError::ensure_range("noise_amplitude", self.noise_amplitude, 0.0, f64::MAX)?;
        Ok(())
    }
}

/// Generates the long-form Socratic metrics table.
#[derive(Debug, Clone)]
pub struct SocraticGenerator {
    metrics: Vec<MetricSpec>,
    model: SocraticModel,
}

impl SocraticGenerator {
    pub fn new(metrics: Vec<MetricSpec>, model: SocraticModel) -> Result<Self, ParamError> {
        model.validate()?;
        let mut seen = std::collections::HashSet::new();
        for spec in &metrics {
            let column = spec.column_name();
            if !seen.insert(column.clone()) {
                return Err(ParamError::DuplicateElement(column));
            }
        }
        Ok(Self { metrics, model })
    }

    pub fn metrics(&self) -> &[MetricSpec] {
        &self.metrics
    }

    pub fn generate(&self, seed: u64, n_students: usize, n_attempts: u32) -> Result<SocraticLong, ParamError> {
        validate_cohort(n_students, n_attempts)?;
        let m = &self.model;
        let columns: Vec<String> = self.metrics.iter().map(MetricSpec::column_name).collect();

        let mut records = Vec::with_capacity(n_students * n_attempts as usize * columns.len());
        for ordinal in 1..=n_students {
            let id = student_id(ordinal, n_students);
            let mut traits = cell_rng(seed, SOCRATIC_STREAM, ordinal, 0);
            let bases: Vec<f64> = columns
                .iter()
                .map(|_| uniform(&mut traits, m.baseline_low, m.baseline_high))
                .collect();

            for attempt in 1..=n_attempts {
                let mut rng = cell_rng(seed, SOCRATIC_STREAM, ordinal, attempt);
                for (column, base) in columns.iter().zip(&bases) {
                    let gain = uniform(&mut rng, m.progression_low, m.progression_high);
                    let progression = f64::from(attempt - 1) * gain;
                    let raw = base + progression + m.noise_amplitude * bounded_noise(&mut rng);
                    records.push(SocraticRecord {
                        student_id: id.clone(),
                        attempt,
                        metric: column.clone(),
                        value: round1(raw).clamp(m.scale_min, m.scale_max),
                    });
                }
            }
        }

        tracing::debug!(seed, n_students, n_attempts, records = records.len(), "generated socratic table");

        Ok(SocraticLong::from_sorted(columns, records))
    }
}

impl Default for SocraticGenerator {
    fn default() -> Self {
        Self {
            metrics: MetricSpec::defaults(),
            model: SocraticModel::default(),
        }
    }
}

/// Generate the Socratic table with the default metrics and model.
pub fn generate_socratic(seed: u64, n_students: usize, n_attempts: u32) -> Result<SocraticLong, ParamError> {
    SocraticGenerator::default().generate(seed, n_students, n_attempts)
}
