//! TOML configuration: loading, environment overrides and validation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::generator::{SocraticModel, TrendModel};
use crate::misses::{Grouping, DEFAULT_MISS_THRESHOLD};
use crate::selection::{AttemptWindow, CohortSplit};
use crate::taxonomy::{Criterion, Taxonomy};

/// Generator section (`[generator]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub n_students: usize,
    pub n_attempts: u32,
    pub baseline_low: f64,
    pub baseline_high: f64,
    pub trend_slope: f64,
    pub criterion_bias: f64,
    pub noise_amplitude: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let trend = TrendModel::default();
        Self {
            seed: 42,
            n_students: 12,
            n_attempts: 5,
            baseline_low: trend.baseline_low,
            baseline_high: trend.baseline_high,
            trend_slope: trend.trend_slope,
            criterion_bias: trend.criterion_bias,
            noise_amplitude: trend.noise_amplitude,
        }
    }
}

impl GeneratorConfig {
    pub fn trend_model(&self) -> TrendModel {
        TrendModel {
            baseline_low: self.baseline_low,
            baseline_high: self.baseline_high,
            trend_slope: self.trend_slope,
            criterion_bias: self.criterion_bias,
            noise_amplitude: self.noise_amplitude,
        }
    }
}

/// Analysis section (`[analysis]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Scores strictly below this are misses.
    pub miss_threshold: f64,
    /// Minimum per-subject miss count for a co-miss or bipartite edge.
    pub min_misses: u32,
    /// Minimum |r| for a correlation edge.
    pub min_abs_corr: f64,
    /// Student profiled in the report; empty disables the profile.
    pub student_id: String,
    pub grouping: Grouping,
    /// Attempts analysed; `recent` counts back from the latest attempt.
    pub attempt_window: AttemptWindow,
    /// Cohort half the miss and correlation networks run on.
    pub cohort: CohortSplit,
    /// The two halves compared side by side.
    pub compare: [CohortSplit; 2],
    /// Criterion whose elements get their own co-miss network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_criterion: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            miss_threshold: DEFAULT_MISS_THRESHOLD,
            min_misses: 2,
            min_abs_corr: 0.3,
            student_id: "S01".to_string(),
            grouping: Grouping::Student,
            attempt_window: AttemptWindow::All,
            cohort: CohortSplit::All,
            compare: [CohortSplit::Undergrad, CohortSplit::Graduate],
            focus_criterion: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsConfig {
    /// Built-in taxonomy name, used when `criteria` is empty.
    #[serde(default = "default_taxonomy")]
    pub taxonomy: String,
    /// Explicit taxonomy override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub socratic: SocraticModel,
}

fn default_taxonomy() -> String {
    "pi".to_string()
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            taxonomy: default_taxonomy(),
            criteria: Vec::new(),
            generator: GeneratorConfig::default(),
            analysis: AnalysisConfig::default(),
            socratic: SocraticModel::default(),
        }
    }
}

impl InsightsConfig {
    /// Resolve the taxonomy: explicit criteria win over the built-in name.
    pub fn resolve_taxonomy(&self) -> Result<Taxonomy, ParamError> {
        if self.criteria.is_empty() {
            Taxonomy::builtin(&self.taxonomy)
        } else {
            Taxonomy::new(self.criteria.clone())
        }
    }

    /// Hard validation: every parameter the pipeline would reject.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.generator.n_students < 1 {
            return Err(ParamError::InvalidStudentCount(self.generator.n_students));
        }
        if self.generator.n_attempts < 1 {
            return Err(ParamError::InvalidAttemptCount(self.generator.n_attempts));
        }
        self.generator.trend_model().validate()?;
        self.socratic.validate()?;
        ParamError::ensure_finite("miss_threshold", self.analysis.miss_threshold)?;
        ParamError::ensure_range("min_abs_corr", self.analysis.min_abs_corr, 0.0, 1.0)?;
        self.analysis.attempt_window.validate()?;
        let taxonomy = self.resolve_taxonomy()?;
        if let Some(name) = &self.analysis.focus_criterion {
            taxonomy.criterion(name)?;
        }
        Ok(())
    }
}

/// Parse a TOML string (useful for testing).
pub fn parse_config_str(content: &str, source: &Path) -> Result<InsightsConfig> {
    toml::from_str::<InsightsConfig>(content)
        .with_context(|| format!("failed to parse config: {}", source.display()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `insights.toml` in the current directory
/// 2. `~/.config/insights/config.toml`
///
/// Environment variable overrides: `INSIGHTS_SEED`, `INSIGHTS_MISS_THRESHOLD`.
pub fn load_config() -> Result<InsightsConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<InsightsConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("insights.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content, &path)?
        }
        None => InsightsConfig::default(),
    };

    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Apply `INSIGHTS_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(
    mut config: InsightsConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<InsightsConfig> {
    if let Some(seed) = lookup("INSIGHTS_SEED") {
        config.generator.seed = seed
            .trim()
            .parse()
            .with_context(|| format!("INSIGHTS_SEED is not an unsigned integer: {seed}"))?;
    }
    if let Some(threshold) = lookup("INSIGHTS_MISS_THRESHOLD") {
        config.analysis.miss_threshold = threshold
            .trim()
            .parse()
            .with_context(|| format!("INSIGHTS_MISS_THRESHOLD is not a number: {threshold}"))?;
    }
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("insights"))
}

/// A non-fatal configuration issue.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The offending field (if applicable).
    pub field: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Check a configuration for settings that are legal but probably unintended.
pub fn validate_config(config: &InsightsConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: Some(field.to_string()),
            message,
        })
    };

    if let Ok(taxonomy) = config.resolve_taxonomy() {
        if !taxonomy.is_uniform() {
            let counts: Vec<String> = taxonomy
                .criteria()
                .iter()
                .map(|c| format!("{}={}", c.name, c.elements.len()))
                .collect();
            warn(
                "criteria",
                format!("criteria declare different element counts ({})", counts.join(", ")),
            );
        }
    }

    if !config.criteria.is_empty() && config.taxonomy != default_taxonomy() {
        warn(
            "taxonomy",
            format!("taxonomy '{}' is ignored because [[criteria]] is set", config.taxonomy),
        );
    }

    if config.analysis.student_id.trim().is_empty() {
        warn("analysis.student_id", "student_id is empty; no student profile will be produced".into());
    }

    if config.analysis.min_misses == 0 {
        warn(
            "analysis.min_misses",
            "min_misses is 0; every pair of columns will be linked".into(),
        );
    }

    match config.analysis.attempt_window {
        AttemptWindow::First(n) | AttemptWindow::Recent(n) if n >= config.generator.n_attempts => warn(
            "analysis.attempt_window",
            format!(
                "window '{}' covers all {} generated attempts",
                config.analysis.attempt_window, config.generator.n_attempts
            ),
        ),
        _ => {}
    }

    if config.analysis.cohort != CohortSplit::All && config.generator.n_students < 2 {
        warn(
            "analysis.cohort",
            format!("cohort '{}' is empty with fewer than 2 students", config.analysis.cohort),
        );
    }

    if config.generator.n_students < crate::correlation::MIN_SHARED_STUDENTS {
        warn(
            "generator.n_students",
            format!(
                "{} student(s) is too few for correlations (need at least {})",
                config.generator.n_students,
                crate::correlation::MIN_SHARED_STUDENTS
            ),
        );
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
taxonomy = "proactive"

[generator]
seed = 7
n_students = 20
n_attempts = 3
trend_slope = 2

[analysis]
miss_threshold = 65.5
min_misses = 1
min_abs_corr = 0.5
student_id = "S03"
grouping = "student_attempt"
attempt_window = { recent = 2 }
cohort = "graduate"
compare = ["all", "undergrad"]
focus_criterion = "PRO_02_Response_Quality"

[socratic]
noise_amplitude = 0.2
"#;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = parse_config_str("", Path::new("empty.toml")).unwrap();
        assert_eq!(config, InsightsConfig::default());
        assert_eq!(config.generator.seed, 42);
        assert_eq!(config.generator.n_students, 12);
        assert_eq!(config.analysis.miss_threshold, 70.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config_str(FULL_TOML, Path::new("full.toml")).unwrap();
        assert_eq!(config.generator.seed, 7);
        assert_eq!(config.generator.trend_slope, 2.0);
        assert_eq!(config.generator.noise_amplitude, 12.0);
        assert_eq!(config.analysis.grouping, Grouping::StudentAttempt);
        assert_eq!(config.analysis.student_id, "S03");
        assert_eq!(config.socratic.noise_amplitude, 0.2);
        assert_eq!(config.socratic.scale_max, 4.0);
        assert_eq!(config.resolve_taxonomy().unwrap().element_count(), 20);
        assert_eq!(config.analysis.attempt_window, AttemptWindow::Recent(2));
        assert_eq!(config.analysis.cohort, CohortSplit::Graduate);
        assert_eq!(config.analysis.compare, [CohortSplit::All, CohortSplit::Undergrad]);
        assert_eq!(config.analysis.focus_criterion.as_deref(), Some("PRO_02_Response_Quality"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn subset_settings_are_validated() {
        let mut config = InsightsConfig::default();
        config.analysis.attempt_window = AttemptWindow::Recent(0);
        assert!(matches!(config.validate(), Err(ParamError::EmptyAttemptWindow(_))));

        let mut config = InsightsConfig::default();
        config.analysis.focus_criterion = Some("PRO_02_Response_Quality".into());
        assert_eq!(
            config.validate(),
            Err(ParamError::UnknownCriterion("PRO_02_Response_Quality".into()))
        );

        let mut config = InsightsConfig::default();
        config.analysis.attempt_window = AttemptWindow::First(5);
        config.analysis.cohort = CohortSplit::Undergrad;
        config.generator.n_students = 1;
        let fields: Vec<String> = validate_config(&config)
            .into_iter()
            .filter_map(|w| w.field)
            .collect();
        assert!(fields.contains(&"analysis.attempt_window".to_string()));
        assert!(fields.contains(&"analysis.cohort".to_string()));
    }

    #[test]
    fn explicit_criteria_override_builtin() {
        let toml = r#"
[[criteria]]
name = "A"
elements = ["a1", "a2"]

[[criteria]]
name = "B"
elements = ["b1"]
"#;
        let config = parse_config_str(toml, Path::new("c.toml")).unwrap();
        let taxonomy = config.resolve_taxonomy().unwrap();
        assert_eq!(taxonomy.criterion_names().collect::<Vec<_>>(), vec!["A", "B"]);

        let warnings = validate_config(&config);
        assert!(warnings.iter().any(|w| w.message.contains("different element counts")));
    }

    #[test]
    fn hard_errors_are_not_warnings() {
        let mut config = InsightsConfig::default();
        config.analysis.min_abs_corr = 2.0;
        assert!(matches!(config.validate(), Err(ParamError::OutOfRange { .. })));

        let mut config = InsightsConfig::default();
        config.generator.n_attempts = 0;
        assert_eq!(config.validate(), Err(ParamError::InvalidAttemptCount(0)));

        let mut config = InsightsConfig::default();
        config.taxonomy = "unknown".into();
        assert!(matches!(config.validate(), Err(ParamError::UnknownTaxonomy(_))));
    }

    #[test]
    fn warnings_for_suspicious_settings() {
        let mut config = InsightsConfig::default();
        assert!(validate_config(&config).is_empty());

        config.analysis.min_misses = 0;
        config.analysis.student_id = " ".into();
        config.generator.n_students = 2;
        let fields: Vec<String> = validate_config(&config)
            .into_iter()
            .filter_map(|w| w.field)
            .collect();
        assert_eq!(
            fields,
            vec!["analysis.student_id", "analysis.min_misses", "generator.n_students"]
        );
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let config = apply_env_overrides(InsightsConfig::default(), |name| match name {
            "INSIGHTS_SEED" => Some("99".into()),
            "INSIGHTS_MISS_THRESHOLD" => Some("60.5".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.generator.seed, 99);
        assert_eq!(config.analysis.miss_threshold, 60.5);

        let bad = apply_env_overrides(InsightsConfig::default(), |name| {
            (name == "INSIGHTS_SEED").then(|| "not-a-number".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/insights.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insights.toml");
        std::fs::write(&path, FULL_TOML).unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.analysis.min_misses, 1);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_config_str("this is not [valid toml }{", Path::new("bad.toml")).is_err());
        assert!(parse_config_str("[generator]\nseed = -1\n", Path::new("neg.toml")).is_err());
    }
}
