//! The `insights generate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use insights_core::config::{load_config_from, InsightsConfig};
use insights_core::pipeline::Pipeline;
use insights_report::csv::write_all;

/// Cohort-size flags shared by `generate` and `analyze`.
#[derive(Debug, Default)]
pub struct CohortOverrides {
    pub seed: Option<u64>,
    pub n_students: Option<usize>,
    pub n_attempts: Option<u32>,
}

impl CohortOverrides {
    pub fn apply(&self, config: &mut InsightsConfig) {
        if let Some(seed) = self.seed {
            config.generator.seed = seed;
        }
        if let Some(n) = self.n_students {
            config.generator.n_students = n;
        }
        if let Some(n) = self.n_attempts {
            config.generator.n_attempts = n;
        }
    }
}

pub fn execute(
    config_path: Option<PathBuf>,
    overrides: CohortOverrides,
    output: PathBuf,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    overrides.apply(&mut config);

    let g = &config.generator;
    eprintln!(
        "insights v{}: generating {} students x {} attempts (seed {})",
        env!("CARGO_PKG_VERSION"),
        g.n_students,
        g.n_attempts,
        g.seed
    );

    let pipeline = Pipeline::new(config);
    let (scores, socratic) = pipeline.generate().context("invalid generator parameters")?;

    for path in write_all(&output, &scores, &socratic)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
