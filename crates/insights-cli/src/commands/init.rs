//! The `insights init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    let path = std::path::Path::new("insights.toml");
    if path.exists() {
        println!("insights.toml already exists, skipping.");
    } else {
        std::fs::write(path, SAMPLE_CONFIG)?;
        println!("Created insights.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit insights.toml (seed, cohort size, thresholds)");
    println!("  2. Run: insights validate --config insights.toml");
    println!("  3. Run: insights analyze --format all");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# insights configuration

# Built-in taxonomy: "pi" or "proactive". A [[criteria]] list replaces it.
taxonomy = "pi"

[generator]
seed = 42
n_students = 12
n_attempts = 5
baseline_low = 55.0
baseline_high = 80.0
trend_slope = 3.0
criterion_bias = 5.0
noise_amplitude = 12.0

[analysis]
miss_threshold = 70.0
min_misses = 2
min_abs_corr = 0.3
student_id = "S01"
grouping = "student"
# "all", { first = 5 } or { recent = 3 }
attempt_window = "all"
# Cohort half for the networks: "all", "undergrad" or "graduate"
cohort = "all"
compare = ["undergrad", "graduate"]
# focus_criterion = "PI_01_Foster_Integrity"

[socratic]
noise_amplitude = 0.6
"#;
