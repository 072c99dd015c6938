//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs `insights` inside `dir` with HOME pointed there too, so no user
/// config leaks into the test.
fn insights(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("insights").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("INSIGHTS_SEED")
        .env_remove("INSIGHTS_MISS_THRESHOLD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn generate_writes_three_tables() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["generate", "--output", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scores.csv"))
        .stdout(predicate::str::contains("socratic_long.csv"))
        .stdout(predicate::str::contains("socratic_wide.csv"));

    let scores = std::fs::read_to_string(dir.path().join("data/scores.csv")).unwrap();
    let mut lines = scores.lines();
    assert!(lines
        .next()
        .unwrap()
        .starts_with("student_id,attempt,honesty_transparency"));
    assert_eq!(lines.count(), 12 * 5);

    let wide = std::fs::read_to_string(dir.path().join("data/socratic_wide.csv")).unwrap();
    assert_eq!(wide.lines().count(), 1 + 12 * 5);
}

#[test]
fn generate_respects_cohort_flags() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["generate", "--n-students", "3", "--n-attempts", "2", "--output", "data"])
        .assert()
        .success();

    let scores = std::fs::read_to_string(dir.path().join("data/scores.csv")).unwrap();
    assert_eq!(scores.lines().count(), 1 + 3 * 2);
    assert!(scores.contains("\nS03,2,"));
}

#[test]
fn generate_rejects_empty_cohort() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["generate", "--n-students", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("student"));
}

#[test]
fn validate_default_config() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 criteria, 12 elements"))
        .stdout(predicate::str::contains("Config valid."));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("warn.toml");
    std::fs::write(&path, "[analysis]\nmin_misses = 0\nstudent_id = \"\"\n").unwrap();

    insights(&dir)
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[analysis.min_misses] WARNING"))
        .stdout(predicate::str::contains("[analysis.student_id] WARNING"))
        .stdout(predicate::str::contains("2 warning(s) found."));
}

#[test]
fn validate_unknown_taxonomy_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "taxonomy = \"nursing\"\n").unwrap();

    insights(&dir)
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("nursing"));
}

#[test]
fn validate_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["validate", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn init_creates_config_once() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created insights.toml"));
    assert!(dir.path().join("insights.toml").exists());

    insights(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    // The local file is picked up by the default search.
    insights(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config valid."));
}

#[test]
fn analyze_requires_both_tables() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["analyze", "--scores", "scores.csv"])
        .assert()
        .failure();
}

#[test]
fn analyze_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["analyze", "--format", "sarif"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format 'sarif'"));
}

#[test]
fn analyze_rejects_out_of_range_correlation_cutoff() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["analyze", "--min-abs-corr", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_abs_corr"));
}

#[test]
fn env_override_changes_seed() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .env("INSIGHTS_SEED", "not-a-seed")
        .arg("generate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("INSIGHTS_SEED"));
}

#[test]
fn analyze_rejects_generator_flags_with_tables() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args([
            "analyze",
            "--scores",
            "scores.csv",
            "--socratic",
            "socratic.csv",
            "--seed",
            "7",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn analyze_rejects_empty_attempt_window() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["analyze", "--attempt-window", "recent:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one attempt"));
}

#[test]
fn analyze_rejects_unknown_focus_criterion() {
    let dir = TempDir::new().unwrap();
    insights(&dir)
        .args(["analyze", "--focus-criterion", "PI_09_Nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown criterion: PI_09_Nothing"));
}
