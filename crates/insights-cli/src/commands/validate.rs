//! The `insights validate` command.

use std::path::PathBuf;

use anyhow::Result;

use insights_core::config::{load_config_from, validate_config};

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let source = config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "default search path".to_string());
    println!("Config: {source}");

    config.validate()?;
    let taxonomy = config.resolve_taxonomy()?;
    println!(
        "Taxonomy: {} criteria, {} elements",
        taxonomy.criteria().len(),
        taxonomy.element_count()
    );

    let warnings = validate_config(&config);
    for w in &warnings {
        let prefix = w
            .field
            .as_ref()
            .map(|f| format!("  [{f}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Config valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
