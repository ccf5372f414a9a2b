//! The `quizscore validate` command.

use std::path::PathBuf;

use anyhow::Result;

use quizscore_core::config::load_config_from;
use quizscore_core::parser::{self, Severity};

pub fn execute(test_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let tests = if test_path.is_dir() {
        parser::load_test_directory(&test_path)?
    } else {
        vec![parser::load_test_definition(&test_path)?]
    };

    let mut errors = 0;
    let mut warnings = 0;

    for test in &tests {
        println!(
            "Test: {} v{} ({} questions, {} scales, {} rules)",
            test.id,
            test.version,
            test.questions.len(),
            test.scales.len(),
            test.rules.len()
        );

        for issue in parser::validate_test_definition(test, &config.limits) {
            match issue.severity {
                Severity::Error => {
                    errors += 1;
                    println!("  [{}] ERROR: {}", issue.location, issue.message);
                }
                Severity::Warning => {
                    warnings += 1;
                    println!("  [{}] WARNING: {}", issue.location, issue.message);
                }
            }
        }
    }

    if errors == 0 && warnings == 0 {
        println!("All test definitions valid.");
    } else {
        println!("\n{errors} error(s), {warnings} warning(s) found.");
    }

    anyhow::ensure!(errors == 0, "{errors} definition error(s)");
    Ok(())
}
