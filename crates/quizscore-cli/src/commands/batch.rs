//! The `quizscore batch` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use quizscore_core::config::load_config_from;
use quizscore_core::engine::ProgressReporter;
use quizscore_core::parser;
use quizscore_core::report::{BatchReport, ScoringRecord};
use quizscore_core::store::JsonDirStore;
use quizscore_core::traits::ResultStore;
use quizscore_core::ScoringEngine;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_scored(&self, record: &ScoringRecord) {
        eprintln!(
            "  Scored: {} -> {}",
            record.session_id, record.result.summary_type
        );
    }

    fn on_failed(&self, session_id: Uuid, error: &str) {
        eprintln!("  FAILED: {session_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, scored: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {scored}/{total} scored, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    test_path: PathBuf,
    answers_dir: PathBuf,
    parallelism: Option<usize>,
    output: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
        config.parallelism = p;
    }
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    let test = Arc::new(parser::load_test_definition(&test_path)?);
    let submissions = parser::load_submissions_dir(&answers_dir)?;
    anyhow::ensure!(
        !submissions.is_empty(),
        "no loadable answer files in {}",
        answers_dir.display()
    );

    let store: Option<Arc<dyn ResultStore>> = store_dir
        .or_else(|| config.store_dir.clone())
        .map(|dir| Arc::new(JsonDirStore::new(dir)) as Arc<dyn ResultStore>);

    eprintln!(
        "quizscore v{} - Scoring {} submissions for '{}' v{}",
        env!("CARGO_PKG_VERSION"),
        submissions.len(),
        test.id,
        test.version
    );
    eprintln!();

    let engine = ScoringEngine::new(config.engine_config());
    let report = engine
        .score_batch(test, submissions, store, &ConsoleReporter)
        .await;

    print_summary(&report);

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let json_path = output.join(format!("batch-{timestamp}.json"));
    report.save_json(&json_path)?;
    eprintln!("Results saved to: {}", json_path.display());

    let md_path = output.join(format!("batch-{timestamp}.md"));
    std::fs::write(&md_path, report.to_markdown())?;
    eprintln!("Markdown summary: {}", md_path.display());

    Ok(())
}

fn print_summary(report: &BatchReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Summary type", "Count", "Share"]);

    let scored = report.stats.total.max(1) as f64;
    for (summary_type, count) in &report.stats.classifications {
        table.add_row(vec![
            Cell::new(summary_type),
            Cell::new(count),
            Cell::new(format!("{:.1}%", *count as f64 / scored * 100.0)),
        ]);
    }

    eprintln!("\n{table}");
}
