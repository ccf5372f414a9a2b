//! The `quizscore score` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use uuid::Uuid;

use quizscore_core::config::load_config_from;
use quizscore_core::parser;
use quizscore_core::report::ScoringRecord;
use quizscore_core::store::JsonDirStore;
use quizscore_core::traits::ResultStore;
use quizscore_core::ScoringEngine;

use super::render_record;

pub async fn execute(
    test_path: PathBuf,
    answers_path: PathBuf,
    format: String,
    store_dir: Option<PathBuf>,
    session: Option<Uuid>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json" | "markdown"),
        "unknown format '{format}' (expected text, json or markdown)"
    );

    let config = load_config_from(config_path.as_deref())?;
    let test = parser::load_test_definition(&test_path)?;
    let submission = parser::load_submission(&answers_path)?;
    let session_id = session.unwrap_or(submission.session_id);

    let engine = ScoringEngine::new(config.engine_config());
    let result = engine
        .score(&test, &submission.answers)
        .with_context(|| format!("failed to score {}", answers_path.display()))?;
    let record = ScoringRecord::new(session_id, &test, result);

    if let Some(dir) = store_dir.or(config.store_dir) {
        let store = JsonDirStore::new(dir);
        store.save(&record).await?;
        tracing::info!("saved record {} to {}", session_id, store.dir().display());
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&record)?),
        "markdown" => print!("{}", record.to_markdown()),
        _ => print!("{}", render_record(&record)),
    }

    Ok(())
}
