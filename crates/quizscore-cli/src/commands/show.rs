//! The `quizscore show` command.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use quizscore_core::config::load_config_from;
use quizscore_core::store::JsonDirStore;
use quizscore_core::traits::ResultStore;

use super::render_record;

pub async fn execute(
    store_dir: Option<PathBuf>,
    session: Uuid,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let dir = match store_dir {
        Some(dir) => dir,
        None => load_config_from(config_path.as_deref())?
            .store_dir
            .ok_or_else(|| anyhow::anyhow!("no --store given and no store_dir configured"))?,
    };

    let store = JsonDirStore::new(dir);
    let record = store.load(session).await?.ok_or_else(|| {
        anyhow::anyhow!(
            "no record for session {session} in {}",
            store.dir().display()
        )
    })?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&record)?),
        "text" => print!("{}", render_record(&record)),
        other => anyhow::bail!("unknown format '{other}' (expected text or json)"),
    }

    Ok(())
}
