//! [`ResultStore`] implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::report::ScoringRecord;
use crate::traits::ResultStore;

/// In-memory store, mostly useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Uuid, ScoringRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, record: &ScoringRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.session_id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Option<ScoringRecord>> {
        Ok(self.records.read().await.get(&session_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Uuid>> {
        Ok(self.records.read().await.keys().copied().collect())
    }
}

/// Stores each record as `<session_id>.json` in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl ResultStore for JsonDirStore {
    fn name(&self) -> &str {
        "json-dir"
    }

    async fn save(&self, record: &ScoringRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create store directory {}", self.dir.display()))?;

        let path = self.path_for(record.session_id);
        let json = serde_json::to_vec_pretty(record).context("failed to serialize record")?;

        // Write to a sibling temp file first so readers never see a partial record.
        // The name is unique per save; one session may be saved concurrently.
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("failed to move record into {}", path.display()));
        }

        tracing::debug!(session = %record.session_id, path = %path.display(), "stored record");
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Option<ScoringRecord>> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let record = serde_json::from_slice(&content)
            .with_context(|| format!("failed to parse record {}", path.display()))?;
        Ok(Some(record))
    }

    async fn list(&self) -> Result<Vec<Uuid>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read store {}", self.dir.display()));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match path.file_stem().and_then(|s| s.to_str()).map(Uuid::parse_str) {
                    Some(Ok(id)) => ids.push(id),
                    _ => tracing::warn!("ignoring unexpected file in store: {}", path.display()),
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
