//! Collaborator traits implemented outside the pure engine.
//!
//! The engine never persists anything itself. Callers that want results kept
//! hand a [`ResultStore`] to batch scoring or save records directly.

use async_trait::async_trait;
use uuid::Uuid;

use crate::report::ScoringRecord;

/// Persists scoring records keyed by session ID.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Human-readable store name (e.g. "memory").
    fn name(&self) -> &str;

    /// Save a record, replacing any previous record for the same session.
    async fn save(&self, record: &ScoringRecord) -> anyhow::Result<()>;

    /// Load the record for a session, if one exists.
    async fn load(&self, session_id: Uuid) -> anyhow::Result<Option<ScoringRecord>>;

    /// All stored session IDs, sorted.
    async fn list(&self) -> anyhow::Result<Vec<Uuid>>;
}
