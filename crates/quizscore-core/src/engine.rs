//! Scoring engine: aggregation, band resolution, rule evaluation and result
//! assembly, plus concurrent batch scoring of independent submissions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::aggregate::{aggregate, missing_questions};
use crate::bands::score_scale;
use crate::error::ScoringError;
use crate::model::{AnswerSet, TestDefinition};
use crate::report::{BatchFailure, BatchReport, FailureKind, ScoringRecord};
use crate::results::{Classification, ScaleScore, ScoringResult};
use crate::rules::{self, Limits};
use crate::statistics::compute_batch_stats;
use crate::traits::ResultStore;

/// Answer-set policies applied before aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringOptions {
    /// Reject answer sets that leave any question unanswered.
    #[serde(default)]
    pub require_complete: bool,
}

/// Configuration for the scoring engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounds on formula and combo evaluation.
    pub limits: Limits,
    /// Answer-set policies.
    pub options: ScoringOptions,
    /// Maximum concurrent submissions in a batch.
    pub parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            options: ScoringOptions::default(),
            parallelism: 4,
        }
    }
}

/// One submission in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub session_id: Uuid,
    pub answers: AnswerSet,
}

/// Progress reporting trait for batch scoring.
pub trait ProgressReporter: Send + Sync {
    fn on_scored(&self, record: &ScoringRecord);
    fn on_failed(&self, session_id: Uuid, error: &str);
    fn on_batch_complete(&self, total: usize, scored: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_scored(&self, _: &ScoringRecord) {}
    fn on_failed(&self, _: Uuid, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The scoring engine. Holds configuration only; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: EngineConfig,
}

impl ScoringEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Score one answer set.
    pub fn score(
        &self,
        test: &TestDefinition,
        answers: &AnswerSet,
    ) -> Result<ScoringResult, ScoringError> {
        let span = tracing::debug_span!("score", test = %test.id, version = test.version);
        let _enter = span.enter();

        if self.config.options.require_complete {
            let missing = missing_questions(test, answers);
            if !missing.is_empty() {
                return Err(ScoringError::IncompleteAnswers { missing });
            }
        }

        let totals = aggregate(test, answers)?;

        let scores: Vec<ScaleScore> = test
            .scales
            .iter()
            .map(|scale| score_scale(scale, totals.get(&scale.key).copied().unwrap_or(0.0)))
            .collect();

        let matched = rules::evaluate(
            &test.id,
            &test.rules,
            &scores,
            test.default_result.as_ref(),
            &self.config.limits,
        )?;

        Ok(assemble(test, answers, scores, matched))
    }

    /// Score independent submissions concurrently.
    ///
    /// Each submission is scored on the blocking pool, bounded by
    /// `parallelism`. Failures are collected into the report and never abort
    /// the batch. When `store` is given, every scored record is saved to it.
    pub async fn score_batch(
        &self,
        test: Arc<TestDefinition>,
        submissions: Vec<Submission>,
        store: Option<Arc<dyn ResultStore>>,
        progress: &dyn ProgressReporter,
    ) -> BatchReport {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, submission) in submissions.into_iter().enumerate() {
            let engine = self.clone();
            let test = Arc::clone(&test);
            let store = store.clone();
            let semaphore = Arc::clone(&semaphore);
            let session_id = submission.session_id;

            futures.push(async move {
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

                    let scoring_test = Arc::clone(&test);
                    let result = tokio::task::spawn_blocking(move || {
                        engine.score(&scoring_test, &submission.answers)
                    })
                    .await
                    .map_err(|e| anyhow::anyhow!("scoring task failed: {e}"))??;

                    let record = ScoringRecord::new(session_id, &test, result);
                    if let Some(store) = &store {
                        store.save(&record).await?;
                    }
                    anyhow::Ok(record)
                };
                (index, session_id, inner.await)
            });
        }

        let total = futures.len();
        let mut records = Vec::new();
        let mut failures = Vec::new();

        while let Some((index, session_id, outcome)) = futures.next().await {
            match outcome {
                Ok(record) => {
                    progress.on_scored(&record);
                    records.push((index, record));
                }
                Err(e) => {
                    tracing::warn!("scoring failed for session {session_id}: {e:#}");
                    progress.on_failed(session_id, &e.to_string());
                    failures.push((
                        index,
                        BatchFailure {
                            session_id,
                            kind: FailureKind::classify(&e),
                            error: format!("{e:#}"),
                        },
                    ));
                }
            }
        }

        records.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|(index, _)| *index);
        let records: Vec<ScoringRecord> = records.into_iter().map(|(_, r)| r).collect();
        let failures: Vec<BatchFailure> = failures.into_iter().map(|(_, f)| f).collect();

        let elapsed = start.elapsed();
        progress.on_batch_complete(total, records.len(), failures.len(), elapsed);
        tracing::info!(
            test = %test.id,
            total,
            scored = records.len(),
            failed = failures.len(),
            "batch complete"
        );

        BatchReport {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            test_id: test.id.clone(),
            test_version: test.version,
            stats: compute_batch_stats(records.iter().map(|r| &r.result)),
            records,
            failures,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Score one answer set with the default configuration.
pub fn score(test: &TestDefinition, answers: &AnswerSet) -> Result<ScoringResult, ScoringError> {
    ScoringEngine::default().score(test, answers)
}

/// Merge scale scores with the selected classification.
pub fn assemble(
    test: &TestDefinition,
    answers: &AnswerSet,
    scores: Vec<ScaleScore>,
    matched: Classification<'_>,
) -> ScoringResult {
    tracing::debug!(
        test = %test.id,
        summary_type = matched.summary_type(),
        default = matched.matched_rule().is_none(),
        "assembled result"
    );
    ScoringResult {
        summary: matched.summary().to_string(),
        summary_type: matched.summary_type().to_string(),
        scales: scores,
        details: answers.clone(),
        matched_rule: matched.matched_rule(),
    }
}
