//! Persisted scoring records and batch reports with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScoringError;
use crate::model::TestDefinition;
use crate::results::ScoringResult;
use crate::statistics::BatchStats;

/// A scoring result keyed by the session that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRecord {
    pub session_id: Uuid,
    pub scored_at: DateTime<Utc>,
    pub test_id: String,
    pub test_version: u32,
    pub result: ScoringResult,
}

impl ScoringRecord {
    /// Wrap a result for persistence, stamped with the current time.
    pub fn new(session_id: Uuid, test: &TestDefinition, result: ScoringResult) -> Self {
        Self {
            session_id,
            scored_at: Utc::now(),
            test_id: test.id.clone(),
            test_version: test.version,
            result,
        }
    }

    /// Save the record as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    /// Load a record from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read record from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse record JSON")
    }

    /// Format the record as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let result = &self.result;

        md.push_str(&format!("## {}\n\n", result.summary_type));
        if !result.summary.is_empty() {
            md.push_str(&format!("{}\n\n", result.summary));
        }
        md.push_str(&format!(
            "Test `{}` v{}, session `{}`\n\n",
            self.test_id, self.test_version, self.session_id
        ));

        md.push_str("| Scale | Raw | Clamped | Band |\n");
        md.push_str("|-------|-----|---------|------|\n");
        for s in &result.scales {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                s.name,
                s.raw,
                s.clamped,
                s.label().unwrap_or("-")
            ));
        }

        let interpretations: Vec<_> = result
            .scales
            .iter()
            .filter_map(|s| {
                let band = s.band.as_ref()?;
                band.interpretation
                    .as_ref()
                    .map(|text| (s.name.as_str(), band.label.as_str(), text))
            })
            .collect();
        if !interpretations.is_empty() {
            md.push_str("\n### Interpretation\n\n");
            for (scale, label, text) in interpretations {
                md.push_str(&format!("- **{scale}** ({label}): {text}\n"));
            }
        }

        md
    }
}

/// Why a batch submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The answers were rejected.
    Validation,
    /// No rule matched and there was no default result.
    Unscored,
    /// Anything else, e.g. the store failed.
    Internal,
}

impl FailureKind {
    /// Classify an error by downcasting to [`ScoringError`].
    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ScoringError>() {
            Some(ScoringError::Unscored { .. }) => FailureKind::Unscored,
            Some(_) => FailureKind::Validation,
            None => FailureKind::Internal,
        }
    }
}

/// A submission that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub session_id: Uuid,
    pub kind: FailureKind,
    pub error: String,
}

/// The outcome of scoring a batch of submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub test_id: String,
    pub test_version: u32,
    /// Scored submissions, in submission order.
    pub records: Vec<ScoringRecord>,
    /// Failed submissions, in submission order.
    pub failures: Vec<BatchFailure>,
    /// Aggregate statistics over the scored submissions.
    pub stats: BatchStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl BatchReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse report JSON")
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} scored, {} failed ({} fell back to the default result)\n\n",
            self.records.len(),
            self.failures.len(),
            self.stats.defaulted
        ));

        if !self.stats.classifications.is_empty() {
            md.push_str("### Classifications\n\n");
            md.push_str("| Summary type | Count |\n");
            md.push_str("|--------------|-------|\n");
            for (summary_type, count) in &self.stats.classifications {
                md.push_str(&format!("| {summary_type} | {count} |\n"));
            }
            md.push('\n');
        }

        if !self.stats.per_scale.is_empty() {
            md.push_str("### Scales\n\n");
            md.push_str("| Scale | Mean | Min | Max | Std dev |\n");
            md.push_str("|-------|------|-----|-----|---------|\n");
            for (key, s) in &self.stats.per_scale {
                md.push_str(&format!(
                    "| {} | {:.2} | {} | {} | {:.2} |\n",
                    key, s.mean, s.min, s.max, s.std_dev
                ));
            }
            md.push('\n');
        }

        if !self.failures.is_empty() {
            md.push_str("### Failures\n\n");
            for f in &self.failures {
                md.push_str(&format!(
                    "- `{}` ({:?}): {}\n",
                    f.session_id, f.kind, f.error
                ));
            }
        }

        md
    }
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerSet, Band, Selection};
    use crate::results::{MatchedRule, ScaleScore};
    use crate::statistics::compute_batch_stats;

    fn make_result(summary_type: &str, raw: f64) -> ScoringResult {
        let mut details = AnswerSet::new();
        details.insert("q1".into(), Selection::One("a".into()));
        ScoringResult {
            summary: format!("{summary_type} summary"),
            summary_type: summary_type.into(),
            scales: vec![ScaleScore {
                key: "trust".into(),
                name: "Trust".into(),
                raw,
                clamped: raw.min(10.0),
                band: Some(Band {
                    min: 5.0,
                    max: 10.0,
                    lower_exclusive: false,
                    label: "high".into(),
                    interpretation: Some("Trusts others readily".into()),
                }),
            }],
            details,
            matched_rule: Some(MatchedRule {
                index: 0,
                id: None,
                priority: 10,
            }),
        }
    }

    fn make_record(summary_type: &str, raw: f64) -> ScoringRecord {
        ScoringRecord {
            session_id: Uuid::new_v4(),
            scored_at: Utc::now(),
            test_id: "trust-quiz".into(),
            test_version: 1,
            result: make_result(summary_type, raw),
        }
    }

    fn make_report(records: Vec<ScoringRecord>, failures: Vec<BatchFailure>) -> BatchReport {
        BatchReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            test_id: "trust-quiz".into(),
            test_version: 1,
            stats: compute_batch_stats(records.iter().map(|r| &r.result)),
            records,
            failures,
            duration_ms: 0,
        }
    }

    #[test]
    fn record_json_roundtrip() {
        let record = make_record("trusting", 7.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("record.json");

        record.save_json(&path).unwrap();
        let loaded = ScoringRecord::load_json(&path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn record_json_uses_camel_case_wire_names() {
        let record = make_record("trusting", 7.0);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("sessionId").is_some());
        assert_eq!(value["result"]["summaryType"], "trusting");
        assert_eq!(value["result"]["scales"][0]["band"]["label"], "high");
        assert_eq!(value["result"]["details"]["q1"], "a");
    }

    #[test]
    fn record_markdown_includes_interpretation() {
        let md = make_record("trusting", 7.0).to_markdown();
        assert!(md.contains("## trusting"));
        assert!(md.contains("| Trust | 7 | 7 | high |"));
        assert!(md.contains("Trusts others readily"));
    }

    #[test]
    fn report_json_roundtrip() {
        let report = make_report(vec![make_record("trusting", 7.0)], vec![]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");

        report.save_json(&path).unwrap();
        let loaded = BatchReport::load_json(&path).unwrap();
        assert_eq!(loaded.test_id, "trust-quiz");
        assert_eq!(loaded.records.len(), 1);
    }

    #[test]
    fn report_markdown_lists_failures() {
        let report = make_report(
            vec![make_record("trusting", 7.0), make_record("guarded", 2.0)],
            vec![BatchFailure {
                session_id: Uuid::nil(),
                kind: FailureKind::Validation,
                error: "unknown question: q9".into(),
            }],
        );
        let md = report.to_markdown();
        assert!(md.contains("2 scored, 1 failed"));
        assert!(md.contains("| guarded | 1 |"));
        assert!(md.contains("unknown question: q9"));
    }

    #[test]
    fn failure_kind_classification() {
        let unscored = anyhow::Error::new(ScoringError::Unscored {
            test_id: "t".into(),
        });
        let invalid = anyhow::Error::new(ScoringError::UnknownQuestion("q".into()));
        let other = anyhow::anyhow!("disk full");
        assert_eq!(FailureKind::classify(&unscored), FailureKind::Unscored);
        assert_eq!(FailureKind::classify(&invalid), FailureKind::Validation);
        assert_eq!(FailureKind::classify(&other), FailureKind::Internal);
    }
}
