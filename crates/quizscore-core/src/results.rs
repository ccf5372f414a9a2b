//! Engine output types.

use serde::{Deserialize, Serialize};

use crate::model::{AnswerSet, Band, DefaultResult, Rule};

/// The computed score for one scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleScore {
    /// Scale key.
    pub key: String,
    /// Scale display name.
    pub name: String,
    /// Sum of weights, unclamped.
    pub raw: f64,
    /// Raw score clamped into the scale's range.
    pub clamped: f64,
    /// First band containing the clamped score, if any.
    pub band: Option<Band>,
}

impl ScaleScore {
    /// Band label, if a band matched.
    pub fn label(&self) -> Option<&str> {
        self.band.as_ref().map(|b| b.label.as_str())
    }
}

/// Identifies the rule that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRule {
    /// Position of the rule in the test's declaration order.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub priority: i64,
}

/// The output of a scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub summary: String,
    pub summary_type: String,
    /// One entry per defined scale, in definition order.
    pub scales: Vec<ScaleScore>,
    /// The submitted answers, verbatim.
    pub details: AnswerSet,
    /// The winning rule, or `None` when the default result was used.
    pub matched_rule: Option<MatchedRule>,
}

impl ScoringResult {
    /// Look up a scale score by key.
    pub fn scale(&self, key: &str) -> Option<&ScaleScore> {
        self.scales.iter().find(|s| s.key == key)
    }

    /// Whether the default result supplied the classification.
    pub fn is_default(&self) -> bool {
        self.matched_rule.is_none()
    }
}

/// What the rule evaluator selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification<'a> {
    /// A rule matched; `index` is its declaration position.
    Rule { index: usize, rule: &'a Rule },
    /// No rule matched; the test's default result applies.
    Default(&'a DefaultResult),
}

impl Classification<'_> {
    pub fn summary_type(&self) -> &str {
        match self {
            Classification::Rule { rule, .. } => &rule.outcome.summary_type,
            Classification::Default(d) => &d.summary_type,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Classification::Rule { rule, .. } => &rule.outcome.summary,
            Classification::Default(d) => &d.summary,
        }
    }

    pub fn matched_rule(&self) -> Option<MatchedRule> {
        match self {
            Classification::Rule { index, rule } => Some(MatchedRule {
                index: *index,
                id: rule.id.clone(),
                priority: rule.priority,
            }),
            Classification::Default(_) => None,
        }
    }
}
