//! Scoring error types.
//!
//! [`ScoringError`] is fatal to a scoring attempt and is returned to the
//! caller. [`RuleError`] and [`FormulaError`] describe a misconfigured rule;
//! the rule evaluator logs them and moves on to the next rule, so they never
//! abort a run.

use thiserror::Error;

/// Errors that abort a scoring attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// The answer set references a question the test does not define.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// A selected option does not belong to the named question.
    #[error("invalid option '{option_id}' for question '{question_id}'")]
    InvalidOption {
        question_id: String,
        option_id: String,
    },

    /// Wrong number of selected options for the question's answer type.
    #[error("invalid answer shape for question '{question_id}': {reason}")]
    InvalidAnswerShape { question_id: String, reason: String },

    /// Completeness was required and some questions were left unanswered.
    #[error("unanswered questions: {}", missing.join(", "))]
    IncompleteAnswers { missing: Vec<String> },

    /// No rule matched and the test has no default result.
    #[error("unscored: no rule matched and test '{test_id}' has no default result")]
    Unscored { test_id: String },
}

impl ScoringError {
    /// Returns `true` for errors caused by the submitted answers rather than
    /// by the test definition.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ScoringError::Unscored { .. })
    }
}

/// A rule that cannot be evaluated. Non-fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    /// The rule references a scale the test does not define.
    #[error("unknown scale: {0}")]
    UnknownScale(String),

    /// The formula failed to parse or evaluate.
    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),

    /// A combo tree nests deeper than the configured limit.
    #[error("combo tree exceeds maximum depth of {max}")]
    ComboTooDeep { max: usize },

    /// A combo group has the wrong number of sub-conditions.
    #[error("combo {op} group {reason}")]
    MalformedGroup { op: &'static str, reason: String },
}

/// Errors raised by the formula parser and evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Malformed expression.
    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// The expression references a name that is not a scale key.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    /// Arithmetic produced NaN or an infinity.
    #[error("non-finite result")]
    NonFinite,

    /// An operator received a value of the wrong type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The expression source exceeds the configured length limit.
    #[error("expression is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    /// The expression nests deeper than the configured limit.
    #[error("expression nests deeper than {max} levels")]
    TooDeep { max: usize },
}
