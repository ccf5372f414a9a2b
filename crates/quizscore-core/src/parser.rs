//! Test definition and answer file loaders.
//!
//! Loads definitions and answer sets from JSON or TOML files (chosen by
//! extension) and lints definitions for authoring mistakes.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::Submission;
use crate::formula;
use crate::model::{AnswerSet, Condition, Scale, TestDefinition};
use crate::rules::{combo_leaves, lint_rule, Limits};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }

    fn parse<T: DeserializeOwned>(self, content: &str, source_path: &Path) -> Result<T> {
        match self {
            Format::Json => serde_json::from_str(content)
                .with_context(|| format!("failed to parse JSON: {}", source_path.display())),
            Format::Toml => toml::from_str(content)
                .with_context(|| format!("failed to parse TOML: {}", source_path.display())),
        }
    }
}

fn format_of(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| {
        anyhow::anyhow!(
            "unsupported file type (expected .json or .toml): {}",
            path.display()
        )
    })
}

/// Parse a single `.json` or `.toml` file into a `TestDefinition`.
pub fn load_test_definition(path: &Path) -> Result<TestDefinition> {
    let format = format_of(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read test definition: {}", path.display()))?;
    format.parse(&content, path)
}

/// Parse a definition string, picking the format from `source_path`'s
/// extension (useful for testing).
pub fn parse_test_definition_str(content: &str, source_path: &Path) -> Result<TestDefinition> {
    format_of(source_path)?.parse(content, source_path)
}

/// Recursively load all definition files from a directory.
///
/// Files that fail to parse are logged and skipped.
pub fn load_test_directory(dir: &Path) -> Result<Vec<TestDefinition>> {
    let mut tests = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for path in sorted_entries(dir)? {
        if path.is_dir() {
            tests.extend(load_test_directory(&path)?);
        } else if Format::from_path(&path).is_some() {
            match load_test_definition(&path) {
                Ok(test) => tests.push(test),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(tests)
}

/// An answer file is either a bare answer set or a submission with an
/// explicit session ID.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnswerFile {
    #[serde(rename_all = "camelCase")]
    Submission {
        #[serde(default)]
        session_id: Option<Uuid>,
        answers: AnswerSet,
    },
    Answers(AnswerSet),
}

/// Load the answer set from a `.json` or `.toml` file.
pub fn load_answer_set(path: &Path) -> Result<AnswerSet> {
    Ok(load_submission(path)?.answers)
}

/// Load a submission from an answer file.
///
/// The session ID is taken from the file when present, then from the file
/// stem when it parses as a UUID, and is otherwise freshly generated.
pub fn load_submission(path: &Path) -> Result<Submission> {
    let format = format_of(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answers: {}", path.display()))?;

    let stem_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    let submission = match format.parse::<AnswerFile>(&content, path)? {
        AnswerFile::Submission {
            session_id,
            answers,
        } => Submission {
            session_id: session_id.or(stem_id).unwrap_or_else(Uuid::new_v4),
            answers,
        },
        AnswerFile::Answers(answers) => Submission {
            session_id: stem_id.unwrap_or_else(Uuid::new_v4),
            answers,
        },
    };
    Ok(submission)
}

/// Load every answer file in a directory (not recursive), sorted by file name.
///
/// Files that fail to read or parse are logged and skipped.
pub fn load_submissions_dir(dir: &Path) -> Result<Vec<Submission>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut submissions = Vec::new();
    for path in sorted_entries(dir)? {
        if !path.is_file() || Format::from_path(&path).is_none() {
            continue;
        }
        match load_submission(&path) {
            Ok(submission) => submissions.push(submission),
            Err(e) => {
                tracing::warn!("skipping {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(submissions)
}

fn sorted_entries(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

/// How serious a definition issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Likely a mistake, but scoring behaves predictably.
    Warning,
    /// Scoring will reject answers or skip rules because of this.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A problem found while linting a test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionIssue {
    pub severity: Severity,
    /// Where the issue is, e.g. `questions[q1]` or `rules[2]`.
    pub location: String,
    pub message: String,
}

impl fmt::Display for DefinitionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.location, self.message)
    }
}

/// Validate a test definition for common issues.
pub fn validate_test_definition(test: &TestDefinition, limits: &Limits) -> Vec<DefinitionIssue> {
    let mut issues = Vec::new();
    let mut push = |severity, location: String, message: String| {
        issues.push(DefinitionIssue {
            severity,
            location,
            message,
        })
    };

    if test.id.trim().is_empty() {
        push(Severity::Error, "id".into(), "test id is empty".into());
    }

    // Questions and options
    let mut seen_questions = HashSet::new();
    for question in &test.questions {
        let location = format!("questions[{}]", question.id);
        if !seen_questions.insert(question.id.as_str()) {
            push(
                Severity::Error,
                location.clone(),
                format!("duplicate question ID: {}", question.id),
            );
        }
        if question.options.is_empty() {
            push(Severity::Error, location.clone(), "question has no options".into());
        }

        let mut seen_options = HashSet::new();
        for option in &question.options {
            let location = format!("{location}.options[{}]", option.id);
            if !seen_options.insert(option.id.as_str()) {
                push(
                    Severity::Error,
                    location.clone(),
                    format!("duplicate option ID: {}", option.id),
                );
            }
            for (scale, weight) in &option.weights {
                if !weight.is_finite() {
                    push(
                        Severity::Error,
                        location.clone(),
                        format!("weight for '{scale}' is not a finite number"),
                    );
                }
                if test.scale(scale).is_none() {
                    push(
                        Severity::Warning,
                        location.clone(),
                        format!("weight for undefined scale '{scale}' is ignored"),
                    );
                }
            }
        }
    }

    // Scales and bands
    let mut seen_scales = HashSet::new();
    for scale in &test.scales {
        let location = format!("scales[{}]", scale.key);
        if !seen_scales.insert(scale.key.as_str()) {
            push(
                Severity::Error,
                location.clone(),
                format!("duplicate scale key: {}", scale.key),
            );
        }
        if !formula::is_referenceable(&scale.key) {
            push(
                Severity::Warning,
                location.clone(),
                format!("scale key '{}' cannot be referenced in formulas", scale.key),
            );
        }
        if !scale.min.is_finite() || !scale.max.is_finite() {
            push(Severity::Error, location.clone(), "scale bounds must be finite".into());
        } else if scale.min > scale.max {
            push(
                Severity::Error,
                location.clone(),
                format!("min {} is greater than max {}", scale.min, scale.max),
            );
        }
        for (index, band) in scale.bands.iter().enumerate() {
            if band.min > band.max {
                push(
                    Severity::Error,
                    format!("{location}.bands[{index}]"),
                    format!("band '{}' has min greater than max", band.label),
                );
            }
        }
        for (a, b) in overlapping_bands(scale) {
            push(
                Severity::Warning,
                location.clone(),
                format!(
                    "bands '{}' and '{}' overlap; the first listed wins",
                    scale.bands[a].label, scale.bands[b].label
                ),
            );
        }
    }

    // Rules
    let scale_keys: BTreeSet<&str> = test.scales.iter().map(|s| s.key.as_str()).collect();
    for (index, rule) in test.rules.iter().enumerate() {
        let location = match &rule.id {
            Some(id) => format!("rules[{index}:{id}]"),
            None => format!("rules[{index}]"),
        };
        if let Err(e) = lint_rule(rule, &scale_keys, limits) {
            push(Severity::Error, location.clone(), e.to_string());
        }
        let thresholds = match &rule.condition {
            Condition::Threshold(t) => vec![t],
            Condition::Combo(group) => combo_leaves(group),
            Condition::Formula(_) => vec![],
        };
        for t in thresholds.into_iter().filter(|t| !t.value.is_finite()) {
            push(
                Severity::Error,
                location.clone(),
                format!("threshold on '{}' is not a finite number", t.scale),
            );
        }
        if rule.outcome.summary_type.trim().is_empty() {
            push(Severity::Error, location, "summaryType is empty".into());
        }
    }

    if test.default_result.is_none() {
        push(
            Severity::Warning,
            "defaultResult".into(),
            "no default result; answers matching no rule cannot be scored".into(),
        );
    }

    issues
}

/// Index pairs of bands whose ranges share at least one point.
fn overlapping_bands(scale: &Scale) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in scale.bands.iter().enumerate() {
        for (j, b) in scale.bands.iter().enumerate().skip(i + 1) {
            let (lower, upper) = if a.min <= b.min { (a, b) } else { (b, a) };
            let touches = upper.min < lower.max
                || (upper.min == lower.max && !upper.lower_exclusive);
            if touches {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Returns `true` if any issue is an error.
pub fn has_errors(issues: &[DefinitionIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}
