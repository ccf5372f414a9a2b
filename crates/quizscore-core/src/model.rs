//! Core data model types for quizscore.
//!
//! These are the definition-side types the engine consumes: tests, questions,
//! weighted options, scales with their bands, classification rules and the
//! answer set submitted by a test taker. All of them deserialize from the
//! camelCase JSON shape produced by the admin tooling, and from TOML.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Rule priority used when a rule does not specify one.
pub const DEFAULT_PRIORITY: i64 = 100;

/// Tolerance used when comparing accumulated floating point scores.
pub const SCORE_EPSILON: f64 = 1e-9;

/// A complete quiz definition, immutable for the duration of a scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    /// Unique identifier for this test.
    pub id: String,
    /// Definition version, bumped whenever questions or rules change.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Description shown to test takers.
    #[serde(default)]
    pub description: String,
    /// Questions in display order.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Scoring dimensions.
    #[serde(default)]
    pub scales: Vec<Scale>,
    /// Classification rules in declaration order.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Fallback classification when no rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_result: Option<DefaultResult>,
}

fn default_version() -> u32 {
    1
}

impl TestDefinition {
    /// Look up a question by ID.
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Look up a scale by key.
    pub fn scale(&self, key: &str) -> Option<&Scale> {
        self.scales.iter().find(|s| s.key == key)
    }

    /// Every scale key mentioned by an option weight anywhere in the test.
    pub fn weight_keys(&self) -> BTreeSet<&str> {
        self.questions
            .iter()
            .flat_map(|q| &q.options)
            .flat_map(|o| o.weights.keys())
            .map(String::as_str)
            .collect()
    }
}

/// A single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique identifier within the test.
    pub id: String,
    /// Question text.
    #[serde(default)]
    pub text: String,
    /// How many options may be selected.
    #[serde(default)]
    pub answer_type: AnswerType,
    /// Answer options in display order.
    #[serde(default)]
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Look up an option by ID.
    pub fn option(&self, id: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// Supported answer shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    /// Exactly one option.
    #[default]
    Single,
    /// One or more options, weights summed.
    Multi,
    /// A likert-style scale; exactly one option.
    #[serde(alias = "likert")]
    Scale,
}

impl AnswerType {
    /// Whether exactly one option must be selected.
    pub fn is_single_choice(self) -> bool {
        matches!(self, AnswerType::Single | AnswerType::Scale)
    }
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerType::Single => write!(f, "single"),
            AnswerType::Multi => write!(f, "multi"),
            AnswerType::Scale => write!(f, "scale"),
        }
    }
}

impl FromStr for AnswerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(AnswerType::Single),
            "multi" | "multiple" => Ok(AnswerType::Multi),
            "scale" | "likert" => Ok(AnswerType::Scale),
            other => Err(format!("unknown answer type: {other}")),
        }
    }
}

/// A selectable answer option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    /// Unique identifier within its question.
    pub id: String,
    /// Display text.
    #[serde(default)]
    pub text: String,
    /// Nominal value of the option (e.g. the likert point).
    #[serde(default)]
    pub value: f64,
    /// Contribution to each scale. Missing keys contribute 0.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl AnswerOption {
    /// Contribution of this option to `scale`.
    pub fn weight(&self, scale: &str) -> f64 {
        self.weights.get(scale).copied().unwrap_or(0.0)
    }
}

/// A named scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawScale")]
pub struct Scale {
    /// Stable key used by weights and rules.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Lower bound of the reportable range.
    pub min: f64,
    /// Upper bound of the reportable range.
    pub max: f64,
    /// Qualitative bands, evaluated first-match in this order.
    pub bands: Vec<Band>,
}

impl Scale {
    /// Display name, falling back to the key.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }
}

/// Wire shape of a scale before band normalization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScale {
    key: String,
    #[serde(default)]
    name: String,
    min: f64,
    max: f64,
    #[serde(default)]
    bands: Vec<RawBand>,
}

/// Bands are authored either with explicit bounds or as an upper bound only.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBand {
    #[serde(rename_all = "camelCase")]
    Range {
        min: f64,
        max: f64,
        #[serde(default)]
        lower_exclusive: bool,
        label: String,
        #[serde(default)]
        interpretation: Option<String>,
    },
    UpTo {
        to: f64,
        label: String,
        #[serde(default)]
        interpretation: Option<String>,
    },
}

impl From<RawScale> for Scale {
    fn from(raw: RawScale) -> Self {
        let mut bands: Vec<Band> = Vec::with_capacity(raw.bands.len());
        for band in raw.bands {
            let normalized = match band {
                RawBand::Range {
                    min,
                    max,
                    lower_exclusive,
                    label,
                    interpretation,
                } => Band {
                    min,
                    max,
                    lower_exclusive,
                    label,
                    interpretation,
                },
                RawBand::UpTo {
                    to,
                    label,
                    interpretation,
                } => {
                    // (previous upper bound, to]; the first band starts at scale.min inclusive
                    let (min, lower_exclusive) = match bands.last() {
                        Some(prev) => (prev.max, true),
                        None => (raw.min, false),
                    };
                    Band {
                        min,
                        max: to,
                        lower_exclusive,
                        label,
                        interpretation,
                    }
                }
            };
            bands.push(normalized);
        }

        Scale {
            key: raw.key,
            name: raw.name,
            min: raw.min,
            max: raw.max,
            bands,
        }
    }
}

/// A labeled sub-range of a scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub min: f64,
    pub max: f64,
    /// Set for bands normalized from the `{to, label}` form after the first.
    #[serde(default, skip_serializing_if = "is_false")]
    pub lower_exclusive: bool,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Band {
    /// Whether `score` falls inside this band.
    pub fn contains(&self, score: f64) -> bool {
        let above_min = if self.lower_exclusive {
            score > self.min
        } else {
            score >= self.min
        };
        above_min && score <= self.max
    }
}

/// Comparison operators usable in threshold conditions and formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">=", alias = "gte")]
    Ge,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = "<=", alias = "lte")]
    Le,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
}

impl Comparison {
    /// Apply the comparison with [`SCORE_EPSILON`] tolerance on equality.
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        let eq = (lhs - rhs).abs() <= SCORE_EPSILON;
        match self {
            Comparison::Ge => lhs > rhs || eq,
            Comparison::Gt => lhs > rhs && !eq,
            Comparison::Le => lhs < rhs || eq,
            Comparison::Lt => lhs < rhs && !eq,
            Comparison::Eq => eq,
            Comparison::Ne => !eq,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Lt => "<",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Rule kinds as they appear in the `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Threshold,
    Formula,
    Combo,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Threshold => write!(f, "threshold"),
            RuleKind::Formula => write!(f, "formula"),
            RuleKind::Combo => write!(f, "combo"),
        }
    }
}

/// A prioritized condition-to-classification mapping.
///
/// On the wire a rule is `{ id?, kind, priority?, payload }`, where the
/// payload holds the condition fields for `kind` together with the
/// `summaryType`/`summary` outcome. Internally the condition is a sum type so
/// a payload can never disagree with its kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct Rule {
    pub id: Option<String>,
    /// Lower numbers are evaluated first.
    pub priority: i64,
    pub condition: Condition,
    pub outcome: Outcome,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self.condition {
            Condition::Threshold(_) => RuleKind::Threshold,
            Condition::Formula(_) => RuleKind::Formula,
            Condition::Combo(_) => RuleKind::Combo,
        }
    }
}

/// The condition half of a rule payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Threshold(Threshold),
    Formula(Formula),
    Combo(ComboGroup),
}

/// Compare one scale's raw score against a bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub scale: String,
    pub op: Comparison,
    pub value: f64,
}

/// An expression over scale keys, see [`crate::formula`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub expression: String,
}

/// Boolean connectives for combo rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
    #[serde(rename = "NOT", alias = "not")]
    Not,
}

/// A boolean group of sub-conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboGroup {
    pub op: BoolOp,
    pub conditions: Vec<ComboNode>,
}

/// A node of a combo tree: a nested group or a threshold leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComboNode {
    Group(ComboGroup),
    Leaf(Threshold),
}

/// The classification a rule produces when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub summary_type: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    kind: RuleKind,
    #[serde(default = "default_priority")]
    priority: i64,
    payload: serde_json::Value,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

#[derive(Deserialize)]
struct Payload<C> {
    #[serde(flatten)]
    condition: C,
    #[serde(flatten)]
    outcome: Outcome,
}

impl TryFrom<RawRule> for Rule {
    type Error = String;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        fn payload<C: serde::de::DeserializeOwned>(
            kind: RuleKind,
            value: serde_json::Value,
        ) -> Result<(C, Outcome), String> {
            serde_json::from_value::<Payload<C>>(value)
                .map(|p| (p.condition, p.outcome))
                .map_err(|e| format!("invalid {kind} payload: {e}"))
        }

        let (condition, outcome) = match raw.kind {
            RuleKind::Threshold => {
                let (c, o) = payload(raw.kind, raw.payload)?;
                (Condition::Threshold(c), o)
            }
            RuleKind::Formula => {
                let (c, o) = payload(raw.kind, raw.payload)?;
                (Condition::Formula(c), o)
            }
            RuleKind::Combo => {
                let (c, o) = payload(raw.kind, raw.payload)?;
                (Condition::Combo(c), o)
            }
        };

        Ok(Rule {
            id: raw.id,
            priority: raw.priority,
            condition,
            outcome,
        })
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct PayloadRef<'a, C: Serialize> {
            #[serde(flatten)]
            condition: &'a C,
            summary_type: &'a str,
            summary: &'a str,
        }

        fn payload<'a, C: Serialize>(rule: &'a Rule, condition: &'a C) -> PayloadRef<'a, C> {
            PayloadRef {
                condition,
                summary_type: &rule.outcome.summary_type,
                summary: &rule.outcome.summary,
            }
        }

        let mut s = serializer.serialize_struct("Rule", 4)?;
        match &self.id {
            Some(id) => s.serialize_field("id", id)?,
            None => s.skip_field("id")?,
        }
        s.serialize_field("kind", &self.kind())?;
        s.serialize_field("priority", &self.priority)?;
        match &self.condition {
            Condition::Threshold(t) => s.serialize_field("payload", &payload(self, t))?,
            Condition::Formula(f) => s.serialize_field("payload", &payload(self, f))?,
            Condition::Combo(c) => s.serialize_field("payload", &payload(self, c))?,
        }
        s.end()
    }
}

/// Fallback classification used when no rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultResult {
    pub summary_type: String,
    #[serde(default)]
    pub summary: String,
    /// Snapshot of the scale definitions at authoring time.
    #[serde(default)]
    pub scales_data: Vec<Scale>,
}

/// The option(s) selected for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    One(String),
    Many(Vec<String>),
}

impl Selection {
    /// Selected option IDs in submission order.
    pub fn ids(&self) -> &[String] {
        match self {
            Selection::One(id) => std::slice::from_ref(id),
            Selection::Many(ids) => ids,
        }
    }
}

impl From<&str> for Selection {
    fn from(id: &str) -> Self {
        Selection::One(id.to_string())
    }
}

impl From<Vec<&str>> for Selection {
    fn from(ids: Vec<&str>) -> Self {
        Selection::Many(ids.into_iter().map(String::from).collect())
    }
}

/// Question ID to selected option(s).
pub type AnswerSet = BTreeMap<String, Selection>;
