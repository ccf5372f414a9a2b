//! Classification rule evaluation.
//!
//! Rules are tried in ascending priority order (declaration order breaks
//! ties) and the first rule whose condition holds wins. A rule that cannot be
//! evaluated is logged and skipped; it never aborts the run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{FormulaError, RuleError, ScoringError};
use crate::formula;
use crate::model::{BoolOp, ComboGroup, ComboNode, Condition, DefaultResult, Rule, Threshold};
use crate::results::{Classification, ScaleScore};

/// Bounds on admin-authored rule payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum formula source length in bytes.
    #[serde(default = "default_max_formula_len")]
    pub max_formula_len: usize,
    /// Maximum formula nesting depth.
    #[serde(default = "default_max_formula_depth")]
    pub max_formula_depth: usize,
    /// Maximum combo tree depth.
    #[serde(default = "default_max_combo_depth")]
    pub max_combo_depth: usize,
}

fn default_max_formula_len() -> usize {
    1024
}
fn default_max_formula_depth() -> usize {
    64
}
fn default_max_combo_depth() -> usize {
    32
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_formula_len: default_max_formula_len(),
            max_formula_depth: default_max_formula_depth(),
            max_combo_depth: default_max_combo_depth(),
        }
    }
}

/// Pick the classification for a set of scale scores.
///
/// Falls back to `default` when no rule matches, and fails with
/// [`ScoringError::Unscored`] when there is no default either.
pub fn evaluate<'a>(
    test_id: &str,
    rules: &'a [Rule],
    scores: &[ScaleScore],
    default: Option<&'a DefaultResult>,
    limits: &Limits,
) -> Result<Classification<'a>, ScoringError> {
    let namespace: BTreeMap<&str, f64> = scores.iter().map(|s| (s.key.as_str(), s.raw)).collect();

    for (index, rule) in by_priority(rules) {
        match check_rule(rule, &namespace, limits) {
            Ok(true) => {
                tracing::debug!(
                    test = test_id,
                    rule = index,
                    priority = rule.priority,
                    summary_type = %rule.outcome.summary_type,
                    "rule matched"
                );
                return Ok(Classification::Rule { index, rule });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    test = test_id,
                    rule = index,
                    rule_id = rule.id.as_deref().unwrap_or("-"),
                    priority = rule.priority,
                    kind = %rule.kind(),
                    "skipping rule: {e}"
                );
            }
        }
    }

    match default {
        Some(d) => {
            tracing::debug!(test = test_id, "no rule matched, using default result");
            Ok(Classification::Default(d))
        }
        None => Err(ScoringError::Unscored {
            test_id: test_id.to_string(),
        }),
    }
}

/// Rules paired with their declaration index, sorted by ascending priority.
///
/// The sort is stable, so equal priorities keep declaration order.
pub fn by_priority(rules: &[Rule]) -> Vec<(usize, &Rule)> {
    let mut ordered: Vec<(usize, &Rule)> = rules.iter().enumerate().collect();
    ordered.sort_by_key(|(_, rule)| rule.priority);
    ordered
}

/// Evaluate one rule's condition.
pub fn check_rule(
    rule: &Rule,
    namespace: &BTreeMap<&str, f64>,
    limits: &Limits,
) -> Result<bool, RuleError> {
    match &rule.condition {
        Condition::Threshold(t) => check_threshold(t, namespace),
        Condition::Formula(f) => Ok(formula::evaluate(
            &f.expression,
            namespace,
            limits.max_formula_len,
            limits.max_formula_depth,
        )?),
        Condition::Combo(group) => {
            check_combo_shape(group, 1, limits.max_combo_depth)?;
            if let Some(unknown) = combo_scales(group)
                .into_iter()
                .find(|s| !namespace.contains_key(s))
            {
                return Err(RuleError::UnknownScale(unknown.to_string()));
            }
            check_group(group, namespace)
        }
    }
}

/// Check a rule against the scale keys a test defines, without evaluating it.
///
/// Reports the same configuration errors [`check_rule`] would hit at scoring
/// time, except those that depend on score values (division by zero, type
/// mismatches).
pub fn lint_rule(rule: &Rule, scales: &BTreeSet<&str>, limits: &Limits) -> Result<(), RuleError> {
    match &rule.condition {
        Condition::Threshold(t) => {
            if !scales.contains(t.scale.as_str()) {
                return Err(RuleError::UnknownScale(t.scale.clone()));
            }
        }
        Condition::Formula(f) => {
            let expr = formula::compile(
                &f.expression,
                limits.max_formula_len,
                limits.max_formula_depth,
            )?;
            let unknown = expr
                .variables()
                .into_iter()
                .find(|v| !scales.contains(v))
                .map(str::to_string);
            if let Some(unknown) = unknown {
                return Err(FormulaError::UnknownVariable(unknown).into());
            }
        }
        Condition::Combo(group) => {
            check_combo_shape(group, 1, limits.max_combo_depth)?;
            let unknown = combo_scales(group)
                .into_iter()
                .find(|s| !scales.contains(s))
                .map(str::to_string);
            if let Some(unknown) = unknown {
                return Err(RuleError::UnknownScale(unknown));
            }
        }
    }
    Ok(())
}

fn check_threshold(t: &Threshold, namespace: &BTreeMap<&str, f64>) -> Result<bool, RuleError> {
    let raw = namespace
        .get(t.scale.as_str())
        .ok_or_else(|| RuleError::UnknownScale(t.scale.clone()))?;
    Ok(t.op.apply(*raw, t.value))
}

/// Validate group arity and depth before anything is evaluated.
fn check_combo_shape(group: &ComboGroup, depth: usize, max_depth: usize) -> Result<(), RuleError> {
    if depth > max_depth {
        return Err(RuleError::ComboTooDeep { max: max_depth });
    }
    match group.op {
        BoolOp::Not if group.conditions.len() != 1 => {
            return Err(RuleError::MalformedGroup {
                op: "NOT",
                reason: format!("needs exactly one condition, got {}", group.conditions.len()),
            });
        }
        BoolOp::And | BoolOp::Or if group.conditions.is_empty() => {
            return Err(RuleError::MalformedGroup {
                op: if group.op == BoolOp::And { "AND" } else { "OR" },
                reason: "has no conditions".into(),
            });
        }
        _ => {}
    }
    for node in &group.conditions {
        if let ComboNode::Group(inner) = node {
            check_combo_shape(inner, depth + 1, max_depth)?;
        }
    }
    Ok(())
}

/// Every threshold leaf of a combo tree.
pub fn combo_leaves(group: &ComboGroup) -> Vec<&Threshold> {
    let mut leaves = Vec::new();
    let mut stack = vec![group];
    while let Some(g) = stack.pop() {
        for node in &g.conditions {
            match node {
                ComboNode::Leaf(t) => leaves.push(t),
                ComboNode::Group(inner) => stack.push(inner),
            }
        }
    }
    leaves
}

/// Every scale key referenced by a combo tree.
pub fn combo_scales(group: &ComboGroup) -> Vec<&str> {
    combo_leaves(group)
        .into_iter()
        .map(|t| t.scale.as_str())
        .collect()
}

fn check_group(group: &ComboGroup, namespace: &BTreeMap<&str, f64>) -> Result<bool, RuleError> {
    let mut results = group.conditions.iter().map(|node| match node {
        ComboNode::Leaf(t) => check_threshold(t, namespace),
        ComboNode::Group(inner) => check_group(inner, namespace),
    });

    match group.op {
        BoolOp::And => {
            for r in results {
                if !r? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        BoolOp::Or => {
            for r in results {
                if r? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        BoolOp::Not => match results.next() {
            Some(r) => Ok(!r?),
            None => Err(RuleError::MalformedGroup {
                op: "NOT",
                reason: "needs exactly one condition, got 0".into(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comparison, Formula, Outcome};

    fn threshold(scale: &str, op: Comparison, value: f64) -> Threshold {
        Threshold {
            scale: scale.into(),
            op,
            value,
        }
    }

    fn rule(priority: i64, condition: Condition, summary_type: &str) -> Rule {
        Rule {
            id: Some(summary_type.into()),
            priority,
            condition,
            outcome: Outcome {
                summary_type: summary_type.into(),
                summary: format!("{summary_type} summary"),
            },
        }
    }

    fn formula(expression: &str) -> Condition {
        Condition::Formula(Formula {
            expression: expression.into(),
        })
    }

    fn scores(pairs: &[(&str, f64)]) -> Vec<ScaleScore> {
        pairs
            .iter()
            .map(|(key, raw)| ScaleScore {
                key: key.to_string(),
                name: key.to_string(),
                raw: *raw,
                clamped: *raw,
                band: None,
            })
            .collect()
    }

    fn default_result() -> DefaultResult {
        DefaultResult {
            summary_type: "balanced".into(),
            summary: "No strong tendency".into(),
            scales_data: vec![],
        }
    }

    fn summary_type(classification: &Classification<'_>) -> String {
        classification.summary_type().to_string()
    }

    #[test]
    fn lower_priority_number_wins() {
        let rules = vec![
            rule(100, Condition::Threshold(threshold("trust", Comparison::Ge, 1.0)), "late"),
            rule(50, Condition::Threshold(threshold("trust", Comparison::Ge, 1.0)), "early"),
        ];
        let c = evaluate("t", &rules, &scores(&[("trust", 7.0)]), None, &Limits::default()).unwrap();
        assert_eq!(summary_type(&c), "early");
        assert_eq!(c.matched_rule().unwrap().index, 1);
    }

    #[test]
    fn equal_priorities_keep_declaration_order() {
        let rules = vec![
            rule(10, formula("trust > 0"), "first"),
            rule(10, formula("trust > 0"), "second"),
        ];
        let c = evaluate("t", &rules, &scores(&[("trust", 1.0)]), None, &Limits::default()).unwrap();
        assert_eq!(summary_type(&c), "first");
    }

    #[test]
    fn threshold_on_unknown_scale_is_skipped() {
        let rules = vec![
            rule(1, Condition::Threshold(threshold("ghost", Comparison::Ge, 0.0)), "broken"),
            rule(2, Condition::Threshold(threshold("trust", Comparison::Ge, 5.0)), "ok"),
        ];
        let c = evaluate("t", &rules, &scores(&[("trust", 7.0)]), None, &Limits::default()).unwrap();
        assert_eq!(summary_type(&c), "ok");
    }

    #[test]
    fn broken_formulas_are_skipped() {
        let rules = vec![
            rule(1, formula("ghost > 1"), "unknown-var"),
            rule(2, formula("trust / zero > 1"), "div-zero"),
            rule(3, formula("trust >"), "malformed"),
            rule(4, formula("trust >= 7"), "good"),
        ];
        let c = evaluate(
            "t",
            &rules,
            &scores(&[("trust", 7.0), ("zero", 0.0)]),
            None,
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(summary_type(&c), "good");
    }

    #[test]
    fn formula_limits_apply() {
        let limits = Limits {
            max_formula_len: 8,
            ..Limits::default()
        };
        let rules = vec![rule(1, formula("trust >= 1 + 1"), "long")];
        let default = default_result();
        let c = evaluate("t", &rules, &scores(&[("trust", 7.0)]), Some(&default), &limits).unwrap();
        assert!(matches!(c, Classification::Default(_)));
    }

    #[test]
    fn falls_back_to_default() {
        let rules = vec![rule(1, formula("trust > 100"), "never")];
        let default = default_result();
        let c = evaluate("t", &rules, &scores(&[("trust", 7.0)]), Some(&default), &Limits::default())
            .unwrap();
        assert_eq!(summary_type(&c), "balanced");
        assert!(c.matched_rule().is_none());
    }

    #[test]
    fn unscored_without_default() {
        let rules = vec![rule(1, formula("trust > 100"), "never")];
        let err = evaluate("quiz-1", &rules, &scores(&[("trust", 7.0)]), None, &Limits::default())
            .unwrap_err();
        assert_eq!(
            err,
            ScoringError::Unscored {
                test_id: "quiz-1".into()
            }
        );
    }

    #[test]
    fn threshold_uses_raw_score() {
        let mut s = scores(&[("trust", 42.0)]);
        s[0].clamped = 10.0;
        let ns: BTreeMap<&str, f64> = s.iter().map(|s| (s.key.as_str(), s.raw)).collect();
        let r = rule(1, Condition::Threshold(threshold("trust", Comparison::Gt, 10.0)), "x");
        assert!(check_rule(&r, &ns, &Limits::default()).unwrap());
    }

    fn combo(op: BoolOp, conditions: Vec<ComboNode>) -> ComboGroup {
        ComboGroup { op, conditions }
    }

    fn leaf(scale: &str, op: Comparison, value: f64) -> ComboNode {
        ComboNode::Leaf(threshold(scale, op, value))
    }

    #[test]
    fn combo_boolean_semantics() {
        let ns = BTreeMap::from([("a", 5.0), ("b", 1.0)]);
        let limits = Limits::default();
        let check = |group: ComboGroup| {
            check_rule(&rule(1, Condition::Combo(group), "c"), &ns, &limits).unwrap()
        };

        assert!(check(combo(
            BoolOp::And,
            vec![leaf("a", Comparison::Ge, 5.0), leaf("b", Comparison::Lt, 2.0)]
        )));
        assert!(!check(combo(
            BoolOp::And,
            vec![leaf("a", Comparison::Ge, 5.0), leaf("b", Comparison::Gt, 2.0)]
        )));
        assert!(check(combo(
            BoolOp::Or,
            vec![leaf("a", Comparison::Lt, 0.0), leaf("b", Comparison::Eq, 1.0)]
        )));
        assert!(check(combo(
            BoolOp::Not,
            vec![ComboNode::Group(combo(
                BoolOp::Or,
                vec![leaf("a", Comparison::Lt, 0.0), leaf("b", Comparison::Gt, 3.0)]
            ))]
        )));
    }

    #[test]
    fn combo_with_unknown_scale_fails_regardless_of_order() {
        let ns = BTreeMap::from([("a", 5.0)]);
        let group = combo(
            BoolOp::Or,
            vec![leaf("a", Comparison::Ge, 0.0), leaf("ghost", Comparison::Ge, 0.0)],
        );
        let err = check_rule(&rule(1, Condition::Combo(group), "c"), &ns, &Limits::default())
            .unwrap_err();
        assert_eq!(err, RuleError::UnknownScale("ghost".into()));
    }

    #[test]
    fn combo_depth_and_arity_limits() {
        let ns = BTreeMap::from([("a", 5.0)]);
        let mut group = combo(BoolOp::And, vec![leaf("a", Comparison::Ge, 0.0)]);
        for _ in 0..3 {
            group = combo(BoolOp::And, vec![ComboNode::Group(group)]);
        }
        let limits = Limits {
            max_combo_depth: 3,
            ..Limits::default()
        };
        let err = check_rule(&rule(1, Condition::Combo(group), "deep"), &ns, &limits).unwrap_err();
        assert_eq!(err, RuleError::ComboTooDeep { max: 3 });

        let not_two = combo(
            BoolOp::Not,
            vec![leaf("a", Comparison::Ge, 0.0), leaf("a", Comparison::Ge, 1.0)],
        );
        assert!(matches!(
            check_rule(&rule(1, Condition::Combo(not_two), "n"), &ns, &Limits::default()),
            Err(RuleError::MalformedGroup { op: "NOT", .. })
        ));

        let empty_and = combo(BoolOp::And, vec![]);
        assert!(matches!(
            check_rule(&rule(1, Condition::Combo(empty_and), "e"), &ns, &Limits::default()),
            Err(RuleError::MalformedGroup { op: "AND", .. })
        ));
    }

    #[test]
    fn lint_reports_configuration_errors_only() {
        let scales = BTreeSet::from(["a", "b"]);
        let limits = Limits::default();

        assert!(lint_rule(&rule(1, formula("a / b > 1"), "ok"), &scales, &limits).is_ok());
        assert_eq!(
            lint_rule(&rule(1, formula("a + ghost > 1"), "x"), &scales, &limits),
            Err(RuleError::Formula(FormulaError::UnknownVariable("ghost".into())))
        );
        assert!(matches!(
            lint_rule(&rule(1, formula("a >"), "x"), &scales, &limits),
            Err(RuleError::Formula(FormulaError::Parse { .. }))
        ));
        assert_eq!(
            lint_rule(
                &rule(1, Condition::Threshold(threshold("c", Comparison::Ge, 1.0)), "x"),
                &scales,
                &limits
            ),
            Err(RuleError::UnknownScale("c".into()))
        );
        assert!(matches!(
            lint_rule(
                &rule(1, Condition::Combo(combo(BoolOp::Or, vec![])), "x"),
                &scales,
                &limits
            ),
            Err(RuleError::MalformedGroup { op: "OR", .. })
        ));
    }

    #[test]
    fn combo_scales_walks_nested_groups() {
        let group = combo(
            BoolOp::And,
            vec![
                leaf("a", Comparison::Ge, 0.0),
                ComboNode::Group(combo(BoolOp::Not, vec![leaf("b", Comparison::Ge, 0.0)])),
            ],
        );
        let mut scales = combo_scales(&group);
        scales.sort();
        assert_eq!(scales, vec!["a", "b"]);
    }
}
