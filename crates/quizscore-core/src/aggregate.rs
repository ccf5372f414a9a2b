//! Answer aggregation: folds selected options into per-scale totals.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ScoringError;
use crate::model::{AnswerOption, AnswerSet, Question, Selection, TestDefinition};

/// Sum the weights of every selected option into per-scale totals.
///
/// Every defined scale and every scale key mentioned by any option weight is
/// present in the returned map, starting from 0. Any invalid answer aborts
/// the whole aggregation; no partial totals are returned.
pub fn aggregate(
    test: &TestDefinition,
    answers: &AnswerSet,
) -> Result<BTreeMap<String, f64>, ScoringError> {
    let mut totals: BTreeMap<String, f64> = test
        .scales
        .iter()
        .map(|s| s.key.as_str())
        .chain(test.weight_keys())
        .map(|key| (key.to_string(), 0.0))
        .collect();

    for (question_id, selection) in answers {
        let question = test
            .question(question_id)
            .ok_or_else(|| ScoringError::UnknownQuestion(question_id.clone()))?;

        for option in resolve_selection(question, selection)? {
            for (scale, weight) in &option.weights {
                *totals.entry(scale.clone()).or_insert(0.0) += weight;
            }
        }
    }

    Ok(totals)
}

/// Resolve a selection to the question's options, enforcing the answer shape.
pub fn resolve_selection<'a>(
    question: &'a Question,
    selection: &Selection,
) -> Result<Vec<&'a AnswerOption>, ScoringError> {
    let ids = selection.ids();
    let shape_error = |reason: String| ScoringError::InvalidAnswerShape {
        question_id: question.id.clone(),
        reason,
    };

    if question.answer_type.is_single_choice() && ids.len() != 1 {
        return Err(shape_error(format!(
            "{} question expects exactly one option, got {}",
            question.answer_type,
            ids.len()
        )));
    }
    if ids.is_empty() {
        return Err(shape_error(
            "multi question expects at least one option".into(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut options = Vec::with_capacity(ids.len());
    for id in ids {
        let option = question
            .option(id)
            .ok_or_else(|| ScoringError::InvalidOption {
                question_id: question.id.clone(),
                option_id: id.clone(),
            })?;
        if !seen.insert(id.as_str()) {
            return Err(shape_error(format!("option '{id}' selected more than once")));
        }
        options.push(option);
    }

    Ok(options)
}

/// Questions of the test that have no entry in the answer set, in test order.
pub fn missing_questions(test: &TestDefinition, answers: &AnswerSet) -> Vec<String> {
    test.questions
        .iter()
        .filter(|q| !answers.contains_key(&q.id))
        .map(|q| q.id.clone())
        .collect()
}
