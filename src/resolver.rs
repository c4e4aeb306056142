//! Question-tree resolver
//!
//! Pure functions derive the active question sequence from a tree and an
//! answer map. `WizardSession` owns the answer map and keeps it consistent:
//! after every mutation no answer refers to an inactive question.

use crate::error::{Result, SelectorError};
use crate::tree::{Answers, DecisionTree, Question};
use serde::Serialize;
use std::sync::Arc;

/// Questions whose constraints are satisfied, in declared tree order
pub fn active_questions<'a>(tree: &'a DecisionTree, answers: &Answers) -> Vec<&'a Question> {
    tree.questions
        .iter()
        .filter(|q| q.is_active(answers))
        .collect()
}

/// First active question without an answer
pub fn current_question<'a>(active: &[&'a Question], answers: &Answers) -> Option<&'a Question> {
    active
        .iter()
        .find(|q| !answers.contains_key(&q.id))
        .copied()
}

/// A path is complete only when there is at least one active question and all
/// of them are answered. An empty active list is never complete.
pub fn is_complete(active: &[&Question], answers: &Answers) -> bool {
    !active.is_empty() && active.iter().all(|q| answers.contains_key(&q.id))
}

pub fn missing_questions<'a>(tree: &'a DecisionTree, answers: &Answers) -> Vec<&'a str> {
    active_questions(tree, answers)
        .into_iter()
        .filter(|q| !answers.contains_key(&q.id))
        .map(|q| q.id.as_str())
        .collect()
}

/// Drop answers to inactive questions until none remain, returning the
/// removed ids in removal order.
///
/// Runs to a fixpoint: removing one answer can deactivate a question that
/// depended on it.
pub fn prune(tree: &DecisionTree, answers: &mut Answers) -> Vec<String> {
    let mut removed = Vec::new();
    loop {
        let stale: Vec<String> = {
            let active = active_questions(tree, answers);
            answers
                .keys()
                .filter(|id| !active.iter().any(|q| &q.id == *id))
                .cloned()
                .collect()
        };
        if stale.is_empty() {
            return removed;
        }
        for id in stale {
            answers.remove(&id);
            removed.push(id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
    pub percent: u8,
}

/// Answered question with display labels, in active order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub question_id: String,
    pub question_label: String,
    pub value: String,
    pub option_label: String,
}

/// Answer map for one wizard instance, bound to an immutable tree
#[derive(Debug, Clone)]
pub struct WizardSession {
    tree: Arc<DecisionTree>,
    answers: Answers,
    revision: u64,
}

impl WizardSession {
    pub fn new(tree: Arc<DecisionTree>) -> Self {
        Self {
            tree,
            answers: Answers::new(),
            revision: 0,
        }
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    /// Bumped on every change to the answer map
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn active(&self) -> Vec<&Question> {
        active_questions(&self.tree, &self.answers)
    }

    pub fn current(&self) -> Option<&Question> {
        current_question(&self.active(), &self.answers)
    }

    pub fn is_complete(&self) -> bool {
        is_complete(&self.active(), &self.answers)
    }

    /// Record `value` for `question_id`, then prune answers that are no longer
    /// reachable. Re-recording the current value is a no-op.
    ///
    /// Returns the ids pruned as a consequence.
    pub fn record_answer(&mut self, question_id: &str, value: &str) -> Result<Vec<String>> {
        let question = self.tree.question(question_id).ok_or_else(|| {
            let ids = self.tree.question_ids();
            SelectorError::Validation {
                message: with_suggestion(
                    format!("Unknown question '{}'", question_id),
                    question_id,
                    &ids,
                ),
            }
        })?;
        if question.option(value).is_none() {
            let values: Vec<&str> = question.options.iter().map(|o| o.value.as_str()).collect();
            return Err(SelectorError::Validation {
                message: with_suggestion(
                    format!("Invalid answer for '{}': {}", question_id, value),
                    value,
                    &values,
                ),
            });
        }

        if self.answers.get(question_id).map(String::as_str) == Some(value) {
            return Ok(Vec::new());
        }

        let before = self.answers.clone();
        self.answers
            .insert(question_id.to_string(), value.to_string());
        let pruned = prune(&self.tree, &mut self.answers);
        // An answer to an inactive question is pruned straight back out
        if self.answers == before {
            return Ok(pruned);
        }
        self.revision += 1;
        if !pruned.is_empty() {
            tracing::debug!(
                "answer {}={} pruned {:?}",
                question_id,
                value,
                pruned
            );
        }
        Ok(pruned)
    }

    /// Remove the answer to the last active, answered question.
    /// Returns `None` when nothing is answered.
    pub fn retract_last(&mut self) -> Option<String> {
        let last = self
            .active()
            .into_iter()
            .rev()
            .find(|q| self.answers.contains_key(&q.id))
            .map(|q| q.id.clone())?;
        self.answers.remove(&last);
        prune(&self.tree, &mut self.answers);
        self.revision += 1;
        Some(last)
    }

    pub fn clear(&mut self) {
        if !self.answers.is_empty() {
            self.answers.clear();
            self.revision += 1;
        }
    }

    pub fn progress(&self) -> Progress {
        let active = self.active();
        let answered = active
            .iter()
            .filter(|q| self.answers.contains_key(&q.id))
            .count();
        let total = active.len();
        let percent = (answered as f64 / total.max(1) as f64 * 100.0).round() as u8;
        Progress {
            answered,
            total,
            percent,
        }
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.active()
            .into_iter()
            .filter_map(|q| {
                let value = self.answers.get(&q.id)?;
                Some(Breadcrumb {
                    question_id: q.id.clone(),
                    question_label: q.label.clone(),
                    value: value.clone(),
                    option_label: q.option_label(value).to_string(),
                })
            })
            .collect()
    }
}

fn with_suggestion(mut message: String, input: &str, candidates: &[&str]) -> String {
    if let Some(closest) = find_closest_match(input, candidates) {
        message.push_str(&format!(". Did you mean '{}'?", closest));
    }
    message
}

/// Closest candidate by edit distance, only when the typo is small relative
/// to the input
fn find_closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input_lower = input.to_lowercase();
    candidates
        .iter()
        .map(|c| (*c, strsim::levenshtein(&input_lower, &c.to_lowercase())))
        .min_by_key(|(_, distance)| *distance)
        .filter(|(_, distance)| *distance < 4 && *distance < input.chars().count())
        .map(|(c, _)| c)
}
