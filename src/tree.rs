//! Question tree data model
//!
//! A tree is an ordered list of questions. Each question may carry a `when`
//! constraint set naming earlier answers it depends on. The same document also
//! carries the rule table and hypothesis templates used by the backend.

use crate::error::{Result, SelectorError};
use crate::rules::{Hypotheses, Rule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Tree shipped with the crate, used when no tree path is configured
pub const BUILTIN_TREE_JSON: &str = include_str!("../data/tree_config.json");

/// Chosen option value per question id
pub type Answers = BTreeMap<String, String>;

/// Activation constraints: question id to expected answer
pub type ConstraintSet = BTreeMap<String, Constraint>;

/// Expected answer for a single referenced question.
///
/// Serialized as a bare string (`Equals`) or an array of strings (`OneOf`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint {
    Equals(String),
    OneOf(Vec<String>),
}

impl Constraint {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Constraint::Equals(expected) => expected == value,
            Constraint::OneOf(expected) => expected.iter().any(|v| v == value),
        }
    }

    /// Every value this constraint can match
    pub fn values(&self) -> Vec<&str> {
        match self {
            Constraint::Equals(v) => vec![v.as_str()],
            Constraint::OneOf(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// True when every constrained question is answered with an accepted value.
/// An absent constraint set is always satisfied.
pub fn matches_constraints(constraints: Option<&ConstraintSet>, answers: &Answers) -> bool {
    let Some(constraints) = constraints else {
        return true;
    };
    constraints.iter().all(|(question_id, expected)| {
        answers
            .get(question_id)
            .is_some_and(|value| expected.accepts(value))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub label: String,
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<ConstraintSet>,
}

impl Question {
    pub fn option(&self, value: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|opt| opt.value == value)
    }

    /// Display label for a value, falling back to the raw value
    pub fn option_label<'a>(&'a self, value: &'a str) -> &'a str {
        self.option(value).map_or(value, |opt| opt.label.as_str())
    }

    pub fn is_active(&self, answers: &Answers) -> bool {
        matches_constraints(self.when.as_ref(), answers)
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_alpha() -> f64 {
    0.05
}

/// Static wizard definition, immutable for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_alpha")]
    pub default_alpha: f64,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub hypothesis_templates: BTreeMap<String, Hypotheses>,
}

impl DecisionTree {
    /// Tree with only questions, no backend rules
    pub fn from_questions(questions: Vec<Question>) -> Self {
        Self {
            version: default_version(),
            default_alpha: default_alpha(),
            questions,
            rules: Vec::new(),
            hypothesis_templates: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TREE_JSON)
    }

    /// Parse and validate a tree document
    pub fn from_json(raw: &str) -> Result<Self> {
        let tree: DecisionTree =
            serde_json::from_str(raw).map_err(|e| SelectorError::TreeLoad {
                message: format!("Failed to parse tree document: {}", e),
            })?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SelectorError::TreeLoad {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let tree = Self::from_json(&raw)?;
        tracing::info!(
            "Loaded tree {} from {} ({} questions, {} rules)",
            tree.version,
            path.display(),
            tree.questions.len(),
            tree.rules.len()
        );
        Ok(tree)
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn question_ids(&self) -> Vec<&str> {
        self.questions.iter().map(|q| q.id.as_str()).collect()
    }

    /// Structural checks: unique question ids, non-empty and unique options,
    /// constraints only referencing known questions and their option values.
    ///
    /// An unsatisfiable tree is still valid; it simply has no active questions.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(SelectorError::InvalidTree {
                    message: format!("duplicate question id '{}'", question.id),
                });
            }
            if question.options.is_empty() {
                return Err(SelectorError::InvalidTree {
                    message: format!("question '{}' has no options", question.id),
                });
            }
            let mut values = HashSet::new();
            for opt in &question.options {
                if !values.insert(opt.value.as_str()) {
                    return Err(SelectorError::InvalidTree {
                        message: format!(
                            "question '{}' repeats option '{}'",
                            question.id, opt.value
                        ),
                    });
                }
            }
        }

        for question in &self.questions {
            if let Some(when) = &question.when {
                self.check_constraints(&format!("question '{}'", question.id), when)?;
            }
        }
        for rule in &self.rules {
            self.check_constraints(&format!("rule '{}'", rule.rule_id), &rule.conditions)?;
            if let Some(template) = &rule.result.hypothesis_template
                && !self.hypothesis_templates.contains_key(template)
            {
                tracing::warn!(
                    "rule '{}' references unknown hypothesis template '{}'",
                    rule.rule_id,
                    template
                );
            }
        }

        if !(self.default_alpha > 0.0 && self.default_alpha < 1.0) {
            return Err(SelectorError::InvalidTree {
                message: format!("default_alpha {} must be in (0, 1)", self.default_alpha),
            });
        }
        Ok(())
    }

    fn check_constraints(&self, owner: &str, constraints: &ConstraintSet) -> Result<()> {
        for (question_id, expected) in constraints {
            let Some(referenced) = self.question(question_id) else {
                return Err(SelectorError::InvalidTree {
                    message: format!("{} references unknown question '{}'", owner, question_id),
                });
            };
            for value in expected.values() {
                if referenced.option(value).is_none() {
                    return Err(SelectorError::InvalidTree {
                        message: format!(
                            "{} expects '{}' = '{}', which is not an option",
                            owner, question_id, value
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
