//! Rule table matching for the resolution backend
//!
//! A completed answer path is mapped to the first rule, in declared order,
//! whose conditions it satisfies. The matched rule's result is expanded with
//! its hypothesis template and returned to the wizard as a `ResolutionResult`.

use crate::resolver::{active_questions, missing_questions};
use crate::tree::{Answers, ConstraintSet, DecisionTree, matches_constraints};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub condition: String,
    pub test: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisVariant {
    /// `two_sided`, `left`, `right` or `global`
    pub tail: String,
    pub h0: String,
    pub ha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hypotheses {
    #[serde(default)]
    pub variants: Vec<HypothesisVariant>,
}

/// Result body stored on a rule, before template expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub test_primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis_template: Option<String>,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub test_alternatives: Vec<Alternative>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub conditions: ConstraintSet,
    pub result: RuleResult,
}

/// Recommendation returned by the resolution service, displayed as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub test_primary: String,
    pub rule_id: String,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub test_alternatives: Vec<Alternative>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub hypotheses: Hypotheses,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_default: Option<f64>,
}

/// Why the backend refused to resolve an answer map
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Invalid(String),
    Incomplete {
        missing: Vec<String>,
        active: Vec<String>,
    },
    NoRule,
}

impl Rejection {
    pub fn message(&self) -> String {
        match self {
            Rejection::Invalid(message) => message.clone(),
            Rejection::Incomplete { .. } => "Missing answers needed to pick a test.".to_string(),
            Rejection::NoRule => "No rule matches the given answers.".to_string(),
        }
    }
}

/// Check that every key is a known question and every value one of its options
pub fn validate_answers(tree: &DecisionTree, answers: &Answers) -> Result<(), String> {
    let mut unknown: Vec<&str> = answers
        .keys()
        .filter(|id| tree.question(id).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(format!("Unknown questions in answers: {}", unknown.join(", ")));
    }

    for (question_id, value) in answers {
        let valid = tree
            .question(question_id)
            .is_some_and(|q| q.option(value).is_some());
        if !valid {
            return Err(format!("Invalid answer for \"{}\": {}", question_id, value));
        }
    }
    Ok(())
}

pub fn find_matching_rule<'a>(tree: &'a DecisionTree, answers: &Answers) -> Option<&'a Rule> {
    tree.rules
        .iter()
        .find(|rule| matches_constraints(Some(&rule.conditions), answers))
}

/// Expand a matched rule into the payload sent to the wizard
pub fn build_result(tree: &DecisionTree, rule: &Rule) -> ResolutionResult {
    let hypotheses = rule
        .result
        .hypothesis_template
        .as_ref()
        .and_then(|id| tree.hypothesis_templates.get(id))
        .cloned()
        .unwrap_or_default();

    ResolutionResult {
        test_primary: rule.result.test_primary.clone(),
        rule_id: rule.rule_id.clone(),
        example: rule.result.example.clone(),
        test_alternatives: rule.result.test_alternatives.clone(),
        assumptions: rule.result.assumptions.clone(),
        hypotheses,
        hypothesis_template: rule.result.hypothesis_template.clone(),
        alpha_default: Some(tree.default_alpha),
    }
}

/// Validate, check completeness, and match a rule for an answer map
pub fn resolve(tree: &DecisionTree, answers: &Answers) -> Result<ResolutionResult, Rejection> {
    validate_answers(tree, answers).map_err(Rejection::Invalid)?;

    let missing = missing_questions(tree, answers);
    if !missing.is_empty() {
        return Err(Rejection::Incomplete {
            missing: missing.into_iter().map(str::to_string).collect(),
            active: active_questions(tree, answers)
                .into_iter()
                .map(|q| q.id.clone())
                .collect(),
        });
    }

    let rule = find_matching_rule(tree, answers).ok_or(Rejection::NoRule)?;
    tracing::debug!("answers matched rule {}", rule.rule_id);
    Ok(build_result(tree, rule))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> DecisionTree {
        DecisionTree::builtin().unwrap()
    }

    fn answers(pairs: &[(&str, &str)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_one_variable_quantitative_normal() {
        let result = resolve(
            &tree(),
            &answers(&[
                ("scope", "one_variable"),
                ("one_data_type", "quantitative"),
                ("one_quant_normality", "ok"),
            ]),
        )
        .unwrap();
        assert_eq!(result.test_primary, "One-sample t-test");
        assert_eq!(result.rule_id, "R01");
        assert_eq!(result.hypotheses.variants.len(), 3);
        assert_eq!(result.alpha_default, Some(0.05));
    }

    #[test]
    fn test_small_sample_proportion_uses_exact_test() {
        let result = resolve(
            &tree(),
            &answers(&[
                ("scope", "one_variable"),
                ("one_data_type", "categorical_proportion"),
                ("one_prop_approx", "violated"),
            ]),
        )
        .unwrap();
        assert_eq!(result.test_primary, "Exact binomial test");
    }

    #[test]
    fn test_ordinal_rule_matches_through_one_of() {
        let result = resolve(
            &tree(),
            &answers(&[("scope", "one_variable"), ("one_data_type", "ordinal")]),
        )
        .unwrap();
        assert_eq!(result.rule_id, "R03");
    }

    #[test]
    fn test_independent_unequal_variance_is_welch() {
        let result = resolve(
            &tree(),
            &answers(&[
                ("scope", "two_variables"),
                ("two_data_pattern", "nominal_continuous"),
                ("two_nomcont_groups", "two"),
                ("two_nomcont_dependency", "independent"),
                ("two_nomcont_normality", "ok"),
                ("two_nomcont_variance", "violated"),
            ]),
        )
        .unwrap();
        assert_eq!(result.test_primary, "Welch's t-test");
    }

    #[test]
    fn test_more_than_two_groups_non_normal() {
        let result = resolve(
            &tree(),
            &answers(&[
                ("scope", "two_variables"),
                ("two_data_pattern", "nominal_continuous"),
                ("two_nomcont_groups", "more_than_two"),
                ("two_nomcont_normality", "violated"),
            ]),
        )
        .unwrap();
        assert_eq!(result.test_primary, "Kruskal-Wallis test");
        assert_eq!(result.hypotheses.variants[0].tail, "global");
    }

    #[test]
    fn test_missing_answers_reported() {
        let err = resolve(&tree(), &answers(&[("scope", "one_variable")])).unwrap_err();
        match err {
            Rejection::Incomplete { missing, active } => {
                assert_eq!(missing, vec!["one_data_type".to_string()]);
                assert_eq!(active, vec!["scope".to_string(), "one_data_type".to_string()]);
            }
            other => panic!("unexpected rejection: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_value_rejected() {
        let err = resolve(
            &tree(),
            &answers(&[("scope", "one_variable"), ("one_data_type", "invalid_value")]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Rejection::Invalid("Invalid answer for \"one_data_type\": invalid_value".into())
        );
    }

    #[test]
    fn test_unknown_questions_listed_sorted() {
        let err = validate_answers(&tree(), &answers(&[("zeta", "x"), ("alpha", "y")]))
            .unwrap_err();
        assert_eq!(err, "Unknown questions in answers: alpha, zeta");
    }

    #[test]
    fn test_unknown_template_yields_empty_hypotheses() {
        let mut tree = tree();
        tree.hypothesis_templates.clear();
        let rule = tree.rules[0].clone();
        let result = build_result(&tree, &rule);
        assert!(result.hypotheses.variants.is_empty());
        assert_eq!(result.rule_id, rule.rule_id);
    }

    #[test]
    fn test_no_rule_for_complete_path() {
        let mut tree = tree();
        tree.rules.retain(|r| r.rule_id != "R07");
        let err = resolve(
            &tree,
            &answers(&[
                ("scope", "two_variables"),
                ("two_data_pattern", "two_nominal"),
                ("two_nominal_expected", "low"),
            ]),
        )
        .unwrap_err();
        assert_eq!(err, Rejection::NoRule);
    }
}
