//! Wizard controller driven by the UI layer
//!
//! Wraps a `WizardSession` with the resolution service: every change that
//! leaves the path complete issues a resolution request, and responses that
//! arrive after the answers have moved on are discarded.

use crate::client::ResolutionService;
use crate::error::{Result, SelectorError};
use crate::resolver::{Breadcrumb, Progress, WizardSession};
use crate::rules::ResolutionResult;
use crate::tree::{Answers, DecisionTree, Question};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the UI should show after an action
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Present this question
    Ask(Question),
    /// Path complete and resolved
    Resolved(ResolutionResult),
    /// Path complete but resolution failed; answers are preserved
    Failed(String),
    /// Path complete, resolution not yet requested; call `advance`
    Pending,
    /// The tree has no active questions; distinct from a completed path
    NoQuestions,
}

/// Snapshot of a resolution request, tagged with the session revision it was
/// issued for
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResolution {
    pub revision: u64,
    pub answers: Answers,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Resolved(ResolutionResult),
    Failed(String),
    /// The answer map changed since the request was issued
    Stale,
}

pub struct Wizard<S: ResolutionService> {
    service: S,
    session: WizardSession,
    alpha: f64,
    result: Option<ResolutionResult>,
    error: Option<String>,
}

impl<S: ResolutionService> Wizard<S> {
    /// Fetch the tree and start an empty session. A failure here is fatal.
    pub async fn load(service: S) -> Result<Self> {
        let tree = service.fetch_tree().await?;
        Ok(Self::with_tree(service, Arc::new(tree)))
    }

    pub fn with_tree(service: S, tree: Arc<DecisionTree>) -> Self {
        let alpha = tree.default_alpha;
        Self {
            service,
            session: WizardSession::new(tree),
            alpha,
            result: None,
            error: None,
        }
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn result(&self) -> Option<&ResolutionResult> {
        self.result.as_ref()
    }

    /// Last resolution error, cleared on the next successful resolution
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(SelectorError::Validation {
                message: format!("alpha {} must be between 0 and 1", alpha),
            });
        }
        self.alpha = alpha;
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        self.session.progress()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.session.breadcrumbs()
    }

    /// Record an option click and advance
    pub async fn select(&mut self, question_id: &str, value: &str) -> Result<Step> {
        let before = self.session.revision();
        self.session.record_answer(question_id, value)?;
        if self.session.revision() == before
            && let Some(result) = &self.result
        {
            return Ok(Step::Resolved(result.clone()));
        }
        Ok(self.advance().await)
    }

    /// Undo the last answer ("back" control)
    pub async fn back(&mut self) -> Step {
        if let Some(id) = self.session.retract_last() {
            debug!("retracted answer to {}", id);
        }
        self.advance().await
    }

    /// Clear local answers, then notify the service. The local state is
    /// already reset while the notification is in flight, and a failed
    /// notification is only logged.
    pub async fn reset(&mut self) -> Step {
        self.session.clear();
        self.result = None;
        self.error = None;
        if let Err(e) = self.service.reset().await {
            warn!("reset notification failed: {}", e);
        }
        self.advance().await
    }

    /// Re-issue the resolution request for the current answers
    pub async fn retry(&mut self) -> Step {
        self.advance().await
    }

    /// Current question, or resolve the path when complete
    pub async fn advance(&mut self) -> Step {
        if let Some(question) = self.session.current() {
            let question = question.clone();
            self.result = None;
            return Step::Ask(question);
        }
        let Some(pending) = self.begin_resolution() else {
            return Step::NoQuestions;
        };
        let outcome = self.service.resolve(&pending.answers).await;
        match self.apply_resolution(&pending, outcome) {
            Applied::Resolved(result) => Step::Resolved(result),
            Applied::Failed(message) => Step::Failed(message),
            // Only reachable when a caller interleaves mutations between
            // begin_resolution and apply_resolution
            Applied::Stale => self.current_step(),
        }
    }

    /// Step for the current state without contacting the service
    pub fn current_step(&self) -> Step {
        if let Some(question) = self.session.current() {
            return Step::Ask(question.clone());
        }
        if !self.session.is_complete() {
            return Step::NoQuestions;
        }
        match (&self.result, &self.error) {
            (Some(result), _) => Step::Resolved(result.clone()),
            (None, Some(error)) => Step::Failed(error.clone()),
            (None, None) => Step::Pending,
        }
    }

    /// Snapshot the answers for a resolution request; `None` unless the path
    /// is complete
    pub fn begin_resolution(&self) -> Option<PendingResolution> {
        if !self.session.is_complete() {
            return None;
        }
        Some(PendingResolution {
            revision: self.session.revision(),
            answers: self.session.answers().clone(),
        })
    }

    /// Apply a response unless the session has moved past the request.
    /// Never mutates the answers.
    pub fn apply_resolution(
        &mut self,
        pending: &PendingResolution,
        outcome: Result<ResolutionResult>,
    ) -> Applied {
        if pending.revision != self.session.revision() || !self.session.is_complete() {
            debug!(
                "discarding stale resolution for revision {} (now {})",
                pending.revision,
                self.session.revision()
            );
            return Applied::Stale;
        }
        match outcome {
            Ok(result) => {
                info!("path resolved to {} ({})", result.test_primary, result.rule_id);
                self.error = None;
                self.result = Some(result.clone());
                Applied::Resolved(result)
            }
            Err(e) => {
                warn!("resolution failed: {}", e);
                let message = match e {
                    SelectorError::Resolution { message } => message,
                    other => other.to_string(),
                };
                self.result = None;
                self.error = Some(message.clone());
                Applied::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{self, Rejection};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory service resolving against the tree's own rule table
    struct LocalService {
        tree: DecisionTree,
        resolve_calls: AtomicUsize,
        fail_reset: bool,
        fail_resolve: AtomicBool,
        last_answers: Mutex<Option<Answers>>,
    }

    impl LocalService {
        fn new() -> Self {
            Self {
                tree: DecisionTree::builtin().unwrap(),
                resolve_calls: AtomicUsize::new(0),
                fail_reset: false,
                fail_resolve: AtomicBool::new(false),
                last_answers: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ResolutionService for LocalService {
        async fn fetch_tree(&self) -> Result<DecisionTree> {
            Ok(self.tree.clone())
        }

        async fn resolve(&self, answers: &Answers) -> Result<ResolutionResult> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_answers.lock().unwrap() = Some(answers.clone());
            if self.fail_resolve.load(Ordering::SeqCst) {
                return Err(SelectorError::Transport {
                    message: "connection refused".into(),
                });
            }
            rules::resolve(&self.tree, answers).map_err(|r: Rejection| {
                SelectorError::Resolution {
                    message: r.message(),
                }
            })
        }

        async fn reset(&self) -> Result<()> {
            if self.fail_reset {
                return Err(SelectorError::Transport {
                    message: "reset unavailable".into(),
                });
            }
            Ok(())
        }
    }

    async fn loaded() -> Wizard<LocalService> {
        Wizard::load(LocalService::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_walk_to_resolution() {
        let mut wizard = loaded().await;
        assert!(matches!(wizard.advance().await, Step::Ask(q) if q.id == "scope"));

        wizard.select("scope", "two_variables").await.unwrap();
        wizard.select("two_data_pattern", "two_nominal").await.unwrap();
        let step = wizard.select("two_nominal_expected", "low").await.unwrap();

        match step {
            Step::Resolved(result) => assert_eq!(result.test_primary, "Fisher's exact test"),
            other => panic!("expected resolution, got {:?}", other),
        }
        assert_eq!(wizard.service().resolve_calls.load(Ordering::SeqCst), 1);
        assert_eq!(wizard.progress().percent, 100);
    }

    #[tokio::test]
    async fn test_reselecting_same_answer_does_not_resolve_again() {
        let mut wizard = loaded().await;
        wizard.select("scope", "two_variables").await.unwrap();
        wizard.select("two_data_pattern", "two_ordinal").await.unwrap();
        wizard.select("two_data_pattern", "two_ordinal").await.unwrap();
        assert_eq!(wizard.service().resolve_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changing_answer_while_complete_resolves_again() {
        let mut wizard = loaded().await;
        wizard.select("scope", "two_variables").await.unwrap();
        wizard.select("two_data_pattern", "two_ordinal").await.unwrap();
        let step = wizard.select("two_data_pattern", "two_continuous").await.unwrap();
        assert!(matches!(step, Step::Ask(q) if q.id == "two_continuous_normality"));
        assert!(wizard.result().is_none());

        wizard.select("two_continuous_normality", "ok").await.unwrap();
        assert_eq!(wizard.service().resolve_calls.load(Ordering::SeqCst), 2);
        let sent = wizard.service().last_answers.lock().unwrap().clone();
        assert_eq!(sent.as_ref(), Some(wizard.session().answers()));
        assert_eq!(sent.unwrap().len(), 3);
        assert_eq!(
            wizard.result().map(|r| r.rule_id.as_str()),
            Some("R08")
        );
    }

    #[tokio::test]
    async fn test_answer_to_inactive_question_does_not_resolve_again() {
        let mut wizard = loaded().await;
        wizard.select("scope", "two_variables").await.unwrap();
        wizard.select("two_data_pattern", "two_ordinal").await.unwrap();
        let revision = wizard.session().revision();
        let pending = wizard.begin_resolution().unwrap();

        let step = wizard.select("one_data_type", "ordinal").await.unwrap();
        assert!(matches!(step, Step::Resolved(ref r) if r.rule_id == "R10"));
        assert_eq!(wizard.session().revision(), revision);
        assert!(!wizard.session().answers().contains_key("one_data_type"));
        assert_eq!(wizard.service().resolve_calls.load(Ordering::SeqCst), 1);

        let outcome = wizard.service().resolve(&pending.answers).await;
        assert!(matches!(
            wizard.apply_resolution(&pending, outcome),
            Applied::Resolved(_)
        ));
    }

    #[tokio::test]
    async fn test_current_step_is_pending_before_resolution() {
        let service = LocalService::new();
        let tree = Arc::new(service.tree.clone());
        let mut wizard = Wizard::with_tree(service, tree);
        wizard.session.record_answer("scope", "two_variables").unwrap();
        wizard
            .session
            .record_answer("two_data_pattern", "two_ordinal")
            .unwrap();

        assert_eq!(wizard.current_step(), Step::Pending);
        assert!(matches!(wizard.advance().await, Step::Resolved(_)));
        assert!(matches!(wizard.current_step(), Step::Resolved(_)));
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let mut wizard = loaded().await;
        wizard.select("scope", "one_variable").await.unwrap();
        wizard.select("one_data_type", "ordinal").await.unwrap();

        let pending = wizard.begin_resolution().unwrap();
        let outcome = wizard.service().resolve(&pending.answers).await;

        wizard.back().await;
        assert_eq!(wizard.apply_resolution(&pending, outcome), Applied::Stale);
        assert!(wizard.result().is_none());
        assert!(matches!(wizard.current_step(), Step::Ask(q) if q.id == "one_data_type"));
    }

    #[tokio::test]
    async fn test_failed_resolution_preserves_answers() {
        let mut wizard = loaded().await;
        wizard.service().fail_resolve.store(true, Ordering::SeqCst);
        wizard.select("scope", "two_variables").await.unwrap();
        let step = wizard.select("two_data_pattern", "two_ordinal").await.unwrap();

        assert!(matches!(step, Step::Failed(ref m) if m.contains("connection refused")));
        assert_eq!(wizard.session().answers().len(), 2);
        assert!(wizard.error().is_some());

        wizard.service().fail_resolve.store(false, Ordering::SeqCst);
        let step = wizard.retry().await;
        assert!(matches!(step, Step::Resolved(_)));
        assert!(wizard.error().is_none());
    }

    #[tokio::test]
    async fn test_reset_survives_notification_failure() {
        let mut service = LocalService::new();
        service.fail_reset = true;
        let mut wizard = Wizard::load(service).await.unwrap();
        wizard.select("scope", "one_variable").await.unwrap();

        let revision = wizard.session().revision();
        let step = wizard.reset().await;
        assert!(wizard.session().answers().is_empty());
        assert_eq!(wizard.session().revision(), revision + 1);
        assert!(wizard.result().is_none());
        assert!(matches!(step, Step::Ask(q) if q.id == "scope"));
    }

    #[tokio::test]
    async fn test_empty_tree_never_resolves() {
        let service = LocalService::new();
        let mut wizard =
            Wizard::with_tree(service, Arc::new(DecisionTree::from_questions(vec![])));
        assert_eq!(wizard.advance().await, Step::NoQuestions);
        assert_eq!(wizard.service().resolve_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_alpha_bounds() {
        let mut wizard = loaded().await;
        assert_eq!(wizard.alpha(), 0.05);
        assert!(wizard.set_alpha(0.01).is_ok());
        assert!(wizard.set_alpha(1.0).is_err());
        assert!(wizard.set_alpha(0.0).is_err());
        assert_eq!(wizard.alpha(), 0.01);
    }
}
