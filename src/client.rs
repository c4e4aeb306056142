use crate::error::{Result, SelectorError};
use crate::rules::ResolutionResult;
use crate::tree::{Answers, DecisionTree};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Remote collaborator that owns the tree and the rule table
#[async_trait]
pub trait ResolutionService: Send + Sync {
    async fn fetch_tree(&self) -> Result<DecisionTree>;
    async fn resolve(&self, answers: &Answers) -> Result<ResolutionResult>;
    async fn reset(&self) -> Result<()>;
}

#[derive(Deserialize)]
struct TreeEnvelope {
    success: bool,
    tree: Option<DecisionTree>,
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    answers: &'a Answers,
}

#[derive(Deserialize)]
struct ResolveEnvelope {
    success: bool,
    result: Option<ResolutionResult>,
    error: Option<String>,
    #[serde(default)]
    missing_questions: Vec<String>,
}

/// reqwest-backed client for the `/api/*` endpoints
#[derive(Clone, Debug)]
pub struct HttpResolutionClient {
    base_url: String,
    timeout_ms: u64,
    client: Client,
}

impl HttpResolutionClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SelectorError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn map_send_error(&self, operation: &str, err: reqwest::Error) -> SelectorError {
        if err.is_timeout() {
            SelectorError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl ResolutionService for HttpResolutionClient {
    async fn fetch_tree(&self) -> Result<DecisionTree> {
        let res = self
            .client
            .get(self.endpoint("tree"))
            .send()
            .await
            .map_err(|e| SelectorError::TreeLoad {
                message: self.map_send_error("fetch tree", e).to_string(),
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(SelectorError::TreeLoad {
                message: format!("tree endpoint returned {}: {}", status, text),
            });
        }

        let envelope: TreeEnvelope = res.json().await.map_err(|e| SelectorError::TreeLoad {
            message: format!("Failed to parse tree response: {}", e),
        })?;
        let tree = match envelope {
            TreeEnvelope {
                success: true,
                tree: Some(tree),
            } => tree,
            _ => {
                return Err(SelectorError::TreeLoad {
                    message: "Could not fetch the tree configuration.".to_string(),
                });
            }
        };
        tree.validate().map_err(|e| SelectorError::TreeLoad {
            message: e.to_string(),
        })?;

        info!(
            "Fetched tree {} ({} questions) from {}",
            tree.version,
            tree.questions.len(),
            self.base_url
        );
        Ok(tree)
    }

    async fn resolve(&self, answers: &Answers) -> Result<ResolutionResult> {
        debug!("Resolving {} answers", answers.len());
        let res = self
            .client
            .post(self.endpoint("resolve"))
            .json(&ResolveRequest { answers })
            .send()
            .await
            .map_err(|e| self.map_send_error("resolve", e))?;

        let status = res.status();
        let envelope: ResolveEnvelope = match res.json().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(SelectorError::Resolution {
                    message: format!("resolution service returned {}", status),
                });
            }
        };

        match envelope {
            ResolveEnvelope {
                success: true,
                result: Some(result),
                ..
            } if status.is_success() => Ok(result),
            ResolveEnvelope {
                error,
                missing_questions,
                ..
            } => {
                let mut message =
                    error.unwrap_or_else(|| "Could not determine a test.".to_string());
                if !missing_questions.is_empty() {
                    message.push_str(&format!(" (missing: {})", missing_questions.join(", ")));
                }
                Err(SelectorError::Resolution { message })
            }
        }
    }

    async fn reset(&self) -> Result<()> {
        let res = self
            .client
            .post(self.endpoint("reset"))
            .send()
            .await
            .map_err(|e| self.map_send_error("reset", e))?;
        if !res.status().is_success() {
            return Err(SelectorError::Transport {
                message: format!("reset endpoint returned {}", res.status()),
            });
        }
        Ok(())
    }
}
