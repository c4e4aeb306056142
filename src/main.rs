//! test-selector CLI
//!
//! Usage:
//!   test-selector serve [--bind 127.0.0.1:15006] [--tree tree_config.json]
//!   test-selector resolve --answer scope=one_variable --answer one_data_type=ordinal
//!   test-selector walk --answer scope=two_variables

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use test_selector::config::Config;
use test_selector::resolver::WizardSession;
use test_selector::rules::{self, ResolutionResult};
use test_selector::{DecisionTree, HttpResolutionClient, Step, Wizard};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "test-selector")]
#[command(about = "Which statistical test should I use? Wizard backend and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the resolution backend
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Tree document; defaults to the built-in tree
        #[arg(long)]
        tree: Option<PathBuf>,
    },
    /// Walk the wizard against a running backend with the given answers
    Resolve {
        #[arg(long)]
        base_url: Option<String>,
        /// Answer as question_id=value, applied in order
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
    /// Show the question path for the given answers without a backend
    Walk {
        #[arg(long)]
        tree: Option<PathBuf>,
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
}

fn parse_answer(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected question_id=value, got '{}'", raw))
}

fn load_tree(path: Option<&PathBuf>) -> Result<DecisionTree> {
    let tree = match path {
        Some(path) => DecisionTree::load(path)?,
        None => DecisionTree::builtin()?,
    };
    Ok(tree)
}

fn print_result(result: &ResolutionResult) {
    println!("Recommended test: {} (rule {})", result.test_primary, result.rule_id);
    if !result.example.is_empty() {
        println!("Example: {}", result.example);
    }
    if result.test_alternatives.is_empty() {
        println!("Alternatives: none for this path");
    }
    for alt in &result.test_alternatives {
        println!("Alternative: {}: {}", alt.condition, alt.test);
    }
    for assumption in &result.assumptions {
        println!("Assumption: {}", assumption);
    }
    for variant in &result.hypotheses.variants {
        println!("[{}] H0: {} | HA: {}", variant.tail, variant.h0, variant.ha);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { bind, tree } => {
            let tree = load_tree(tree.as_ref().or(config.server.tree_path.as_ref()))?;
            let bind = bind.unwrap_or(config.server.bind);
            info!("Starting test-selector backend");
            test_selector::server::start_http_server(
                tree,
                bind,
                Duration::from_millis(config.server.request_timeout_ms),
            )
            .await?;
        }
        Commands::Resolve { base_url, answers } => {
            let base_url = base_url.unwrap_or(config.client.base_url.clone());
            let client = HttpResolutionClient::new(&base_url, config.client.timeout_ms)?;
            let mut wizard = Wizard::load(client).await?;
            let mut step = wizard.advance().await;
            for (question_id, value) in &answers {
                step = wizard.select(question_id, value).await?;
            }
            for crumb in wizard.breadcrumbs() {
                println!("{}: {}", crumb.question_label, crumb.option_label);
            }
            match step {
                Step::Ask(question) => {
                    let options: Vec<&str> =
                        question.options.iter().map(|o| o.value.as_str()).collect();
                    println!("Next question [{}]: {}", question.id, question.label);
                    println!("Options: {}", options.join(", "));
                }
                Step::Resolved(result) => print_result(&result),
                Step::Failed(message) => anyhow::bail!("Resolution failed: {}", message),
                Step::Pending => println!("Resolution pending"),
                Step::NoQuestions => anyhow::bail!("The tree has no active questions"),
            }
        }
        Commands::Walk { tree, answers } => {
            let tree = Arc::new(load_tree(tree.as_ref().or(config.server.tree_path.as_ref()))?);
            let mut session = WizardSession::new(tree.clone());
            for (question_id, value) in &answers {
                session.record_answer(question_id, value)?;
            }
            let progress = session.progress();
            println!(
                "Progress: {}% ({}/{})",
                progress.percent, progress.answered, progress.total
            );
            for question in session.active() {
                let marker = match session.answers().get(&question.id) {
                    Some(value) => format!("= {}", question.option_label(value)),
                    None => "(unanswered)".to_string(),
                };
                println!("  {} {}", question.id, marker);
            }
            if session.is_complete() {
                match rules::resolve(&tree, session.answers()) {
                    Ok(result) => print_result(&result),
                    Err(rejection) => anyhow::bail!(rejection.message()),
                }
            } else if let Some(current) = session.current() {
                println!("Next question [{}]: {}", current.id, current.label);
            } else {
                println!("The tree has no active questions");
            }
        }
    }

    Ok(())
}
