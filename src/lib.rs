pub mod client;
pub mod config;
pub mod error;
pub mod resolver;
pub mod rules;
pub mod server;
pub mod tree;
pub mod wizard;

pub use client::{HttpResolutionClient, ResolutionService};
pub use error::{Result, SelectorError};
pub use resolver::WizardSession;
pub use tree::{Answers, Constraint, DecisionTree, Question, QuestionOption};
pub use wizard::{Step, Wizard};
