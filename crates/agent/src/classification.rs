use std::sync::Arc;

use anyhow::Result;
use brewline_core::{AgentTag, ApplicationError, Message};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::oracle::{decide_as, DecisionOracle, DecisionSchema, OraclePrompt};
use crate::prompts::PromptLibrary;

pub const CLASSIFICATION_SCHEMA: &str = "classification_decision";

#[derive(Debug, Deserialize)]
struct ClassificationOutput {
    decision: String,
}

/// Chooses which agent answers the turn, from the full conversation.
pub struct Classifier {
    oracle: Arc<dyn DecisionOracle>,
    prompts: Arc<PromptLibrary>,
}

impl Classifier {
    pub fn new(oracle: Arc<dyn DecisionOracle>, prompts: Arc<PromptLibrary>) -> Self {
        Self { oracle, prompts }
    }

    pub fn schema() -> DecisionSchema {
        let tags = AgentTag::ALL.iter().map(AgentTag::as_str).collect::<Vec<_>>();
        DecisionSchema::object(
            CLASSIFICATION_SCHEMA,
            json!({
                "chain_of_thought": {"type": "string"},
                "decision": {"type": "string", "enum": tags},
                "message": {"type": "string"},
            }),
        )
    }

    /// A tag outside the known agents is a configuration defect, not a
    /// retryable oracle failure.
    pub async fn classify(&self, messages: &[Message]) -> Result<AgentTag> {
        let prompt = OraclePrompt::new(self.prompts.classifier()?, messages.to_vec());
        let output: ClassificationOutput =
            decide_as(self.oracle.as_ref(), &prompt, &Self::schema()).await?;

        let tag = output.decision.parse::<AgentTag>().map_err(|unknown| {
            error!(
                event_name = "classification.unknown_tag",
                decision = %output.decision,
                "classifier produced an unknown agent tag"
            );
            ApplicationError::ConfigurationDefect(unknown.to_string())
        })?;

        info!(event_name = "classification.decision", decision = %tag, "turn classified");
        Ok(tag)
    }
}
