use std::sync::Arc;

use anyhow::Result;
use brewline_core::{DecisionMemory, GuardVerdict, Message};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::oracle::{decide_as, DecisionOracle, DecisionSchema, OraclePrompt};
use crate::prompts::PromptLibrary;

pub const GUARD_SCHEMA: &str = "guard_decision";

const FALLBACK_REFUSAL: &str =
    "Sorry, I can only help with Version Coffee's menu, orders and recommendations.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { user_message: String },
}

impl GuardrailDecision {
    pub fn verdict(&self) -> GuardVerdict {
        match self {
            Self::Allow => GuardVerdict::Allow,
            Self::Deny { .. } => GuardVerdict::Deny,
        }
    }

    /// The assistant turn shown to the user, tagged with guard memory.
    pub fn into_message(self) -> Message {
        let decision = self.verdict();
        let content = match self {
            Self::Allow => String::new(),
            Self::Deny { user_message } => user_message,
        };
        Message::assistant(content, DecisionMemory::Guard { decision })
    }
}

#[derive(Debug, Deserialize)]
struct GuardOutput {
    decision: GuardVerdict,
    #[serde(default)]
    message: String,
}

pub struct GuardAgent {
    oracle: Arc<dyn DecisionOracle>,
    prompts: Arc<PromptLibrary>,
}

impl GuardAgent {
    pub fn new(oracle: Arc<dyn DecisionOracle>, prompts: Arc<PromptLibrary>) -> Self {
        Self { oracle, prompts }
    }

    pub fn schema() -> DecisionSchema {
        DecisionSchema::object(
            GUARD_SCHEMA,
            json!({
                "chain_of_thought": {"type": "string"},
                "decision": {"type": "string", "enum": ["allowed", "not allowed"]},
                "message": {"type": "string"},
            }),
        )
    }

    /// Judge only the latest message.
    pub async fn evaluate(&self, messages: &[Message]) -> Result<GuardrailDecision> {
        let latest = messages.last().map(|message| Message::user(message.content.clone()));
        let prompt = OraclePrompt::new(self.prompts.guard()?, latest.into_iter().collect());
        let output: GuardOutput = decide_as(self.oracle.as_ref(), &prompt, &Self::schema()).await?;

        info!(
            event_name = "guard.decision",
            decision = ?output.decision,
            "guard evaluated latest message"
        );

        Ok(match output.decision {
            GuardVerdict::Allow => GuardrailDecision::Allow,
            GuardVerdict::Deny => {
                let user_message = if output.message.trim().is_empty() {
                    FALLBACK_REFUSAL.to_string()
                } else {
                    output.message
                };
                GuardrailDecision::Deny { user_message }
            }
        })
    }
}
