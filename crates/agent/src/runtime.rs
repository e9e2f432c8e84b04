use std::sync::Arc;

use anyhow::Result;
use brewline_core::{AgentTag, ApplicationError, Message};
use futures::StreamExt;
use tracing::{error, info};

use crate::agents::{Agent, AgentRegistry, EventStream, StreamEvent};
use crate::classification::Classifier;
use crate::conversation::validate_conversation;
use crate::guardrails::{GuardAgent, GuardrailDecision};

/// Routes each turn: guard, then classifier, then the chosen agent. Holds
/// nothing mutable after construction.
pub struct AgentRuntime {
    guard: GuardAgent,
    classifier: Classifier,
    registry: AgentRegistry,
}

impl AgentRuntime {
    pub fn new(guard: GuardAgent, classifier: Classifier, registry: AgentRegistry) -> Self {
        Self { guard, classifier, registry }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub async fn handle(&self, messages: &[Message]) -> Result<Message> {
        validate_conversation(messages)?;

        let decision = self.guard.evaluate(messages).await?;
        if let GuardrailDecision::Deny { .. } = decision {
            info!(event_name = "runtime.guard_denied", "turn refused by guard");
            return Ok(decision.into_message());
        }

        let agent = self.route(messages).await?;
        let reply = agent.respond(messages).await?;
        info!(
            event_name = "runtime.reply",
            agent = %agent.tag(),
            memory = reply.memory.as_ref().map(|memory| memory.agent_name()).unwrap_or("none"),
            "turn answered"
        );
        Ok(reply)
    }

    /// Streaming counterpart of [`AgentRuntime::handle`]. A guard denial is
    /// emitted as one token followed by the guard memory.
    pub fn handle_stream(self: Arc<Self>, messages: Vec<Message>) -> EventStream {
        Box::pin(async_stream::try_stream! {
            validate_conversation(&messages)?;

            let decision = self.guard.evaluate(&messages).await?;
            if let GuardrailDecision::Deny { .. } = decision {
                info!(event_name = "runtime.guard_denied", streaming = true, "turn refused by guard");
                let reply = decision.into_message();
                yield StreamEvent::Token(reply.content);
                if let Some(memory) = reply.memory {
                    yield StreamEvent::Memory(memory);
                }
                return;
            }

            let agent = self.route(&messages).await?;
            let mut events = agent.stream_respond(messages);
            while let Some(event) = events.next().await {
                yield event?;
            }
        })
    }

    async fn route(&self, messages: &[Message]) -> Result<Arc<dyn Agent>> {
        let tag = self.classifier.classify(messages).await?;
        self.agent_for(tag)
    }

    fn agent_for(&self, tag: AgentTag) -> Result<Arc<dyn Agent>> {
        let agent = self.registry.get(tag).ok_or_else(|| {
            error!(event_name = "runtime.unregistered_agent", agent = %tag, "no agent registered");
            ApplicationError::ConfigurationDefect(format!("no agent registered for `{tag}`"))
        })?;
        info!(event_name = "runtime.dispatch", agent = %tag, "dispatching turn");
        Ok(agent)
    }
}
