//! The three agents a classified turn can be dispatched to.

pub mod details;
pub mod order_taking;
pub mod recommendation;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use brewline_core::{AgentTag, DecisionMemory, Message};
use futures::Stream;
use serde::{Deserialize, Serialize};

pub use details::DetailsAgent;
pub use order_taking::OrderTakingAgent;
pub use recommendation::RecommendationAgent;

/// Incremental reply: text fragments, then exactly one terminal memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    Token(String),
    Memory(DecisionMemory),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn tag(&self) -> AgentTag;

    /// Full reply for the conversation, tagged with this agent's memory.
    async fn respond(&self, messages: &[Message]) -> Result<Message>;

    /// Streaming variant. Agents that cannot stream emit their whole reply
    /// as a single token.
    fn stream_respond(self: Arc<Self>, messages: Vec<Message>) -> EventStream {
        Box::pin(async_stream::try_stream! {
            let reply = self.respond(&messages).await?;
            yield StreamEvent::Token(reply.content);
            if let Some(memory) = reply.memory {
                yield StreamEvent::Memory(memory);
            }
        })
    }
}

/// Static tag → agent table, built once at composition.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentTag, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.tag(), agent);
    }

    pub fn get(&self, tag: AgentTag) -> Option<Arc<dyn Agent>> {
        self.agents.get(&tag).cloned()
    }

    pub fn tags(&self) -> Vec<AgentTag> {
        let mut tags = self.agents.keys().copied().collect::<Vec<_>>();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use brewline_core::{AgentTag, DecisionMemory, Message};
    use futures::StreamExt;
    use serde_json::json;

    use super::{Agent, AgentRegistry, StreamEvent};

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn tag(&self) -> AgentTag {
            AgentTag::Details
        }

        async fn respond(&self, messages: &[Message]) -> Result<Message> {
            let content = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Message::assistant(content, DecisionMemory::Details))
        }
    }

    #[test]
    fn stream_events_use_type_and_content_fields() {
        let token = serde_json::to_value(StreamEvent::Token("Hi".to_string())).expect("token");
        assert_eq!(token, json!({"type": "token", "content": "Hi"}));

        let memory =
            serde_json::to_value(StreamEvent::Memory(DecisionMemory::Recommendation)).expect("memory");
        assert_eq!(memory, json!({"type": "memory", "content": {"agent": "recommendation_agent"}}));
    }

    #[test]
    fn registry_is_keyed_by_agent_tag() {
        let mut registry = AgentRegistry::default();
        assert!(registry.is_empty());

        registry.register(Arc::new(EchoAgent));
        registry.register(Arc::new(EchoAgent));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tags(), vec![AgentTag::Details]);
        assert!(registry.get(AgentTag::Details).is_some());
        assert!(registry.get(AgentTag::OrderTaking).is_none());
    }

    #[tokio::test]
    async fn default_stream_wraps_the_full_reply() {
        let agent: Arc<dyn Agent> = Arc::new(EchoAgent);
        let events = agent
            .stream_respond(vec![Message::user("hello")])
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .expect("stream should succeed");

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("hello".to_string()),
                StreamEvent::Memory(DecisionMemory::Details),
            ]
        );
    }
}
