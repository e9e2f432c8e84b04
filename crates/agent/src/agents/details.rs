use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use brewline_core::{AgentTag, DecisionMemory, Message};
use futures::StreamExt;
use tracing::debug;

use super::{Agent, EventStream, StreamEvent};
use crate::conversation::{latest_content, with_latest_content};
use crate::oracle::{DecisionOracle, OraclePrompt};
use crate::prompts::PromptLibrary;
use crate::retriever::KnowledgeRetriever;

pub const DEFAULT_TOP_K: usize = 5;

/// Answers shop and menu questions from retrieved knowledge.
pub struct DetailsAgent {
    oracle: Arc<dyn DecisionOracle>,
    retriever: Arc<dyn KnowledgeRetriever>,
    prompts: Arc<PromptLibrary>,
    top_k: usize,
}

impl DetailsAgent {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        retriever: Arc<dyn KnowledgeRetriever>,
        prompts: Arc<PromptLibrary>,
    ) -> Self {
        Self { oracle, retriever, prompts, top_k: DEFAULT_TOP_K }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    async fn prompt(&self, messages: &[Message]) -> Result<OraclePrompt> {
        let question = latest_content(messages);
        let chunks = self.retriever.search(question, self.top_k).await?;
        debug!(event_name = "details.context", chunk_count = chunks.len(), "knowledge retrieved");

        let context = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>().join("\n");
        let system = self.prompts.details(&context, question)?;

        // The opening greeting adds nothing to a factual answer.
        let mut window = with_latest_content(messages, system.clone());
        if window.len() > 1 {
            window.remove(0);
        }
        Ok(OraclePrompt::new(system, window))
    }
}

#[async_trait]
impl Agent for DetailsAgent {
    fn tag(&self) -> AgentTag {
        AgentTag::Details
    }

    async fn respond(&self, messages: &[Message]) -> Result<Message> {
        let prompt = self.prompt(messages).await?;
        let answer = self.oracle.complete(&prompt).await?;
        Ok(Message::assistant(answer, DecisionMemory::Details))
    }

    fn stream_respond(self: Arc<Self>, messages: Vec<Message>) -> EventStream {
        Box::pin(async_stream::try_stream! {
            let prompt = self.prompt(&messages).await?;
            let mut tokens = self.oracle.complete_stream(prompt);
            while let Some(token) = tokens.next().await {
                yield StreamEvent::Token(token?);
            }
            yield StreamEvent::Memory(DecisionMemory::Details);
        })
    }
}
