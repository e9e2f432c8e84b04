use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use brewline_core::recommendations::DEFAULT_MAX_RECOMMENDATIONS;
use brewline_core::{
    AgentTag, DecisionMemory, Message, OrderLine, RecommendationEngine, RecommendationPlan,
};
use futures::StreamExt;
use serde_json::json;
use tracing::info;

use super::{Agent, EventStream, StreamEvent};
use crate::conversation::{latest_content, tail, with_latest_content};
use crate::oracle::{decide_as, DecisionOracle, DecisionSchema, OraclePrompt};
use crate::prompts::PromptLibrary;

pub const RECOMMENDATION_SCHEMA: &str = "recommendation_classification";
pub const NO_RECOMMENDATIONS: &str = "Sorry, I couldn't find any recommendations for you.";
pub const NO_ORDER_RECOMMENDATIONS: &str =
    "Based on your order, I don't have specific recommendations at the moment.";

/// Messages the recommendation classifier and presenter see.
const WINDOW: usize = 3;

/// Wraps the deterministic engine: the oracle picks the query and phrases
/// the result, the engine picks the products.
pub struct RecommendationAgent {
    oracle: Arc<dyn DecisionOracle>,
    prompts: Arc<PromptLibrary>,
    engine: Arc<RecommendationEngine>,
}

impl RecommendationAgent {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        prompts: Arc<PromptLibrary>,
        engine: Arc<RecommendationEngine>,
    ) -> Self {
        Self { oracle, prompts, engine }
    }

    pub fn schema() -> DecisionSchema {
        DecisionSchema::object(
            RECOMMENDATION_SCHEMA,
            json!({
                "chain_of_thought": {"type": "string"},
                "recommendation_type": {
                    "type": "string",
                    "enum": ["apriori", "popular", "popular by category"],
                },
                "parameters": {"type": "array", "items": {"type": "string"}},
            }),
        )
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub async fn classify(&self, messages: &[Message]) -> Result<RecommendationPlan> {
        let system = self.prompts.recommendation_classification(&self.engine)?;
        let prompt = OraclePrompt::new(system, tail(messages, WINDOW).to_vec());
        let plan: RecommendationPlan =
            decide_as(self.oracle.as_ref(), &prompt, &Self::schema()).await?;

        info!(
            event_name = "recommendation.plan",
            recommendation_type = plan.kind.as_str(),
            parameter_count = plan.parameters.len(),
            "recommendation request classified"
        );
        Ok(plan)
    }

    /// Classified products for the conversation, possibly none.
    async fn select(&self, messages: &[Message]) -> Result<Vec<String>> {
        let plan = self.classify(messages).await?;
        Ok(self.engine.execute(&plan, DEFAULT_MAX_RECOMMENDATIONS))
    }

    fn presentation(
        &self,
        system: String,
        messages: &[Message],
        items: &[String],
    ) -> Result<OraclePrompt> {
        let request = self.prompts.recommendation_request(latest_content(messages), items)?;
        let window = with_latest_content(messages, request);
        Ok(OraclePrompt::new(system, tail(&window, WINDOW).to_vec()))
    }

    /// Terse follow-up list for an order that was just taken.
    pub async fn recommend_for_order(
        &self,
        messages: &[Message],
        order: &[OrderLine],
    ) -> Result<Message> {
        let products = order.iter().map(|line| line.item.as_str()).collect::<Vec<_>>();
        let items = self.engine.apriori(&products, DEFAULT_MAX_RECOMMENDATIONS);

        info!(
            event_name = "recommendation.order",
            order_lines = order.len(),
            recommended = items.len(),
            "order follow-up recommendations computed"
        );

        if items.is_empty() {
            return Ok(Message::assistant(NO_ORDER_RECOMMENDATIONS, DecisionMemory::Recommendation));
        }

        let prompt = self.presentation(self.prompts.order_recommendation()?, messages, &items)?;
        let text = self.oracle.complete(&prompt).await?;
        Ok(Message::assistant(text, DecisionMemory::Recommendation))
    }
}

#[async_trait]
impl Agent for RecommendationAgent {
    fn tag(&self) -> AgentTag {
        AgentTag::Recommendation
    }

    async fn respond(&self, messages: &[Message]) -> Result<Message> {
        let items = self.select(messages).await?;
        if items.is_empty() {
            return Ok(Message::assistant(NO_RECOMMENDATIONS, DecisionMemory::Recommendation));
        }

        let prompt =
            self.presentation(self.prompts.recommendation_presentation()?, messages, &items)?;
        let text = self.oracle.complete(&prompt).await?;
        Ok(Message::assistant(text, DecisionMemory::Recommendation))
    }

    fn stream_respond(self: Arc<Self>, messages: Vec<Message>) -> EventStream {
        Box::pin(async_stream::try_stream! {
            let items = self.select(&messages).await?;
            if items.is_empty() {
                yield StreamEvent::Token(NO_RECOMMENDATIONS.to_string());
            } else {
                let system = self.prompts.recommendation_presentation()?;
                let prompt = self.presentation(system, &messages, &items)?;
                let mut tokens = self.oracle.complete_stream(prompt);
                while let Some(token) = tokens.next().await {
                    yield StreamEvent::Token(token?);
                }
            }
            yield StreamEvent::Memory(DecisionMemory::Recommendation);
        })
    }
}
