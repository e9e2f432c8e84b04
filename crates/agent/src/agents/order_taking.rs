use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use brewline_core::{AgentTag, DecisionMemory, Message, OrderLine, OrderSnapshot};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{Agent, RecommendationAgent};
use crate::conversation::{last_order_state, latest_content, with_latest_content};
use crate::oracle::{decide_as, DecisionOracle, DecisionSchema, OraclePrompt};
use crate::prompts::PromptLibrary;

pub const ORDER_TAKING_SCHEMA: &str = "order_taking_decision";
pub const RECOMMENDATION_BRIDGE: &str = "\nHere's my recommendation based on your order:\n";

#[derive(Debug, Deserialize)]
struct OrderTakingOutput {
    step_number: String,
    #[serde(default)]
    order: Vec<OrderLine>,
    response: String,
}

/// Walks the customer through the order, carrying state between turns in
/// its memory. The first non-empty order triggers one follow-up
/// recommendation.
pub struct OrderTakingAgent {
    oracle: Arc<dyn DecisionOracle>,
    prompts: Arc<PromptLibrary>,
    recommendations: Arc<RecommendationAgent>,
}

impl OrderTakingAgent {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        prompts: Arc<PromptLibrary>,
        recommendations: Arc<RecommendationAgent>,
    ) -> Self {
        Self { oracle, prompts, recommendations }
    }

    pub fn schema() -> DecisionSchema {
        DecisionSchema::object(
            ORDER_TAKING_SCHEMA,
            json!({
                "chain_of_thought": {"type": "string"},
                "step_number": {"type": "string"},
                "order": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "item": {"type": "string"},
                            "quantity": {"type": "integer"},
                            "price": {"type": "number"},
                        },
                        "required": ["item", "quantity", "price"],
                        "additionalProperties": false,
                    },
                },
                "response": {"type": "string"},
            }),
        )
    }
}

#[async_trait]
impl Agent for OrderTakingAgent {
    fn tag(&self) -> AgentTag {
        AgentTag::OrderTaking
    }

    async fn respond(&self, messages: &[Message]) -> Result<Message> {
        let prior = last_order_state(messages);
        let mut asked_recommendation_before =
            prior.map(|state| state.asked_recommendation_before).unwrap_or(false);

        let window = match prior {
            Some(state) => {
                let preamble = self.prompts.order_preamble(state)?;
                with_latest_content(messages, format!("{preamble}\n{}", latest_content(messages)))
            }
            None => messages.to_vec(),
        };

        let prompt = OraclePrompt::new(self.prompts.order_taking()?, window);
        let output: OrderTakingOutput =
            decide_as(self.oracle.as_ref(), &prompt, &Self::schema()).await?;

        let mut response = output.response;
        if !asked_recommendation_before && !output.order.is_empty() {
            let follow_up =
                self.recommendations.recommend_for_order(&prompt.messages, &output.order).await?;
            response.push_str(RECOMMENDATION_BRIDGE);
            response.push_str(&follow_up.content);
            asked_recommendation_before = true;
        }

        let snapshot = OrderSnapshot {
            step_number: output.step_number,
            order: output.order,
            asked_recommendation_before,
        };
        info!(
            event_name = "order_taking.step",
            step_number = %snapshot.step_number,
            order_lines = snapshot.order.len(),
            order_total = %snapshot.total(),
            resumed = prior.is_some(),
            asked_recommendation_before,
            "order state updated"
        );

        Ok(Message::assistant(response, DecisionMemory::OrderTaking(snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use brewline_core::{
        AffinityRecord, AffinityTable, ApplicationError, DecisionMemory, Message, OrderLine,
        OrderSnapshot, PopularityTable, RecommendationEngine,
    };
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{OrderTakingAgent, ORDER_TAKING_SCHEMA, RECOMMENDATION_BRIDGE};
    use crate::agents::{Agent, RecommendationAgent};
    use crate::prompts::PromptLibrary;
    use crate::testing::{OracleCall, ScriptedOracle};

    fn agent(oracle: Arc<ScriptedOracle>) -> OrderTakingAgent {
        let mut rules = BTreeMap::new();
        rules.insert(
            "Latte".to_string(),
            vec![AffinityRecord {
                product: "Croissant".to_string(),
                product_category: "Bakery".to_string(),
                confidence: 0.7,
            }],
        );
        let engine = RecommendationEngine::new(
            AffinityTable::from_map(rules).expect("rules"),
            PopularityTable::default(),
        );
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        let recommendations =
            Arc::new(RecommendationAgent::new(oracle.clone(), prompts.clone(), Arc::new(engine)));
        OrderTakingAgent::new(oracle, prompts, recommendations)
    }

    fn latte_decision(step: &str) -> serde_json::Value {
        json!({
            "chain_of_thought": "",
            "step_number": step,
            "order": [{"item": "Latte", "quantity": 1, "price": 4.75}],
            "response": "One latte. Anything else?"
        })
    }

    #[tokio::test]
    async fn first_order_appends_one_recommendation() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision(ORDER_TAKING_SCHEMA, latte_decision("1"));
        oracle.push_completion("- Croissant");

        let reply =
            agent(oracle.clone()).respond(&[Message::user("a latte please")]).await.expect("runs");

        assert_eq!(
            reply.content,
            format!("One latte. Anything else?{RECOMMENDATION_BRIDGE}- Croissant")
        );
        let snapshot = reply.order_snapshot().expect("order memory");
        assert!(snapshot.asked_recommendation_before);
        assert_eq!(snapshot.total(), Decimal::new(475, 2));
    }

    #[tokio::test]
    async fn empty_order_does_not_recommend() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision(
            ORDER_TAKING_SCHEMA,
            json!({
                "chain_of_thought": "",
                "step_number": "1",
                "order": [],
                "response": "What would you like?"
            }),
        );

        let reply =
            agent(oracle.clone()).respond(&[Message::user("I want to order")]).await.expect("runs");
        assert_eq!(reply.content, "What would you like?");
        assert_eq!(reply.order_snapshot().map(|s| s.asked_recommendation_before), Some(false));
        assert_eq!(oracle.completion_calls(), 0);
    }

    #[tokio::test]
    async fn resumed_order_carries_flag_and_preamble() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision(ORDER_TAKING_SCHEMA, latte_decision("3"));

        let prior = OrderSnapshot {
            step_number: "2".to_string(),
            order: vec![OrderLine {
                item: "Latte".to_string(),
                quantity: 1,
                price: Decimal::new(475, 2),
            }],
            asked_recommendation_before: true,
        };
        let messages = vec![
            Message::user("a latte"),
            Message::assistant("Anything else?", DecisionMemory::OrderTaking(prior)),
            Message::user("where is the shop?"),
            Message::assistant("Main street", DecisionMemory::Details),
            Message::user("that's all"),
        ];

        let reply = agent(oracle.clone()).respond(&messages).await.expect("runs");
        assert_eq!(reply.content, "One latte. Anything else?");
        assert_eq!(reply.order_snapshot().map(|s| s.asked_recommendation_before), Some(true));
        assert_eq!(oracle.completion_calls(), 0);

        match oracle.calls().as_slice() {
            [OracleCall::Decide { prompt, .. }] => {
                let latest = &prompt.messages[4].content;
                assert!(latest.starts_with("step number: 2"));
                assert!(latest.ends_with("\nthat's all"));
            }
            other => panic!("unexpected calls {other:?}"),
        }
    }

    #[tokio::test]
    async fn order_decision_failure_surfaces_as_oracle_error() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision_failure(ORDER_TAKING_SCHEMA, "rate limited");

        let error = agent(oracle.clone())
            .respond(&[Message::user("a latte please")])
            .await
            .expect_err("decision failure must surface");
        assert!(matches!(
            error.downcast_ref::<ApplicationError>(),
            Some(ApplicationError::Oracle(message)) if message == "rate limited"
        ));
        assert_eq!(oracle.completion_calls(), 0);
    }

    #[tokio::test]
    async fn follow_up_recommendation_failure_fails_the_turn() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision(ORDER_TAKING_SCHEMA, latte_decision("1"));
        oracle.push_completion_failure("presentation timed out");

        let error = agent(oracle.clone())
            .respond(&[Message::user("a latte please")])
            .await
            .expect_err("presentation failure must surface");
        assert!(matches!(
            error.downcast_ref::<ApplicationError>(),
            Some(ApplicationError::Oracle(message)) if message == "presentation timed out"
        ));
        assert_eq!(oracle.completion_calls(), 1);
    }
}
