use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::order::OrderSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn. Only assistant turns carry `memory`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<DecisionMemory>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), memory: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), memory: None }
    }

    pub fn assistant(content: impl Into<String>, memory: DecisionMemory) -> Self {
        Self { role: Role::Assistant, content: content.into(), memory: Some(memory) }
    }

    /// Assistant turn without memory, i.e. not produced by any agent.
    pub fn plain_assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), memory: None }
    }

    pub fn order_snapshot(&self) -> Option<&OrderSnapshot> {
        match (&self.role, &self.memory) {
            (Role::Assistant, Some(DecisionMemory::OrderTaking(snapshot))) => Some(snapshot),
            _ => None,
        }
    }
}

/// The three agents a classified turn can be dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentTag {
    #[serde(rename = "details_agent", alias = "details")]
    Details,
    #[serde(rename = "recommendation_agent", alias = "recommendation")]
    Recommendation,
    #[serde(rename = "order_taking_agent", alias = "order_taking")]
    OrderTaking,
}

impl AgentTag {
    pub const ALL: [AgentTag; 3] = [Self::Details, Self::Recommendation, Self::OrderTaking];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Details => "details_agent",
            Self::Recommendation => "recommendation_agent",
            Self::OrderTaking => "order_taking_agent",
        }
    }
}

impl fmt::Display for AgentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownAgentTag(pub String);

impl fmt::Display for UnknownAgentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown agent tag `{}`", self.0)
    }
}

impl FromStr for AgentTag {
    type Err = UnknownAgentTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "details_agent" | "details" => Ok(Self::Details),
            "recommendation_agent" | "recommendation" => Ok(Self::Recommendation),
            "order_taking_agent" | "order_taking" => Ok(Self::OrderTaking),
            other => Err(UnknownAgentTag(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardVerdict {
    #[serde(rename = "allowed", alias = "allow")]
    Allow,
    #[serde(rename = "not allowed", alias = "deny")]
    Deny,
}

impl GuardVerdict {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }
}

/// Per-turn decision state, keyed by the agent that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "agent")]
pub enum DecisionMemory {
    #[serde(rename = "guard")]
    Guard { decision: GuardVerdict },
    #[serde(rename = "classification")]
    Classification { decision: AgentTag },
    #[serde(rename = "details_agent", alias = "details")]
    Details,
    #[serde(rename = "recommendation_agent", alias = "recommendation")]
    Recommendation,
    #[serde(rename = "order_taking_agent", alias = "order_taking")]
    OrderTaking(OrderSnapshot),
}

impl DecisionMemory {
    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::Guard { .. } => "guard",
            Self::Classification { .. } => "classification",
            Self::Details => AgentTag::Details.as_str(),
            Self::Recommendation => AgentTag::Recommendation.as_str(),
            Self::OrderTaking(_) => AgentTag::OrderTaking.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{AgentTag, DecisionMemory, GuardVerdict, Message, Role};
    use crate::domain::order::{OrderLine, OrderSnapshot};

    #[test]
    fn memory_round_trips_with_agent_tag() {
        let memory = DecisionMemory::OrderTaking(OrderSnapshot {
            step_number: "2".to_string(),
            order: vec![OrderLine {
                item: "Latte".to_string(),
                quantity: 1,
                price: Decimal::new(475, 2),
            }],
            asked_recommendation_before: true,
        });

        let value = serde_json::to_value(&memory).expect("memory should serialize");
        assert_eq!(value["agent"], "order_taking_agent");
        assert_eq!(value["step_number"], "2");
        assert_eq!(value["order"][0]["price"], 4.75);
        assert_eq!(value["asked_recommendation_before"], true);
    }

    #[test]
    fn stateless_agents_still_carry_their_tag() {
        let value = serde_json::to_value(DecisionMemory::Details).expect("serialize");
        assert_eq!(value, json!({"agent": "details_agent"}));

        let value = serde_json::to_value(DecisionMemory::Recommendation).expect("serialize");
        assert_eq!(value, json!({"agent": "recommendation_agent"}));
    }

    #[test]
    fn guard_memory_uses_frontend_wording() {
        let value = serde_json::to_value(DecisionMemory::Guard { decision: GuardVerdict::Deny })
            .expect("serialize");
        assert_eq!(value, json!({"agent": "guard", "decision": "not allowed"}));
    }

    #[test]
    fn unknown_memory_tag_is_rejected() {
        let result =
            serde_json::from_value::<DecisionMemory>(json!({"agent": "billing_agent"}));
        assert!(result.is_err());
    }

    #[test]
    fn message_without_memory_omits_field() {
        let value = serde_json::to_value(Message::user("hi")).expect("serialize");
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let parsed: Message =
            serde_json::from_value(json!({"role": "assistant", "content": "hello"}))
                .expect("parse");
        assert_eq!(parsed.role, Role::Assistant);
        assert!(parsed.memory.is_none());
    }

    #[test]
    fn agent_tag_parsing_accepts_short_names_and_rejects_others() {
        assert_eq!("order_taking".parse::<AgentTag>(), Ok(AgentTag::OrderTaking));
        assert_eq!("details_agent".parse::<AgentTag>(), Ok(AgentTag::Details));
        assert!("billing_agent".parse::<AgentTag>().is_err());
    }
}
