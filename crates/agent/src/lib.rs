//! Agent runtime for the coffee-shop assistant.
//!
//! Every chat turn runs through a constrained loop:
//! 1. **Guard** (`guardrails`) - admit or refuse the latest user message
//! 2. **Classification** (`classification`) - pick the agent for the turn
//! 3. **Dispatch** (`agents`) - details, recommendation or order-taking
//!
//! Per-turn state travels on the assistant messages themselves as
//! [`brewline_core::DecisionMemory`]; `conversation` recovers it from history.
//!
//! The language model is reached only through [`oracle::DecisionOracle`]. It
//! phrases replies and extracts structure, but rankings come from the
//! deterministic [`brewline_core::RecommendationEngine`].

pub mod agents;
pub mod classification;
pub mod conversation;
pub mod guardrails;
pub mod oracle;
pub mod prompts;
pub mod retriever;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agents::{Agent, AgentRegistry, EventStream, StreamEvent};
pub use oracle::{DecisionOracle, DecisionSchema, OpenAiOracle, OraclePrompt, TokenStream};
pub use retriever::{KnowledgeRetriever, PineconeRetriever, RetrievedChunk, StaticRetriever};
pub use runtime::AgentRuntime;
