//! Deterministic oracle double for exercising the runtime without a model.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::{oracle_error, DecisionOracle, DecisionSchema, OraclePrompt, TokenStream};

#[derive(Clone, Debug, PartialEq)]
pub enum OracleCall {
    Decide { schema: String, prompt: OraclePrompt },
    Complete { prompt: OraclePrompt },
    Stream { prompt: OraclePrompt },
}

impl OracleCall {
    pub fn prompt(&self) -> &OraclePrompt {
        match self {
            Self::Decide { prompt, .. } | Self::Complete { prompt } | Self::Stream { prompt } => {
                prompt
            }
        }
    }
}

/// Replays queued answers. Decisions are queued per schema name; free-text
/// and streamed completions share one queue. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    decisions: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    completions: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<OracleCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_decision(&self, schema: &str, value: Value) {
        lock(&self.decisions).entry(schema.to_string()).or_default().push_back(Ok(value));
    }

    pub fn push_decision_failure(&self, schema: &str, message: &str) {
        lock(&self.decisions)
            .entry(schema.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn push_completion(&self, text: &str) {
        lock(&self.completions).push_back(Ok(text.to_string()));
    }

    pub fn push_completion_failure(&self, message: &str) {
        lock(&self.completions).push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        lock(&self.calls).clone()
    }

    pub fn last_prompt(&self) -> Option<OraclePrompt> {
        lock(&self.calls).last().map(|call| call.prompt().clone())
    }

    pub fn decision_calls(&self, schema: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, OracleCall::Decide { schema: name, .. } if name == schema))
            .count()
    }

    pub fn completion_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, OracleCall::Complete { .. } | OracleCall::Stream { .. }))
            .count()
    }

    fn next_completion(&self) -> Result<String> {
        match lock(&self.completions).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(oracle_error(message)),
            None => Err(oracle_error("no scripted completion left")),
        }
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, prompt: &OraclePrompt, schema: &DecisionSchema) -> Result<Value> {
        lock(&self.calls)
            .push(OracleCall::Decide { schema: schema.name.to_string(), prompt: prompt.clone() });

        let next = lock(&self.decisions).get_mut(schema.name).and_then(VecDeque::pop_front);
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(oracle_error(message)),
            None => Err(oracle_error(format!("no scripted decision for `{}`", schema.name))),
        }
    }

    async fn complete(&self, prompt: &OraclePrompt) -> Result<String> {
        lock(&self.calls).push(OracleCall::Complete { prompt: prompt.clone() });
        self.next_completion()
    }

    /// Splits the scripted text into word-sized tokens.
    fn complete_stream(&self, prompt: OraclePrompt) -> TokenStream {
        lock(&self.calls).push(OracleCall::Stream { prompt });
        let tokens = match self.next_completion() {
            Ok(text) => text.split_inclusive(' ').map(|token| Ok(token.to_string())).collect(),
            Err(error) => vec![Err(error)],
        };
        Box::pin(futures::stream::iter(tokens))
    }
}
