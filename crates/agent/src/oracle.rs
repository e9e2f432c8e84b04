use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use brewline_core::config::LlmConfig;
use brewline_core::{ApplicationError, Message, Role};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// System prompt plus the message window an oracle call sees.
#[derive(Clone, Debug, PartialEq)]
pub struct OraclePrompt {
    pub system: String,
    pub messages: Vec<Message>,
}

impl OraclePrompt {
    pub fn new(system: impl Into<String>, messages: Vec<Message>) -> Self {
        Self { system: system.into(), messages }
    }
}

/// Named JSON schema the oracle's structured output must satisfy.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionSchema {
    pub name: &'static str,
    pub schema: Value,
}

impl DecisionSchema {
    /// Object schema with every listed property required and nothing else allowed.
    pub fn object(name: &'static str, properties: Value) -> Self {
        let required = properties
            .as_object()
            .map(|fields| fields.keys().cloned().map(Value::String).collect::<Vec<_>>())
            .unwrap_or_default();
        Self {
            name,
            schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            }),
        }
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, prompt: &OraclePrompt, schema: &DecisionSchema) -> Result<Value>;
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String>;
    fn complete_stream(&self, prompt: OraclePrompt) -> TokenStream;
}

/// Structured decision deserialized into `T`. Output that does not fit is an
/// oracle failure.
pub async fn decide_as<T: DeserializeOwned>(
    oracle: &dyn DecisionOracle,
    prompt: &OraclePrompt,
    schema: &DecisionSchema,
) -> Result<T> {
    let value = oracle.decide(prompt, schema).await?;
    serde_json::from_value(value).map_err(|err| {
        oracle_error(format!("`{}` decision did not match its schema: {err}", schema.name))
    })
}

pub(crate) fn oracle_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ApplicationError::Oracle(message.into()))
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenAI, Ollama).
#[derive(Clone)]
pub struct OpenAiOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiOracle {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        Self::new(base_url, config.model.clone(), config.api_key.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, body: &ChatRequest) -> reqwest::RequestBuilder {
        let builder = self.client.post(format!("{}/chat/completions", self.base_url)).json(body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    async fn chat(&self, body: ChatRequest) -> Result<String> {
        debug!(
            event_name = "oracle.request",
            model = %self.model,
            message_count = body.messages.len(),
            structured = body.response_format.is_some(),
            "sending chat completion request"
        );

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|err| oracle_error(format!("chat completion request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(oracle_error(format!("chat completion returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| oracle_error(format!("malformed chat completion response: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| oracle_error("chat completion response had no content"))
    }
}

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn decide(&self, prompt: &OraclePrompt, schema: &DecisionSchema) -> Result<Value> {
        let body = ChatRequest::new(&self.model, prompt).with_schema(schema);
        let content = self.chat(body).await?;
        serde_json::from_str(&content).map_err(|err| {
            oracle_error(format!("`{}` decision was not valid JSON: {err}", schema.name))
        })
    }

    async fn complete(&self, prompt: &OraclePrompt) -> Result<String> {
        self.chat(ChatRequest::new(&self.model, prompt)).await
    }

    fn complete_stream(&self, prompt: OraclePrompt) -> TokenStream {
        let mut body = ChatRequest::new(&self.model, &prompt);
        body.stream = true;
        let request = self.request(&body);

        Box::pin(async_stream::try_stream! {
            let response = request
                .send()
                .await
                .map_err(|err| oracle_error(format!("streaming request failed: {err}")))?;

            ensure_success(response.status())?;

            let mut tokens = sse_tokens(response.bytes_stream());
            while let Some(token) = tokens.next().await {
                yield token?;
            }
        })
    }
}

fn ensure_success(status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(oracle_error(format!("streaming completion returned {status}")))
    }
}

/// Decode an OpenAI-style server-sent event body into content tokens. The
/// body must close with `[DONE]`; anything else is an oracle failure.
fn sse_tokens<S, B, E>(body: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut events = Box::pin(body.eventsource());
        let mut finished = false;

        while let Some(event) = events.next().await {
            let event = event.map_err(|err| oracle_error(format!("stream interrupted: {err}")))?;
            match parse_stream_data(&event.data)? {
                StreamData::Token(token) => {
                    yield token;
                }
                StreamData::Done => {
                    finished = true;
                    break;
                }
                StreamData::Empty => {}
            }
        }

        if !finished {
            Err::<(), _>(oracle_error("stream ended before [DONE]"))?;
        }
    })
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamData {
    Token(String),
    Done,
    /// Role-only or empty delta.
    Empty,
}

/// Interpret the data field of one streamed completion event.
pub(crate) fn parse_stream_data(data: &str) -> Result<StreamData> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamData::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|err| oracle_error(format!("malformed stream chunk: {err}")))?;
    if let Some(error) = chunk.error {
        return Err(oracle_error(format!("stream reported an error: {}", error.message)));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(StreamData::Token)
        .unwrap_or(StreamData::Empty))
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl ChatRequest {
    fn new(model: &str, prompt: &OraclePrompt) -> Self {
        let mut messages = Vec::with_capacity(prompt.messages.len() + 1);
        messages.push(WireMessage { role: Role::System, content: prompt.system.clone() });
        messages.extend(
            prompt
                .messages
                .iter()
                .map(|message| WireMessage { role: message.role, content: message.content.clone() }),
        );
        Self { model: model.to_string(), messages, response_format: None, stream: false }
    }

    fn with_schema(mut self, schema: &DecisionSchema) -> Self {
        self.response_format = Some(json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": true,
            }
        }));
        self
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
