use anyhow::Result;
use async_trait::async_trait;
use brewline_core::config::{LlmConfig, RetrieverConfig};
use brewline_core::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::oracle::oracle_error;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// One passage returned by a knowledge search.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Embeds the query through the embeddings endpoint, then queries a
/// Pinecone index namespace for the nearest chunks.
pub struct PineconeRetriever {
    client: reqwest::Client,
    embeddings_url: String,
    embeddings_key: Option<SecretString>,
    embedding_model: String,
    index_host: String,
    api_key: SecretString,
    namespace: String,
}

impl PineconeRetriever {
    pub fn from_config(llm: &LlmConfig, retriever: &RetrieverConfig) -> Result<Self> {
        let api_key = retriever.api_key.clone().ok_or_else(|| {
            ApplicationError::ConfigurationDefect("retriever.api_key is not set".to_string())
        })?;
        let index_host = retriever.index_host.clone().ok_or_else(|| {
            ApplicationError::ConfigurationDefect("retriever.index_host is not set".to_string())
        })?;
        let base_url = llm.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            embeddings_url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            embeddings_key: llm.api_key.clone(),
            embedding_model: retriever.embedding_model.clone(),
            index_host: index_host.trim_end_matches('/').to_string(),
            api_key,
            namespace: retriever.namespace.clone(),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self
            .client
            .post(&self.embeddings_url)
            .json(&EmbeddingRequest { model: &self.embedding_model, input: text });
        if let Some(key) = &self.embeddings_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response =
            request.send().await.map_err(|err| oracle_error(format!("embedding failed: {err}")))?;
        if !response.status().is_success() {
            return Err(oracle_error(format!("embedding returned {}", response.status())));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| oracle_error(format!("malformed embedding response: {err}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| oracle_error("embedding response was empty"))
    }
}

#[async_trait]
impl KnowledgeRetriever for PineconeRetriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embed(query).await?;

        let response = self
            .client
            .post(format!("{}/query", self.index_host))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&PineconeQuery {
                namespace: &self.namespace,
                vector,
                top_k,
                include_values: false,
                include_metadata: true,
            })
            .send()
            .await
            .map_err(|err| oracle_error(format!("knowledge query failed: {err}")))?;
        if !response.status().is_success() {
            return Err(oracle_error(format!("knowledge query returned {}", response.status())));
        }

        let parsed: PineconeResponse = response
            .json()
            .await
            .map_err(|err| oracle_error(format!("malformed knowledge response: {err}")))?;

        let chunks = parsed.into_chunks();
        debug!(
            event_name = "retriever.search",
            namespace = %self.namespace,
            requested = top_k,
            returned = chunks.len(),
            "knowledge search completed"
        );
        Ok(chunks)
    }
}

/// Fixed passages, used when no index is configured.
#[derive(Clone, Debug, Default)]
pub struct StaticRetriever {
    chunks: Vec<String>,
}

impl StaticRetriever {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { chunks: chunks.into_iter().map(Into::into).collect() }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl KnowledgeRetriever for StaticRetriever {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        Ok(self
            .chunks
            .iter()
            .take(top_k)
            .map(|text| RetrievedChunk { text: text.clone(), score: 1.0 })
            .collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PineconeQuery<'a> {
    namespace: &'a str,
    vector: Vec<f32>,
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PineconeResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl PineconeResponse {
    /// Matches without a `text` metadata field carry nothing to show.
    fn into_chunks(self) -> Vec<RetrievedChunk> {
        self.matches
            .into_iter()
            .filter_map(|item| {
                let text = item.metadata?.get("text")?.as_str()?.to_string();
                Some(RetrievedChunk { text, score: item.score })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{KnowledgeRetriever, PineconeQuery, PineconeResponse, StaticRetriever};

    #[tokio::test]
    async fn static_retriever_honours_top_k() {
        let retriever = StaticRetriever::new(["Open 7am-6pm", "Located on Main St", "Free wifi"]);
        let chunks = retriever.search("hours?", 2).await.expect("search should succeed");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Open 7am-6pm");
        assert!(StaticRetriever::default().search("hours?", 5).await.expect("search").is_empty());
    }

    #[test]
    fn pinecone_query_uses_camel_case_fields() {
        let body = serde_json::to_value(PineconeQuery {
            namespace: "ns1",
            vector: vec![0.5],
            top_k: 5,
            include_values: false,
            include_metadata: true,
        })
        .expect("query should serialize");

        assert_eq!(body["topK"], 5);
        assert_eq!(body["includeMetadata"], true);
        assert_eq!(body["namespace"], "ns1");
    }

    #[test]
    fn pinecone_matches_without_text_are_dropped() {
        let response: PineconeResponse = serde_json::from_value(json!({
            "matches": [
                {"id": "1", "score": 0.9, "metadata": {"text": "Latte - espresso with milk"}},
                {"id": "2", "score": 0.8, "metadata": {"title": "no text"}},
                {"id": "3", "score": 0.7}
            ]
        }))
        .expect("response should parse");

        let chunks = response.into_chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Latte - espresso with milk");
    }
}
