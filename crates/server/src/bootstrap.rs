use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use brewline_agent::agents::{AgentRegistry, DetailsAgent, OrderTakingAgent, RecommendationAgent};
use brewline_agent::classification::Classifier;
use brewline_agent::guardrails::GuardAgent;
use brewline_agent::prompts::PromptLibrary;
use brewline_agent::{
    AgentRuntime, DecisionOracle, KnowledgeRetriever, OpenAiOracle, PineconeRetriever,
    StaticRetriever,
};
use brewline_core::config::{AppConfig, ConfigError, LoadOptions};
use brewline_core::{AffinityTable, DatasetError, PopularityTable, RecommendationEngine};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::chat::{self, ChatState};
use crate::health::{self, DatasetSummary, HealthState};

pub struct Application {
    pub config: AppConfig,
    pub engine: Arc<RecommendationEngine>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("dataset load failed: {0}")]
    Dataset(#[from] DatasetError),
    #[error("prompt templates failed to compile: {0}")]
    Prompts(String),
    #[error("knowledge retriever could not be configured: {0}")]
    Retriever(String),
    #[error("server.allowed_origin `{0}` is not a valid header value")]
    AllowedOrigin(String),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let affinity = AffinityTable::from_path(&config.datasets.affinity_path)?;
    let popularity = PopularityTable::from_path(&config.datasets.popularity_path)?;
    info!(
        event_name = "system.bootstrap.datasets_loaded",
        correlation_id = "bootstrap",
        affinity_rules = affinity.len(),
        popularity_rows = popularity.len(),
        "recommendation datasets loaded"
    );
    let engine = Arc::new(RecommendationEngine::new(affinity, popularity));

    let openai = OpenAiOracle::from_config(&config.llm);
    info!(
        event_name = "system.bootstrap.oracle_configured",
        correlation_id = "bootstrap",
        model = openai.model(),
        "language model oracle configured"
    );
    let oracle: Arc<dyn DecisionOracle> = Arc::new(openai);
    let retriever: Arc<dyn KnowledgeRetriever> = if config.retriever.enabled {
        let pinecone = PineconeRetriever::from_config(&config.llm, &config.retriever)
            .map_err(|error| BootstrapError::Retriever(format!("{error:#}")))?;
        Arc::new(pinecone)
    } else {
        warn!(
            event_name = "system.bootstrap.retriever_disabled",
            correlation_id = "bootstrap",
            "knowledge retriever disabled; details answers will have no context"
        );
        Arc::new(StaticRetriever::default())
    };

    let runtime = compose(engine.clone(), oracle, retriever, config.retriever.top_k)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        model = %config.llm.model,
        agents = runtime.registry().len(),
        "agent runtime composed"
    );

    Ok(Application { config, engine, runtime: Arc::new(runtime) })
}

/// Wire the guard, classifier and the three agents around shared adapters.
pub fn compose(
    engine: Arc<RecommendationEngine>,
    oracle: Arc<dyn DecisionOracle>,
    retriever: Arc<dyn KnowledgeRetriever>,
    top_k: usize,
) -> Result<AgentRuntime, BootstrapError> {
    let prompts = Arc::new(
        PromptLibrary::new().map_err(|error| BootstrapError::Prompts(format!("{error:#}")))?,
    );

    let recommendations =
        Arc::new(RecommendationAgent::new(oracle.clone(), prompts.clone(), engine));

    let mut registry = AgentRegistry::default();
    registry.register(Arc::new(
        DetailsAgent::new(oracle.clone(), retriever, prompts.clone()).with_top_k(top_k),
    ));
    registry.register(recommendations.clone());
    registry.register(Arc::new(OrderTakingAgent::new(
        oracle.clone(),
        prompts.clone(),
        recommendations,
    )));

    Ok(AgentRuntime::new(
        GuardAgent::new(oracle.clone(), prompts.clone()),
        Classifier::new(oracle, prompts),
        registry,
    ))
}

impl Application {
    pub fn router(&self) -> Result<Router, BootstrapError> {
        let origin = HeaderValue::from_str(&self.config.server.allowed_origin)
            .map_err(|_| BootstrapError::AllowedOrigin(self.config.server.allowed_origin.clone()))?;
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        let datasets = DatasetSummary {
            affinity_rules: self.engine.affinity().len(),
            popularity_rows: self.engine.popularity().len(),
        };

        Ok(health::router(HealthState::new(datasets))
            .merge(chat::router(ChatState::new(self.runtime.clone())))
            .layer(cors))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use brewline_core::config::{ConfigOverrides, LoadOptions};
    use brewline_core::{AgentTag, DatasetError};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::{bootstrap, BootstrapError};

    fn write_datasets(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let affinity = dir.join("apriori_recommendations.json");
        let popularity = dir.join("popularity_recommendation.csv");
        fs::write(
            &affinity,
            r#"{"Latte": [{"product": "Croissant", "product_category": "Bakery", "confidence": 0.5}]}"#,
        )
        .expect("write affinity");
        fs::write(
            &popularity,
            "product,product_category,number_of_transactions\nLatte,Coffee,10\nCroissant,Bakery,4\n",
        )
        .expect("write popularity");
        (affinity, popularity)
    }

    fn options(affinity: std::path::PathBuf, popularity: std::path::PathBuf) -> LoadOptions {
        LoadOptions {
            config_path: Some(std::path::PathBuf::from("does-not-exist/brewline.toml")),
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-test".to_string()),
                retriever_enabled: Some(false),
                affinity_path: Some(affinity),
                popularity_path: Some(popularity),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn bootstrap_composes_all_three_agents() {
        let dir = TempDir::new().expect("tempdir");
        let (affinity, popularity) = write_datasets(dir.path());

        let app = bootstrap(options(affinity, popularity)).expect("bootstrap should succeed");

        assert_eq!(app.runtime.registry().tags(), AgentTag::ALL.to_vec());
        assert_eq!(app.engine.popularity().len(), 2);
        assert_eq!(app.engine.apriori(&["latte"], 5), vec!["Croissant".to_string()]);
    }

    #[test]
    fn bootstrap_fails_fast_on_missing_dataset() {
        let dir = TempDir::new().expect("tempdir");
        let (affinity, _) = write_datasets(dir.path());

        let result = bootstrap(options(affinity, dir.path().join("missing.csv")));
        assert!(matches!(result, Err(BootstrapError::Dataset(DatasetError::Read { .. }))));
    }

    #[tokio::test]
    async fn router_serves_health_with_dataset_counts() {
        let dir = TempDir::new().expect("tempdir");
        let (affinity, popularity) = write_datasets(dir.path());
        let app = bootstrap(options(affinity, popularity)).expect("bootstrap should succeed");

        let response = app
            .router()
            .expect("router should build")
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("http://localhost:3000")
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["datasets"]["popularity_rows"], 2);
    }
}
