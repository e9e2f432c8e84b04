use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub retriever: RetrieverConfig,
    pub datasets: DatasetConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct RetrieverConfig {
    pub enabled: bool,
    pub api_key: Option<SecretString>,
    pub index_host: Option<String>,
    pub namespace: String,
    pub embedding_model: String,
    pub top_k: usize,
}

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub affinity_path: PathBuf,
    pub popularity_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub allowed_origin: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub retriever_enabled: Option<bool>,
    pub affinity_path: Option<PathBuf>,
    pub popularity_path: Option<PathBuf>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: Some("https://api.openai.com/v1".to_string()),
                model: "gpt-4o-mini".to_string(),
            },
            retriever: RetrieverConfig {
                enabled: true,
                api_key: None,
                index_host: None,
                namespace: "ns1".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                top_k: 5,
            },
            datasets: DatasetConfig {
                affinity_path: PathBuf::from("data/apriori_recommendations.json"),
                popularity_path: PathBuf::from("data/popularity_recommendation.csv"),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                allowed_origin: "http://localhost:3000".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("brewline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// `host:port` the HTTP server listens on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
        }

        if let Some(retriever) = patch.retriever {
            if let Some(enabled) = retriever.enabled {
                self.retriever.enabled = enabled;
            }
            if let Some(retriever_api_key_value) = retriever.api_key {
                self.retriever.api_key = Some(secret_value(retriever_api_key_value));
            }
            if let Some(index_host) = retriever.index_host {
                self.retriever.index_host = Some(index_host);
            }
            if let Some(namespace) = retriever.namespace {
                self.retriever.namespace = namespace;
            }
            if let Some(embedding_model) = retriever.embedding_model {
                self.retriever.embedding_model = embedding_model;
            }
            if let Some(top_k) = retriever.top_k {
                self.retriever.top_k = top_k;
            }
        }

        if let Some(datasets) = patch.datasets {
            if let Some(affinity_path) = datasets.affinity_path {
                self.datasets.affinity_path = affinity_path;
            }
            if let Some(popularity_path) = datasets.popularity_path {
                self.datasets.popularity_path = popularity_path;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(allowed_origin) = server.allowed_origin {
                self.server.allowed_origin = allowed_origin;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BREWLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("BREWLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BREWLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        let model = read_env("BREWLINE_LLM_MODEL").or_else(|| read_env("BREWLINE_MODEL_NAME"));
        if let Some(value) = model {
            self.llm.model = value;
        }

        if let Some(value) = read_env("BREWLINE_RETRIEVER_ENABLED") {
            self.retriever.enabled = parse_bool("BREWLINE_RETRIEVER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("BREWLINE_RETRIEVER_API_KEY") {
            self.retriever.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BREWLINE_RETRIEVER_INDEX_HOST") {
            self.retriever.index_host = Some(value);
        }
        if let Some(value) = read_env("BREWLINE_RETRIEVER_NAMESPACE") {
            self.retriever.namespace = value;
        }
        if let Some(value) = read_env("BREWLINE_RETRIEVER_EMBEDDING_MODEL") {
            self.retriever.embedding_model = value;
        }
        if let Some(value) = read_env("BREWLINE_RETRIEVER_TOP_K") {
            self.retriever.top_k = parse_usize("BREWLINE_RETRIEVER_TOP_K", &value)?;
        }

        if let Some(value) = read_env("BREWLINE_DATASETS_AFFINITY_PATH") {
            self.datasets.affinity_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("BREWLINE_DATASETS_POPULARITY_PATH") {
            self.datasets.popularity_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("BREWLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("BREWLINE_SERVER_PORT").or_else(|| read_env("BREWLINE_PORT"));
        if let Some(value) = port {
            self.server.port = parse_u16("BREWLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BREWLINE_SERVER_ALLOWED_ORIGIN") {
            self.server.allowed_origin = value;
        }

        let log_level =
            read_env("BREWLINE_LOGGING_LEVEL").or_else(|| read_env("BREWLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BREWLINE_LOGGING_FORMAT").or_else(|| read_env("BREWLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(enabled) = overrides.retriever_enabled {
            self.retriever.enabled = enabled;
        }
        if let Some(affinity_path) = overrides.affinity_path {
            self.datasets.affinity_path = affinity_path;
        }
        if let Some(popularity_path) = overrides.popularity_path {
            self.datasets.popularity_path = popularity_path;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_retriever(&self.retriever)?;
        validate_datasets(&self.datasets)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("brewline.toml"), PathBuf::from("config/brewline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_retriever(retriever: &RetrieverConfig) -> Result<(), ConfigError> {
    if !retriever.enabled {
        return Ok(());
    }

    let missing_key = retriever
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(
            "retriever.api_key is required when retriever.enabled is true".to_string(),
        ));
    }

    match &retriever.index_host {
        Some(host) if host.starts_with("https://") || host.starts_with("http://") => {}
        Some(_) => {
            return Err(ConfigError::Validation(
                "retriever.index_host must start with http:// or https://".to_string(),
            ))
        }
        None => {
            return Err(ConfigError::Validation(
                "retriever.index_host is required when retriever.enabled is true".to_string(),
            ))
        }
    }

    if retriever.top_k == 0 || retriever.top_k > 50 {
        return Err(ConfigError::Validation("retriever.top_k must be in range 1..=50".to_string()));
    }

    Ok(())
}

fn validate_datasets(datasets: &DatasetConfig) -> Result<(), ConfigError> {
    if datasets.affinity_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "datasets.affinity_path must not be empty".to_string(),
        ));
    }
    if datasets.popularity_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "datasets.popularity_path must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if !server.allowed_origin.starts_with("http://")
        && !server.allowed_origin.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "server.allowed_origin must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    retriever: Option<RetrieverPatch>,
    datasets: Option<DatasetPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrieverPatch {
    enabled: Option<bool>,
    api_key: Option<String>,
    index_host: Option<String>,
    namespace: Option<String>,
    embedding_model: Option<String>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetPatch {
    affinity_path: Option<PathBuf>,
    popularity_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    allowed_origin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
