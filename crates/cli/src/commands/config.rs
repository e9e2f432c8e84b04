use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use brewline_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Table;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("llm.provider", &["BREWLINE_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        Field::new(
            "llm.model",
            &["BREWLINE_LLM_MODEL", "BREWLINE_MODEL_NAME"],
            config.llm.model.clone(),
        ),
        Field::new(
            "llm.base_url",
            &["BREWLINE_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["BREWLINE_LLM_API_KEY"], redact_secret(&config.llm.api_key)),
        Field::new(
            "retriever.enabled",
            &["BREWLINE_RETRIEVER_ENABLED"],
            config.retriever.enabled.to_string(),
        ),
        Field::new(
            "retriever.api_key",
            &["BREWLINE_RETRIEVER_API_KEY"],
            redact_secret(&config.retriever.api_key),
        ),
        Field::new(
            "retriever.index_host",
            &["BREWLINE_RETRIEVER_INDEX_HOST"],
            config.retriever.index_host.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "retriever.namespace",
            &["BREWLINE_RETRIEVER_NAMESPACE"],
            config.retriever.namespace.clone(),
        ),
        Field::new(
            "retriever.embedding_model",
            &["BREWLINE_RETRIEVER_EMBEDDING_MODEL"],
            config.retriever.embedding_model.clone(),
        ),
        Field::new(
            "retriever.top_k",
            &["BREWLINE_RETRIEVER_TOP_K"],
            config.retriever.top_k.to_string(),
        ),
        Field::new(
            "datasets.affinity_path",
            &["BREWLINE_DATASETS_AFFINITY_PATH"],
            config.datasets.affinity_path.display().to_string(),
        ),
        Field::new(
            "datasets.popularity_path",
            &["BREWLINE_DATASETS_POPULARITY_PATH"],
            config.datasets.popularity_path.display().to_string(),
        ),
        Field::new(
            "server.bind_address",
            &["BREWLINE_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        Field::new(
            "server.port",
            &["BREWLINE_SERVER_PORT", "BREWLINE_PORT"],
            config.server.port.to_string(),
        ),
        Field::new(
            "server.allowed_origin",
            &["BREWLINE_SERVER_ALLOWED_ORIGIN"],
            config.server.allowed_origin.clone(),
        ),
        Field::new(
            "logging.level",
            &["BREWLINE_LOGGING_LEVEL", "BREWLINE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        Field::new(
            "logging.format",
            &["BREWLINE_LOGGING_FORMAT", "BREWLINE_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("brewline.toml"), PathBuf::from("config/brewline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Table> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Table>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Table>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(**key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Table, key_path: &str) -> bool {
    let mut keys = key_path.split('.');
    let Some(mut current) = keys.next().and_then(|key| root.get(key)) else {
        return false;
    };
    for key in keys {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &Option<SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };

    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Table;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_their_prefix() {
        assert_eq!(redact_secret(&Some(SecretString::from("sk-proj-abc123".to_string()))), "sk-***");
        assert_eq!(redact_secret(&Some(SecretString::from("pcsk8f00".to_string()))), "<redacted>");
        assert_eq!(redact_secret(&Some(SecretString::from("  ".to_string()))), "<empty>");
        assert_eq!(redact_secret(&None), "<unset>");
    }

    #[test]
    fn dotted_paths_resolve_into_nested_tables() {
        let doc = "[retriever]\nnamespace = \"ns2\"\n".parse::<Table>().expect("toml");
        assert!(contains_path(&doc, "retriever.namespace"));
        assert!(!contains_path(&doc, "retriever.top_k"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
