use anyhow::{Context, Result};
use brewline_core::config::{AppConfig, LoadOptions};
use brewline_core::{
    AffinityTable, CategoryFilter, PopularityTable, RecommendationEngine, RecommendationKind,
};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_DATASET};

#[derive(Debug, Serialize)]
struct RecommendationReport {
    command: &'static str,
    status: &'static str,
    recommendation_type: &'static str,
    parameters: Vec<String>,
    k: usize,
    recommendations: Vec<String>,
}

pub fn apriori(products: &[String], k: usize) -> CommandResult {
    with_engine(|engine| RecommendationReport {
        command: "recommend",
        status: "ok",
        recommendation_type: RecommendationKind::Apriori.as_str(),
        parameters: products.to_vec(),
        k,
        recommendations: engine.apriori(products, k),
    })
}

pub fn popular(categories: Vec<String>, k: usize) -> CommandResult {
    let kind = if categories.is_empty() {
        RecommendationKind::Popular
    } else {
        RecommendationKind::PopularByCategory
    };

    with_engine(move |engine| RecommendationReport {
        command: "recommend",
        status: "ok",
        recommendation_type: kind.as_str(),
        parameters: categories.clone(),
        k,
        recommendations: engine.popular(CategoryFilter::from(categories), k),
    })
}

fn with_engine(query: impl FnOnce(&RecommendationEngine) -> RecommendationReport) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "recommend",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            )
        }
    };

    match load_engine(&config) {
        Ok(engine) => CommandResult::report(&query(&engine)),
        Err(error) => {
            CommandResult::failure("recommend", "dataset_load", format!("{error:#}"), EXIT_DATASET)
        }
    }
}

pub(crate) fn load_engine(config: &AppConfig) -> Result<RecommendationEngine> {
    let affinity = AffinityTable::from_path(&config.datasets.affinity_path).with_context(|| {
        format!("loading affinity table `{}`", config.datasets.affinity_path.display())
    })?;
    let popularity =
        PopularityTable::from_path(&config.datasets.popularity_path).with_context(|| {
            format!("loading popularity table `{}`", config.datasets.popularity_path.display())
        })?;
    Ok(RecommendationEngine::new(affinity, popularity))
}
