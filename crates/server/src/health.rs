use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

/// Row counts of the recommendation datasets loaded at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub affinity_rules: usize,
    pub popularity_rows: usize,
}

#[derive(Clone)]
pub struct HealthState {
    datasets: DatasetSummary,
}

impl HealthState {
    pub fn new(datasets: DatasetSummary) -> Self {
        Self { datasets }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetCheck {
    pub status: &'static str,
    pub affinity_rules: usize,
    pub popularity_rows: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub datasets: DatasetCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let datasets = dataset_check(state.datasets);
    let ready = datasets.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "brewline-server runtime initialized".to_string(),
        },
        datasets,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

// Both tables must hold rows for recommendations to answer.
fn dataset_check(summary: DatasetSummary) -> DatasetCheck {
    let ready = summary.affinity_rules > 0 && summary.popularity_rows > 0;
    DatasetCheck {
        status: if ready { "ready" } else { "degraded" },
        affinity_rules: summary.affinity_rules,
        popularity_rows: summary.popularity_rows,
    }
}
