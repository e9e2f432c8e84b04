use brewline_core::config::{AppConfig, LoadOptions};
use brewline_core::{AffinityTable, PopularityTable};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_DOCTOR};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_DOCTOR };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_affinity_dataset(&config));
            checks.push(check_popularity_dataset(&config));
            checks.push(check_retriever(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["affinity_dataset", "popularity_dataset", "knowledge_retriever"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail)
        && checks.iter().any(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_affinity_dataset(config: &AppConfig) -> DoctorCheck {
    let path = &config.datasets.affinity_path;
    match AffinityTable::from_path(path) {
        Ok(table) if table.is_empty() => DoctorCheck {
            name: "affinity_dataset",
            status: CheckStatus::Fail,
            details: format!("`{}` holds no affinity rules", path.display()),
        },
        Ok(table) => DoctorCheck {
            name: "affinity_dataset",
            status: CheckStatus::Pass,
            details: format!("loaded {} affinity keys from `{}`", table.len(), path.display()),
        },
        Err(error) => DoctorCheck {
            name: "affinity_dataset",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_popularity_dataset(config: &AppConfig) -> DoctorCheck {
    let path = &config.datasets.popularity_path;
    match PopularityTable::from_path(path) {
        Ok(table) if table.is_empty() => DoctorCheck {
            name: "popularity_dataset",
            status: CheckStatus::Fail,
            details: format!("`{}` holds no popularity rows", path.display()),
        },
        Ok(table) => DoctorCheck {
            name: "popularity_dataset",
            status: CheckStatus::Pass,
            details: format!(
                "loaded {} rows in {} categories from `{}`",
                table.len(),
                table.categories().len(),
                path.display()
            ),
        },
        Err(error) => DoctorCheck {
            name: "popularity_dataset",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_retriever(config: &AppConfig) -> DoctorCheck {
    if !config.retriever.enabled {
        return DoctorCheck {
            name: "knowledge_retriever",
            status: CheckStatus::Skipped,
            details: "retriever disabled; details answers run without shop context".to_string(),
        };
    }

    DoctorCheck {
        name: "knowledge_retriever",
        status: CheckStatus::Pass,
        details: format!(
            "namespace `{}` via `{}` (top_k {})",
            config.retriever.namespace,
            config.retriever.index_host.as_deref().unwrap_or("<unset>"),
            config.retriever.top_k
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
