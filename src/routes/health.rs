use crate::{
    error::{AppResult, ReadProcessStatusSnafu},
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use snafu::ResultExt;
use std::{io::ErrorKind, path::Path};

const PROC_STATUS: &str = "/proc/self/status";

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: &'static str,
    timestamp: DateTime<Utc>,
    /// Seconds since startup.
    uptime: f64,
    environment: String,
}

/// Liveness of the process only; the store is never consulted.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "UP",
        timestamp: Utc::now(),
        uptime: state.uptime().as_secs_f64(),
        environment: state.config().server_config().environment().to_string(),
    })
}

#[derive(Debug, Serialize)]
struct DatabaseHealth {
    status: &'static str,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct MemoryUsage {
    rss_bytes: Option<u64>,
    virtual_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailedHealthReport {
    status: &'static str,
    timestamp: DateTime<Utc>,
    uptime: String,
    uptime_seconds: f64,
    environment: String,
    database: DatabaseHealth,
    memory: MemoryUsage,
    version: &'static str,
    platform: String,
}

/// `1d 2h 3m 4s`, dropping zero units from either end. Zero units in the middle stay.
pub fn format_uptime(total_seconds: u64) -> String {
    let units = [
        (total_seconds / 86_400, 'd'),
        (total_seconds % 86_400 / 3_600, 'h'),
        (total_seconds % 3_600 / 60, 'm'),
        (total_seconds % 60, 's'),
    ];

    let Some(first) = units.iter().position(|(n, _)| *n != 0) else {
        return "0s".to_string();
    };
    let last = units.iter().rposition(|(n, _)| *n != 0).unwrap_or(first);

    units[first..=last]
        .iter()
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads `VmRSS` and `VmSize` out of a `/proc/<pid>/status` listing.
fn parse_proc_status(status: &str) -> MemoryUsage {
    let kib = |key: &str| {
        status
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
            .map(|kib| kib * 1024)
    };

    MemoryUsage {
        rss_bytes: kib("VmRSS:"),
        virtual_bytes: kib("VmSize:"),
    }
}

/// Platforms without procfs report no figures; any other read failure is an error.
async fn memory_usage(proc_status: &Path) -> AppResult<MemoryUsage> {
    match tokio::fs::read_to_string(proc_status).await {
        Ok(status) => Ok(parse_proc_status(&status)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(MemoryUsage::default()),
        Err(e) => Err(e).context(ReadProcessStatusSnafu {
            path: proc_status.display().to_string(),
        }),
    }
}

async fn build_detailed_report(
    state: &AppState,
    proc_status: &Path,
) -> AppResult<DetailedHealthReport> {
    let database = DatabaseHealth {
        status: if state.is_connected().await {
            "connected"
        } else {
            "disconnected"
        },
    };
    let memory = memory_usage(proc_status).await?;
    let uptime = state.uptime();

    Ok(DetailedHealthReport {
        status: "UP",
        timestamp: Utc::now(),
        uptime: format_uptime(uptime.as_secs()),
        uptime_seconds: uptime.as_secs_f64(),
        environment: state.config().server_config().environment().to_string(),
        database,
        memory,
        version: env!("CARGO_PKG_VERSION"),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
    })
}

async fn detailed_health(state: &AppState, proc_status: &Path) -> Response {
    match build_detailed_report(state, proc_status).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(?e, "Unable to build detailed health report");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "DOWN", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// An unreachable store is reported in the body with a 200; only failing to put the report
/// together at all gives a 503.
pub async fn get_detailed_health(State(state): State<AppState>) -> Response {
    detailed_health(&state, Path::new(PROC_STATUS)).await
}
