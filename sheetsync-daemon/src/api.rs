//! HTTP admin surface and webhook ingress.

use std::path::Path;

use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use sheetsync_core::{Mapping, MappingPatch, NewMapping, RegistryError, Table};
use sheetsync_engine::{CycleOutcome, CycleReport, PushUpdate};

use crate::config::MIN_SYNC_INTERVAL;
use crate::error::DaemonError;
use crate::state::{AppState, SyncSettings, SyncStatus};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Full router. Static files, when configured, are served for every path the
/// API does not claim.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/sync/status", get(get_status))
        .route("/sync/config", get(get_config).post(update_config))
        .route("/sync/start", post(start_sync))
        .route("/sync/stop", post(stop_sync))
        .route("/sync/trigger", post(trigger_sync))
        .route("/mappings", get(list_mappings).post(create_mapping))
        .route("/mappings/:id", put(update_mapping).delete(delete_mapping))
        .route("/cache/reset", post(reset_cache));

    let app = Router::new()
        .nest("/api", api)
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => app.fallback_service(
            ServeDir::new(dir)
                .append_index_html_on_directories(true)
                .not_found_service(ServeFile::new(dir.join("index.html"))),
        ),
        None => app,
    };

    app.layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

// ---------------------------------------------------------------------------
// Health & webhook
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

/// Body posted by the spreadsheet-side trigger script.
///
/// `sheetId`, `timestamp` and `changeType` are logged only.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub sheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub range: Option<String>,
    pub values: Option<Table>,
    pub timestamp: Option<Value>,
    pub change_type: Option<String>,
}

pub async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Value> {
    let (Some(sheet_name), Some(range), Some(values)) = (
        payload.sheet_name.filter(|s| !s.is_empty()),
        payload.range.filter(|s| !s.is_empty()),
        payload.values,
    ) else {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Missing required fields: sheetName, range, values",
        ));
    };

    tracing::info!(
        sheet_id = payload.sheet_id.as_deref().unwrap_or(""),
        sheet_name = %sheet_name,
        range = %range,
        change_type = payload.change_type.as_deref().unwrap_or(""),
        timestamp = ?payload.timestamp,
        "webhook received",
    );

    let update = PushUpdate {
        sheet_name,
        range,
        values,
    };
    match state.apply_push(update).await {
        Ok(outcome) => Ok(Json(json!({
            "success": true,
            "message": "Webhook processed successfully",
            "timestamp": Utc::now(),
            "result": outcome,
        }))),
        Err(err) => {
            tracing::error!(error = %err, "webhook processing failed");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))
        }
    }
}

// ---------------------------------------------------------------------------
// Sync control
// ---------------------------------------------------------------------------

pub async fn get_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.status().await)
}

pub async fn get_config(State(state): State<AppState>) -> Json<SyncSettings> {
    Json(state.settings().await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub interval: Option<u64>,
    pub auto_start: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub settings: SyncSettings,
    pub message: &'static str,
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<ConfigResponse> {
    if update
        .interval
        .is_some_and(|ms| ms < MIN_SYNC_INTERVAL.as_millis() as u64)
    {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Interval must be at least 10 seconds",
        ));
    }

    let (settings, restarted) = state.update_settings(update.interval, update.auto_start).await;
    Ok(Json(ConfigResponse {
        settings,
        message: if restarted {
            "Configuration updated and sync interval restarted"
        } else {
            "Configuration updated"
        },
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub message: &'static str,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CycleReport>,
}

pub async fn start_sync(State(state): State<AppState>) -> ApiResult<ControlResponse> {
    if !state.start_scheduler().await {
        return Err(error(StatusCode::BAD_REQUEST, "Sync is already running"));
    }
    let report = state.run_sync().await;
    Ok(Json(ControlResponse {
        message: "Sync started successfully",
        status: state.status().await,
        report: Some(report),
    }))
}

pub async fn stop_sync(State(state): State<AppState>) -> ApiResult<ControlResponse> {
    if !state.stop_scheduler().await {
        return Err(error(StatusCode::BAD_REQUEST, "Sync is not running"));
    }
    Ok(Json(ControlResponse {
        message: "Sync stopped successfully",
        status: state.status().await,
        report: None,
    }))
}

pub async fn trigger_sync(State(state): State<AppState>) -> ApiResult<ControlResponse> {
    let report = state.run_sync().await;
    let message = match report.outcome {
        CycleOutcome::AlreadyRunning => {
            return Err(error(StatusCode::CONFLICT, "A sync cycle is already in progress"))
        }
        CycleOutcome::RateLimited => "Rate limit reached, sync skipped",
        CycleOutcome::NoMappings => "No mappings configured",
        CycleOutcome::Completed => "Manual sync completed successfully",
    };
    Ok(Json(ControlResponse {
        message,
        status: state.status().await,
        report: Some(report),
    }))
}

pub async fn reset_cache(State(state): State<AppState>) -> ApiResult<Value> {
    if state.engine.reset_checksums().await {
        Ok(Json(json!({ "message": "Checksum cache reset" })))
    } else {
        Err(error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Checksum cache cleared but could not be saved",
        ))
    }
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

fn registry_error(err: DaemonError) -> ApiError {
    match err {
        DaemonError::Registry(RegistryError::MissingField(_)) => {
            error(StatusCode::BAD_REQUEST, err.to_string())
        }
        DaemonError::Registry(RegistryError::MappingNotFound(_)) => {
            error(StatusCode::NOT_FOUND, "Mapping not found")
        }
        other => {
            tracing::error!(error = %other, "mapping registry operation failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

pub async fn list_mappings(State(state): State<AppState>) -> Json<Vec<Mapping>> {
    Json(state.mappings().await)
}

pub async fn create_mapping(
    State(state): State<AppState>,
    Json(new): Json<NewMapping>,
) -> Result<(StatusCode, Json<Mapping>), ApiError> {
    let mapping = state.create_mapping(new).await.map_err(registry_error)?;
    Ok((StatusCode::CREATED, Json(mapping)))
}

pub async fn update_mapping(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(patch): Json<MappingPatch>,
) -> ApiResult<Mapping> {
    let mapping = state.update_mapping(&id, patch).await.map_err(registry_error)?;
    Ok(Json(mapping))
}

pub async fn delete_mapping(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Value> {
    state.delete_mapping(&id).await.map_err(registry_error)?;
    Ok(Json(json!({ "message": "Mapping deleted successfully" })))
}

