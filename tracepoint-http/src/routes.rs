use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use tracepoint_core::{DeviceQuery, ScanQuery};
use tracepoint_posture::{summarize, PostureSummary};
use tracepoint_types::{DeviceSnapshot, FileEntry};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FilesParams {
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JsonFileParams {
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLogParams {
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DirectoriesResponse {
    pub directories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse<T> {
    pub devices: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct DeviceLogsResponse {
    pub devicelogs: Vec<DeviceSnapshot>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParameter(name))
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn directories(State(state): State<AppState>) -> Result<Json<DirectoriesResponse>, ApiError> {
    let directories = state.telemetry.directories().await?;
    Ok(Json(DirectoriesResponse { directories }))
}

pub async fn files(
    State(state): State<AppState>,
    params: Result<Query<FilesParams>, QueryRejection>,
) -> Result<Json<FilesResponse>, ApiError> {
    let Query(params) = params?;
    let dir = required(params.dir, "dir")?;
    let files = state.telemetry.files(&dir).await?;
    debug!(dir = %dir, files = files.len(), "Listed files");
    Ok(Json(FilesResponse { files }))
}

pub async fn json_file(
    State(state): State<AppState>,
    params: Result<Query<JsonFileParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let file = required(params.file, "file")?;
    Ok(Json(state.telemetry.json_file(&file).await?))
}

pub async fn devices(
    State(state): State<AppState>,
    query: Result<Query<DeviceQuery>, QueryRejection>,
) -> Result<Json<DevicesResponse<DeviceSnapshot>>, ApiError> {
    let Query(query) = query?;
    let devices = state.telemetry.devices(&query).await?;
    Ok(Json(DevicesResponse { devices }))
}

pub async fn devices_last_status(
    State(state): State<AppState>,
    query: Result<Query<DeviceQuery>, QueryRejection>,
) -> Result<Json<DevicesResponse<DeviceSnapshot>>, ApiError> {
    let Query(query) = query?;
    let devices = state.telemetry.latest_status(&query).await?;
    Ok(Json(DevicesResponse { devices }))
}

pub async fn device_log(
    State(state): State<AppState>,
    params: Result<Query<DeviceLogParams>, QueryRejection>,
) -> Result<Json<DeviceLogsResponse>, ApiError> {
    let Query(params) = params?;
    let device_id = required(params.device_id, "deviceId")?;
    let devicelogs = state.telemetry.device_log(&device_id).await?;
    Ok(Json(DeviceLogsResponse { devicelogs }))
}

pub async fn devices_scan(
    State(state): State<AppState>,
    query: Result<Query<ScanQuery>, QueryRejection>,
) -> Result<Json<DevicesResponse<Value>>, ApiError> {
    let Query(query) = query?;
    let devices = state.telemetry.scan(&query).await?;
    Ok(Json(DevicesResponse { devices }))
}

pub async fn posture_summary(
    State(state): State<AppState>,
    query: Result<Query<DeviceQuery>, QueryRejection>,
) -> Result<Json<PostureSummary>, ApiError> {
    let Query(query) = query?;
    let latest = state.telemetry.latest_status(&query).await?;
    Ok(Json(summarize(&latest, Utc::now().date_naive())))
}
