use crate::analytics::{
    MetricSummary, PhaseStats, RollingPoint, StatsRange, StreakPoint, DEFAULT_WINDOW,
};
use crate::errors::AppError;
use crate::models::{
    CommitCountResponse, Credentials, EndPhaseRequest, EntryResponse, MetricEntry, MetricKey,
    NewPhaseRequest, Phase, VisibilityRequest,
};
use crate::state::AppState;
use crate::sync::{start_of_today, SyncOutcome, SyncStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct RollingQuery {
    pub metric: MetricKey,
    pub window: Option<usize>,
    #[serde(default)]
    pub range: StatsRange,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub metric: MetricKey,
    #[serde(default)]
    pub range: StatsRange,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub sync: SyncStatus,
    pub load_issues: Vec<String>,
}

pub async fn list_entries(State(state): State<AppState>) -> Json<BTreeMap<String, MetricEntry>> {
    Json(state.entries().await)
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<EntryResponse>, AppError> {
    let entry = state
        .entry(&date)
        .await
        .ok_or_else(|| AppError::not_found(format!("no entry for {date}")))?;
    Ok(Json(EntryResponse { date, entry }))
}

pub async fn put_entry(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Json(entry): Json<MetricEntry>,
) -> Result<Json<EntryResponse>, AppError> {
    state.put_entry(&date, entry).await?;
    let entry = state.entry(&date).await.unwrap_or_default();
    Ok(Json(EntryResponse { date, entry }))
}

pub async fn delete_entry(State(state): State<AppState>, Path(date): Path<String>) -> StatusCode {
    if state.remove_entry(&date).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn list_phases(State(state): State<AppState>) -> Json<Vec<Phase>> {
    Json(state.phases().await)
}

pub async fn current_phase(State(state): State<AppState>) -> Json<Option<Phase>> {
    Json(state.current_phase().await)
}

pub async fn add_phase(
    State(state): State<AppState>,
    Json(payload): Json<NewPhaseRequest>,
) -> Result<(StatusCode, Json<Phase>), AppError> {
    let phase = state.add_phase(&payload.name, &payload.start, payload.goals).await?;
    Ok((StatusCode::CREATED, Json(phase)))
}

pub async fn end_phase(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<EndPhaseRequest>,
) -> Result<Json<Phase>, AppError> {
    if !state.end_phase(id, &payload.end).await? {
        return Err(AppError::not_found(format!("no phase {id}")));
    }
    state
        .phase(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no phase {id}")))
}

pub async fn delete_phase(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    if state.delete_phase(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn rolling_average(
    State(state): State<AppState>,
    Query(query): Query<RollingQuery>,
) -> Json<Vec<RollingPoint>> {
    let window = query.window.unwrap_or(DEFAULT_WINDOW);
    Json(state.rolling_average(query.metric, window, query.range).await)
}

pub async fn metric_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Json<MetricSummary> {
    Json(state.metric_summary(query.metric, query.range).await)
}

pub async fn phase_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PhaseStats>, AppError> {
    state
        .phase_stats(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no phase {id}")))
}

pub async fn streaks(State(state): State<AppState>) -> Json<Vec<StreakPoint>> {
    Json(state.streaks().await)
}

pub async fn sync_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        sync: state.sync.status().await,
        load_issues: state.load_issues().to_vec(),
    })
}

pub async fn sync_now(State(state): State<AppState>) -> Json<SyncOutcome> {
    Json(state.sync.sync_now().await)
}

pub async fn visibility(
    State(state): State<AppState>,
    Json(payload): Json<VisibilityRequest>,
) -> Json<SyncOutcome> {
    Json(state.sync.on_visibility_change(payload.hidden).await)
}

pub async fn commits_today(
    State(state): State<AppState>,
) -> Result<Json<CommitCountResponse>, AppError> {
    let since = start_of_today();
    let count = state
        .sync
        .commits_today()
        .await?
        .ok_or_else(|| AppError::not_found("no remote connected"))?;
    Ok(Json(CommitCountResponse {
        since: since.to_rfc3339(),
        count,
    }))
}

pub async fn connect_remote(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<StatusCode, AppError> {
    let missing = [&credentials.token, &credentials.owner, &credentials.repo]
        .iter()
        .any(|field| field.trim().is_empty());
    if missing {
        return Err(AppError::bad_request("token, owner and repo are required"));
    }
    state.connect_remote(credentials).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disconnect_remote(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.disconnect_remote().await?;
    Ok(StatusCode::NO_CONTENT)
}
