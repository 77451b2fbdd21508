use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use greensteps_core::{ActivityForm, DashboardSummary, Emission, current_streak, summarize};
use jiff::Timestamp;
use jiff::civil::Date;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use super::auth::Requester;
use super::error::ApiResult;
use crate::store::ActivityRecord;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    limit: Option<usize>,
}

fn calculate(state: &AppState, form: ActivityForm) -> ApiResult<Emission> {
    let table = state.store.factors.table()?;
    Ok(table.compute_with_limits(form, &state.config.limits)?)
}

fn today(state: &AppState) -> Date {
    Timestamp::now().to_zoned(state.time_zone.clone()).date()
}

pub(super) async fn compute(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    body: Result<Json<ActivityForm>, JsonRejection>,
) -> ApiResult<Json<Emission>> {
    let Json(form) = body?;
    Ok(Json(calculate(&state, form)?))
}

pub(super) async fn create(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    body: Result<Json<ActivityForm>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ActivityRecord>)> {
    let Json(form) = body?;
    let emission = calculate(&state, form)?;
    let record = state.store.activities.insert(&user, emission, Timestamp::now())?;
    info!(
        target: "http",
        %user,
        category = %record.category,
        emission_kg = record.emission_kg,
        "activity logged"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub(super) async fn list(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ActivityRecord>>> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    Ok(Json(state.store.activities.recent(&user, limit)?))
}

pub(super) async fn summary(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<DashboardSummary>> {
    let logged: Vec<_> = state
        .store
        .activities
        .all_for(&user)?
        .iter()
        .filter_map(|record| record.logged(&state.time_zone))
        .collect();
    Ok(Json(summarize(&logged, today(&state))))
}

pub(super) async fn streak(
    State(state): State<Arc<AppState>>,
    Requester(user): Requester,
) -> ApiResult<Json<Value>> {
    let days = state
        .store
        .activities
        .all_for(&user)?
        .iter()
        .map(|record| record.created_at.to_zoned(state.time_zone.clone()).date())
        .collect::<Vec<_>>();
    let current = current_streak(days, today(&state));
    Ok(Json(json!({ "current_streak": current })))
}
