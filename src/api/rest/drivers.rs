use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, put};
use axum::Json;
use axum::Router;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::actor::{require_admin, require_driver_access};
use crate::engine::dispatch::{Assignment, DriverPage, DriverStatistics, NewDriver};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::driver::{Driver, DriverAvailability, GeoPoint};
use crate::models::earnings::{EarningsRecord, EarningsSummary, PeriodBucket, PeriodGranularity};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(list_drivers).post(register_driver))
        .route("/drivers/statistics", get(driver_statistics))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", put(update_status))
        .route("/drivers/:id/location", put(update_location))
        .route("/drivers/:id/assign/:order_id", put(assign_order))
        .route("/drivers/:id/queue/reorder", put(reorder_queue))
        .route("/drivers/:id/queue/:order_id", delete(remove_from_queue))
        .route("/drivers/:id/complete-order", put(complete_order))
        .route("/drivers/:id/earnings", get(earnings))
        .route("/drivers/:id/earnings/periods", get(earnings_by_period))
}

#[derive(Deserialize)]
pub struct ListDriversQuery {
    pub availability: Option<DriverAvailability>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    10
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverAvailability,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub order_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct PeriodQuery {
    #[serde(default = "default_granularity")]
    pub period: PeriodGranularity,
    pub year: Option<i32>,
}

fn default_granularity() -> PeriodGranularity {
    PeriodGranularity::Monthly
}

#[derive(Serialize)]
pub struct EarningsResponse {
    pub summary: EarningsSummary,
    pub records: Vec<EarningsRecord>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewDriver>,
) -> Result<Json<Driver>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.register_driver(payload)?))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ListDriversQuery>,
) -> Result<Json<DriverPage>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.list_drivers(
        query.availability,
        query.page,
        query.limit,
    )))
}

async fn driver_statistics(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<DriverStatistics>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.statistics()))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.get_driver(id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    require_driver_access(&actor, id)?;
    let driver = state
        .dispatch
        .set_availability(id, payload.status, payload.location)
        .await?;
    Ok(Json(driver))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    require_driver_access(&actor, id)?;
    Ok(Json(state.dispatch.update_location(id, payload.location).await?))
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, order_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Assignment>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.assign_order(order_id, id).await?))
}

async fn reorder_queue(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<Driver>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.reorder_queue(id, &payload.order_ids).await?))
}

async fn remove_from_queue(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, order_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Driver>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.dispatch.remove_from_queue(id, order_id).await?))
}

async fn complete_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    require_driver_access(&actor, id)?;
    Ok(Json(state.dispatch.complete_current_order(id, actor).await?))
}

async fn earnings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<EarningsResponse>, AppError> {
    require_driver_access(&actor, id)?;
    let records = state.earnings.history(id)?;
    let summary = state.earnings.summary(id, Utc::now())?;
    Ok(Json(EarningsResponse { summary, records }))
}

async fn earnings_by_period(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<PeriodBucket>>, AppError> {
    require_driver_access(&actor, id)?;
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    Ok(Json(state.earnings.by_period(id, query.period, year)?))
}
