use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::require_admin;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::earnings::{EarningsRecord, PaymentStatus, PayoutMethod};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/earnings/payouts", post(mark_paid))
        .route("/earnings/:id/tip", post(add_tip))
        .route("/earnings/:id/bonus", post(add_bonus))
        .route("/earnings/:id/payment-status", put(set_payment_status))
}

#[derive(Deserialize)]
pub struct TipRequest {
    pub amount: f64,
}

#[derive(Deserialize)]
pub struct BonusRequest {
    pub amount: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Deserialize)]
pub struct PayoutRequest {
    pub record_ids: Vec<Uuid>,
    #[serde(default)]
    pub method: PayoutMethod,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

async fn add_tip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<TipRequest>,
) -> Result<Json<EarningsRecord>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.earnings.add_tip(id, payload.amount).await?))
}

async fn add_bonus(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<BonusRequest>,
) -> Result<Json<EarningsRecord>, AppError> {
    require_admin(&actor)?;
    let record = state
        .earnings
        .add_bonus(id, payload.amount, payload.reason)
        .await?;
    Ok(Json(record))
}

async fn set_payment_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentStatusRequest>,
) -> Result<Json<EarningsRecord>, AppError> {
    require_admin(&actor)?;
    Ok(Json(state.earnings.set_payment_status(id, payload.status).await?))
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<PayoutRequest>,
) -> Result<Json<Vec<EarningsRecord>>, AppError> {
    require_admin(&actor)?;
    let paid = state
        .earnings
        .mark_paid(&payload.record_ids, payload.method, payload.transaction_id)
        .await?;
    Ok(Json(paid))
}
