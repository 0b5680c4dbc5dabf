use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::catalog::{self, Product};
use crate::engine::lifecycle::{NewOrder, OrderFilter};
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/products", get(products))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
        .route("/orders/:id/cancel", put(cancel_order))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

async fn products() -> Json<Vec<Product>> {
    Json(catalog::products())
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.create_order(actor, payload).await?))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<Order>>, AppError> {
    if actor.role == Role::Customer {
        return Err(AppError::AccessDenied(
            "order listing is for staff only".to_string(),
        ));
    }
    Ok(Json(state.lifecycle.list_orders(actor, &filter)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.get_order(actor, id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.update_status(id, payload.status, actor).await?))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.cancel_order(id, actor).await?))
}
