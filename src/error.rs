use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("driver {0} not found")]
    DriverNotFound(Uuid),

    #[error("earnings record {0} not found")]
    EarningsNotFound(Uuid),

    #[error("driver {0} is offline and cannot be assigned orders")]
    DriverOffline(Uuid),

    #[error("driver {driver_id} queue is full ({capacity} orders)")]
    QueueFull { driver_id: Uuid, capacity: u8 },

    #[error("order {order_id} is already assigned to driver {driver_id}")]
    AlreadyAssigned { order_id: Uuid, driver_id: Uuid },

    #[error("cannot change status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid queue order: {0}")]
    InvalidQueueOrder(String),

    #[error("order {order_id} not found in driver {driver_id} queue")]
    OrderNotFoundInQueue { order_id: Uuid, driver_id: Uuid },

    #[error("driver {0} has no current order to complete")]
    NoCurrentOrder(Uuid),

    #[error("order {0} has no assigned driver")]
    OrderNotAssigned(Uuid),

    #[error("invalid availability change: {0}")]
    InvalidAvailability(String),

    #[error("earnings total cannot be negative (computed {0:.2})")]
    NegativeEarnings(f64),

    #[error("earnings record already exists for order {0}")]
    EarningsAlreadyExist(Uuid),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing or malformed caller identity")]
    Unauthenticated,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    AccessDenied,
    Unauthenticated,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::OrderNotFound(_)
            | AppError::DriverNotFound(_)
            | AppError::EarningsNotFound(_) => ErrorKind::NotFound,
            AppError::DriverOffline(_)
            | AppError::QueueFull { .. }
            | AppError::AlreadyAssigned { .. }
            | AppError::InvalidTransition { .. }
            | AppError::InvalidQueueOrder(_)
            | AppError::OrderNotFoundInQueue { .. }
            | AppError::NoCurrentOrder(_)
            | AppError::OrderNotAssigned(_)
            | AppError::InvalidAvailability(_)
            | AppError::NegativeEarnings(_)
            | AppError::EarningsAlreadyExist(_)
            | AppError::BadRequest(_) => ErrorKind::InvalidState,
            AppError::AccessDenied(_) => ErrorKind::AccessDenied,
            AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match kind {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ErrorKind::InvalidState => (StatusCode::BAD_REQUEST, self.to_string()),
            ErrorKind::AccessDenied => (StatusCode::FORBIDDEN, self.to_string()),
            ErrorKind::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            ErrorKind::Internal => {
                tracing::error!(error = %self, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}
