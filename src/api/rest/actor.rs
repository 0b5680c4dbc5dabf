//! Caller identity. An upstream gateway authenticates the request and
//! forwards the caller as `x-user-id` and `x-user-role` headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthenticated)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_ID_HEADER)?
            .trim()
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthenticated)?;
        let role = header(parts, USER_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|_| AppError::Unauthenticated)?;

        Ok(Actor::new(id, role))
    }
}

pub fn require_admin(actor: &Actor) -> Result<(), AppError> {
    if !actor.is_admin() {
        return Err(AppError::AccessDenied("admin role required".to_string()));
    }
    Ok(())
}

pub fn require_driver_access(actor: &Actor, driver_id: Uuid) -> Result<(), AppError> {
    if !actor.acts_for_driver(driver_id) {
        return Err(AppError::AccessDenied(format!(
            "not allowed to act for driver {driver_id}"
        )));
    }
    Ok(())
}
