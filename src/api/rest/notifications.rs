use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::models::actor::Actor;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/notifications", get(list_notifications))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Json<Vec<Notification>> {
    Json(state.inbox.for_recipient(actor.id))
}
