use super::{AppState, Result};
use crate::core::{ChangeNotification, MergedView, UpdateRequest};
use crate::service::UserSnapshot;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde_json::{Value, json};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// SSE event name of the property-changed signal.
pub const PROPERTIES_CHANGED_EVENT: &str = "PropertiesChanged";

pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_login_messages(State(state): State<AppState>) -> Json<String> {
    Json(state.login_messages.get())
}

pub async fn dismiss_login_messages(State(state): State<AppState>) -> StatusCode {
    state.login_messages.dismiss();
    StatusCode::NO_CONTENT
}

pub async fn get_records(State(state): State<AppState>) -> Result<Json<MergedView>> {
    let records = state.machines.records().await?;
    Ok(Json(records))
}

pub async fn update_record(
    State(state): State<AppState>,
    Json(payload): Json<UpdateRequest>,
) -> Result<StatusCode> {
    state
        .machines
        .update(&payload.filename, &payload.record, payload.attributes)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn watch_changes(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let receiver = state.machines.subscribe();

    let changes = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => return Some((Ok(notification_event(&notification)), receiver)),
                // Missed signals collapse into the next one; it still tells
                // the observer to re-read.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(changes).keep_alive(KeepAlive::default())
}

pub async fn get_user(State(state): State<AppState>) -> Json<UserSnapshot> {
    Json(state.user.as_ref().clone())
}

fn notification_event(notification: &ChangeNotification) -> Event {
    let data = serde_json::to_string(notification).unwrap_or_else(|_| "{}".to_string());
    Event::default()
        .event(PROPERTIES_CHANGED_EVENT)
        .id(notification.serial.to_string())
        .data(data)
}
