use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{NewNotification, Notification};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list).post(publish))
        .route("/notifications/{id}", get(show).delete(remove))
        .route("/notifications/{id}/read", post(mark_read))
}

async fn list(
    State(state): State<AppState>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Notification>>> {
    let page = state.page(&page);
    Ok(Json(state.run(move |s| s.list_notifications(page)).await?))
}

async fn publish(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewNotification>,
) -> Result<(StatusCode, Json<Notification>)> {
    let notification = state
        .run(move |s| s.publish_notification(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn show(State(state): State<AppState>, Id(id): Id) -> Result<Json<Notification>> {
    Ok(Json(state.run(move |s| s.get_notification(id)).await?))
}

async fn remove(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<StatusCode> {
    state
        .run(move |s| s.delete_notification(id, &actor))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ReadReceipt {
    apartment_id: i64,
}

async fn mark_read(
    State(state): State<AppState>,
    Id(id): Id,
    Body(receipt): Body<ReadReceipt>,
) -> Result<StatusCode> {
    state
        .run(move |s| s.mark_read(id, receipt.apartment_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
