use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{NewResident, Resident, ResidentFilter, ResidentStatusChange, ResidentUpdate};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/residents", get(list).post(register))
        .route("/residents/{id}", get(show).put(update).delete(remove))
        .route("/residents/{id}/status", post(set_status))
}

async fn list(
    State(state): State<AppState>,
    Params(filter): Params<ResidentFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Resident>>> {
    let page = state.page(&page);
    Ok(Json(
        state.run(move |s| s.list_residents(&filter, page)).await?,
    ))
}

async fn register(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewResident>,
) -> Result<(StatusCode, Json<Resident>)> {
    let resident = state
        .run(move |s| s.register_resident(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(resident)))
}

async fn show(State(state): State<AppState>, Id(id): Id) -> Result<Json<Resident>> {
    Ok(Json(state.run(move |s| s.get_resident(id)).await?))
}

async fn update(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(update): Body<ResidentUpdate>,
) -> Result<Json<Resident>> {
    let resident = state
        .run(move |s| s.update_resident(id, update, &actor))
        .await?;
    Ok(Json(resident))
}

async fn remove(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<StatusCode> {
    state.run(move |s| s.delete_resident(id, &actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(change): Body<ResidentStatusChange>,
) -> Result<Json<Resident>> {
    let resident = state
        .run(move |s| s.set_resident_status(id, change, &actor))
        .await?;
    Ok(Json(resident))
}
