use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{Incident, IncidentFilter, IncidentStatusChange, NewIncident};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/incidents", get(list).post(report))
        .route("/incidents/{id}", get(show))
        .route("/incidents/{id}/status", post(set_status))
}

async fn list(
    State(state): State<AppState>,
    Params(filter): Params<IncidentFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Incident>>> {
    let page = state.page(&page);
    Ok(Json(
        state.run(move |s| s.list_incidents(&filter, page)).await?,
    ))
}

async fn report(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewIncident>,
) -> Result<(StatusCode, Json<Incident>)> {
    let incident = state
        .run(move |s| s.report_incident(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

async fn show(State(state): State<AppState>, Id(id): Id) -> Result<Json<Incident>> {
    Ok(Json(state.run(move |s| s.get_incident(id)).await?))
}

async fn set_status(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(change): Body<IncidentStatusChange>,
) -> Result<Json<Incident>> {
    Ok(Json(
        state
            .run(move |s| s.update_incident_status(id, change, &actor))
            .await?,
    ))
}
