use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{NewVisit, Visit, VisitFilter};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/visits", get(list).post(check_in))
        .route("/visits/{id}", get(show))
        .route("/visits/{id}/checkout", post(check_out))
}

async fn list(
    State(state): State<AppState>,
    Params(filter): Params<VisitFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Visit>>> {
    let page = state.page(&page);
    Ok(Json(state.run(move |s| s.list_visits(&filter, page)).await?))
}

async fn check_in(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewVisit>,
) -> Result<(StatusCode, Json<Visit>)> {
    let visit = state
        .run(move |s| s.check_in_visitor(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

async fn show(State(state): State<AppState>, Id(id): Id) -> Result<Json<Visit>> {
    Ok(Json(state.run(move |s| s.get_visit(id)).await?))
}

async fn check_out(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<Json<Visit>> {
    Ok(Json(
        state
            .run(move |s| s.check_out_visitor(id, &actor))
            .await?,
    ))
}
