use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{NewVehicle, ParkingLog, Vehicle, VehicleFilter, VehicleStatusChange};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/vehicles", get(list).post(register))
        .route("/vehicles/{id}", get(show))
        .route("/vehicles/{id}/status", post(set_status))
        .route("/vehicles/{id}/entry", post(entry))
        .route("/vehicles/{id}/exit", post(exit))
        .route("/vehicles/{id}/history", get(history))
}

async fn list(
    State(state): State<AppState>,
    Params(filter): Params<VehicleFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Vehicle>>> {
    let page = state.page(&page);
    Ok(Json(
        state.run(move |s| s.list_vehicles(&filter, page)).await?,
    ))
}

async fn register(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewVehicle>,
) -> Result<(StatusCode, Json<Vehicle>)> {
    let vehicle = state
        .run(move |s| s.register_vehicle(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn show(State(state): State<AppState>, Id(id): Id) -> Result<Json<Vehicle>> {
    Ok(Json(state.run(move |s| s.get_vehicle(id)).await?))
}

async fn set_status(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(change): Body<VehicleStatusChange>,
) -> Result<Json<Vehicle>> {
    Ok(Json(
        state
            .run(move |s| s.set_vehicle_status(id, change, &actor))
            .await?,
    ))
}

async fn entry(
    State(state): State<AppState>,
    Id(id): Id,
) -> Result<(StatusCode, Json<ParkingLog>)> {
    let log = state.run(move |s| s.record_entry(id)).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn exit(
    State(state): State<AppState>,
    Id(id): Id,
) -> Result<(StatusCode, Json<ParkingLog>)> {
    let log = state.run(move |s| s.record_exit(id)).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn history(
    State(state): State<AppState>,
    Id(id): Id,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<ParkingLog>>> {
    let page = state.page(&page);
    Ok(Json(
        state.run(move |s| s.parking_history(id, page)).await?,
    ))
}
