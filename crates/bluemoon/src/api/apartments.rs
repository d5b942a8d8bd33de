use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{
    Apartment, ApartmentBalance, ApartmentFilter, ApartmentNotification, NewApartment,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/apartments", get(list).post(create))
        .route("/apartments/{id}", get(show).put(update).delete(remove))
        .route("/apartments/{id}/balance", get(balance))
        .route("/apartments/{id}/notifications", get(notifications))
}

async fn list(
    State(state): State<AppState>,
    Params(filter): Params<ApartmentFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Apartment>>> {
    let page = state.page(&page);
    let apartments = state
        .run(move |s| s.list_apartments(&filter, page))
        .await?;
    Ok(Json(apartments))
}

async fn create(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewApartment>,
) -> Result<(StatusCode, Json<Apartment>)> {
    let apartment = state
        .run(move |s| s.create_apartment(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(apartment)))
}

async fn show(State(state): State<AppState>, Id(id): Id) -> Result<Json<Apartment>> {
    Ok(Json(state.run(move |s| s.get_apartment(id)).await?))
}

async fn update(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(input): Body<NewApartment>,
) -> Result<Json<Apartment>> {
    let apartment = state
        .run(move |s| s.update_apartment(id, input, &actor))
        .await?;
    Ok(Json(apartment))
}

async fn remove(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<StatusCode> {
    state.run(move |s| s.delete_apartment(id, &actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn balance(State(state): State<AppState>, Id(id): Id) -> Result<Json<ApartmentBalance>> {
    Ok(Json(state.run(move |s| s.apartment_balance(id)).await?))
}

#[derive(Debug, Default, Deserialize)]
struct InboxQuery {
    #[serde(default)]
    unread_only: bool,
}

async fn notifications(
    State(state): State<AppState>,
    Id(id): Id,
    Params(query): Params<InboxQuery>,
) -> Result<Json<Vec<ApartmentNotification>>> {
    let notices = state
        .run(move |s| s.notifications_for_apartment(id, query.unread_only))
        .await?;
    Ok(Json(notices))
}
